//! Outcome of one sync cycle

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Domain, SyncStatus, SyncWindow, WindowClamp};

/// Terminal state of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Every domain committed
    Success,
    /// At least one domain failed; the others committed
    PartialFailure,
    /// Authentication failed before any domain ran
    TotalFailure,
    /// The device has not uploaded since every domain's cursor; nothing ran
    UpToDate,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Success => "success",
            CycleOutcome::PartialFailure => "partial_failure",
            CycleOutcome::TotalFailure => "total_failure",
            CycleOutcome::UpToDate => "up_to_date",
        }
    }
}

/// What happened to one domain during a cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainOutcome {
    pub domain: Domain,
    pub status: SyncStatus,
    pub records_collected: usize,
    /// Window computed from the cursor, before upstream caps
    pub window: Option<SyncWindow>,
    pub clamp: Option<WindowClamp>,
    /// Cursor position after the cycle, `None` if the domain was never synced
    pub synced_to: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl DomainOutcome {
    pub fn succeeded(&self) -> bool {
        !self.status.is_failure()
    }
}

/// Aggregate of one orchestrator cycle, kept in memory for reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncRunResult {
    pub run_id: String,
    pub outcome: CycleOutcome,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Per-domain outcomes in processing order; empty on total failure
    pub domains: Vec<DomainOutcome>,
    pub auth_error: Option<String>,
    /// Device upload time the cycle's windows were bounded by, when known
    pub last_upload: Option<DateTime<Utc>>,
}

impl SyncRunResult {
    /// Result of a cycle whose domains all ran
    pub fn completed(
        run_id: String,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        domains: Vec<DomainOutcome>,
    ) -> Self {
        let outcome = if domains.iter().all(DomainOutcome::succeeded) {
            CycleOutcome::Success
        } else {
            CycleOutcome::PartialFailure
        };
        Self {
            run_id,
            outcome,
            started_at,
            ended_at,
            domains,
            auth_error: None,
            last_upload: None,
        }
    }

    /// Result of a cycle skipped because nothing was uploaded since the
    /// last one
    pub fn up_to_date(
        run_id: String,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        last_upload: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            outcome: CycleOutcome::UpToDate,
            started_at,
            ended_at,
            domains: Vec::new(),
            auth_error: None,
            last_upload: Some(last_upload),
        }
    }

    /// Result of a cycle that could not authenticate
    pub fn auth_failed(
        run_id: String,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        error: String,
    ) -> Self {
        Self {
            run_id,
            outcome: CycleOutcome::TotalFailure,
            started_at,
            ended_at,
            domains: Vec::new(),
            auth_error: Some(error),
            last_upload: None,
        }
    }

    pub fn total_records(&self) -> usize {
        self.domains.iter().map(|d| d.records_collected).sum()
    }

    pub fn domain(&self, domain: Domain) -> Option<&DomainOutcome> {
        self.domains.iter().find(|d| d.domain == domain)
    }

    pub fn failed_domains(&self) -> Vec<Domain> {
        self.domains
            .iter()
            .filter(|d| !d.succeeded())
            .map(|d| d.domain)
            .collect()
    }

    /// Whether the cycle got past authentication
    pub fn authenticated(&self) -> bool {
        self.outcome != CycleOutcome::TotalFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(domain: Domain, status: SyncStatus, records: usize) -> DomainOutcome {
        let now = Utc::now();
        DomainOutcome {
            domain,
            status,
            records_collected: records,
            window: None,
            clamp: None,
            synced_to: None,
            error: None,
            started_at: now,
            ended_at: now,
        }
    }

    #[test]
    fn test_partial_clamp_still_counts_as_success() {
        let now = Utc::now();
        let result = SyncRunResult::completed(
            "r1".into(),
            now,
            now,
            vec![
                outcome(Domain::DailySummary, SyncStatus::Success, 7),
                outcome(Domain::HeartRate, SyncStatus::Partial, 120),
            ],
        );
        assert_eq!(result.outcome, CycleOutcome::Success);
        assert_eq!(result.total_records(), 127);
        assert!(result.failed_domains().is_empty());
    }

    #[test]
    fn test_any_failed_domain_is_partial_failure() {
        let now = Utc::now();
        let result = SyncRunResult::completed(
            "r1".into(),
            now,
            now,
            vec![
                outcome(Domain::DailySummary, SyncStatus::Success, 7),
                outcome(Domain::Sleep, SyncStatus::Failed, 0),
            ],
        );
        assert_eq!(result.outcome, CycleOutcome::PartialFailure);
        assert_eq!(result.failed_domains(), vec![Domain::Sleep]);
        assert!(result.authenticated());
    }

    #[test]
    fn test_up_to_date_is_authenticated() {
        let now = Utc::now();
        let result = SyncRunResult::up_to_date("r1".into(), now, now, now);
        assert!(result.authenticated());
        assert_eq!(result.total_records(), 0);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"], "up_to_date");
    }

    #[test]
    fn test_auth_failure_serializes() {
        let now = Utc::now();
        let result = SyncRunResult::auth_failed("r1".into(), now, now, "bad password".into());
        assert!(!result.authenticated());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"], "total_failure");
        assert_eq!(json["auth_error"], "bad password");
    }
}
