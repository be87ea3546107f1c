//! In-memory storage implementation, used for testing

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use super::HealthStore;
use super::traits::check_domain;
use crate::models::{CollectionLogEntry, Domain, HealthRecord, SyncCursor, SyncStatus};

/// In-memory implementation of HealthStore
///
/// Uses maps protected by RwLocks for thread-safe access. Commits take
/// every write lock they need up front, so readers never observe records
/// without their cursor.
#[derive(Default)]
pub struct InMemoryHealthStore {
    /// domain -> natural key -> record
    records: RwLock<HashMap<Domain, BTreeMap<String, HealthRecord>>>,
    cursors: RwLock<BTreeMap<Domain, SyncCursor>>,
    logs: RwLock<Vec<CollectionLogEntry>>,
}

impl InMemoryHealthStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

impl HealthStore for InMemoryHealthStore {
    fn get_cursor(&self, domain: Domain) -> Result<Option<SyncCursor>> {
        Ok(self.cursors.read().unwrap().get(&domain).cloned())
    }

    fn list_cursors(&self) -> Result<Vec<SyncCursor>> {
        Ok(self.cursors.read().unwrap().values().cloned().collect())
    }

    fn commit_domain(
        &self,
        domain: Domain,
        records: &[HealthRecord],
        synced_to: DateTime<Utc>,
        status: SyncStatus,
    ) -> Result<SyncCursor> {
        check_domain(domain, records)?;

        let mut stored = self.records.write().unwrap();
        let mut cursors = self.cursors.write().unwrap();

        let table = stored.entry(domain).or_default();
        for record in records {
            table.insert(record.natural_key(), record.clone());
        }

        let cursor = match cursors.remove(&domain) {
            Some(existing) => existing.advanced(synced_to, status),
            None => SyncCursor::new(domain, synced_to, status),
        };
        cursors.insert(domain, cursor.clone());
        Ok(cursor)
    }

    fn record_cursor_status(&self, domain: Domain, status: SyncStatus) -> Result<()> {
        if let Some(cursor) = self.cursors.write().unwrap().get_mut(&domain) {
            cursor.last_status = status;
        }
        Ok(())
    }

    fn append_log(&self, entry: &CollectionLogEntry) -> Result<()> {
        self.logs.write().unwrap().push(entry.clone());
        Ok(())
    }

    fn list_logs(&self, run_id: &str) -> Result<Vec<CollectionLogEntry>> {
        Ok(self
            .logs
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect())
    }

    fn recent_logs(&self, limit: usize) -> Result<Vec<CollectionLogEntry>> {
        Ok(self
            .logs
            .read()
            .unwrap()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    fn list_records(&self, domain: Domain) -> Result<Vec<HealthRecord>> {
        Ok(self
            .records
            .read()
            .unwrap()
            .get(&domain)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    fn count_records(&self, domain: Domain) -> Result<usize> {
        Ok(self
            .records
            .read()
            .unwrap()
            .get(&domain)
            .map_or(0, BTreeMap::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DailySummary, HeartRateSample, LogScope};
    use chrono::{Duration, NaiveDate};

    fn summary(day: u32, steps: i64) -> HealthRecord {
        let mut summary = DailySummary::new(NaiveDate::from_ymd_opt(2025, 3, day).unwrap());
        summary.total_steps = Some(steps);
        HealthRecord::DailySummary(summary)
    }

    #[test]
    fn test_commit_upserts_by_natural_key() {
        let store = InMemoryHealthStore::new();
        let now = Utc::now();

        store
            .commit_domain(
                Domain::DailySummary,
                &[summary(9, 100), summary(10, 200)],
                now,
                SyncStatus::Success,
            )
            .unwrap();
        store
            .commit_domain(
                Domain::DailySummary,
                &[summary(10, 250)],
                now + Duration::minutes(5),
                SyncStatus::Success,
            )
            .unwrap();

        let records = store.list_records(Domain::DailySummary).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], summary(10, 250));
    }

    #[test]
    fn test_cursor_never_moves_backwards() {
        let store = InMemoryHealthStore::new();
        let now = Utc::now();

        store
            .commit_domain(Domain::Sleep, &[], now, SyncStatus::Success)
            .unwrap();
        let cursor = store
            .commit_domain(Domain::Sleep, &[], now - Duration::hours(1), SyncStatus::Partial)
            .unwrap();

        assert_eq!(cursor.last_synced_at, now);
        assert_eq!(cursor.last_status, SyncStatus::Partial);
    }

    #[test]
    fn test_stray_record_rejects_whole_commit() {
        let store = InMemoryHealthStore::new();
        let stray = HealthRecord::HeartRate(HeartRateSample {
            timestamp: Utc::now(),
            bpm: 60,
        });

        let result = store.commit_domain(
            Domain::DailySummary,
            &[summary(10, 1), stray],
            Utc::now(),
            SyncStatus::Success,
        );

        assert!(result.is_err());
        assert_eq!(store.count_records(Domain::DailySummary).unwrap(), 0);
        assert!(store.get_cursor(Domain::DailySummary).unwrap().is_none());
    }

    #[test]
    fn test_status_only_update_needs_cursor() {
        let store = InMemoryHealthStore::new();
        store
            .record_cursor_status(Domain::Stress, SyncStatus::Failed)
            .unwrap();
        assert!(store.get_cursor(Domain::Stress).unwrap().is_none());

        let now = Utc::now();
        store
            .commit_domain(Domain::Stress, &[], now, SyncStatus::Success)
            .unwrap();
        store
            .record_cursor_status(Domain::Stress, SyncStatus::Failed)
            .unwrap();

        let cursor = store.get_cursor(Domain::Stress).unwrap().unwrap();
        assert_eq!(cursor.last_synced_at, now);
        assert_eq!(cursor.last_status, SyncStatus::Failed);
    }

    #[test]
    fn test_logs_by_run_and_recency() {
        let store = InMemoryHealthStore::new();
        let now = Utc::now();
        for (run, scope) in [
            ("r1", LogScope::Authentication),
            ("r2", LogScope::Domain(Domain::Sleep)),
            ("r2", LogScope::Domain(Domain::Stress)),
        ] {
            store
                .append_log(&CollectionLogEntry {
                    run_id: run.into(),
                    scope,
                    started_at: now,
                    ended_at: now,
                    status: SyncStatus::Success,
                    records_collected: 0,
                    error_detail: None,
                })
                .unwrap();
        }

        assert_eq!(store.list_logs("r2").unwrap().len(), 2);
        let recent = store.recent_logs(1).unwrap();
        assert_eq!(recent[0].scope, LogScope::Domain(Domain::Stress));
    }
}
