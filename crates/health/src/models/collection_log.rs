//! Append-only audit trail of collection attempts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Domain, ParseNameError, SyncStatus};

/// What a log entry describes: one domain, or the authentication step that
/// precedes all domains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogScope {
    Authentication,
    Domain(Domain),
}

impl LogScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogScope::Authentication => "authentication",
            LogScope::Domain(domain) => domain.as_str(),
        }
    }

    pub fn domain(&self) -> Option<Domain> {
        match self {
            LogScope::Authentication => None,
            LogScope::Domain(domain) => Some(*domain),
        }
    }
}

impl fmt::Display for LogScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogScope {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "authentication" {
            return Ok(LogScope::Authentication);
        }
        s.parse().map(LogScope::Domain)
    }
}

/// One collection attempt for one scope within one run. Never mutated after
/// being written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionLogEntry {
    pub run_id: String,
    pub scope: LogScope,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: SyncStatus,
    pub records_collected: usize,
    /// Failure cause, or the clamp warning for a partial run
    pub error_detail: Option<String>,
}

impl CollectionLogEntry {
    pub fn domain(&self) -> Option<Domain> {
        self.scope.domain()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}
