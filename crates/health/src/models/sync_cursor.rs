//! Per-domain watermark for incremental sync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Domain, SyncStatus};

/// Tracks sync progress for one data domain
///
/// Persisted separately from the records so each domain can be retried
/// independently. Only one SyncCursor per domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub domain: Domain,
    /// End of the last window whose records were durably committed
    pub last_synced_at: DateTime<Utc>,
    /// Outcome of the last run for this domain
    pub last_status: SyncStatus,
}

impl SyncCursor {
    pub fn new(domain: Domain, last_synced_at: DateTime<Utc>, last_status: SyncStatus) -> Self {
        Self {
            domain,
            last_synced_at,
            last_status,
        }
    }

    /// Merge a newer commit into this cursor.
    ///
    /// The watermark never moves backwards; the status always reflects the
    /// latest run.
    pub fn advanced(mut self, to: DateTime<Utc>, status: SyncStatus) -> Self {
        if to > self.last_synced_at {
            self.last_synced_at = to;
        }
        self.last_status = status;
        self
    }

    /// Record a run outcome without moving the watermark
    pub fn with_status(mut self, status: SyncStatus) -> Self {
        self.last_status = status;
        self
    }
}
