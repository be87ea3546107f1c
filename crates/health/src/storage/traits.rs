//! Storage trait definitions

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{CollectionLogEntry, Domain, HealthRecord, SyncCursor, SyncStatus};

/// Trait for health data storage operations
///
/// Backends own the sync cursors and the collection log as well as the
/// records, so a domain's records and its cursor can be committed in one
/// transaction.
pub trait HealthStore: Send + Sync {
    /// Get the cursor for a domain, `None` if it has never been synced
    fn get_cursor(&self, domain: Domain) -> Result<Option<SyncCursor>>;

    /// All cursors, in domain order
    fn list_cursors(&self) -> Result<Vec<SyncCursor>>;

    /// Upsert `records` by natural key and advance the domain's cursor to
    /// `synced_to`, atomically.
    ///
    /// Either everything is committed or nothing is. The cursor never moves
    /// backwards; a stale `synced_to` only updates the status. Every record
    /// must belong to `domain`.
    fn commit_domain(
        &self,
        domain: Domain,
        records: &[HealthRecord],
        synced_to: DateTime<Utc>,
        status: SyncStatus,
    ) -> Result<SyncCursor>;

    /// Record a run outcome without moving the watermark. Does nothing for a
    /// domain without a cursor.
    fn record_cursor_status(&self, domain: Domain, status: SyncStatus) -> Result<()>;

    /// Append an audit entry
    fn append_log(&self, entry: &CollectionLogEntry) -> Result<()>;

    /// Entries written by one run, in write order
    fn list_logs(&self, run_id: &str) -> Result<Vec<CollectionLogEntry>>;

    /// Most recent entries first
    fn recent_logs(&self, limit: usize) -> Result<Vec<CollectionLogEntry>>;

    /// All stored records of a domain, ordered by natural key
    fn list_records(&self, domain: Domain) -> Result<Vec<HealthRecord>>;

    /// Count stored records of a domain
    fn count_records(&self, domain: Domain) -> Result<usize>;
}

/// Reject records that do not belong to the domain being committed
pub(crate) fn check_domain(domain: Domain, records: &[HealthRecord]) -> Result<()> {
    if let Some(stray) = records.iter().find(|r| r.domain() != domain) {
        anyhow::bail!(
            "Cannot commit {} record {} as part of {}",
            stray.domain(),
            stray.natural_key(),
            domain
        );
    }
    Ok(())
}
