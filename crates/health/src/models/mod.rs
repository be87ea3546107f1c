//! Domain models for synced health data

mod collection_log;
mod domain;
mod records;
mod sync_cursor;
mod window;

pub use collection_log::{CollectionLogEntry, LogScope};
pub use domain::{Domain, ParseNameError, SyncStatus};
pub use records::{
    Activity, ActivityId, BodyCompositionReading, DailySummary, HealthRecord, HeartRateSample,
    HrvReading, RespirationSample, SleepSession, StressSample, TrackPoint,
};
pub use sync_cursor::SyncCursor;
pub use window::{SyncWindow, WindowCaps, WindowClamp, start_of_day};
