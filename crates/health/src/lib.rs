//! Health crate - Incremental sync of personal health telemetry
//!
//! This crate provides the sync engine that pulls wellness data from the
//! upstream platform into a local store, including:
//! - Domain models (cursors, windows, normalized health records)
//! - Upstream API client and token-based authentication
//! - Per-domain source collectors behind a shared rate limiter
//! - Storage trait abstractions with SQLite and in-memory backends
//! - Cycle orchestration and the single-shot / continuous loop driver
//!
//! All I/O is blocking; callers that need async wrap the driver in a thread.

pub mod clock;
pub mod collect;
pub mod config;
pub mod connect;
pub mod error;
pub mod models;
pub mod session;
pub mod storage;
pub mod sync;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collect::{
    Collected, CollectorRegistry, Discovered, RateLimiter, RetryPolicy, SourceCollector,
    UploadWatermark, Upstream,
};
pub use config::{ConnectCredentials, SyncSettings};
pub use connect::{ConnectAuth, ConnectClient, ConnectEndpoints, WellnessApi};
pub use error::{AuthError, CollectionError, DriverError, StorageError, UpstreamError};
pub use models::{
    Activity, ActivityId, BodyCompositionReading, CollectionLogEntry, DailySummary, Domain,
    HealthRecord, HeartRateSample, HrvReading, LogScope, RespirationSample, SleepSession,
    StressSample, SyncCursor, SyncStatus, SyncWindow, TrackPoint, WindowCaps, WindowClamp,
};
pub use session::{Authenticator, MfaCodeProvider, Session};
pub use storage::{HealthStore, InMemoryHealthStore, SqliteHealthStore};
pub use sync::{
    CancelToken, CycleOutcome, CyclePhase, DomainOutcome, DriverConfig, Orchestrator, SyncCycle,
    SyncDriver, SyncRunResult,
};
