//! Sync engine for collecting and storing health data
//!
//! [`Orchestrator`] runs one cycle across every domain; [`SyncDriver`] runs
//! cycles once or continuously. Re-running a cycle over an overlapping
//! window is idempotent.

mod driver;
mod orchestrator;
mod result;

pub use driver::{CancelToken, DriverConfig, SyncDriver};
pub use orchestrator::{CyclePhase, Orchestrator, SyncCycle};
pub use result::{CycleOutcome, DomainOutcome, SyncRunResult};
