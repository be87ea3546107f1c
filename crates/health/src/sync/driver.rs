//! Single-shot and continuous execution of sync cycles
//!
//! At most one cycle runs at a time. Manual triggers that arrive while a
//! cycle is in flight are refused; the continuous loop waits its turn.
//! Cancellation is cooperative and only observed between cycles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::time::Duration;

use super::orchestrator::SyncCycle;
use super::result::{CycleOutcome, SyncRunResult};
use crate::clock::Clock;
use crate::config::SyncSettings;
use crate::error::DriverError;

/// Cloneable stop flag for continuous mode
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Pacing for continuous mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Idle time from the end of one cycle to the start of the next
    pub interval: Duration,
    /// First wait after a cycle that could not authenticate
    pub auth_backoff_initial: Duration,
    pub auth_backoff_max: Duration,
    /// Granularity at which idle waits check for cancellation
    pub poll_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            auth_backoff_initial: Duration::from_secs(60),
            auth_backoff_max: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl DriverConfig {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            interval: settings.interval(),
            auth_backoff_initial: Duration::from_secs(settings.auth_backoff.initial_secs),
            auth_backoff_max: Duration::from_secs(settings.auth_backoff.max_secs),
            ..Self::default()
        }
    }
}

/// Runs cycles once or on a fixed interval
pub struct SyncDriver {
    cycle: Arc<dyn SyncCycle>,
    clock: Arc<dyn Clock>,
    config: DriverConfig,
    /// Held for the duration of every cycle
    in_flight: Mutex<()>,
    last_result: RwLock<Option<SyncRunResult>>,
}

impl SyncDriver {
    pub fn new(cycle: Arc<dyn SyncCycle>, clock: Arc<dyn Clock>, config: DriverConfig) -> Self {
        Self {
            cycle,
            clock,
            config,
            in_flight: Mutex::new(()),
            last_result: RwLock::new(None),
        }
    }

    /// Run exactly one cycle, refusing if one is already running
    pub fn run_single(&self) -> Result<SyncRunResult, DriverError> {
        let guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(DriverError::CycleInProgress),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        Ok(self.execute(guard))
    }

    /// Manual or API-initiated cycle, alongside a running continuous loop
    pub fn trigger(&self) -> Result<SyncRunResult, DriverError> {
        log::info!("[DRIVER] Manual sync triggered");
        self.run_single()
    }

    /// Run cycles until `cancel` is observed. Returns the number of cycles run.
    pub fn run_continuous(&self, cancel: &CancelToken) -> usize {
        let mut cycles = 0;
        let mut auth_backoff: Option<Duration> = None;

        log::info!(
            "[DRIVER] Continuous sync every {}s",
            self.config.interval.as_secs()
        );

        while !cancel.is_cancelled() {
            let guard = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            let result = self.execute(guard);
            cycles += 1;

            if cancel.is_cancelled() {
                break;
            }

            let wait = if result.authenticated() {
                auth_backoff = None;
                self.config.interval
            } else {
                let next = self.next_auth_backoff(auth_backoff);
                auth_backoff = Some(next);
                log::warn!(
                    "[DRIVER] Authentication failed, backing off {}s",
                    next.as_secs()
                );
                next
            };

            self.idle(wait, cancel);
        }

        log::info!("[DRIVER] Stopped after {} cycle(s)", cycles);
        cycles
    }

    /// Last completed cycle's result
    pub fn last_result(&self) -> Option<SyncRunResult> {
        self.last_result.read().unwrap().clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.in_flight.try_lock(), Err(TryLockError::WouldBlock))
    }

    fn execute(&self, _guard: MutexGuard<'_, ()>) -> SyncRunResult {
        let result = self.cycle.run_cycle();
        if result.outcome == CycleOutcome::TotalFailure {
            log::error!("[DRIVER] Cycle {} failed to authenticate", result.run_id);
        }
        *self.last_result.write().unwrap() = Some(result.clone());
        result
    }

    /// Doubles the previous auth backoff, capped at the configured maximum
    fn next_auth_backoff(&self, previous: Option<Duration>) -> Duration {
        match previous {
            Some(previous) => previous.saturating_mul(2).min(self.config.auth_backoff_max),
            None => self.config.auth_backoff_initial,
        }
    }

    /// Sleep for `total` in slices, returning early on cancellation
    fn idle(&self, total: Duration, cancel: &CancelToken) {
        let slice = self.config.poll_interval.max(Duration::from_millis(1));
        let mut remaining = total;
        while !remaining.is_zero() && !cancel.is_cancelled() {
            let step = remaining.min(slice);
            self.clock.sleep(step);
            remaining -= step;
        }
    }
}
