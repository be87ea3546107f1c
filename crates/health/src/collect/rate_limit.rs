//! Global spacing gate for upstream calls

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;

/// Enforces a minimum interval between consecutive upstream calls.
///
/// Not a token bucket: there is no burst allowance. Every `acquire` returns
/// at least `min_interval` after the previous one returned, across every
/// collector sharing the instance. Callers are serialized on the internal
/// lock while they wait.
pub struct RateLimiter {
    min_interval: Duration,
    last_acquired: Mutex<Option<DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

    pub fn new(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            last_acquired: Mutex::new(None),
            clock,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until the next upstream call may be made
    pub fn acquire(&self) {
        let mut last = self.last_acquired.lock().unwrap();

        if let Some(previous) = *last {
            // A clock that went backwards counts as no time elapsed
            let elapsed = (self.clock.now() - previous)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                log::trace!("[RATE] waiting {:?} before next upstream call", wait);
                self.clock.sleep(wait);
            }
        }

        *last = Some(self.clock.now());
    }
}
