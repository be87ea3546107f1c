//! Bounded retry with exponential backoff for upstream calls

use std::time::Duration;

use crate::clock::Clock;
use crate::error::UpstreamError;

/// How many times an upstream call is attempted and how long to wait
/// between attempts.
///
/// Only transient failures ([`UpstreamError::is_transient`]) are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2,
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// The call still failed when the policy gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: UpstreamError,
}

impl RetryPolicy {
    /// A policy that makes a single attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Wait before retry number `retry` (0 = the wait after the first failure)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(retry);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub fn run<T>(
        &self,
        clock: &dyn Clock,
        mut op: impl FnMut(u32) -> Result<T, UpstreamError>,
    ) -> Result<T, RetryExhausted> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let wait = self.backoff_for(attempt - 1);
                    log::warn!(
                        "[RETRY] attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        max_attempts,
                        err,
                        wait
                    );
                    clock.sleep(wait);
                    attempt += 1;
                }
                Err(err) => {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }
            }
        }
    }
}
