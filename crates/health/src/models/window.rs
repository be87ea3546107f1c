//! Time windows requested from collectors and upstream window caps

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open time range `[since, until)` a collector is asked to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl SyncWindow {
    /// Create a window; a `since` later than `until` collapses to an empty
    /// window ending at `until`.
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            since: since.min(until),
            until,
        }
    }

    /// Window used for a domain that has never been synced.
    ///
    /// Covers `lookback_days` whole calendar days ending with the day of
    /// `now`: a 7 day lookback on day D starts at midnight of D-6.
    pub fn initial(now: DateTime<Utc>, lookback_days: u32) -> Self {
        let days_back = i64::from(lookback_days.max(1)) - 1;
        let first_day = now.date_naive() - Duration::days(days_back);
        Self::new(start_of_day(first_day), now)
    }

    pub fn is_empty(&self) -> bool {
        self.since >= self.until
    }

    pub fn span(&self) -> Duration {
        self.until - self.since
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.since <= at && at < self.until
    }

    /// Calendar dates (UTC) touched by the window, oldest first
    pub fn dates(&self) -> Vec<NaiveDate> {
        if self.is_empty() {
            return Vec::new();
        }
        let first = self.since.date_naive();
        let last = (self.until - Duration::microseconds(1)).date_naive();
        first.iter_days().take_while(|d| *d <= last).collect()
    }

    /// Clamp the window to upstream caps.
    ///
    /// A lookback cap moves `since` forward to `until - max_lookback`; a span
    /// cap then moves `until` back to `since + max_span`. Returns the clamp
    /// description when anything changed.
    pub fn clamp(&self, caps: &WindowCaps) -> (SyncWindow, Option<WindowClamp>) {
        let mut effective = *self;

        if let Some(max_lookback) = caps.max_lookback {
            let floor = effective.until - max_lookback;
            if effective.since < floor {
                effective.since = floor;
            }
        }

        if let Some(max_span) = caps.max_span {
            let ceiling = effective.since + max_span;
            if effective.until > ceiling {
                effective.until = ceiling;
            }
        }

        if effective == *self {
            (effective, None)
        } else {
            (
                effective,
                Some(WindowClamp {
                    requested: *self,
                    effective,
                }),
            )
        }
    }
}

impl fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.since.to_rfc3339(), self.until.to_rfc3339())
    }
}

/// Midnight UTC at the start of `date`
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Upstream-imposed limits on how far back and how wide a request may reach
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCaps {
    /// Oldest data the platform exposes, relative to the window end
    pub max_lookback: Option<Duration>,
    /// Widest range a single cycle may request
    pub max_span: Option<Duration>,
}

impl WindowCaps {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn lookback_days(days: u32) -> Self {
        Self {
            max_lookback: Some(Duration::days(i64::from(days))),
            max_span: None,
        }
    }

    pub fn span_days(days: u32) -> Self {
        Self {
            max_lookback: None,
            max_span: Some(Duration::days(i64::from(days))),
        }
    }
}

/// A window reduced by [`WindowCaps`], reported back to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowClamp {
    pub requested: SyncWindow,
    pub effective: SyncWindow,
}

impl WindowClamp {
    /// Older data was dropped because the platform no longer exposes it
    pub fn lost_history(&self) -> bool {
        self.effective.since > self.requested.since
    }

    /// Newer data was deferred to a later cycle
    pub fn deferred_tail(&self) -> bool {
        self.effective.until < self.requested.until
    }
}

impl fmt::Display for WindowClamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window {} clamped to {}", self.requested, self.effective)
    }
}
