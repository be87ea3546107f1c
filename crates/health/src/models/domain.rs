//! Data domains and per-domain sync status

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One category of health data, collected and cursor-tracked independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    DailySummary,
    Activities,
    Sleep,
    HeartRate,
    Stress,
    /// Overnight heart rate variability readings
    Hrv,
    Respiration,
    BodyComposition,
    /// GPS track points extracted from activity details
    ActivityGps,
}

impl Domain {
    /// Every domain in its fixed processing order.
    ///
    /// Summary domains come before detail domains; a domain always appears
    /// after the domain it depends on.
    pub const ALL: [Domain; 9] = [
        Domain::DailySummary,
        Domain::Activities,
        Domain::Sleep,
        Domain::HeartRate,
        Domain::Stress,
        Domain::Hrv,
        Domain::Respiration,
        Domain::BodyComposition,
        Domain::ActivityGps,
    ];

    /// Stable identifier used in storage and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::DailySummary => "daily_summary",
            Domain::Activities => "activities",
            Domain::Sleep => "sleep",
            Domain::HeartRate => "heart_rate",
            Domain::Stress => "stress",
            Domain::Hrv => "hrv",
            Domain::Respiration => "respiration",
            Domain::BodyComposition => "body_composition",
            Domain::ActivityGps => "activity_gps",
        }
    }

    /// The domain whose records must be collected first in the same cycle
    pub fn depends_on(&self) -> Option<Domain> {
        match self {
            Domain::ActivityGps => Some(Domain::Activities),
            _ => None,
        }
    }

    /// Position in [`Domain::ALL`]
    pub fn order(&self) -> usize {
        Self::ALL
            .iter()
            .position(|d| d == self)
            .unwrap_or(Self::ALL.len())
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown domain or status name
#[derive(Debug, thiserror::Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseNameError {
    kind: &'static str,
    value: String,
}

impl FromStr for Domain {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| ParseNameError {
                kind: "domain",
                value: s.to_string(),
            })
    }
}

/// Outcome of the last run for a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    /// Committed, but the requested window was clamped by an upstream cap
    Partial,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncStatus::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(SyncStatus::Success),
            "partial" => Ok(SyncStatus::Partial),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(ParseNameError {
                kind: "sync status",
                value: other.to_string(),
            }),
        }
    }
}
