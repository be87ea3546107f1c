//! Normalized health records, one variant per data domain
//!
//! Every record carries a natural key that is unique within its domain.
//! Storage upserts by that key, so re-delivering a record is idempotent.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Domain;

/// Upstream activity identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityId(pub i64);

impl ActivityId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ActivityId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Whole-day wellness summary, keyed by calendar date
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DailySummary {
    pub calendar_date: NaiveDate,
    pub total_steps: Option<i64>,
    pub total_distance_meters: Option<f64>,
    pub active_seconds: Option<i64>,
    pub highly_active_seconds: Option<i64>,
    pub sedentary_seconds: Option<i64>,
    pub calories_total: Option<f64>,
    pub calories_active: Option<f64>,
    pub floors_climbed: Option<f64>,
    pub resting_heart_rate: Option<i32>,
    pub min_heart_rate: Option<i32>,
    pub max_heart_rate: Option<i32>,
    pub avg_stress_level: Option<i32>,
    pub max_stress_level: Option<i32>,
    pub body_battery_charged: Option<i32>,
    pub body_battery_drained: Option<i32>,
    pub body_battery_highest: Option<i32>,
    pub body_battery_lowest: Option<i32>,
}

impl DailySummary {
    pub fn new(calendar_date: NaiveDate) -> Self {
        Self {
            calendar_date,
            ..Default::default()
        }
    }
}

/// A recorded activity (run, ride, walk...), keyed by activity id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub activity_id: ActivityId,
    pub name: Option<String>,
    pub activity_type: Option<String>,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: Option<f64>,
    pub distance_meters: Option<f64>,
    pub elevation_gain_meters: Option<f64>,
    pub elevation_loss_meters: Option<f64>,
    pub avg_speed_mps: Option<f64>,
    pub max_speed_mps: Option<f64>,
    pub avg_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
    pub calories: Option<f64>,
    pub start_latitude: Option<f64>,
    pub start_longitude: Option<f64>,
    /// Upstream payload as received, for fields not normalized here
    pub raw_json: Option<String>,
}

impl Activity {
    /// Activity types that are recorded outdoors with a GPS fix
    const GPS_TYPE_HINTS: [&'static str; 8] = [
        "running",
        "cycling",
        "walking",
        "hiking",
        "outdoor",
        "trail_running",
        "road_biking",
        "mountain_biking",
    ];

    pub fn new(activity_id: ActivityId, start_time: DateTime<Utc>) -> Self {
        Self {
            activity_id,
            name: None,
            activity_type: None,
            start_time,
            duration_seconds: None,
            distance_meters: None,
            elevation_gain_meters: None,
            elevation_loss_meters: None,
            avg_speed_mps: None,
            max_speed_mps: None,
            avg_heart_rate: None,
            max_heart_rate: None,
            calories: None,
            start_latitude: None,
            start_longitude: None,
            raw_json: None,
        }
    }

    /// Whether the activity plausibly has a GPS track worth fetching
    pub fn likely_has_gps(&self) -> bool {
        let type_key = self.activity_type.as_deref().unwrap_or_default().to_lowercase();
        let name = self.name.as_deref().unwrap_or_default().to_lowercase();

        Self::GPS_TYPE_HINTS
            .iter()
            .any(|hint| type_key.contains(hint) || name.contains(hint))
            || self.distance_meters.is_some_and(|d| d > 0.0)
            || self.start_latitude.is_some()
    }
}

/// One night of sleep, keyed by the calendar date it is attributed to
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SleepSession {
    pub calendar_date: NaiveDate,
    pub sleep_start: Option<DateTime<Utc>>,
    pub sleep_end: Option<DateTime<Utc>>,
    pub total_sleep_seconds: Option<i64>,
    pub deep_sleep_seconds: Option<i64>,
    pub light_sleep_seconds: Option<i64>,
    pub rem_sleep_seconds: Option<i64>,
    pub awake_seconds: Option<i64>,
    pub sleep_score: Option<i32>,
    pub avg_respiration: Option<f64>,
    pub avg_spo2: Option<f64>,
    pub lowest_spo2: Option<f64>,
    pub restless_moments: Option<i32>,
}

/// Intraday heart rate reading, keyed by timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSample {
    pub timestamp: DateTime<Utc>,
    pub bpm: i32,
}

/// Intraday stress and body battery reading, keyed by timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressSample {
    pub timestamp: DateTime<Utc>,
    pub stress_level: Option<i32>,
    pub body_battery: Option<i32>,
}

/// Heart rate variability reading, keyed by reading time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrvReading {
    pub timestamp: DateTime<Utc>,
    pub hrv_ms: f64,
}

/// Intraday breathing rate, keyed by timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespirationSample {
    pub timestamp: DateTime<Utc>,
    pub breaths_per_minute: f64,
}

/// Weigh-in / body composition measurement, keyed by measurement time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyCompositionReading {
    pub measured_at: DateTime<Utc>,
    pub weight_kg: Option<f64>,
    pub bmi: Option<f64>,
    pub body_fat_percentage: Option<f64>,
    pub body_water_percentage: Option<f64>,
    pub bone_mass_kg: Option<f64>,
    pub muscle_mass_kg: Option<f64>,
    pub source: Option<String>,
}

/// A GPS fix on an activity's track, keyed by (activity id, sequence)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub activity_id: ActivityId,
    pub sequence: u32,
    pub timestamp: Option<DateTime<Utc>>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_meters: Option<f64>,
}

/// Any normalized record produced by a collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthRecord {
    DailySummary(DailySummary),
    Activity(Activity),
    Sleep(SleepSession),
    HeartRate(HeartRateSample),
    Stress(StressSample),
    Hrv(HrvReading),
    Respiration(RespirationSample),
    BodyComposition(BodyCompositionReading),
    TrackPoint(TrackPoint),
}

impl HealthRecord {
    pub fn domain(&self) -> Domain {
        match self {
            HealthRecord::DailySummary(_) => Domain::DailySummary,
            HealthRecord::Activity(_) => Domain::Activities,
            HealthRecord::Sleep(_) => Domain::Sleep,
            HealthRecord::HeartRate(_) => Domain::HeartRate,
            HealthRecord::Stress(_) => Domain::Stress,
            HealthRecord::Hrv(_) => Domain::Hrv,
            HealthRecord::Respiration(_) => Domain::Respiration,
            HealthRecord::BodyComposition(_) => Domain::BodyComposition,
            HealthRecord::TrackPoint(_) => Domain::ActivityGps,
        }
    }

    /// Key that identifies the record uniquely within its domain
    pub fn natural_key(&self) -> String {
        match self {
            HealthRecord::DailySummary(r) => r.calendar_date.to_string(),
            HealthRecord::Activity(r) => r.activity_id.to_string(),
            HealthRecord::Sleep(r) => r.calendar_date.to_string(),
            HealthRecord::HeartRate(r) => r.timestamp.timestamp_millis().to_string(),
            HealthRecord::Stress(r) => r.timestamp.timestamp_millis().to_string(),
            HealthRecord::Hrv(r) => r.timestamp.timestamp_millis().to_string(),
            HealthRecord::Respiration(r) => r.timestamp.timestamp_millis().to_string(),
            HealthRecord::BodyComposition(r) => r.measured_at.timestamp_millis().to_string(),
            HealthRecord::TrackPoint(r) => format!("{}:{}", r.activity_id, r.sequence),
        }
    }

    pub fn as_activity(&self) -> Option<&Activity> {
        match self {
            HealthRecord::Activity(activity) => Some(activity),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_natural_keys() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let ts = Utc.timestamp_millis_opt(1_741_600_000_000).unwrap();

        let summary = HealthRecord::DailySummary(DailySummary::new(date));
        assert_eq!(summary.natural_key(), "2025-03-10");
        assert_eq!(summary.domain(), Domain::DailySummary);

        let hr = HealthRecord::HeartRate(HeartRateSample { timestamp: ts, bpm: 61 });
        assert_eq!(hr.natural_key(), "1741600000000");

        let point = HealthRecord::TrackPoint(TrackPoint {
            activity_id: ActivityId(42),
            sequence: 7,
            timestamp: None,
            latitude: 51.5,
            longitude: -0.12,
            altitude_meters: None,
        });
        assert_eq!(point.natural_key(), "42:7");
        assert_eq!(point.domain(), Domain::ActivityGps);
    }

    #[test]
    fn test_likely_has_gps() {
        let start = Utc::now();

        let mut run = Activity::new(ActivityId(1), start);
        run.activity_type = Some("trail_running".to_string());
        assert!(run.likely_has_gps());

        let mut yoga = Activity::new(ActivityId(2), start);
        yoga.activity_type = Some("yoga".to_string());
        assert!(!yoga.likely_has_gps());

        yoga.distance_meters = Some(0.0);
        assert!(!yoga.likely_has_gps());

        let mut swim = Activity::new(ActivityId(3), start);
        swim.activity_type = Some("open_water_swimming".to_string());
        swim.distance_meters = Some(1500.0);
        assert!(swim.likely_has_gps());
    }

    #[test]
    fn test_record_serialization_is_tagged() {
        let record = HealthRecord::Stress(StressSample {
            timestamp: Utc::now(),
            stress_level: Some(25),
            body_battery: None,
        });
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"kind\":\"stress\""));
    }
}
