//! Wellness platform integration
//!
//! This module provides:
//! - Session authentication with token caching and one-time-code support
//! - The [`WellnessApi`] contract collectors fetch through, and its HTTP
//!   implementation
//! - Response normalization to health records

mod auth;
mod client;
pub mod normalize;

pub use auth::{ConnectAuth, ConnectEndpoints};
pub use client::ConnectClient;

use chrono::NaiveDate;

use crate::error::UpstreamError;
use crate::models::ActivityId;
use crate::session::Session;

/// One method per upstream endpoint the collectors use.
///
/// Per-date endpoints return `Ok(None)` when the platform has no data for
/// that day. Implementations make exactly one HTTP call per method call;
/// rate limiting and retries are applied by the caller.
pub trait WellnessApi: Send + Sync {
    fn daily_summary(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Option<api::DailySummaryResponse>, UpstreamError>;

    fn sleep(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Option<api::SleepResponse>, UpstreamError>;

    fn heart_rates(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Option<api::HeartRateResponse>, UpstreamError>;

    fn stress(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Option<api::StressResponse>, UpstreamError>;

    fn hrv(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Option<api::HrvResponse>, UpstreamError>;

    fn respiration(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Option<api::RespirationResponse>, UpstreamError>;

    /// One page of activities started within `[start, end]` (inclusive dates)
    fn search_activities(
        &self,
        session: &Session,
        start: NaiveDate,
        end: NaiveDate,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, UpstreamError>;

    fn body_composition(
        &self,
        session: &Session,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<api::WeightRangeResponse, UpstreamError>;

    fn activity_details(
        &self,
        session: &Session,
        activity_id: ActivityId,
    ) -> Result<api::ActivityDetailsResponse, UpstreamError>;

    /// The user's most recently used device and when it last uploaded
    fn device_last_used(
        &self,
        session: &Session,
    ) -> Result<Option<api::DeviceLastUsedResponse>, UpstreamError>;
}

/// Wellness platform response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Daily wellness summary for one calendar date
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DailySummaryResponse {
        pub calendar_date: Option<String>,
        pub total_steps: Option<i64>,
        pub total_distance_meters: Option<f64>,
        pub active_seconds: Option<i64>,
        pub highly_active_seconds: Option<i64>,
        pub sedentary_seconds: Option<i64>,
        pub total_kilocalories: Option<f64>,
        pub active_kilocalories: Option<f64>,
        pub floors_ascended: Option<f64>,
        pub resting_heart_rate: Option<i32>,
        pub min_heart_rate: Option<i32>,
        pub max_heart_rate: Option<i32>,
        pub average_stress_level: Option<i32>,
        pub max_stress_level: Option<i32>,
        pub body_battery_charged_value: Option<i32>,
        pub body_battery_drained_value: Option<i32>,
        pub body_battery_highest_value: Option<i32>,
        pub body_battery_lowest_value: Option<i32>,
    }

    /// Activity list entry
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ActivitySummary {
        pub activity_id: i64,
        pub activity_name: Option<String>,
        pub activity_type: Option<ActivityType>,
        #[serde(rename = "startTimeGMT")]
        pub start_time_gmt: Option<String>,
        pub duration: Option<f64>,
        pub distance: Option<f64>,
        pub elevation_gain: Option<f64>,
        pub elevation_loss: Option<f64>,
        pub average_speed: Option<f64>,
        pub max_speed: Option<f64>,
        #[serde(rename = "averageHR")]
        pub average_hr: Option<f64>,
        #[serde(rename = "maxHR")]
        pub max_hr: Option<f64>,
        pub calories: Option<f64>,
        pub start_latitude: Option<f64>,
        pub start_longitude: Option<f64>,
    }

    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ActivityType {
        pub type_key: Option<String>,
    }

    /// Sleep data for one night
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SleepResponse {
        #[serde(rename = "dailySleepDTO")]
        pub daily_sleep: Option<DailySleep>,
        pub restless_moments_count: Option<i32>,
    }

    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DailySleep {
        pub calendar_date: Option<String>,
        #[serde(rename = "sleepStartTimestampGMT")]
        pub sleep_start_timestamp_gmt: Option<i64>,
        #[serde(rename = "sleepEndTimestampGMT")]
        pub sleep_end_timestamp_gmt: Option<i64>,
        pub sleep_time_seconds: Option<i64>,
        pub deep_sleep_seconds: Option<i64>,
        pub light_sleep_seconds: Option<i64>,
        pub rem_sleep_seconds: Option<i64>,
        pub awake_sleep_seconds: Option<i64>,
        pub sleep_scores: Option<SleepScores>,
        pub average_respiration_value: Option<f64>,
        #[serde(rename = "averageSpO2Value")]
        pub average_spo2_value: Option<f64>,
        #[serde(rename = "lowestSpO2Value")]
        pub lowest_spo2_value: Option<f64>,
    }

    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    pub struct SleepScores {
        pub overall: Option<ScoreValue>,
    }

    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    pub struct ScoreValue {
        pub value: Option<i32>,
    }

    /// Intraday heart rate: `[timestamp_ms, bpm]` pairs, bpm may be null
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HeartRateResponse {
        pub heart_rate_values: Option<Vec<Vec<serde_json::Value>>>,
    }

    /// Intraday stress (`[timestamp_ms, level]`) and body battery
    /// (`[timestamp_ms, status, level, version]`) arrays
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct StressResponse {
        pub stress_values_array: Option<Vec<Vec<serde_json::Value>>>,
        pub body_battery_values_array: Option<Vec<Vec<serde_json::Value>>>,
    }

    /// Overnight HRV readings for one date
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HrvResponse {
        pub hrv_readings: Option<Vec<HrvReadingEntry>>,
    }

    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HrvReadingEntry {
        pub hrv_value: Option<f64>,
        #[serde(rename = "readingTimeGMT")]
        pub reading_time_gmt: Option<String>,
    }

    /// Intraday breathing rate: `[timestamp_ms, breaths_per_minute]` pairs.
    /// Negative rates mark unmeasured periods.
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RespirationResponse {
        pub respiration_values_array: Option<Vec<Vec<serde_json::Value>>>,
    }

    /// Weigh-ins over a date range. Masses are in grams.
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WeightRangeResponse {
        pub date_weight_list: Option<Vec<WeighIn>>,
    }

    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WeighIn {
        #[serde(rename = "timestampGMT")]
        pub timestamp_gmt: Option<i64>,
        pub date: Option<i64>,
        pub weight: Option<f64>,
        pub bmi: Option<f64>,
        pub body_fat: Option<f64>,
        pub body_water: Option<f64>,
        pub bone_mass: Option<f64>,
        pub muscle_mass: Option<f64>,
        pub source_type: Option<String>,
    }

    /// Activity detail payload; only the GPS polyline is used
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ActivityDetailsResponse {
        #[serde(rename = "geoPolylineDTO")]
        pub geo_polyline: Option<GeoPolyline>,
    }

    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    pub struct GeoPolyline {
        pub polyline: Option<Vec<PolylinePoint>>,
    }

    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    pub struct PolylinePoint {
        pub lat: Option<f64>,
        pub lon: Option<f64>,
        pub altitude: Option<f64>,
        /// Epoch milliseconds
        pub time: Option<i64>,
    }

    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DeviceLastUsedResponse {
        pub user_device_id: Option<i64>,
        pub last_used_device_name: Option<String>,
        /// Epoch milliseconds
        pub last_used_device_upload_time: Option<i64>,
    }

    /// Profile lookup, used to resolve the display name
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SocialProfile {
        pub display_name: String,
    }
}
