//! Convert wellness platform responses into normalized health records

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

use super::api::{
    ActivityDetailsResponse, ActivitySummary, DailySummaryResponse, DeviceLastUsedResponse,
    HeartRateResponse, HrvResponse, RespirationResponse, SleepResponse, StressResponse,
    WeightRangeResponse,
};
use crate::error::UpstreamError;
use crate::models::{
    Activity, ActivityId, BodyCompositionReading, DailySummary, HeartRateSample, HrvReading,
    RespirationSample, SleepSession, StressSample, TrackPoint,
};

/// Index of the level in a body battery entry `[ts, status, level, version]`
const BODY_BATTERY_LEVEL_INDEX: usize = 2;

pub fn daily_summary(date: NaiveDate, resp: &DailySummaryResponse) -> DailySummary {
    let calendar_date = resp
        .calendar_date
        .as_deref()
        .and_then(|d| d.parse().ok())
        .unwrap_or(date);

    DailySummary {
        calendar_date,
        total_steps: resp.total_steps,
        total_distance_meters: resp.total_distance_meters,
        active_seconds: resp.active_seconds,
        highly_active_seconds: resp.highly_active_seconds,
        sedentary_seconds: resp.sedentary_seconds,
        calories_total: resp.total_kilocalories,
        calories_active: resp.active_kilocalories,
        floors_climbed: resp.floors_ascended,
        resting_heart_rate: resp.resting_heart_rate,
        min_heart_rate: resp.min_heart_rate,
        max_heart_rate: resp.max_heart_rate,
        avg_stress_level: resp.average_stress_level.filter(|v| *v >= 0),
        max_stress_level: resp.max_stress_level.filter(|v| *v >= 0),
        body_battery_charged: resp.body_battery_charged_value,
        body_battery_drained: resp.body_battery_drained_value,
        body_battery_highest: resp.body_battery_highest_value,
        body_battery_lowest: resp.body_battery_lowest_value,
    }
}

/// Normalize one activity list entry, keeping the payload as received
pub fn activity(raw: &Value) -> Result<Activity, UpstreamError> {
    let summary: ActivitySummary = serde_json::from_value(raw.clone())
        .map_err(|e| UpstreamError::Malformed(format!("activity entry: {e}")))?;

    let start_time = summary
        .start_time_gmt
        .as_deref()
        .and_then(parse_gmt_timestamp)
        .ok_or_else(|| {
            UpstreamError::Malformed(format!(
                "activity {} has no usable startTimeGMT",
                summary.activity_id
            ))
        })?;

    let mut activity = Activity::new(ActivityId(summary.activity_id), start_time);
    activity.name = summary.activity_name;
    activity.activity_type = summary.activity_type.and_then(|t| t.type_key);
    activity.duration_seconds = summary.duration;
    activity.distance_meters = summary.distance;
    activity.elevation_gain_meters = summary.elevation_gain;
    activity.elevation_loss_meters = summary.elevation_loss;
    activity.avg_speed_mps = summary.average_speed;
    activity.max_speed_mps = summary.max_speed;
    activity.avg_heart_rate = summary.average_hr;
    activity.max_heart_rate = summary.max_hr;
    activity.calories = summary.calories;
    activity.start_latitude = summary.start_latitude;
    activity.start_longitude = summary.start_longitude;
    activity.raw_json = Some(raw.to_string());
    Ok(activity)
}

/// `None` when the platform recorded no sleep for the night
pub fn sleep(date: NaiveDate, resp: &SleepResponse) -> Option<SleepSession> {
    let dto = resp.daily_sleep.as_ref()?;
    if dto.sleep_time_seconds.is_none() && dto.sleep_start_timestamp_gmt.is_none() {
        return None;
    }

    let calendar_date = dto
        .calendar_date
        .as_deref()
        .and_then(|d| d.parse().ok())
        .unwrap_or(date);

    Some(SleepSession {
        calendar_date,
        sleep_start: dto.sleep_start_timestamp_gmt.and_then(from_millis),
        sleep_end: dto.sleep_end_timestamp_gmt.and_then(from_millis),
        total_sleep_seconds: dto.sleep_time_seconds,
        deep_sleep_seconds: dto.deep_sleep_seconds,
        light_sleep_seconds: dto.light_sleep_seconds,
        rem_sleep_seconds: dto.rem_sleep_seconds,
        awake_seconds: dto.awake_sleep_seconds,
        sleep_score: dto
            .sleep_scores
            .as_ref()
            .and_then(|s| s.overall.as_ref())
            .and_then(|o| o.value),
        avg_respiration: dto.average_respiration_value,
        avg_spo2: dto.average_spo2_value,
        lowest_spo2: dto.lowest_spo2_value,
        restless_moments: resp.restless_moments_count,
    })
}

/// Intraday `[timestamp_ms, bpm]` pairs; gaps (null bpm) and values that
/// do not fit a heart rate are skipped
pub fn heart_rate_samples(resp: &HeartRateResponse) -> Vec<HeartRateSample> {
    resp.heart_rate_values
        .iter()
        .flatten()
        .filter_map(|entry| {
            let timestamp = int_at(entry, 0).and_then(from_millis)?;
            let bpm = i32::try_from(int_at(entry, 1)?).ok()?;
            (bpm > 0).then_some(HeartRateSample { timestamp, bpm })
        })
        .collect()
}

/// Merge the stress and body battery arrays on timestamp.
///
/// Negative stress levels mark unmeasured periods and are dropped, as are
/// levels outside the `i32` range.
pub fn stress_samples(resp: &StressResponse) -> Vec<StressSample> {
    let mut by_timestamp: BTreeMap<i64, (Option<i32>, Option<i32>)> = BTreeMap::new();

    for entry in resp.stress_values_array.iter().flatten() {
        let (Some(ts), Some(level)) = (int_at(entry, 0), int_at(entry, 1)) else {
            continue;
        };
        match i32::try_from(level) {
            Ok(level) if level >= 0 => by_timestamp.entry(ts).or_default().0 = Some(level),
            _ => {}
        }
    }

    for entry in resp.body_battery_values_array.iter().flatten() {
        let (Some(ts), Some(level)) = (int_at(entry, 0), int_at(entry, BODY_BATTERY_LEVEL_INDEX))
        else {
            continue;
        };
        if let Ok(level) = i32::try_from(level) {
            by_timestamp.entry(ts).or_default().1 = Some(level);
        }
    }

    by_timestamp
        .into_iter()
        .filter_map(|(ts, (stress_level, body_battery))| {
            Some(StressSample {
                timestamp: from_millis(ts)?,
                stress_level,
                body_battery,
            })
        })
        .collect()
}

/// Overnight HRV readings; entries without a value or time are skipped
pub fn hrv_readings(resp: &HrvResponse) -> Vec<HrvReading> {
    resp.hrv_readings
        .iter()
        .flatten()
        .filter_map(|r| {
            let timestamp = r.reading_time_gmt.as_deref().and_then(parse_gmt_timestamp)?;
            let hrv_ms = r.hrv_value.filter(|v| *v > 0.0)?;
            Some(HrvReading { timestamp, hrv_ms })
        })
        .collect()
}

/// Intraday `[timestamp_ms, breaths_per_minute]` pairs; non-positive rates
/// mark unmeasured periods
pub fn respiration_samples(resp: &RespirationResponse) -> Vec<RespirationSample> {
    resp.respiration_values_array
        .iter()
        .flatten()
        .filter_map(|entry| {
            let timestamp = int_at(entry, 0).and_then(from_millis)?;
            let breaths_per_minute = entry.get(1)?.as_f64().filter(|v| *v > 0.0)?;
            Some(RespirationSample {
                timestamp,
                breaths_per_minute,
            })
        })
        .collect()
}

/// When the user's device last pushed data, if the platform knows
pub fn last_upload(resp: &DeviceLastUsedResponse) -> Option<DateTime<Utc>> {
    resp.last_used_device_upload_time
        .filter(|ms| *ms > 0)
        .and_then(from_millis)
}

/// Weigh-ins; masses arrive in grams and are stored in kilograms
pub fn body_composition(resp: &WeightRangeResponse) -> Vec<BodyCompositionReading> {
    let grams_to_kg = |g: f64| g / 1000.0;

    resp.date_weight_list
        .iter()
        .flatten()
        .filter_map(|w| {
            let measured_at = w.timestamp_gmt.or(w.date).and_then(from_millis)?;
            Some(BodyCompositionReading {
                measured_at,
                weight_kg: w.weight.map(grams_to_kg),
                bmi: w.bmi,
                body_fat_percentage: w.body_fat,
                body_water_percentage: w.body_water,
                bone_mass_kg: w.bone_mass.map(grams_to_kg),
                muscle_mass_kg: w.muscle_mass.map(grams_to_kg),
                source: w.source_type.clone(),
            })
        })
        .collect()
}

/// GPS track from an activity's detail payload, numbered in upstream order
pub fn track_points(activity_id: ActivityId, resp: &ActivityDetailsResponse) -> Vec<TrackPoint> {
    resp.geo_polyline
        .as_ref()
        .and_then(|g| g.polyline.as_ref())
        .into_iter()
        .flatten()
        .filter_map(|p| Some((p.lat?, p.lon?, p.altitude, p.time)))
        .enumerate()
        .map(|(i, (latitude, longitude, altitude_meters, time))| TrackPoint {
            activity_id,
            sequence: i as u32,
            timestamp: time.and_then(from_millis),
            latitude,
            longitude,
            altitude_meters,
        })
        .collect()
}

/// Parse the platform's GMT timestamps (`2025-03-10 07:15:00`, with an
/// optional `T` separator, fraction or offset)
pub fn parse_gmt_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

fn int_at(entry: &[Value], index: usize) -> Option<i64> {
    let value = entry.get(index)?;
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}
