//! Per-date collectors: daily summary, sleep and the intraday series
//!
//! Each of these fetches one upstream document per calendar date touched by
//! the (clamped) window. Intraday collectors keep every sample of a fetched
//! date that lies before the window's end, including samples older than the
//! window start: devices upload late, and those samples would otherwise
//! fall behind the cursor for good. Upserts on timestamp make the overlap
//! harmless.

use chrono::NaiveDate;
use std::sync::Arc;

use super::{Collected, Discovered, SourceCollector, Upstream, clamp_window};
use crate::connect::{WellnessApi, normalize};
use crate::error::{CollectionError, UpstreamError};
use crate::models::{Domain, HealthRecord, SyncWindow, WindowCaps};
use crate::session::Session;

/// Fetch `fetch(date)` for every date of the clamped window and normalize
/// each answer. Nothing is returned unless every date succeeded.
fn collect_per_date<R>(
    upstream: &Upstream,
    domain: Domain,
    caps: &WindowCaps,
    window: &SyncWindow,
    fetch: impl Fn(&dyn WellnessApi, NaiveDate) -> Result<Option<R>, UpstreamError>,
    normalize: impl Fn(NaiveDate, R, &SyncWindow) -> Vec<HealthRecord>,
) -> Result<Collected, CollectionError> {
    let (effective, clamp) = clamp_window(domain, window, caps);
    let mut collected = Collected::empty(effective, clamp);

    for date in effective.dates() {
        if let Some(response) = upstream.call(domain, |api| fetch(api, date))? {
            collected
                .records
                .extend(normalize(date, response, &effective));
        }
    }

    log::debug!(
        "[COLLECT] {}: {} records for {}",
        domain,
        collected.records.len(),
        effective
    );
    Ok(collected)
}

/// Whole-day wellness summaries
pub struct DailySummaryCollector {
    upstream: Arc<Upstream>,
}

impl DailySummaryCollector {
    pub fn new(upstream: Arc<Upstream>) -> Self {
        Self { upstream }
    }
}

impl SourceCollector for DailySummaryCollector {
    fn domain(&self) -> Domain {
        Domain::DailySummary
    }

    fn collect(
        &self,
        session: &Session,
        window: &SyncWindow,
        _discovered: &Discovered,
    ) -> Result<Collected, CollectionError> {
        collect_per_date(
            &self.upstream,
            self.domain(),
            &WindowCaps::none(),
            window,
            |api, date| api.daily_summary(session, date),
            |date, resp, _| {
                vec![HealthRecord::DailySummary(normalize::daily_summary(
                    date, &resp,
                ))]
            },
        )
    }
}

/// Nightly sleep sessions
pub struct SleepCollector {
    upstream: Arc<Upstream>,
    caps: WindowCaps,
}

impl SleepCollector {
    pub fn new(upstream: Arc<Upstream>, caps: WindowCaps) -> Self {
        Self { upstream, caps }
    }
}

impl SourceCollector for SleepCollector {
    fn domain(&self) -> Domain {
        Domain::Sleep
    }

    fn collect(
        &self,
        session: &Session,
        window: &SyncWindow,
        _discovered: &Discovered,
    ) -> Result<Collected, CollectionError> {
        collect_per_date(
            &self.upstream,
            self.domain(),
            &self.caps,
            window,
            |api, date| api.sleep(session, date),
            |date, resp, _| {
                normalize::sleep(date, &resp)
                    .map(HealthRecord::Sleep)
                    .into_iter()
                    .collect()
            },
        )
    }
}

/// Intraday heart rate samples
pub struct HeartRateCollector {
    upstream: Arc<Upstream>,
    caps: WindowCaps,
}

impl HeartRateCollector {
    pub fn new(upstream: Arc<Upstream>, caps: WindowCaps) -> Self {
        Self { upstream, caps }
    }
}

impl SourceCollector for HeartRateCollector {
    fn domain(&self) -> Domain {
        Domain::HeartRate
    }

    fn collect(
        &self,
        session: &Session,
        window: &SyncWindow,
        _discovered: &Discovered,
    ) -> Result<Collected, CollectionError> {
        collect_per_date(
            &self.upstream,
            self.domain(),
            &self.caps,
            window,
            |api, date| api.heart_rates(session, date),
            |_, resp, effective| {
                normalize::heart_rate_samples(&resp)
                    .into_iter()
                    .filter(|s| s.timestamp < effective.until)
                    .map(HealthRecord::HeartRate)
                    .collect()
            },
        )
    }
}

/// Intraday stress and body battery samples
pub struct StressCollector {
    upstream: Arc<Upstream>,
    caps: WindowCaps,
}

impl StressCollector {
    pub fn new(upstream: Arc<Upstream>, caps: WindowCaps) -> Self {
        Self { upstream, caps }
    }
}

impl SourceCollector for StressCollector {
    fn domain(&self) -> Domain {
        Domain::Stress
    }

    fn collect(
        &self,
        session: &Session,
        window: &SyncWindow,
        _discovered: &Discovered,
    ) -> Result<Collected, CollectionError> {
        collect_per_date(
            &self.upstream,
            self.domain(),
            &self.caps,
            window,
            |api, date| api.stress(session, date),
            |_, resp, effective| {
                normalize::stress_samples(&resp)
                    .into_iter()
                    .filter(|s| s.timestamp < effective.until)
                    .map(HealthRecord::Stress)
                    .collect()
            },
        )
    }
}

/// Overnight heart rate variability readings
pub struct HrvCollector {
    upstream: Arc<Upstream>,
    caps: WindowCaps,
}

impl HrvCollector {
    pub fn new(upstream: Arc<Upstream>, caps: WindowCaps) -> Self {
        Self { upstream, caps }
    }
}

impl SourceCollector for HrvCollector {
    fn domain(&self) -> Domain {
        Domain::Hrv
    }

    fn collect(
        &self,
        session: &Session,
        window: &SyncWindow,
        _discovered: &Discovered,
    ) -> Result<Collected, CollectionError> {
        collect_per_date(
            &self.upstream,
            self.domain(),
            &self.caps,
            window,
            |api, date| api.hrv(session, date),
            |_, resp, effective| {
                normalize::hrv_readings(&resp)
                    .into_iter()
                    .filter(|r| r.timestamp < effective.until)
                    .map(HealthRecord::Hrv)
                    .collect()
            },
        )
    }
}

/// Intraday breathing rate samples
pub struct RespirationCollector {
    upstream: Arc<Upstream>,
    caps: WindowCaps,
}

impl RespirationCollector {
    pub fn new(upstream: Arc<Upstream>, caps: WindowCaps) -> Self {
        Self { upstream, caps }
    }
}

impl SourceCollector for RespirationCollector {
    fn domain(&self) -> Domain {
        Domain::Respiration
    }

    fn collect(
        &self,
        session: &Session,
        window: &SyncWindow,
        _discovered: &Discovered,
    ) -> Result<Collected, CollectionError> {
        collect_per_date(
            &self.upstream,
            self.domain(),
            &self.caps,
            window,
            |api, date| api.respiration(session, date),
            |_, resp, effective| {
                normalize::respiration_samples(&resp)
                    .into_iter()
                    .filter(|s| s.timestamp < effective.until)
                    .map(HealthRecord::Respiration)
                    .collect()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::testing::{FakeApi, session, upstream};
    use crate::connect::api;
    use crate::models::start_of_day;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    #[test]
    fn test_daily_summary_one_record_per_date() {
        let mut api = FakeApi::default();
        for day in 4..=10 {
            api.daily.insert(
                date(day),
                api::DailySummaryResponse {
                    total_steps: Some(1000 * i64::from(day)),
                    ..Default::default()
                },
            );
        }
        let api = Arc::new(api);
        let (upstream, _clock) = upstream(api.clone());
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 18, 0, 0).unwrap();
        let window = SyncWindow::initial(now, 7);

        let collected = DailySummaryCollector::new(upstream)
            .collect(&session(), &window, &Discovered::new())
            .unwrap();

        assert_eq!(collected.records.len(), 7);
        assert!(collected.clamp.is_none());
        assert_eq!(api.calls().first().unwrap(), "daily:2025-03-04");
        assert_eq!(api.calls().last().unwrap(), "daily:2025-03-10");
    }

    #[test]
    fn test_missing_dates_produce_no_records() {
        let api = Arc::new(FakeApi::default());
        let (upstream, _clock) = upstream(api.clone());
        let window = SyncWindow::new(start_of_day(date(9)), start_of_day(date(11)));

        let collected = SleepCollector::new(upstream, WindowCaps::none())
            .collect(&session(), &window, &Discovered::new())
            .unwrap();

        assert!(collected.records.is_empty());
        assert_eq!(api.calls().len(), 2);
    }

    #[test]
    fn test_heart_rate_window_is_clamped() {
        let api = Arc::new(FakeApi::default());
        let (upstream, _clock) = upstream(api.clone());
        let until = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let window = SyncWindow::new(until - Duration::days(10), until);

        let collected = HeartRateCollector::new(upstream, WindowCaps::lookback_days(3))
            .collect(&session(), &window, &Discovered::new())
            .unwrap();

        let clamp = collected.clamp.unwrap();
        assert!(clamp.lost_history());
        assert_eq!(collected.window.since, until - Duration::days(3));
        assert_eq!(collected.window.until, until);
        // 7th..10th inclusive
        assert_eq!(api.calls().len(), 4);
    }

    #[test]
    fn test_intraday_keeps_earlier_samples_of_fetched_dates() {
        let since = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let until = since + Duration::hours(6);
        let mut api = FakeApi::default();
        api.heart_rates.insert(
            date(10),
            serde_json::from_value(json!({
                "heartRateValues": [
                    [(since - Duration::hours(1)).timestamp_millis(), 60],
                    [since.timestamp_millis(), 61],
                    [(until - Duration::minutes(2)).timestamp_millis(), 62],
                    [until.timestamp_millis(), 63]
                ]
            }))
            .unwrap(),
        );
        let api = Arc::new(api);
        let (upstream, _clock) = upstream(api);

        let collected = HeartRateCollector::new(upstream, WindowCaps::none())
            .collect(&session(), &SyncWindow::new(since, until), &Discovered::new())
            .unwrap();

        let bpms: Vec<i32> = collected
            .records
            .iter()
            .map(|r| match r {
                HealthRecord::HeartRate(s) => s.bpm,
                other => panic!("unexpected record {other:?}"),
            })
            .collect();
        // Only the sample at the window's end is left for the next cycle
        assert_eq!(bpms, vec![60, 61, 62]);
    }

    #[test]
    fn test_late_upload_before_window_start_is_collected() {
        let day = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
        let recorded_at = day + Duration::minutes(12 * 60 + 30);
        let mut api = FakeApi::default();
        api.heart_rates.insert(
            date(10),
            serde_json::from_value(json!({
                "heartRateValues": [[recorded_at.timestamp_millis(), 58]]
            }))
            .unwrap(),
        );
        let api = Arc::new(api);
        let (upstream, _clock) = upstream(api);

        // The previous cycle ran at 14:00 before the 12:30 sample was uploaded
        let since = day + Duration::hours(14);
        let window = SyncWindow::new(since, since + Duration::minutes(5));
        let collected = HeartRateCollector::new(upstream, WindowCaps::lookback_days(3))
            .collect(&session(), &window, &Discovered::new())
            .unwrap();

        assert_eq!(collected.records.len(), 1);
        assert!(matches!(
            &collected.records[0],
            HealthRecord::HeartRate(s) if s.timestamp == recorded_at && s.bpm == 58
        ));
    }

    #[test]
    fn test_hrv_and_respiration_per_date() {
        let until = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let mut api = FakeApi::default();
        api.hrv.insert(
            date(10),
            serde_json::from_value(json!({
                "hrvReadings": [
                    { "hrvValue": 44.0, "readingTimeGMT": "2025-03-10T02:00:00.0" },
                    { "hrvValue": 47.0, "readingTimeGMT": "2025-03-10T09:00:00.0" }
                ]
            }))
            .unwrap(),
        );
        api.respiration.insert(
            date(9),
            serde_json::from_value(json!({
                "respirationValuesArray": [[(until - Duration::hours(20)).timestamp_millis(), 13.0]]
            }))
            .unwrap(),
        );
        let api = Arc::new(api);
        let (upstream, _clock) = upstream(api.clone());
        let window = SyncWindow::new(until - Duration::days(1), until);

        let hrv = HrvCollector::new(upstream.clone(), WindowCaps::lookback_days(3))
            .collect(&session(), &window, &Discovered::new())
            .unwrap();
        let respiration = RespirationCollector::new(upstream, WindowCaps::lookback_days(3))
            .collect(&session(), &window, &Discovered::new())
            .unwrap();

        // The 09:00 reading sits on the window's end
        assert_eq!(hrv.records.len(), 1);
        assert_eq!(hrv.records[0].domain(), Domain::Hrv);
        assert_eq!(respiration.records.len(), 1);
        assert_eq!(
            api.calls(),
            vec![
                "hrv:2025-03-09",
                "hrv:2025-03-10",
                "respiration:2025-03-09",
                "respiration:2025-03-10"
            ]
        );
    }

    #[test]
    fn test_failure_on_one_date_returns_nothing() {
        let mut api = FakeApi::default();
        api.stress.insert(
            date(8),
            serde_json::from_value(json!({ "stressValuesArray": [[1741435200000i64, 30]] }))
                .unwrap(),
        );
        api.broken
            .insert("stress:2025-03-09".into(), UpstreamError::Rejected(400));
        let api = Arc::new(api);
        let (upstream, _clock) = upstream(api.clone());
        let window = SyncWindow::new(start_of_day(date(8)), start_of_day(date(11)));

        let result = StressCollector::new(upstream, WindowCaps::none()).collect(
            &session(),
            &window,
            &Discovered::new(),
        );

        assert!(matches!(
            result,
            Err(CollectionError::Upstream {
                domain: Domain::Stress,
                attempts: 1,
                ..
            })
        ));
        // The third date is never requested
        assert_eq!(api.calls(), vec!["stress:2025-03-08", "stress:2025-03-09"]);
    }
}
