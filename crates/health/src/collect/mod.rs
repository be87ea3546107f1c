//! Source collectors
//!
//! One collector per data domain, all sharing the [`SourceCollector`]
//! contract and selected through a static [`CollectorRegistry`]. Collectors
//! own no state: given a session and a window they return normalized records
//! or fail with a [`CollectionError`]. Every upstream call goes through
//! [`Upstream::call`], which waits on the shared [`RateLimiter`] before each
//! attempt and applies the injected [`RetryPolicy`].

mod activities;
mod body;
mod daily;
mod rate_limit;
mod retry;

pub use activities::{ACTIVITY_PAGE_SIZE, ActivitiesCollector, ActivityGpsCollector};
pub use body::BodyCompositionCollector;
pub use daily::{
    DailySummaryCollector, HeartRateCollector, HrvCollector, RespirationCollector, SleepCollector,
    StressCollector,
};
pub use rate_limit::RateLimiter;
pub use retry::{RetryExhausted, RetryPolicy};

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::SyncSettings;
use crate::connect::{WellnessApi, normalize};
use crate::error::{CollectionError, UpstreamError};
use crate::models::{Activity, ActivityId, Domain, HealthRecord, SyncWindow, WindowCaps, WindowClamp};
use crate::session::Session;

/// Output of one successful collector call
#[derive(Debug, Clone, PartialEq)]
pub struct Collected {
    pub records: Vec<HealthRecord>,
    /// Window actually fetched, after upstream caps
    pub window: SyncWindow,
    pub clamp: Option<WindowClamp>,
}

impl Collected {
    pub fn empty(window: SyncWindow, clamp: Option<WindowClamp>) -> Self {
        Self {
            records: Vec::new(),
            window,
            clamp,
        }
    }
}

/// Activities observed earlier in the current cycle.
///
/// Detail collectors only look at what the summary domain returned in the
/// same cycle, never at storage.
#[derive(Debug, Clone, Default)]
pub struct Discovered {
    activities: Vec<Activity>,
    /// End of the window the activity search covered this cycle
    activities_until: Option<DateTime<Utc>>,
}

impl Discovered {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the activities among `records`
    pub fn observe(&mut self, records: &[HealthRecord]) {
        self.activities
            .extend(records.iter().filter_map(HealthRecord::as_activity).cloned());
    }

    /// Remember what `domain` committed this cycle
    pub fn record(&mut self, domain: Domain, collected: &Collected) {
        self.observe(&collected.records);
        if domain == Domain::Activities {
            self.activities_until = Some(collected.window.until);
        }
    }

    /// How far the activity search reached, if it ran this cycle
    pub fn activities_until(&self) -> Option<DateTime<Utc>> {
        self.activities_until
    }

    pub fn activity_ids(&self) -> Vec<ActivityId> {
        self.activities.iter().map(|a| a.activity_id).collect()
    }

    /// Activities worth a GPS detail fetch, oldest first, without duplicates
    pub fn gps_candidates(&self) -> Vec<ActivityId> {
        let mut candidates: Vec<&Activity> = self
            .activities
            .iter()
            .filter(|a| a.likely_has_gps())
            .collect();
        candidates.sort_by_key(|a| (a.start_time, a.activity_id));
        candidates.dedup_by_key(|a| a.activity_id);
        candidates.into_iter().map(|a| a.activity_id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}

/// Contract shared by every per-domain collector
pub trait SourceCollector: Send + Sync {
    fn domain(&self) -> Domain;

    /// Fetch and normalize this domain's records for `window`.
    ///
    /// All-or-nothing: on error no records from this call are returned.
    fn collect(
        &self,
        session: &Session,
        window: &SyncWindow,
        discovered: &Discovered,
    ) -> Result<Collected, CollectionError>;
}

/// Rate-limited, retrying access to the wellness API
pub struct Upstream {
    api: Arc<dyn WellnessApi>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl Upstream {
    pub fn new(
        api: Arc<dyn WellnessApi>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api,
            limiter,
            retry,
            clock,
        }
    }

    /// Run one upstream call for `domain`, waiting on the limiter before
    /// every attempt
    pub fn call<T>(
        &self,
        domain: Domain,
        op: impl FnMut(&dyn WellnessApi) -> Result<T, UpstreamError>,
    ) -> Result<T, CollectionError> {
        self.attempt(op)
            .map_err(|exhausted| CollectionError::Upstream {
                domain,
                attempts: exhausted.attempts,
                cause: exhausted.last_error,
            })
    }

    fn attempt<T>(
        &self,
        mut op: impl FnMut(&dyn WellnessApi) -> Result<T, UpstreamError>,
    ) -> Result<T, RetryExhausted> {
        self.retry.run(self.clock.as_ref(), |_attempt| {
            self.limiter.acquire();
            op(self.api.as_ref())
        })
    }
}

/// Source of the time the user's device last uploaded to the platform.
///
/// A cycle never looks past this point: the platform cannot hold newer
/// data, and cursors stay anchored to what was actually uploaded.
pub trait UploadWatermark: Send + Sync {
    /// `Ok(None)` when the platform does not report an upload time
    fn last_upload(&self, session: &Session) -> Result<Option<DateTime<Utc>>, UpstreamError>;
}

impl UploadWatermark for Upstream {
    fn last_upload(&self, session: &Session) -> Result<Option<DateTime<Utc>>, UpstreamError> {
        let response = self
            .attempt(|api| api.device_last_used(session))
            .map_err(|exhausted| exhausted.last_error)?;
        Ok(response.as_ref().and_then(normalize::last_upload))
    }
}

/// Apply upstream caps to a requested window, logging any reduction
pub(crate) fn clamp_window(
    domain: Domain,
    window: &SyncWindow,
    caps: &WindowCaps,
) -> (SyncWindow, Option<WindowClamp>) {
    let (effective, clamp) = window.clamp(caps);
    if let Some(clamp) = &clamp {
        log::warn!("[COLLECT] {}: {}", domain, clamp);
    }
    (effective, clamp)
}

/// Static per-domain collector lookup
#[derive(Default)]
pub struct CollectorRegistry {
    collectors: BTreeMap<Domain, Box<dyn SourceCollector>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The production collectors for every domain
    pub fn standard(upstream: Arc<Upstream>, settings: &SyncSettings) -> Self {
        let mut registry = Self::new();
        let caps = |domain| settings.window_caps(domain);

        registry.register(DailySummaryCollector::new(upstream.clone()));
        registry.register(ActivitiesCollector::new(
            upstream.clone(),
            caps(Domain::Activities),
        ));
        registry.register(SleepCollector::new(upstream.clone(), caps(Domain::Sleep)));
        registry.register(HeartRateCollector::new(
            upstream.clone(),
            caps(Domain::HeartRate),
        ));
        registry.register(StressCollector::new(upstream.clone(), caps(Domain::Stress)));
        registry.register(HrvCollector::new(upstream.clone(), caps(Domain::Hrv)));
        registry.register(RespirationCollector::new(
            upstream.clone(),
            caps(Domain::Respiration),
        ));
        registry.register(BodyCompositionCollector::new(
            upstream.clone(),
            caps(Domain::BodyComposition),
        ));
        registry.register(ActivityGpsCollector::new(upstream));
        registry
    }

    /// Register a collector, replacing any previous one for its domain
    pub fn register(&mut self, collector: impl SourceCollector + 'static) {
        self.collectors
            .insert(collector.domain(), Box::new(collector));
    }

    pub fn get(&self, domain: Domain) -> Option<&dyn SourceCollector> {
        self.collectors.get(&domain).map(|c| c.as_ref())
    }

    /// Registered domains in processing order
    pub fn domains(&self) -> Vec<Domain> {
        self.collectors.keys().copied().collect()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeApi, session, upstream};
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_upstream_call_waits_before_each_attempt() {
        let api = Arc::new(FakeApi::default());
        api.fail_next([UpstreamError::Timeout("read".into())]);
        let (upstream, clock) = upstream(api.clone());
        let date = Utc::now().date_naive();

        upstream
            .call(Domain::DailySummary, |api| api.daily_summary(&session(), date))
            .unwrap();

        // limiter (first call free), backoff 1s, limiter already satisfied
        assert_eq!(api.calls().len(), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn test_upstream_call_reports_exhaustion() {
        let api = Arc::new(FakeApi::default());
        api.fail_next(vec![UpstreamError::Server(503); 3]);
        let (upstream, _clock) = upstream(api.clone());
        let date = Utc::now().date_naive();

        let err = upstream
            .call(Domain::Sleep, |api| api.sleep(&session(), date))
            .unwrap_err();

        assert_eq!(
            err,
            CollectionError::Upstream {
                domain: Domain::Sleep,
                attempts: 3,
                cause: UpstreamError::Server(503),
            }
        );
    }

    #[test]
    fn test_last_upload_is_retried() {
        let mut api = FakeApi::default();
        api.last_used = Some(crate::connect::api::DeviceLastUsedResponse {
            last_used_device_upload_time: Some(1_741_600_000_000),
            ..Default::default()
        });
        let api = Arc::new(api);
        api.fail_next([UpstreamError::Server(502)]);
        let (upstream, _clock) = upstream(api.clone());

        let last = upstream.last_upload(&session()).unwrap();

        assert_eq!(last.map(|t| t.timestamp_millis()), Some(1_741_600_000_000));
        assert_eq!(api.calls(), vec!["last_used", "last_used"]);
    }

    #[test]
    fn test_last_upload_unknown() {
        let api = Arc::new(FakeApi::default());
        let (upstream, _clock) = upstream(api);
        assert_eq!(upstream.last_upload(&session()).unwrap(), None);

        let broken = Arc::new(FakeApi::default());
        broken.fail_next([UpstreamError::Rejected(403)]);
        let (upstream, _clock) = super::testing::upstream(broken);
        assert_eq!(
            upstream.last_upload(&session()).unwrap_err(),
            UpstreamError::Rejected(403)
        );
    }

    #[test]
    fn test_discovered_tracks_activity_coverage() {
        let since = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
        let window = SyncWindow::new(since, until);
        let mut discovered = Discovered::new();

        discovered.record(Domain::Sleep, &Collected::empty(window, None));
        assert_eq!(discovered.activities_until(), None);

        discovered.record(Domain::Activities, &Collected::empty(window, None));
        assert_eq!(discovered.activities_until(), Some(until));
    }

    #[test]
    fn test_discovered_gps_candidates() {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 7, 0, 0).unwrap();
        let run = crate::connect::normalize::activity(&json!({
            "activityId": 2,
            "activityType": { "typeKey": "running" },
            "startTimeGMT": "2025-03-10 07:00:00"
        }))
        .unwrap();
        let mut yoga = Activity::new(ActivityId(1), start);
        yoga.activity_type = Some("yoga".into());

        let mut discovered = Discovered::new();
        discovered.observe(&[
            HealthRecord::Activity(yoga),
            HealthRecord::Activity(run.clone()),
            HealthRecord::Activity(run),
        ]);

        assert_eq!(discovered.activity_ids().len(), 3);
        assert_eq!(discovered.gps_candidates(), vec![ActivityId(2)]);
    }

    #[test]
    fn test_standard_registry_covers_every_domain() {
        let (upstream, _clock) = upstream(Arc::new(FakeApi::default()));
        let registry = CollectorRegistry::standard(upstream, &SyncSettings::default());

        assert_eq!(registry.domains(), Domain::ALL.to_vec());
        for domain in Domain::ALL {
            assert_eq!(registry.get(domain).unwrap().domain(), domain);
        }
    }
}
