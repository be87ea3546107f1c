//! One sync cycle across every registered domain
//!
//! A cycle authenticates once, asks when the device last uploaded, computes
//! each domain's window from its cursor up to that point, then runs the
//! collectors sequentially in domain order. Each domain's records and cursor
//! are committed together; a failing domain leaves its cursor where it was
//! and never stops the others.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::result::{DomainOutcome, SyncRunResult};
use crate::clock::Clock;
use crate::collect::{CollectorRegistry, Discovered, UploadWatermark};
use crate::error::{AuthError, CollectionError, StorageError};
use crate::models::{CollectionLogEntry, Domain, LogScope, SyncStatus, SyncWindow, WindowClamp};
use crate::session::{Authenticator, MfaCodeProvider, Session};
use crate::storage::HealthStore;

/// Where the orchestrator currently is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "domain")]
pub enum CyclePhase {
    Idle,
    Authenticating,
    CheckingUploads,
    ComputingWindows,
    CollectingDomain(Domain),
    Committing(Domain),
    Auditing(Domain),
}

/// Anything the loop driver can run as one cycle
pub trait SyncCycle: Send + Sync {
    fn run_cycle(&self) -> SyncRunResult;
}

/// Drives collectors, storage commits and the audit log for one cycle
pub struct Orchestrator {
    authenticator: Arc<dyn Authenticator>,
    mfa: Option<Arc<dyn MfaCodeProvider>>,
    uploads: Option<Arc<dyn UploadWatermark>>,
    registry: CollectorRegistry,
    store: Arc<dyn HealthStore>,
    clock: Arc<dyn Clock>,
    lookback_days: u32,
    phase: Mutex<CyclePhase>,
}

/// Per-cycle bookkeeping shared across domains
struct CycleState {
    run_id: String,
    session: Session,
    discovered: Discovered,
    completed: BTreeSet<Domain>,
}

impl Orchestrator {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        registry: CollectorRegistry,
        store: Arc<dyn HealthStore>,
        clock: Arc<dyn Clock>,
        lookback_days: u32,
    ) -> Self {
        Self {
            authenticator,
            mfa: None,
            uploads: None,
            registry,
            store,
            clock,
            lookback_days,
            phase: Mutex::new(CyclePhase::Idle),
        }
    }

    /// Source of one-time codes when login asks for one
    pub fn with_mfa_provider(mut self, provider: Arc<dyn MfaCodeProvider>) -> Self {
        self.mfa = Some(provider);
        self
    }

    /// Bound every window by the device's last upload and skip cycles when
    /// nothing new was uploaded
    pub fn with_upload_watermark(mut self, uploads: Arc<dyn UploadWatermark>) -> Self {
        self.uploads = Some(uploads);
        self
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.lock().unwrap()
    }

    pub fn store(&self) -> &Arc<dyn HealthStore> {
        &self.store
    }

    fn set_phase(&self, phase: CyclePhase) {
        log::debug!("[SYNC] phase: {:?}", phase);
        *self.phase.lock().unwrap() = phase;
    }

    /// Run one full cycle
    pub fn run(&self) -> SyncRunResult {
        let run_id = Uuid::new_v4().to_string();
        let started_at = self.clock.now();
        log::info!("[SYNC] Cycle {} started", run_id);

        self.set_phase(CyclePhase::Authenticating);
        let session = match self.authenticate() {
            Ok(session) => session,
            Err(err) => {
                let result = self.abort_cycle(run_id, started_at, &err);
                self.set_phase(CyclePhase::Idle);
                return result;
            }
        };

        self.set_phase(CyclePhase::CheckingUploads);
        let now = self.clock.now();
        let last_upload = self.last_upload(&session);
        let until = last_upload.map_or(now, |upload| upload.min(now));
        let domains = self.registry.domains();

        if let Some(upload) = last_upload {
            if self.is_up_to_date(&domains, until) {
                log::info!(
                    "[SYNC] Cycle {}: no upload since {}, nothing to sync",
                    run_id,
                    upload.to_rfc3339()
                );
                let result =
                    SyncRunResult::up_to_date(run_id, started_at, self.clock.now(), upload);
                self.set_phase(CyclePhase::Idle);
                return result;
            }
        }

        self.set_phase(CyclePhase::ComputingWindows);
        let mut windows: BTreeMap<Domain, Result<SyncWindow, StorageError>> = domains
            .iter()
            .map(|domain| (*domain, self.compute_window(*domain, until)))
            .collect();
        widen_for_dependents(&mut windows);

        let mut state = CycleState {
            run_id,
            session,
            discovered: Discovered::new(),
            completed: BTreeSet::new(),
        };

        let mut outcomes = Vec::with_capacity(domains.len());
        for (domain, window) in windows {
            outcomes.push(self.sync_domain(&mut state, domain, window));
        }

        let mut result =
            SyncRunResult::completed(state.run_id, started_at, self.clock.now(), outcomes);
        result.last_upload = last_upload;
        log::info!(
            "[SYNC] Cycle {} finished: {} ({} records, {} failed domain(s))",
            result.run_id,
            result.outcome.as_str(),
            result.total_records(),
            result.failed_domains().len()
        );
        self.set_phase(CyclePhase::Idle);
        result
    }

    /// Authenticate, supplying a one-time code once if the platform asks
    fn authenticate(&self) -> Result<Session, AuthError> {
        match self.authenticator.authenticate() {
            Ok(session) => Ok(session),
            Err(err) if err.requires_mfa_code => {
                let code = self.mfa.as_ref().and_then(|provider| provider.one_time_code());
                match code {
                    Some(code) => {
                        log::info!("[AUTH] Retrying login with one-time code");
                        self.authenticator.authenticate_with_code(&code)
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Record an authentication failure as the cycle's only log entry
    fn abort_cycle(
        &self,
        run_id: String,
        started_at: DateTime<Utc>,
        err: &AuthError,
    ) -> SyncRunResult {
        log::error!("[SYNC] Cycle {} aborted: {}", run_id, err);
        let ended_at = self.clock.now();

        let entry = CollectionLogEntry {
            run_id: run_id.clone(),
            scope: LogScope::Authentication,
            started_at,
            ended_at,
            status: SyncStatus::Failed,
            records_collected: 0,
            error_detail: Some(err.to_string()),
        };
        if let Err(e) = self.store.append_log(&entry) {
            log::error!("[SYNC] Failed to write authentication log entry: {:#}", e);
        }

        SyncRunResult::auth_failed(run_id, started_at, ended_at, err.to_string())
    }

    /// Device upload time, or `None` to sync up to now
    fn last_upload(&self, session: &Session) -> Option<DateTime<Utc>> {
        let uploads = self.uploads.as_ref()?;
        match uploads.last_upload(session) {
            Ok(Some(at)) => {
                log::debug!("[SYNC] Device last uploaded at {}", at.to_rfc3339());
                Some(at)
            }
            Ok(None) => {
                log::warn!("[SYNC] Device upload time unknown, syncing up to now");
                None
            }
            Err(err) => {
                log::warn!("[SYNC] Device upload check failed ({}), syncing up to now", err);
                None
            }
        }
    }

    /// Every domain's cursor already reached `until` and none last failed
    fn is_up_to_date(&self, domains: &[Domain], until: DateTime<Utc>) -> bool {
        domains.iter().all(|domain| match self.store.get_cursor(*domain) {
            Ok(Some(cursor)) => !cursor.last_status.is_failure() && cursor.last_synced_at >= until,
            _ => false,
        })
    }

    /// `[cursor, until)`, or the initial lookback for a domain never synced
    fn compute_window(
        &self,
        domain: Domain,
        until: DateTime<Utc>,
    ) -> Result<SyncWindow, StorageError> {
        let cursor = self
            .store
            .get_cursor(domain)
            .map_err(|e| StorageError::from_anyhow(domain, &e))?;

        Ok(match cursor {
            Some(cursor) => SyncWindow::new(cursor.last_synced_at, until),
            None => SyncWindow::initial(until, self.lookback_days),
        })
    }

    fn sync_domain(
        &self,
        state: &mut CycleState,
        domain: Domain,
        window: Result<SyncWindow, StorageError>,
    ) -> DomainOutcome {
        let started_at = self.clock.now();
        let mut outcome = DomainOutcome {
            domain,
            status: SyncStatus::Failed,
            records_collected: 0,
            window: window.as_ref().ok().copied(),
            clamp: None,
            synced_to: None,
            error: None,
            started_at,
            ended_at: started_at,
        };

        match self.collect_and_commit(state, domain, window) {
            Ok((records, clamp, synced_to)) => {
                outcome.status = if clamp.is_some() {
                    SyncStatus::Partial
                } else {
                    SyncStatus::Success
                };
                outcome.records_collected = records;
                outcome.error = clamp.map(|c| c.to_string());
                outcome.clamp = clamp;
                outcome.synced_to = Some(synced_to);
                state.completed.insert(domain);
                log::info!(
                    "[SYNC] {}: {} record(s), cursor at {}",
                    domain,
                    records,
                    synced_to.to_rfc3339()
                );
            }
            Err(detail) => {
                log::error!("[SYNC] {}", detail);
                outcome.error = Some(detail);
                if let Err(e) = self.store.record_cursor_status(domain, SyncStatus::Failed) {
                    log::error!("[SYNC] {}: failed to record status: {:#}", domain, e);
                }
                outcome.synced_to = self
                    .store
                    .get_cursor(domain)
                    .ok()
                    .flatten()
                    .map(|c| c.last_synced_at);
            }
        }

        self.set_phase(CyclePhase::Auditing(domain));
        outcome.ended_at = self.clock.now();
        let entry = CollectionLogEntry {
            run_id: state.run_id.clone(),
            scope: LogScope::Domain(domain),
            started_at: outcome.started_at,
            ended_at: outcome.ended_at,
            status: outcome.status,
            records_collected: outcome.records_collected,
            error_detail: outcome.error.clone(),
        };
        if let Err(e) = self.store.append_log(&entry) {
            log::error!("[SYNC] {}: failed to write log entry: {:#}", domain, e);
        }

        outcome
    }

    /// Collect one domain and commit its records with the advanced cursor.
    ///
    /// Returns the record count, any clamp, and the new cursor position, or
    /// the failure detail.
    fn collect_and_commit(
        &self,
        state: &mut CycleState,
        domain: Domain,
        window: Result<SyncWindow, StorageError>,
    ) -> Result<(usize, Option<WindowClamp>, DateTime<Utc>), String> {
        let window = window.map_err(|e| e.to_string())?;

        if let Some(dependency) = domain.depends_on() {
            if !state.completed.contains(&dependency) {
                return Err(CollectionError::DependencyFailed { domain, dependency }.to_string());
            }
        }

        let Some(collector) = self.registry.get(domain) else {
            return Err(format!("{domain}: no collector registered"));
        };

        self.set_phase(CyclePhase::CollectingDomain(domain));
        log::debug!("[SYNC] {}: collecting {}", domain, window);
        let collected = collector
            .collect(&state.session, &window, &state.discovered)
            .map_err(|e| e.to_string())?;

        self.set_phase(CyclePhase::Committing(domain));
        let status = if collected.clamp.is_some() {
            SyncStatus::Partial
        } else {
            SyncStatus::Success
        };
        let cursor = self
            .store
            .commit_domain(domain, &collected.records, collected.window.until, status)
            .map_err(|e| StorageError::from_anyhow(domain, &e).to_string())?;

        state.discovered.record(domain, &collected);
        Ok((collected.records.len(), collected.clamp, cursor.last_synced_at))
    }
}

/// Start each dependency's window no later than its dependents' windows.
///
/// A dependent that failed earlier lags behind; it only sees what the
/// dependency delivers this cycle, so the dependency reaches back for it.
fn widen_for_dependents(windows: &mut BTreeMap<Domain, Result<SyncWindow, StorageError>>) {
    let lagging: Vec<(Domain, Domain, SyncWindow)> = windows
        .iter()
        .filter_map(|(domain, window)| {
            Some((*domain, domain.depends_on()?, *window.as_ref().ok()?))
        })
        .collect();

    for (dependent, dependency, dependent_window) in lagging {
        if let Some(Ok(window)) = windows.get_mut(&dependency) {
            if dependent_window.since < window.since {
                log::info!(
                    "[SYNC] {}: reaching back to {} for {}",
                    dependency,
                    dependent_window.since.to_rfc3339(),
                    dependent
                );
                *window = SyncWindow::new(dependent_window.since, window.until);
            }
        }
    }
}

impl SyncCycle for Orchestrator {
    fn run_cycle(&self) -> SyncRunResult {
        self.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collect::{Collected, SourceCollector};
    use crate::error::UpstreamError;
    use crate::models::{
        Activity, ActivityId, BodyCompositionReading, DailySummary, HealthRecord,
        HeartRateSample, HrvReading, RespirationSample, SleepSession, StressSample, SyncCursor,
        TrackPoint, WindowCaps,
    };
    use crate::storage::InMemoryHealthStore;
    use crate::sync::CycleOutcome;
    use chrono::{Duration, TimeZone};

    struct StaticAuth {
        result: Result<Session, AuthError>,
        with_code: Option<Result<Session, AuthError>>,
        codes: Mutex<Vec<String>>,
    }

    impl StaticAuth {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                result: Ok(Session::new("token", "tester")),
                with_code: None,
                codes: Mutex::new(Vec::new()),
            })
        }

        fn failing(err: AuthError) -> Arc<Self> {
            Arc::new(Self {
                result: Err(err),
                with_code: None,
                codes: Mutex::new(Vec::new()),
            })
        }
    }

    impl Authenticator for StaticAuth {
        fn authenticate(&self) -> Result<Session, AuthError> {
            self.result.clone()
        }

        fn authenticate_with_code(&self, code: &str) -> Result<Session, AuthError> {
            self.codes.lock().unwrap().push(code.to_string());
            self.with_code
                .clone()
                .unwrap_or_else(|| Err(AuthError::new("unexpected code")))
        }
    }

    struct FixedCode(&'static str);

    impl MfaCodeProvider for FixedCode {
        fn one_time_code(&self) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    /// Collector returning one record per call, or a scripted error
    struct Scripted {
        domain: Domain,
        caps: WindowCaps,
        fail: Option<CollectionError>,
        seen: Arc<Mutex<Vec<(SyncWindow, Vec<ActivityId>)>>>,
    }

    impl Scripted {
        fn new(domain: Domain) -> Self {
            Self {
                domain,
                caps: WindowCaps::none(),
                fail: None,
                seen: Arc::default(),
            }
        }

        fn failing(domain: Domain, err: CollectionError) -> Self {
            Self {
                fail: Some(err),
                ..Self::new(domain)
            }
        }
    }

    impl SourceCollector for Scripted {
        fn domain(&self) -> Domain {
            self.domain
        }

        fn collect(
            &self,
            _session: &Session,
            window: &SyncWindow,
            discovered: &Discovered,
        ) -> Result<Collected, CollectionError> {
            self.seen
                .lock()
                .unwrap()
                .push((*window, discovered.activity_ids()));
            if let Some(err) = &self.fail {
                return Err(err.clone());
            }

            let (effective, clamp) = window.clamp(&self.caps);
            let at = effective.since;
            let record = match self.domain {
                Domain::DailySummary => {
                    HealthRecord::DailySummary(DailySummary::new(at.date_naive()))
                }
                Domain::Activities => {
                    let mut activity = Activity::new(ActivityId(99), at);
                    activity.activity_type = Some("running".into());
                    HealthRecord::Activity(activity)
                }
                Domain::Sleep => HealthRecord::Sleep(SleepSession {
                    calendar_date: at.date_naive(),
                    ..Default::default()
                }),
                Domain::HeartRate => HealthRecord::HeartRate(HeartRateSample {
                    timestamp: at,
                    bpm: 60,
                }),
                Domain::Stress => HealthRecord::Stress(StressSample {
                    timestamp: at,
                    stress_level: Some(20),
                    body_battery: None,
                }),
                Domain::Hrv => HealthRecord::Hrv(HrvReading {
                    timestamp: at,
                    hrv_ms: 45.0,
                }),
                Domain::Respiration => HealthRecord::Respiration(RespirationSample {
                    timestamp: at,
                    breaths_per_minute: 14.0,
                }),
                Domain::BodyComposition => {
                    HealthRecord::BodyComposition(BodyCompositionReading {
                        measured_at: at,
                        weight_kg: Some(70.0),
                        bmi: None,
                        body_fat_percentage: None,
                        body_water_percentage: None,
                        bone_mass_kg: None,
                        muscle_mass_kg: None,
                        source: None,
                    })
                }
                Domain::ActivityGps => HealthRecord::TrackPoint(TrackPoint {
                    activity_id: ActivityId(99),
                    sequence: 0,
                    timestamp: None,
                    latitude: 1.0,
                    longitude: 2.0,
                    altitude_meters: None,
                }),
            };
            Ok(Collected {
                records: vec![record],
                window: effective,
                clamp,
            })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 18, 30, 0).unwrap()
    }

    fn orchestrator(
        auth: Arc<dyn Authenticator>,
        registry: CollectorRegistry,
    ) -> (Orchestrator, Arc<InMemoryHealthStore>) {
        let store = Arc::new(InMemoryHealthStore::new());
        let clock = Arc::new(ManualClock::new(now()));
        let orchestrator = Orchestrator::new(auth, registry, store.clone(), clock, 7);
        (orchestrator, store)
    }

    fn upstream_failure(domain: Domain) -> CollectionError {
        CollectionError::Upstream {
            domain,
            attempts: 3,
            cause: UpstreamError::Server(503),
        }
    }

    struct FixedUpload(Result<Option<DateTime<Utc>>, UpstreamError>);

    impl UploadWatermark for FixedUpload {
        fn last_upload(&self, _session: &Session) -> Result<Option<DateTime<Utc>>, UpstreamError> {
            self.0.clone()
        }
    }

    fn uploaded_at(at: DateTime<Utc>) -> Arc<FixedUpload> {
        Arc::new(FixedUpload(Ok(Some(at))))
    }

    #[test]
    fn test_auth_failure_is_total_with_single_log_entry() {
        let mut registry = CollectorRegistry::new();
        let daily = Scripted::new(Domain::DailySummary);
        let seen = daily.seen.clone();
        registry.register(daily);
        let (orchestrator, store) =
            orchestrator(StaticAuth::failing(AuthError::new("bad password")), registry);

        let result = orchestrator.run();

        assert_eq!(result.outcome, CycleOutcome::TotalFailure);
        assert!(result.domains.is_empty());
        assert!(seen.lock().unwrap().is_empty());

        let logs = store.list_logs(&result.run_id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].scope, LogScope::Authentication);
        assert_eq!(logs[0].status, SyncStatus::Failed);
        assert_eq!(orchestrator.phase(), CyclePhase::Idle);
    }

    #[test]
    fn test_mfa_code_retried_once() {
        let auth = Arc::new(StaticAuth {
            result: Err(AuthError::mfa_required("code needed")),
            with_code: Some(Ok(Session::new("token", "tester"))),
            codes: Mutex::new(Vec::new()),
        });
        let mut registry = CollectorRegistry::new();
        registry.register(Scripted::new(Domain::DailySummary));
        let (orchestrator, _store) = orchestrator(auth.clone(), registry);
        let orchestrator = orchestrator.with_mfa_provider(Arc::new(FixedCode("123456")));

        let result = orchestrator.run();

        assert_eq!(result.outcome, CycleOutcome::Success);
        assert_eq!(*auth.codes.lock().unwrap(), vec!["123456".to_string()]);
    }

    #[test]
    fn test_mfa_without_provider_fails() {
        let mut registry = CollectorRegistry::new();
        registry.register(Scripted::new(Domain::DailySummary));
        let (orchestrator, _store) = orchestrator(
            StaticAuth::failing(AuthError::mfa_required("code needed")),
            registry,
        );

        let result = orchestrator.run();
        assert_eq!(result.outcome, CycleOutcome::TotalFailure);
    }

    #[test]
    fn test_first_run_uses_lookback_and_advances_cursor() {
        let mut registry = CollectorRegistry::new();
        let daily = Scripted::new(Domain::DailySummary);
        let seen = daily.seen.clone();
        registry.register(daily);
        let (orchestrator, store) = orchestrator(StaticAuth::ok(), registry);

        let result = orchestrator.run();

        assert_eq!(result.outcome, CycleOutcome::Success);
        let (window, _) = seen.lock().unwrap()[0].clone();
        assert_eq!(window, SyncWindow::initial(now(), 7));

        let cursor = store.get_cursor(Domain::DailySummary).unwrap().unwrap();
        assert_eq!(cursor, SyncCursor::new(Domain::DailySummary, now(), SyncStatus::Success));
    }

    #[test]
    fn test_failed_domain_keeps_cursor_and_siblings_commit() {
        let mut registry = CollectorRegistry::new();
        registry.register(Scripted::new(Domain::DailySummary));
        registry.register(Scripted::failing(
            Domain::Sleep,
            upstream_failure(Domain::Sleep),
        ));
        registry.register(Scripted::new(Domain::Stress));
        let (orchestrator, store) = orchestrator(StaticAuth::ok(), registry);

        let before = now() - Duration::hours(6);
        store
            .commit_domain(Domain::Sleep, &[], before, SyncStatus::Success)
            .unwrap();

        let result = orchestrator.run();

        assert_eq!(result.outcome, CycleOutcome::PartialFailure);
        assert_eq!(result.failed_domains(), vec![Domain::Sleep]);

        let sleep = store.get_cursor(Domain::Sleep).unwrap().unwrap();
        assert_eq!(sleep.last_synced_at, before);
        assert_eq!(sleep.last_status, SyncStatus::Failed);
        assert_eq!(
            store.get_cursor(Domain::Stress).unwrap().unwrap().last_synced_at,
            now()
        );

        let logs = store.list_logs(&result.run_id).unwrap();
        assert_eq!(logs.len(), 3);
        let sleep_log = logs
            .iter()
            .find(|e| e.scope == LogScope::Domain(Domain::Sleep))
            .unwrap();
        assert_eq!(sleep_log.status, SyncStatus::Failed);
        assert_eq!(sleep_log.records_collected, 0);
        assert!(sleep_log.error_detail.as_deref().unwrap().contains("503"));
    }

    #[test]
    fn test_gps_sees_activities_discovered_this_cycle() {
        let mut registry = CollectorRegistry::new();
        let gps = Scripted::new(Domain::ActivityGps);
        let seen = gps.seen.clone();
        registry.register(gps);
        registry.register(Scripted::new(Domain::Activities));
        let (orchestrator, store) = orchestrator(StaticAuth::ok(), registry);

        let result = orchestrator.run();

        assert_eq!(result.outcome, CycleOutcome::Success);
        assert_eq!(
            result.domains.iter().map(|d| d.domain).collect::<Vec<_>>(),
            vec![Domain::Activities, Domain::ActivityGps]
        );
        assert_eq!(seen.lock().unwrap()[0].1, vec![ActivityId(99)]);
        assert_eq!(store.count_records(Domain::ActivityGps).unwrap(), 1);
    }

    #[test]
    fn test_gps_skipped_when_activities_fail() {
        let mut registry = CollectorRegistry::new();
        registry.register(Scripted::failing(
            Domain::Activities,
            upstream_failure(Domain::Activities),
        ));
        let gps = Scripted::new(Domain::ActivityGps);
        let seen = gps.seen.clone();
        registry.register(gps);
        let (orchestrator, store) = orchestrator(StaticAuth::ok(), registry);

        let result = orchestrator.run();

        let gps_outcome = result.domain(Domain::ActivityGps).unwrap();
        assert_eq!(gps_outcome.status, SyncStatus::Failed);
        assert!(gps_outcome.error.as_deref().unwrap().contains("depends on activities"));
        assert!(seen.lock().unwrap().is_empty());
        assert!(store.get_cursor(Domain::ActivityGps).unwrap().is_none());
    }

    #[test]
    fn test_clamped_window_is_partial_and_cursor_stops_at_clamp() {
        let mut registry = CollectorRegistry::new();
        registry.register(Scripted {
            caps: WindowCaps::span_days(2),
            ..Scripted::new(Domain::BodyComposition)
        });
        let (orchestrator, store) = orchestrator(StaticAuth::ok(), registry);

        let result = orchestrator.run();

        assert_eq!(result.outcome, CycleOutcome::Success);
        let outcome = result.domain(Domain::BodyComposition).unwrap();
        assert_eq!(outcome.status, SyncStatus::Partial);
        let clamp = outcome.clamp.unwrap();
        assert!(clamp.deferred_tail());

        let cursor = store.get_cursor(Domain::BodyComposition).unwrap().unwrap();
        assert_eq!(cursor.last_synced_at, clamp.effective.until);
        assert_eq!(cursor.last_status, SyncStatus::Partial);

        let logs = store.list_logs(&result.run_id).unwrap();
        assert_eq!(logs[0].status, SyncStatus::Partial);
        assert!(logs[0].error_detail.as_deref().unwrap().contains("clamped"));
    }

    #[test]
    fn test_lagging_dependent_widens_dependency_window() {
        let mut registry = CollectorRegistry::new();
        let activities = Scripted::new(Domain::Activities);
        let seen = activities.seen.clone();
        registry.register(activities);
        registry.register(Scripted::new(Domain::ActivityGps));
        let (orchestrator, store) = orchestrator(StaticAuth::ok(), registry);

        let gps_since = now() - Duration::days(2);
        store
            .commit_domain(Domain::ActivityGps, &[], gps_since, SyncStatus::Success)
            .unwrap();
        store
            .record_cursor_status(Domain::ActivityGps, SyncStatus::Failed)
            .unwrap();
        store
            .commit_domain(
                Domain::Activities,
                &[],
                now() - Duration::hours(1),
                SyncStatus::Success,
            )
            .unwrap();

        let result = orchestrator.run();

        assert_eq!(result.outcome, CycleOutcome::Success);
        let (window, _) = seen.lock().unwrap()[0].clone();
        assert_eq!(window, SyncWindow::new(gps_since, now()));
        // The dependency's cursor never moves backwards
        assert_eq!(
            store.get_cursor(Domain::Activities).unwrap().unwrap().last_synced_at,
            now()
        );
        assert_eq!(
            store.get_cursor(Domain::ActivityGps).unwrap().unwrap().last_synced_at,
            now()
        );
    }

    #[test]
    fn test_windows_end_at_last_upload() {
        let mut registry = CollectorRegistry::new();
        let daily = Scripted::new(Domain::DailySummary);
        let seen = daily.seen.clone();
        registry.register(daily);
        let (orchestrator, store) = orchestrator(StaticAuth::ok(), registry);
        let upload = now() - Duration::hours(2);
        let orchestrator = orchestrator.with_upload_watermark(uploaded_at(upload));
        store
            .commit_domain(
                Domain::DailySummary,
                &[],
                now() - Duration::hours(5),
                SyncStatus::Success,
            )
            .unwrap();

        let result = orchestrator.run();

        assert_eq!(result.outcome, CycleOutcome::Success);
        assert_eq!(result.last_upload, Some(upload));
        assert_eq!(seen.lock().unwrap()[0].0.until, upload);
        assert_eq!(
            store.get_cursor(Domain::DailySummary).unwrap().unwrap().last_synced_at,
            upload
        );
    }

    #[test]
    fn test_no_new_upload_skips_cycle() {
        let mut registry = CollectorRegistry::new();
        let daily = Scripted::new(Domain::DailySummary);
        let seen = daily.seen.clone();
        registry.register(daily);
        registry.register(Scripted::new(Domain::Sleep));
        let (orchestrator, store) = orchestrator(StaticAuth::ok(), registry);
        let upload = now() - Duration::hours(2);
        let orchestrator = orchestrator.with_upload_watermark(uploaded_at(upload));
        for domain in [Domain::DailySummary, Domain::Sleep] {
            store
                .commit_domain(domain, &[], upload, SyncStatus::Success)
                .unwrap();
        }

        let result = orchestrator.run();

        assert_eq!(result.outcome, CycleOutcome::UpToDate);
        assert!(result.domains.is_empty());
        assert!(seen.lock().unwrap().is_empty());
        assert!(store.list_logs(&result.run_id).unwrap().is_empty());
        assert_eq!(orchestrator.phase(), CyclePhase::Idle);
    }

    #[test]
    fn test_failed_domain_is_never_up_to_date() {
        let mut registry = CollectorRegistry::new();
        let sleep = Scripted::new(Domain::Sleep);
        let seen = sleep.seen.clone();
        registry.register(sleep);
        let (orchestrator, store) = orchestrator(StaticAuth::ok(), registry);
        let upload = now() - Duration::hours(2);
        let orchestrator = orchestrator.with_upload_watermark(uploaded_at(upload));
        store
            .commit_domain(Domain::Sleep, &[], upload, SyncStatus::Success)
            .unwrap();
        store
            .record_cursor_status(Domain::Sleep, SyncStatus::Failed)
            .unwrap();

        let result = orchestrator.run();

        assert_eq!(result.outcome, CycleOutcome::Success);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_upload_check_failure_syncs_up_to_now() {
        let mut registry = CollectorRegistry::new();
        let daily = Scripted::new(Domain::DailySummary);
        let seen = daily.seen.clone();
        registry.register(daily);
        let (orchestrator, _store) = orchestrator(StaticAuth::ok(), registry);
        let orchestrator = orchestrator
            .with_upload_watermark(Arc::new(FixedUpload(Err(UpstreamError::Server(503)))));

        let result = orchestrator.run();

        assert_eq!(result.outcome, CycleOutcome::Success);
        assert_eq!(result.last_upload, None);
        assert_eq!(seen.lock().unwrap()[0].0.until, now());
    }
}
