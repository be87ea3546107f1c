//! Activity summaries and their GPS tracks

use chrono::Duration;
use std::sync::Arc;

use super::{Collected, Discovered, SourceCollector, Upstream, clamp_window};
use crate::connect::normalize;
use crate::error::CollectionError;
use crate::models::{Domain, HealthRecord, SyncWindow, WindowCaps, WindowClamp};
use crate::session::Session;

/// Activities requested per search page
pub const ACTIVITY_PAGE_SIZE: usize = 100;

/// Paged activity search over the window's date range.
///
/// A page failing after retries fails the whole call; pages already fetched
/// are discarded.
pub struct ActivitiesCollector {
    upstream: Arc<Upstream>,
    caps: WindowCaps,
    page_size: usize,
}

impl ActivitiesCollector {
    pub fn new(upstream: Arc<Upstream>, caps: WindowCaps) -> Self {
        Self {
            upstream,
            caps,
            page_size: ACTIVITY_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

impl SourceCollector for ActivitiesCollector {
    fn domain(&self) -> Domain {
        Domain::Activities
    }

    fn collect(
        &self,
        session: &Session,
        window: &SyncWindow,
        _discovered: &Discovered,
    ) -> Result<Collected, CollectionError> {
        let domain = self.domain();
        let (effective, clamp) = clamp_window(domain, window, &self.caps);
        let mut collected = Collected::empty(effective, clamp);
        if effective.is_empty() {
            return Ok(collected);
        }

        let start = effective.since.date_naive();
        let end = (effective.until - Duration::microseconds(1)).date_naive();
        let mut offset = 0;

        loop {
            let page = self.upstream.call(domain, |api| {
                api.search_activities(session, start, end, offset, self.page_size)
            })?;
            let page_len = page.len();

            for raw in &page {
                let activity = normalize::activity(raw).map_err(|cause| {
                    CollectionError::Upstream {
                        domain,
                        attempts: 1,
                        cause,
                    }
                })?;
                collected.records.push(HealthRecord::Activity(activity));
            }

            log::debug!(
                "[COLLECT] {}: page at offset {} returned {} activities",
                domain,
                offset,
                page_len
            );

            if page_len < self.page_size {
                break;
            }
            offset += page_len;
        }

        Ok(collected)
    }
}

/// GPS track points for activities discovered earlier in the cycle.
///
/// The window never reaches past what the activity search covered, so a
/// deferred activity tail keeps this domain's cursor behind it as well.
pub struct ActivityGpsCollector {
    upstream: Arc<Upstream>,
}

impl ActivityGpsCollector {
    pub fn new(upstream: Arc<Upstream>) -> Self {
        Self { upstream }
    }
}

impl SourceCollector for ActivityGpsCollector {
    fn domain(&self) -> Domain {
        Domain::ActivityGps
    }

    fn collect(
        &self,
        session: &Session,
        window: &SyncWindow,
        discovered: &Discovered,
    ) -> Result<Collected, CollectionError> {
        let domain = self.domain();
        let effective = match discovered.activities_until() {
            Some(until) if until < window.until => SyncWindow::new(window.since, until),
            _ => *window,
        };
        let clamp = (effective != *window).then_some(WindowClamp {
            requested: *window,
            effective,
        });
        if let Some(clamp) = &clamp {
            log::warn!("[COLLECT] {}: {}", domain, clamp);
        }
        let mut collected = Collected::empty(effective, clamp);

        let candidates = discovered.gps_candidates();
        log::debug!(
            "[COLLECT] {}: {} of {} discovered activities likely have GPS",
            domain,
            candidates.len(),
            discovered.activity_ids().len()
        );

        for activity_id in candidates {
            let details = self
                .upstream
                .call(domain, |api| api.activity_details(session, activity_id))?;
            collected.records.extend(
                normalize::track_points(activity_id, &details)
                    .into_iter()
                    .map(HealthRecord::TrackPoint),
            );
        }

        Ok(collected)
    }
}
