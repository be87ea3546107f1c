//! Weigh-ins and body composition

use chrono::Duration;
use std::sync::Arc;

use super::{Collected, Discovered, SourceCollector, Upstream, clamp_window};
use crate::connect::normalize;
use crate::error::CollectionError;
use crate::models::{Domain, HealthRecord, SyncWindow, WindowCaps};
use crate::session::Session;

/// One ranged call per cycle over the window's calendar dates.
///
/// Readings from the window's first date that predate its start are kept,
/// so weigh-ins synced late by the scale are not lost behind the cursor.
/// Readings at or after the window's end wait for the next cycle.
pub struct BodyCompositionCollector {
    upstream: Arc<Upstream>,
    caps: WindowCaps,
}

impl BodyCompositionCollector {
    pub fn new(upstream: Arc<Upstream>, caps: WindowCaps) -> Self {
        Self { upstream, caps }
    }
}

impl SourceCollector for BodyCompositionCollector {
    fn domain(&self) -> Domain {
        Domain::BodyComposition
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
        let response = self
            .upstream
            .call(domain, |api| api.body_composition(session, start, end))?;

        collected.records = normalize::body_composition(&response)
            .into_iter()
            .filter(|r| r.measured_at < effective.until)
            .map(HealthRecord::BodyComposition)
            .collect();
        Ok(collected)
    }
}
