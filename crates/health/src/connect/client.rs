//! Wellness platform HTTP client
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic. Every method makes
//! a single request; pacing and retries belong to the collectors.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::WellnessApi;
use super::api::{
    ActivityDetailsResponse, DailySummaryResponse, DeviceLastUsedResponse, HeartRateResponse,
    HrvResponse, RespirationResponse, SleepResponse, SocialProfile, StressResponse,
    WeightRangeResponse,
};
use crate::error::UpstreamError;
use crate::models::ActivityId;
use crate::session::Session;

/// Read-only client for the wellness platform's data API
pub struct ConnectClient {
    agent: ureq::Agent,
    base_url: Url,
}

impl ConnectClient {
    /// Production API base URL
    pub const DEFAULT_BASE_URL: &'static str = "https://connectapi.garmin.com/";

    /// Create a client against `base_url` with a per-request timeout
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        Self {
            agent: build_agent(timeout),
            base_url: with_trailing_slash(base_url),
        }
    }

    /// Resolve the profile of the session's user
    pub fn social_profile(&self, access_token: &str) -> Result<SocialProfile, UpstreamError> {
        let url = self.endpoint("userprofile-service/socialProfile")?;
        self.get_json(access_token, &url)?
            .ok_or_else(|| UpstreamError::Malformed("empty profile response".into()))
    }

    fn endpoint(&self, path: &str) -> Result<Url, UpstreamError> {
        self.base_url
            .join(path)
            .map_err(|e| UpstreamError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    fn user_endpoint(&self, prefix: &str, session: &Session) -> Result<Url, UpstreamError> {
        let name = urlencoding::encode(session.display_name());
        self.endpoint(&format!("{prefix}/{name}"))
    }

    /// GET `url` and parse the JSON body. An empty body (or 204) means the
    /// platform has nothing for this request.
    fn get_json<T: DeserializeOwned>(
        &self,
        access_token: &str,
        url: &Url,
    ) -> Result<Option<T>, UpstreamError> {
        log::trace!("[CONNECT] GET {}", url);

        let mut response = self
            .agent
            .get(url.as_str())
            .header("Authorization", &format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .call()
            .map_err(classify)?;

        if response.status().as_u16() == 204 {
            return Ok(None);
        }

        let body = response.body_mut().read_to_string().map_err(classify)?;
        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(None);
        }

        serde_json::from_str(trimmed)
            .map(Some)
            .map_err(|e| UpstreamError::Malformed(format!("{}: {}", url.path(), e)))
    }
}

impl WellnessApi for ConnectClient {
    fn daily_summary(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Option<DailySummaryResponse>, UpstreamError> {
        let mut url = self.user_endpoint("usersummary-service/usersummary/daily", session)?;
        url.query_pairs_mut()
            .append_pair("calendarDate", &date.to_string());
        self.get_json(session.access_token(), &url)
    }

    fn sleep(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Option<SleepResponse>, UpstreamError> {
        let mut url = self.user_endpoint("wellness-service/wellness/dailySleepData", session)?;
        url.query_pairs_mut()
            .append_pair("date", &date.to_string())
            .append_pair("nonSleepBufferMinutes", "60");
        self.get_json(session.access_token(), &url)
    }

    fn heart_rates(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Option<HeartRateResponse>, UpstreamError> {
        let mut url = self.user_endpoint("wellness-service/wellness/dailyHeartRate", session)?;
        url.query_pairs_mut().append_pair("date", &date.to_string());
        self.get_json(session.access_token(), &url)
    }

    fn stress(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Option<StressResponse>, UpstreamError> {
        let url = self.endpoint(&format!("wellness-service/wellness/dailyStress/{date}"))?;
        self.get_json(session.access_token(), &url)
    }

    fn hrv(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Option<HrvResponse>, UpstreamError> {
        let url = self.endpoint(&format!("hrv-service/hrv/{date}"))?;
        self.get_json(session.access_token(), &url)
    }

    fn respiration(
        &self,
        session: &Session,
        date: NaiveDate,
    ) -> Result<Option<RespirationResponse>, UpstreamError> {
        let url = self.endpoint(&format!("wellness-service/wellness/daily/respiration/{date}"))?;
        self.get_json(session.access_token(), &url)
    }

    fn search_activities(
        &self,
        session: &Session,
        start: NaiveDate,
        end: NaiveDate,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, UpstreamError> {
        let mut url = self.endpoint("activitylist-service/activities/search/activities")?;
        url.query_pairs_mut()
            .append_pair("startDate", &start.to_string())
            .append_pair("endDate", &end.to_string())
            .append_pair("start", &offset.to_string())
            .append_pair("limit", &limit.to_string());
        Ok(self
            .get_json(session.access_token(), &url)?
            .unwrap_or_default())
    }

    fn body_composition(
        &self,
        session: &Session,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<WeightRangeResponse, UpstreamError> {
        let mut url = self.endpoint("weight-service/weight/dateRange")?;
        url.query_pairs_mut()
            .append_pair("startDate", &start.to_string())
            .append_pair("endDate", &end.to_string());
        Ok(self
            .get_json(session.access_token(), &url)?
            .unwrap_or_default())
    }

    fn activity_details(
        &self,
        session: &Session,
        activity_id: ActivityId,
    ) -> Result<ActivityDetailsResponse, UpstreamError> {
        let mut url = self.endpoint(&format!(
            "activity-service/activity/{}/details",
            activity_id
        ))?;
        url.query_pairs_mut()
            .append_pair("maxChartSize", "2000")
            .append_pair("maxPolylineSize", "4000");
        Ok(self
            .get_json(session.access_token(), &url)?
            .unwrap_or_default())
    }

    fn device_last_used(
        &self,
        session: &Session,
    ) -> Result<Option<DeviceLastUsedResponse>, UpstreamError> {
        let url = self.endpoint("device-service/deviceservice/mylastused")?;
        self.get_json(session.access_token(), &url)
    }
}

/// Agent that reports HTTP error statuses as `ureq::Error::StatusCode`
pub(super) fn build_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    config.into()
}

pub(super) fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Map a ureq failure onto the upstream error taxonomy
pub(super) fn classify(err: ureq::Error) -> UpstreamError {
    match err {
        ureq::Error::StatusCode(status) => UpstreamError::from_status(status),
        ureq::Error::Timeout(which) => UpstreamError::Timeout(which.to_string()),
        ureq::Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => {
            UpstreamError::Timeout(e.to_string())
        }
        other => UpstreamError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_added() {
        let url = with_trailing_slash(Url::parse("http://localhost:8080/api").unwrap());
        assert_eq!(url.as_str(), "http://localhost:8080/api/");

        let joined = url.join("weight-service/weight/dateRange").unwrap();
        assert_eq!(joined.path(), "/api/weight-service/weight/dateRange");
    }

    #[test]
    fn test_classify_status_codes() {
        assert_eq!(
            classify(ureq::Error::StatusCode(429)),
            UpstreamError::RateLimited
        );
        assert_eq!(
            classify(ureq::Error::StatusCode(502)),
            UpstreamError::Server(502)
        );
        assert!(matches!(
            classify(ureq::Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "read timed out"
            ))),
            UpstreamError::Timeout(_)
        ));
    }

    #[test]
    fn test_user_endpoint_encodes_display_name() {
        let client = ConnectClient::new(
            Url::parse("http://localhost/").unwrap(),
            Duration::from_secs(5),
        );
        let session = Session::new("token", "jane doe");
        let url = client
            .user_endpoint("usersummary-service/usersummary/daily", &session)
            .unwrap();
        assert_eq!(url.path(), "/usersummary-service/usersummary/daily/jane%20doe");
    }
}
