//! Settings and credential loading for the sync engine
//!
//! Sync settings are read from `healthsync.json` in the config directory;
//! every field is optional and falls back to its default.
//!
//! Upstream credentials are loaded from (in order of priority):
//! 1. JSON file (`credentials.json` in the config directory)
//! 2. Runtime environment variables (`HEALTHSYNC_EMAIL`, `HEALTHSYNC_PASSWORD`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::collect::RetryPolicy;
use crate::connect::ConnectEndpoints;
use crate::models::{Domain, WindowCaps};

/// Settings filename in the healthsync config directory
const SETTINGS_FILE: &str = "healthsync.json";

/// Credentials filename in the healthsync config directory
const CREDENTIALS_FILE: &str = "credentials.json";

/// Default database filename in the healthsync config directory
const DATABASE_FILE: &str = "health.sqlite";

/// Tunables for the sync loop, pacing and upstream access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Idle time between the end of one cycle and the start of the next
    pub interval_secs: u64,
    /// History fetched for a domain that has never been synced
    pub lookback_days: u32,
    /// Minimum spacing between upstream calls
    pub rate_limit_ms: u64,
    pub request_timeout_secs: u64,
    pub retry: RetrySettings,
    pub auth_backoff: BackoffSettings,
    pub lookback_caps: LookbackCaps,
    pub max_span: SpanCaps,
    /// SQLite database location; defaults to the config directory
    pub db_path: Option<PathBuf>,
    pub api_base_url: String,
    pub sso_base_url: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            lookback_days: 7,
            rate_limit_ms: 1000,
            request_timeout_secs: 30,
            retry: RetrySettings::default(),
            auth_backoff: BackoffSettings::default(),
            lookback_caps: LookbackCaps::default(),
            max_span: SpanCaps::default(),
            db_path: None,
            api_base_url: crate::connect::ConnectClient::DEFAULT_BASE_URL.to_string(),
            sso_base_url: ConnectEndpoints::DEFAULT_SSO_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: u32,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            multiplier: 2,
            max_backoff_ms: 30_000,
        }
    }
}

/// Wait after an authentication failure, doubling up to `max_secs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    pub initial_secs: u64,
    pub max_secs: u64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_secs: 60,
            max_secs: 3600,
        }
    }
}

/// How far back the platform serves intraday and sleep data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookbackCaps {
    pub heart_rate_days: u32,
    pub stress_days: u32,
    pub hrv_days: u32,
    pub respiration_days: u32,
    pub sleep_days: u32,
}

impl Default for LookbackCaps {
    fn default() -> Self {
        Self {
            heart_rate_days: 3,
            stress_days: 3,
            hrv_days: 3,
            respiration_days: 3,
            sleep_days: 7,
        }
    }
}

/// Widest range a single range query may cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanCaps {
    pub activities_days: u32,
    pub body_composition_days: u32,
}

impl Default for SpanCaps {
    fn default() -> Self {
        Self {
            activities_days: 30,
            body_composition_days: 90,
        }
    }
}

impl SyncSettings {
    /// Load settings from the config directory, or defaults if absent
    pub fn load() -> Result<Self> {
        if config::config_exists(SETTINGS_FILE) {
            return config::load_json(SETTINGS_FILE);
        }
        Ok(Self::default())
    }

    /// Load settings from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse settings JSON")
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            multiplier: self.retry.multiplier.max(1),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }

    /// Upstream window limits for a domain
    pub fn window_caps(&self, domain: Domain) -> WindowCaps {
        match domain {
            Domain::HeartRate => WindowCaps::lookback_days(self.lookback_caps.heart_rate_days),
            Domain::Stress => WindowCaps::lookback_days(self.lookback_caps.stress_days),
            Domain::Hrv => WindowCaps::lookback_days(self.lookback_caps.hrv_days),
            Domain::Respiration => WindowCaps::lookback_days(self.lookback_caps.respiration_days),
            Domain::Sleep => WindowCaps::lookback_days(self.lookback_caps.sleep_days),
            Domain::Activities => WindowCaps::span_days(self.max_span.activities_days),
            Domain::BodyComposition => WindowCaps::span_days(self.max_span.body_composition_days),
            Domain::DailySummary | Domain::ActivityGps => WindowCaps::none(),
        }
    }

    /// Parsed upstream base URLs
    pub fn endpoints(&self) -> Result<ConnectEndpoints> {
        let api_base = Url::parse(&self.api_base_url)
            .with_context(|| format!("Invalid api_base_url: {}", self.api_base_url))?;
        let sso_base = Url::parse(&self.sso_base_url)
            .with_context(|| format!("Invalid sso_base_url: {}", self.sso_base_url))?;
        Ok(ConnectEndpoints::new(api_base, sso_base))
    }

    /// The configured database path, or `health.sqlite` in the config directory
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => config::config_path(DATABASE_FILE).context("Could not determine config directory"),
        }
    }
}

/// Login for the upstream wellness platform
#[derive(Clone, Deserialize)]
pub struct ConnectCredentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for ConnectCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ConnectCredentials {
    /// Load credentials from the config directory, falling back to the
    /// environment
    pub fn load() -> Result<Self> {
        if config::config_exists(CREDENTIALS_FILE) {
            return config::load_json(CREDENTIALS_FILE);
        }
        Self::from_env()
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse credentials JSON")
    }

    pub fn from_env() -> Result<Self> {
        let email = std::env::var("HEALTHSYNC_EMAIL")
            .context("HEALTHSYNC_EMAIL environment variable not set")?;
        let password = std::env::var("HEALTHSYNC_PASSWORD")
            .context("HEALTHSYNC_PASSWORD environment variable not set")?;
        Ok(Self { email, password })
    }

    /// Get the default credentials file path (~/.config/healthsync/credentials.json)
    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }

    /// Check if credentials are available (file or env vars)
    pub fn is_available() -> bool {
        if config::config_exists(CREDENTIALS_FILE) {
            return true;
        }
        std::env::var("HEALTHSYNC_EMAIL").is_ok() && std::env::var("HEALTHSYNC_PASSWORD").is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SyncSettings::default();
        assert_eq!(settings.interval(), Duration::from_secs(300));
        assert_eq!(settings.lookback_days, 7);
        assert_eq!(settings.rate_limit(), Duration::from_millis(1000));
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_partial_settings_file() {
        let json = r#"{
            "interval_secs": 60,
            "retry": { "max_attempts": 5 },
            "db_path": "/tmp/health.sqlite"
        }"#;

        let settings = SyncSettings::from_json(json).unwrap();
        assert_eq!(settings.interval_secs, 60);
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.initial_backoff_ms, 1000);
        assert_eq!(settings.lookback_days, 7);
        assert_eq!(
            settings.resolved_db_path().unwrap(),
            PathBuf::from("/tmp/health.sqlite")
        );
    }

    #[test]
    fn test_window_caps_per_domain() {
        let settings = SyncSettings::default();
        assert_eq!(
            settings.window_caps(Domain::HeartRate),
            WindowCaps::lookback_days(3)
        );
        assert_eq!(
            settings.window_caps(Domain::Activities),
            WindowCaps::span_days(30)
        );
        assert_eq!(
            settings.window_caps(Domain::Hrv),
            WindowCaps::lookback_days(3)
        );
        assert_eq!(
            settings.window_caps(Domain::Respiration),
            WindowCaps::lookback_days(3)
        );
        assert_eq!(settings.window_caps(Domain::DailySummary), WindowCaps::none());
    }

    #[test]
    fn test_endpoints() {
        let settings = SyncSettings {
            api_base_url: "http://127.0.0.1:8080/api".into(),
            ..SyncSettings::default()
        };
        let endpoints = settings.endpoints().unwrap();
        assert_eq!(endpoints.api_base.as_str(), "http://127.0.0.1:8080/api/");

        let broken = SyncSettings {
            sso_base_url: "not a url".into(),
            ..SyncSettings::default()
        };
        assert!(broken.endpoints().is_err());
    }

    #[test]
    fn test_parse_credentials() {
        let creds =
            ConnectCredentials::from_json(r#"{ "email": "a@b.c", "password": "hunter2" }"#)
                .unwrap();
        assert_eq!(creds.email, "a@b.c");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[test]
    fn test_invalid_credentials_json() {
        assert!(ConnectCredentials::from_json(r#"{ "email": "a@b.c" }"#).is_err());
    }
}
