//! Wellness platform authentication
//!
//! Credential login against the platform's SSO service, exchanged for a
//! bearer token that is cached on disk and refreshed when close to expiry.
//! Accounts with two-factor authentication get a `requires_mfa_code` error
//! from [`Authenticator::authenticate`]; the login is then finished with
//! [`Authenticator::authenticate_with_code`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use super::ConnectClient;
use super::client::{build_agent, with_trailing_slash};
use crate::config::ConnectCredentials;
use crate::error::AuthError;
use crate::session::{Authenticator, Session};

/// Base URLs of the data API and the SSO service
#[derive(Debug, Clone)]
pub struct ConnectEndpoints {
    pub api_base: Url,
    pub sso_base: Url,
}

impl ConnectEndpoints {
    pub const DEFAULT_SSO_BASE_URL: &'static str = "https://sso.garmin.com/";

    pub fn new(api_base: Url, sso_base: Url) -> Self {
        Self {
            api_base: with_trailing_slash(api_base),
            sso_base: with_trailing_slash(sso_base),
        }
    }

    fn join(base: &Url, path: &str) -> Result<Url, AuthError> {
        base.join(path)
            .map_err(|e| AuthError::new(format!("invalid endpoint {path}: {e}")))
    }

    fn login_url(&self) -> Result<Url, AuthError> {
        Self::join(&self.sso_base, "sso/api/login")
    }

    fn mfa_url(&self) -> Result<Url, AuthError> {
        Self::join(&self.sso_base, "sso/api/mfa/verify")
    }

    fn token_url(&self) -> Result<Url, AuthError> {
        Self::join(&self.api_base, "oauth-service/oauth/token")
    }
}

/// Token cache and login flow for the wellness platform
pub struct ConnectAuth {
    credentials: Option<ConnectCredentials>,
    endpoints: ConnectEndpoints,
    token_path: PathBuf,
    agent: ureq::Agent,
    profile: ConnectClient,
    /// MFA token from a login that is waiting for its one-time code
    pending_mfa: Mutex<Option<String>>,
}

/// Token data persisted between runs
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    display_name: Option<String>,
}

impl StoredToken {
    fn is_fresh(&self, now: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at > now + ConnectAuth::EXPIRY_BUFFER_SECS)
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

/// SSO login / MFA verification response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    status: String,
    ticket: Option<String>,
    mfa_token: Option<String>,
    message: Option<String>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MfaRequest<'a> {
    mfa_token: &'a str,
    code: &'a str,
}

impl ConnectAuth {
    /// Token cache filename in the config directory
    const TOKEN_FILE: &'static str = "connect-tokens.json";

    /// Tokens closer than this to expiry are refreshed
    const EXPIRY_BUFFER_SECS: i64 = 300;

    /// Create an authenticator using the default token cache location
    pub fn new(
        credentials: Option<ConnectCredentials>,
        endpoints: ConnectEndpoints,
        timeout: Duration,
    ) -> Result<Self> {
        let token_path = Self::default_token_path()?;
        Ok(Self::with_token_path(credentials, endpoints, timeout, token_path))
    }

    pub fn with_token_path(
        credentials: Option<ConnectCredentials>,
        endpoints: ConnectEndpoints,
        timeout: Duration,
        token_path: PathBuf,
    ) -> Self {
        let profile = ConnectClient::new(endpoints.api_base.clone(), timeout);
        Self {
            credentials,
            endpoints,
            token_path,
            agent: build_agent(timeout),
            profile,
            pending_mfa: Mutex::new(None),
        }
    }

    /// Get the default token storage path (~/.config/healthsync/connect-tokens.json)
    pub fn default_token_path() -> Result<PathBuf> {
        config::config_path(Self::TOKEN_FILE).context("Could not determine config directory")
    }

    /// Whether a cached token can be used without logging in again
    pub fn has_valid_token(&self) -> bool {
        self.load_token()
            .is_ok_and(|token| token.is_fresh(chrono::Utc::now().timestamp()))
    }

    /// Clear stored tokens (logout)
    pub fn logout(&self) -> Result<()> {
        if self.token_path.exists() {
            fs::remove_file(&self.token_path).with_context(|| {
                format!("Failed to remove token file: {}", self.token_path.display())
            })?;
        }
        Ok(())
    }

    fn load_token(&self) -> Result<StoredToken> {
        config::load_json_file(&self.token_path)
    }

    fn save_token(
        &self,
        token: TokenResponse,
        display_name: Option<String>,
    ) -> Result<StoredToken, AuthError> {
        let stored = StoredToken {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token
                .expires_in
                .map(|d| chrono::Utc::now().timestamp() + d as i64),
            display_name,
        };
        config::save_json_file(&self.token_path, &stored)
            .map_err(|e| AuthError::new(format!("Failed to store session token: {e:#}")))?;
        Ok(stored)
    }

    /// Turn a stored token into a session, resolving the display name once
    fn session_for(&self, mut stored: StoredToken) -> Result<Session, AuthError> {
        let display_name = match stored.display_name.clone() {
            Some(name) => name,
            None => {
                let profile = self
                    .profile
                    .social_profile(&stored.access_token)
                    .map_err(|e| AuthError::new(format!("Failed to resolve profile: {e}")))?;
                stored.display_name = Some(profile.display_name.clone());
                if let Err(e) = config::save_json_file(&self.token_path, &stored) {
                    log::warn!("[AUTH] Could not cache display name: {:#}", e);
                }
                profile.display_name
            }
        };
        Ok(Session::new(stored.access_token, display_name))
    }

    fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let url = self.endpoints.token_url()?;
        let mut response = self
            .agent
            .post(url.as_str())
            .send_form([
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .map_err(|e| AuthError::new(format!("Failed to refresh access token: {e}")))?;

        let mut token: TokenResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| AuthError::new(format!("Failed to parse refresh response: {e}")))?;

        // Preserve the refresh token if not returned
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    fn exchange_ticket(&self, ticket: &str) -> Result<TokenResponse, AuthError> {
        let url = self.endpoints.token_url()?;
        let mut response = self
            .agent
            .post(url.as_str())
            .send_form([("grant_type", "service_ticket"), ("ticket", ticket)])
            .map_err(|e| AuthError::new(format!("Failed to exchange login ticket: {e}")))?;

        response
            .body_mut()
            .read_json()
            .map_err(|e| AuthError::new(format!("Failed to parse token response: {e}")))
    }

    fn credential_login(&self) -> Result<Session, AuthError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| AuthError::new("no credentials configured"))?;

        log::info!("[AUTH] Logging in as {}", credentials.email);
        let url = self.endpoints.login_url()?;
        let mut response = self
            .agent
            .post(url.as_str())
            .send_json(&LoginRequest {
                username: &credentials.email,
                password: &credentials.password,
            })
            .map_err(|e| AuthError::new(format!("Login request failed: {e}")))?;

        let login: LoginResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| AuthError::new(format!("Failed to parse login response: {e}")))?;
        self.finish_login(login)
    }

    fn finish_login(&self, login: LoginResponse) -> Result<Session, AuthError> {
        match login.status.as_str() {
            "SUCCESS" => {
                let ticket = login
                    .ticket
                    .ok_or_else(|| AuthError::new("login succeeded without a ticket"))?;
                let token = self.exchange_ticket(&ticket)?;
                let stored = self.save_token(token, None)?;
                log::info!("[AUTH] Login successful");
                self.session_for(stored)
            }
            "MFA_REQUIRED" => {
                let mfa_token = login
                    .mfa_token
                    .ok_or_else(|| AuthError::new("MFA requested without an MFA token"))?;
                *self.pending_mfa.lock().unwrap() = Some(mfa_token);
                log::info!("[AUTH] One-time code required");
                Err(AuthError::mfa_required("one-time code required"))
            }
            other => Err(AuthError::new(format!(
                "login rejected ({}): {}",
                other,
                login.message.unwrap_or_default()
            ))),
        }
    }
}

impl Authenticator for ConnectAuth {
    fn authenticate(&self) -> Result<Session, AuthError> {
        if let Ok(token) = self.load_token() {
            if token.is_fresh(chrono::Utc::now().timestamp()) {
                log::debug!("[AUTH] Using cached token");
                return self.session_for(token);
            }

            if let Some(refresh_token) = token.refresh_token.as_deref() {
                match self.refresh_access_token(refresh_token) {
                    Ok(new_token) => {
                        log::debug!("[AUTH] Refreshed access token");
                        let stored = self.save_token(new_token, token.display_name)?;
                        return self.session_for(stored);
                    }
                    Err(e) => log::warn!("[AUTH] Token refresh failed: {}", e),
                }
            }
        }

        self.credential_login()
    }

    fn authenticate_with_code(&self, code: &str) -> Result<Session, AuthError> {
        let mfa_token = self
            .pending_mfa
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| AuthError::new("no login is waiting for a one-time code"))?;

        let url = self.endpoints.mfa_url()?;
        let mut response = self
            .agent
            .post(url.as_str())
            .send_json(&MfaRequest {
                mfa_token: &mfa_token,
                code: code.trim(),
            })
            .map_err(|e| AuthError::new(format!("One-time code verification failed: {e}")))?;

        let login: LoginResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| AuthError::new(format!("Failed to parse verification response: {e}")))?;
        self.finish_login(login)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn endpoints() -> ConnectEndpoints {
        ConnectEndpoints::new(
            Url::parse("http://127.0.0.1:9/api").unwrap(),
            Url::parse("http://127.0.0.1:9/sso").unwrap(),
        )
    }

    fn auth_in(dir: &TempDir, credentials: Option<ConnectCredentials>) -> ConnectAuth {
        ConnectAuth::with_token_path(
            credentials,
            endpoints(),
            Duration::from_secs(1),
            dir.path().join("tokens.json"),
        )
    }

    #[test]
    fn test_endpoint_paths() {
        let endpoints = endpoints();
        assert_eq!(endpoints.login_url().unwrap().path(), "/sso/sso/api/login");
        assert_eq!(
            endpoints.token_url().unwrap().path(),
            "/api/oauth-service/oauth/token"
        );
    }

    #[test]
    fn test_token_freshness_buffer() {
        let token = StoredToken {
            access_token: "t".into(),
            refresh_token: None,
            expires_at: Some(1_000),
            display_name: None,
        };
        assert!(token.is_fresh(1_000 - 301));
        assert!(!token.is_fresh(1_000 - 300));
        assert!(!StoredToken { expires_at: None, ..token }.is_fresh(0));
    }

    #[test]
    fn test_cached_token_is_used() {
        let dir = TempDir::new().unwrap();
        let auth = auth_in(&dir, None);
        let stored = StoredToken {
            access_token: "cached-token".into(),
            refresh_token: None,
            expires_at: Some(chrono::Utc::now().timestamp() + 3600),
            display_name: Some("runner42".into()),
        };
        config::save_json_file(&auth.token_path, &stored).unwrap();

        assert!(auth.has_valid_token());
        let session = auth.authenticate().unwrap();
        assert_eq!(session.access_token(), "cached-token");
        assert_eq!(session.display_name(), "runner42");
    }

    #[test]
    fn test_no_token_and_no_credentials_fails() {
        let dir = TempDir::new().unwrap();
        let auth = auth_in(&dir, None);

        let err = auth.authenticate().unwrap_err();
        assert!(!err.requires_mfa_code);
        assert!(err.reason.contains("no credentials"));
    }

    #[test]
    fn test_mfa_response_stores_pending_login() {
        let dir = TempDir::new().unwrap();
        let auth = auth_in(&dir, None);

        let err = auth
            .finish_login(LoginResponse {
                status: "MFA_REQUIRED".into(),
                ticket: None,
                mfa_token: Some("mfa-123".into()),
                message: None,
            })
            .unwrap_err();

        assert!(err.requires_mfa_code);
        assert_eq!(auth.pending_mfa.lock().unwrap().as_deref(), Some("mfa-123"));
    }

    #[test]
    fn test_code_without_pending_login_fails() {
        let dir = TempDir::new().unwrap();
        let auth = auth_in(&dir, None);
        assert!(auth.authenticate_with_code("123456").is_err());
    }

    #[test]
    fn test_logout_removes_token() {
        let dir = TempDir::new().unwrap();
        let auth = auth_in(&dir, None);
        fs::write(&auth.token_path, "{}").unwrap();

        auth.logout().unwrap();
        assert!(!auth.token_path.exists());
        auth.logout().unwrap();
    }
}
