//! Upstream session capability and the authenticator contract

use std::fmt;

use crate::error::AuthError;

/// Opaque, immutable credential handle passed by value into collectors.
///
/// Collectors never hold a reference back to the authenticator; a new
/// session is obtained at the start of every cycle.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    access_token: String,
    display_name: String,
}

impl Session {
    pub fn new(access_token: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            display_name: display_name.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// User handle required by per-user upstream endpoints
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// Supplies a valid session for the upstream platform
pub trait Authenticator: Send + Sync {
    /// Obtain or refresh a session.
    ///
    /// Fails with `requires_mfa_code = true` when a one-time code is needed.
    fn authenticate(&self) -> Result<Session, AuthError>;

    /// Finish a login that asked for a one-time code
    fn authenticate_with_code(&self, code: &str) -> Result<Session, AuthError>;
}

/// Source of human-entered one-time codes
pub trait MfaCodeProvider: Send + Sync {
    fn one_time_code(&self) -> Option<String>;
}
