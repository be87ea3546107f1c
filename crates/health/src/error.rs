//! Error taxonomy for the sync engine
//!
//! - [`AuthError`] aborts a whole cycle and escalates to the driver's backoff.
//! - [`CollectionError`] is scoped to one domain and retried next cycle.
//! - [`StorageError`] fails the affected domain's commit; retried next cycle.
//! - Window clamps are not errors; see [`crate::models::WindowClamp`].

use crate::models::Domain;

/// Authentication with the upstream platform failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Authentication failed: {reason}")]
pub struct AuthError {
    pub reason: String,
    /// A one-time code must be supplied to finish logging in
    pub requires_mfa_code: bool,
}

impl AuthError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            requires_mfa_code: false,
        }
    }

    pub fn mfa_required(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            requires_mfa_code: true,
        }
    }
}

/// A single upstream call failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rate limited by upstream (HTTP 429)")]
    RateLimited,

    #[error("Upstream server error (HTTP {0})")]
    Server(u16),

    #[error("Session rejected (HTTP {0})")]
    Unauthorized(u16),

    #[error("Request rejected (HTTP {0})")]
    Rejected(u16),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// Classify an HTTP error status
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => UpstreamError::RateLimited,
            401 | 403 => UpstreamError::Unauthorized(status),
            500..=599 => UpstreamError::Server(status),
            other => UpstreamError::Rejected(other),
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            UpstreamError::Timeout(_)
                | UpstreamError::Transport(_)
                | UpstreamError::RateLimited
                | UpstreamError::Server(_)
        )
    }
}

/// A collector could not produce records for its domain this cycle
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollectionError {
    #[error("{domain}: upstream call failed after {attempts} attempt(s): {cause}")]
    Upstream {
        domain: Domain,
        attempts: u32,
        #[source]
        cause: UpstreamError,
    },

    #[error("{domain}: depends on {dependency}, which did not complete this cycle")]
    DependencyFailed { domain: Domain, dependency: Domain },
}

impl CollectionError {
    pub fn domain(&self) -> Domain {
        match self {
            CollectionError::Upstream { domain, .. }
            | CollectionError::DependencyFailed { domain, .. } => *domain,
        }
    }
}

/// The storage backend could not read or commit a domain's state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{domain}: storage error: {message}")]
pub struct StorageError {
    pub domain: Domain,
    pub message: String,
}

impl StorageError {
    /// Wrap a storage failure, keeping the full context chain
    pub fn from_anyhow(domain: Domain, err: &anyhow::Error) -> Self {
        Self {
            domain,
            message: format!("{err:#}"),
        }
    }
}

/// Errors surfaced by the sync loop driver
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("A sync cycle is already running")]
    CycleInProgress,
}
