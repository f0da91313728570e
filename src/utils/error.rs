//! Error types for the feedrelay fetchers
//!
//! This module defines the failure classes produced while talking to the
//! content platforms and while maintaining authenticated sessions.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur while fetching a source's feed
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network failure or request timeout
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Platform answered with HTTP 429
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Platform answered with HTTP 401/403
    #[error("Unauthorized")]
    Unauthorized,

    /// Response did not contain the expected fields
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Any other non-success status
    #[error("Unexpected status: {0}")]
    Status(u16),

    /// Every login attempt was followed by another authorization failure
    #[error("Gave up after {attempts} login attempts")]
    AuthRetriesExhausted { attempts: u32 },

    /// The login exchange itself failed
    #[error("Login failed: {0}")]
    Login(#[from] AuthError),
}

impl FetchError {
    /// Classify a non-success HTTP status
    ///
    /// Returns `None` for success statuses.
    pub fn from_status(status: StatusCode) -> Option<Self> {
        if status.is_success() {
            return None;
        }

        Some(match status.as_u16() {
            429 => Self::RateLimited,
            401 | 403 => Self::Unauthorized,
            code => Self::Status(code),
        })
    }

    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::RateLimited => "rate_limited",
            Self::Unauthorized => "unauthorized",
            Self::Malformed(_) => "malformed",
            Self::Status(_) => "status",
            Self::AuthRetriesExhausted { .. } => "auth_exhausted",
            Self::Login(_) => "login",
        }
    }

    /// Whether the next cycle is expected to succeed without intervention
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimited | Self::Unauthorized => true,
            Self::Status(code) => *code >= 500,
            Self::AuthRetriesExhausted { .. } | Self::Login(_) => true,
            Self::Malformed(_) => false,
        }
    }
}

/// Errors raised by an authenticated session
#[derive(Error, Debug)]
pub enum AuthError {
    /// No username/password configured for the platform
    #[error("No login credentials configured")]
    MissingCredentials,

    /// The platform refused the login
    #[error("Login rejected: {0}")]
    Rejected(String),

    /// Network failure during the login exchange
    #[error("Login transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The login response could not be understood
    #[error("Malformed login response: {0}")]
    Malformed(String),

    /// Persisting or restoring credentials failed
    #[error("Session storage error: {0}")]
    Storage(String),

    /// A concurrent login for the same session failed
    #[error("Login failed for a queued request: {0}")]
    LoginPending(String),

    /// The session actor is no longer running
    #[error("Session actor stopped")]
    SessionClosed,
}
