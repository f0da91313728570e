//! Unified error handling for the feedrelay crate
//!
//! This module provides a unified error type that consolidates the
//! domain-specific errors into a single `Error` enum, while keeping the
//! domain-specific errors available where a caller needs to branch on them.
//!
//! # Architecture
//!
//! - [`RelayErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors

use std::io;
use thiserror::Error;

pub use crate::notifications::channels::ChannelError;
pub use crate::utils::error::{AuthError, FetchError};

/// Common trait for all feedrelay error types
pub trait RelayErrorTrait: std::error::Error {
    /// Check if this error is recoverable (the next cycle may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, rate limit)
    Network,
    /// Login and session errors
    Auth,
    /// Response decoding errors
    Parsing,
    /// Storage and I/O errors
    Storage,
    /// Destination delivery errors
    Delivery,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Parsing => "parsing",
            Self::Storage => "storage",
            Self::Delivery => "delivery",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the feedrelay crate
#[derive(Error, Debug)]
pub enum Error {
    /// Fetch errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Login/session errors
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Destination client errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RelayErrorTrait for FetchError {
    fn is_recoverable(&self) -> bool {
        FetchError::is_recoverable(self)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Malformed(_) => ErrorCategory::Parsing,
            Self::AuthRetriesExhausted { .. } | Self::Login(_) | Self::Unauthorized => {
                ErrorCategory::Auth
            }
            _ => ErrorCategory::Network,
        }
    }
}

impl RelayErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Auth(e) => !matches!(e, AuthError::MissingCredentials),
            Self::Channel(e) => e.is_recoverable(),
            Self::Database(_) => false,
            Self::Io(_) => true, // I/O errors are often transient
            Self::Json(_) => false,
            Self::Http(_) => true, // HTTP errors are often transient
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) => e.category(),
            Self::Auth(_) => ErrorCategory::Auth,
            Self::Channel(_) => ErrorCategory::Delivery,
            Self::Http(_) => ErrorCategory::Network,
            Self::Database(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from rusqlite::Error
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err)
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
