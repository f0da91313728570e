//! Destination clients for delivering rendered notifications
//!
//! A destination is one text channel inside one community. Production
//! delivery goes through [`discord::DiscordClient`].

pub mod discord;

use async_trait::async_trait;
use std::fmt;

use crate::notifications::RenderedMessage;

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur during channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Destination deleted, inaccessible or outside its community
    #[error("Destination unresolvable: {0}")]
    Unresolvable(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Destination refused the message
    #[error("Delivery rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error
    #[error("Channel error: {0}")]
    Other(String),
}

impl ChannelError {
    /// Whether a later delivery to the same destination may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::HttpError(_) | Self::RateLimited(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// A resolved delivery target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub community_id: String,
    pub channel_id: String,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.community_id, self.channel_id)
    }
}

/// Client able to resolve and deliver to destinations
#[async_trait]
pub trait DestinationClient: Send + Sync {
    /// Get the client name
    fn name(&self) -> &str;

    /// Resolve a channel inside a community
    ///
    /// Returns `Ok(None)` when the destination no longer exists or is not
    /// accessible.
    async fn resolve_destination(
        &self,
        community_id: &str,
        channel_id: &str,
    ) -> ChannelResult<Option<Destination>>;

    /// Deliver `text` together with the message's embed and attachments
    async fn deliver(
        &self,
        destination: &Destination,
        text: &str,
        message: &RenderedMessage,
    ) -> ChannelResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability() {
        assert!(ChannelError::RateLimited("slow down".into()).is_recoverable());
        assert!(ChannelError::Rejected {
            status: 502,
            body: String::new()
        }
        .is_recoverable());
        assert!(!ChannelError::Rejected {
            status: 403,
            body: "Missing Access".into()
        }
        .is_recoverable());
        assert!(!ChannelError::Unresolvable("gone".into()).is_recoverable());
    }

    #[test]
    fn test_destination_display() {
        let destination = Destination {
            community_id: "1".into(),
            channel_id: "2".into(),
        };
        assert_eq!(destination.to_string(), "1/2");
    }
}
