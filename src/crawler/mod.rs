//! Platform fetchers
//!
//! This module implements per-source feed retrieval for the supported
//! platforms with rate limiting, user-agent rotation and failure
//! classification. Each platform provides one [`SourceFetcher`].

pub mod auth;
pub mod fetcher;
pub mod instagram;
pub mod pipeline;
pub mod vlive;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{ContentItem, OwnerProfile, Platform, Source};
use crate::utils::error::FetchError;

pub use auth::{AuthSession, Authenticator, SessionState};
pub use fetcher::PlatformClient;
pub use instagram::{InstagramFetcher, InstagramLogin};
pub use pipeline::PollCycle;
pub use vlive::VliveFetcher;

/// One endpoint of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    /// Most recent posts
    Timeline,
    /// Currently live stories
    Stories,
    /// Most recent videos
    Videos,
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeline => "timeline",
            Self::Stories => "stories",
            Self::Videos => "videos",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fetches the current items of one platform's sources
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    fn platform(&self) -> Platform;

    /// Feeds polled for every source of this platform
    fn feeds(&self) -> &'static [FeedKind];

    /// Current items of one feed, in whatever order the platform returns them
    async fn fetch(&self, source: &Source, feed: FeedKind) -> Result<Vec<ContentItem>, FetchError>;

    /// Profile of the account that published `item`, when the platform has one
    async fn owner_profile(
        &self,
        _source: &Source,
        _item: &ContentItem,
    ) -> Result<Option<OwnerProfile>, FetchError> {
        Ok(None)
    }
}

/// Thread-safe shared fetcher
pub type SharedFetcher = Arc<dyn SourceFetcher>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_kind_labels() {
        assert_eq!(FeedKind::Timeline.to_string(), "timeline");
        assert_eq!(FeedKind::Stories.as_str(), "stories");
        assert_eq!(FeedKind::Videos.as_str(), "videos");
    }
}
