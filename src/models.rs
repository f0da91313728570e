// Core data structures for feedrelay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Content platform a source lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Vlive,
}

impl Platform {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instagram => "instagram",
            Self::Vlive => "vlive",
        }
    }

    /// All supported platforms
    pub fn all() -> &'static [Platform] {
        &[Self::Instagram, Self::Vlive]
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "instagram" => Ok(Self::Instagram),
            "vlive" => Ok(Self::Vlive),
            other => Err(format!("Unknown platform: {other}")),
        }
    }
}

/// A feed-producing account on one platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Source {
    pub platform: Platform,
    pub source_id: String, // Instagram user id, VLIVE channelSeq
}

impl Source {
    pub fn new(platform: Platform, source_id: impl Into<String>) -> Self {
        Self {
            platform,
            source_id: source_id.into(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.source_id)
    }
}

/// Per-subscription delivery options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    /// Deliver story notifications
    #[serde(default)]
    pub stories: bool,
    /// Deliver items from the platform's sub-brand channel (VLIVE "V PICK!")
    #[serde(default)]
    pub sub_brand: bool,
}

/// One notification rule: a source routed to a destination channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub platform: Platform,
    pub source_id: String,
    pub community_id: String,
    pub channel_id: String,
    #[serde(default)]
    pub mention_role_id: Option<String>,
    #[serde(default)]
    pub options: SubscriptionOptions,
}

impl Subscription {
    /// The source this subscription targets
    pub fn source(&self) -> Source {
        Source::new(self.platform, self.source_id.clone())
    }
}

/// Dedup ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRecord {
    pub source: Source,
    pub item_id: String,
    pub first_seen_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SeenRecord {
    /// Whether cleanup may purge this record at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

/// Coarse item kind used for subscription filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Post,
    Story,
    Video,
}

/// Kind of a single media object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(format!("Unknown media kind: {other}")),
        }
    }
}

/// One child of a multi-media post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarChild {
    pub id: String,
    pub kind: MediaKind,
    pub display_url: String,
    pub video_url: Option<String>,
}

/// Media attached to a post
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostMedia {
    Image { display_url: String },
    Video { display_url: String, video_url: String },
    Sidecar { children: Vec<SidecarChild> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostPayload {
    pub shortcode: String,
    pub owner_username: String,
    pub caption: Option<String>,
    pub media: PostMedia,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryPayload {
    pub owner_username: String,
    pub display_url: String,
    pub expires_at: Option<DateTime<Utc>>,
    /// Highest-quality video resource, for video stories
    pub video_url: Option<String>,
}

/// VLIVE video type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoType {
    Vod,
    Live,
    /// Playlists and anything else the platform lists
    Other(String),
}

impl VideoType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "VOD" => Self::Vod,
            "LIVE" => Self::Live,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Channel metadata returned alongside a video list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelInfo {
    pub channel_code: String,
    pub profile_image: Option<String>,
    pub color: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPayload {
    pub video_seq: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub channel_name: String,
    pub video_type: VideoType,
    pub channel: ChannelInfo,
}

/// Kind-specific item data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemPayload {
    Post(PostPayload),
    Story(StoryPayload),
    Video(VideoPayload),
}

/// An item fetched from a source during one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub item_id: String,
    pub source: Source,
    pub published_at: DateTime<Utc>,
    pub payload: ItemPayload,
}

impl ContentItem {
    pub fn kind(&self) -> ItemKind {
        match self.payload {
            ItemPayload::Post(_) => ItemKind::Post,
            ItemPayload::Story(_) => ItemKind::Story,
            ItemPayload::Video(_) => ItemKind::Video,
        }
    }

    /// Expiry carried into the seen record (ephemeral stories)
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match &self.payload {
            ItemPayload::Story(story) => story.expires_at,
            _ => None,
        }
    }

    /// Sub-brand channel name, if the item was published under one
    pub fn sub_brand(&self) -> Option<&str> {
        match &self.payload {
            ItemPayload::Video(video) if video.channel_name == crate::VLIVE_SUB_BRAND => {
                Some(video.channel_name.as_str())
            }
            _ => None,
        }
    }

    /// Whether subscribers are notified about this item at all
    ///
    /// VLIVE playlists are recorded as seen but never announced.
    pub fn is_notifiable(&self) -> bool {
        !matches!(
            &self.payload,
            ItemPayload::Video(VideoPayload {
                video_type: VideoType::Other(_),
                ..
            })
        )
    }

    /// Handle of the account that published the item, when known
    pub fn owner_username(&self) -> Option<&str> {
        match &self.payload {
            ItemPayload::Post(post) => Some(&post.owner_username),
            ItemPayload::Story(story) => Some(&story.owner_username),
            ItemPayload::Video(_) => None,
        }
    }
}

/// Profile data for a source's owner, looked up once per cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerProfile {
    pub username: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
}

/// Media link target cached for sidecar children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporaryMedia {
    pub media_id: String,
    pub kind: MediaKind,
    pub url: String,
    pub cached_at: DateTime<Utc>,
}

/// Session credentials for an authenticated platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub cookie: String,
    /// Which login produced these credentials (process-local)
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn video(video_type: VideoType, channel_name: &str) -> ContentItem {
        ContentItem {
            item_id: "100".to_string(),
            source: Source::new(Platform::Vlive, "13"),
            published_at: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
            payload: ItemPayload::Video(VideoPayload {
                video_seq: "100".to_string(),
                title: "Title".to_string(),
                thumbnail: None,
                channel_name: channel_name.to_string(),
                video_type,
                channel: ChannelInfo::default(),
            }),
        }
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!("Instagram".parse::<Platform>().unwrap(), Platform::Instagram);
        assert_eq!("vlive".parse::<Platform>().unwrap(), Platform::Vlive);
        assert!("twitter".parse::<Platform>().is_err());
    }

    #[test]
    fn test_playlists_are_not_notifiable() {
        assert!(video(VideoType::Vod, "Channel").is_notifiable());
        assert!(video(VideoType::Live, "Channel").is_notifiable());
        assert!(!video(VideoType::parse("PLAYLIST"), "Channel").is_notifiable());
    }

    #[test]
    fn test_sub_brand_detection() {
        assert_eq!(
            video(VideoType::Vod, crate::VLIVE_SUB_BRAND).sub_brand(),
            Some(crate::VLIVE_SUB_BRAND)
        );
        assert_eq!(video(VideoType::Vod, "Channel").sub_brand(), None);
    }

    #[test]
    fn test_seen_record_expiry() {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let mut record = SeenRecord {
            source: Source::new(Platform::Instagram, "1"),
            item_id: "a".to_string(),
            first_seen_at: now,
            expires_at: None,
        };
        assert!(!record.is_expired(now));

        record.expires_at = Some(Utc.timestamp_opt(999, 0).unwrap());
        assert!(record.is_expired(now));

        record.expires_at = Some(now);
        assert!(!record.is_expired(now));
    }
}
