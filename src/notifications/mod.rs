//! Notification rendering and delivery
//!
//! This module turns new content items into destination-agnostic messages
//! and fans them out to every subscription of the item's source.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────────────┐     ┌──────────────┐
//! │ ContentItem  │────▶│ NotificationBuilder │────▶│  Dispatcher  │
//! └──────────────┘     │  caption, fields,   │     │  filters,    │
//!                      │  collage, styles    │     │  mentions    │
//!                      └─────────────────────┘     └──────┬───────┘
//!                                                         │ join_all
//!                                    ┌────────────────────┼────────────────┐
//!                                    ▼                    ▼                ▼
//!                              ┌───────────┐        ┌───────────┐    ┌───────────┐
//!                              │ channel 1 │        │ channel 2 │    │ channel 3 │
//!                              └───────────┘        └───────────┘    └───────────┘
//! ```
//!
//! Rendering happens once per item; every subscription receives the same
//! message with only its mention appended.

pub mod builder;
pub mod channels;
pub mod compositor;
pub mod dispatcher;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

// Re-exports
pub use builder::{MessageKind, NotificationBuilder, Style};
pub use channels::discord::DiscordClient;
pub use channels::{ChannelError, ChannelResult, Destination, DestinationClient};
pub use compositor::{CompositeError, HttpCompositor, ImageCompositor};
pub use dispatcher::{DispatchReport, Dispatcher};

/// Embed author line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// Rich embed, serialized in Discord's embed shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// File uploaded alongside a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Destination-agnostic notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Plain message text (the item's canonical URL)
    pub text: String,
    pub embed: Embed,
    pub attachments: Vec<Attachment>,
}

impl RenderedMessage {
    /// Text for one subscription, with its role mention appended
    pub fn text_with_mention(&self, mention_role_id: Option<&str>) -> String {
        match mention_role_id {
            Some(role) if !role.is_empty() => format!("{} <@&{role}>", self.text),
            _ => self.text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_with_mention() {
        let message = RenderedMessage {
            text: "https://www.vlive.tv/video/1/".to_string(),
            embed: Embed::default(),
            attachments: Vec::new(),
        };
        assert_eq!(
            message.text_with_mention(Some("42")),
            "https://www.vlive.tv/video/1/ <@&42>"
        );
        assert_eq!(message.text_with_mention(None), message.text);
        assert_eq!(message.text_with_mention(Some("")), message.text);
    }

    #[test]
    fn test_embed_serialization_skips_empty() {
        let embed = Embed {
            title: Some("New Photo".to_string()),
            color: Some(0xffffff),
            ..Default::default()
        };
        let json = serde_json::to_value(&embed).unwrap();
        assert_eq!(json["title"], "New Photo");
        assert_eq!(json["color"], 0xffffff);
        assert!(json.get("fields").is_none());
        assert!(json.get("author").is_none());
    }
}
