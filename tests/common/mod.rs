//! Common test utilities

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use feedrelay::config::{InstagramConfig, VliveConfig};
use feedrelay::crawler::PlatformClient;
use feedrelay::models::{Platform, Subscription, SubscriptionOptions};
use feedrelay::notifications::{ChannelResult, Destination, DestinationClient, RenderedMessage};

/// Platform client without meaningful rate limiting
pub fn test_client() -> Arc<PlatformClient> {
    Arc::new(PlatformClient::new(1000, Duration::from_secs(5), Some("feedrelay-test")).unwrap())
}

/// Instagram config pointing at a mock server
pub fn instagram_config(base_url: &str) -> InstagramConfig {
    InstagramConfig {
        graphql_url: format!("{base_url}/graphql"),
        web_url: base_url.to_string(),
        username: Some("relay".to_string()),
        password: Some("hunter2".to_string()),
        ..Default::default()
    }
}

/// VLIVE config pointing at a mock server
pub fn vlive_config(base_url: &str) -> VliveConfig {
    VliveConfig {
        api_url: base_url.to_string(),
        ..Default::default()
    }
}

pub fn subscription(platform: Platform, source_id: &str, channel_id: &str) -> Subscription {
    Subscription {
        platform,
        source_id: source_id.to_string(),
        community_id: "guild-1".to_string(),
        channel_id: channel_id.to_string(),
        mention_role_id: None,
        options: SubscriptionOptions::default(),
    }
}

/// One timeline node of type GraphImage
pub fn timeline_image(id: &str, shortcode: &str, taken_at: i64, caption: &str) -> Value {
    json!({ "node": {
        "__typename": "GraphImage",
        "id": id,
        "shortcode": shortcode,
        "taken_at_timestamp": taken_at,
        "display_url": format!("https://cdn.example/{id}.jpg"),
        "owner": { "id": "1234", "username": "loonatheworld" },
        "edge_media_to_caption": { "edges": [ { "node": { "text": caption } } ] }
    }})
}

pub fn timeline_body(edges: Vec<Value>) -> Value {
    json!({ "data": { "user": { "edge_owner_to_timeline_media": { "edges": edges } } } })
}

/// One `videoList` entry
pub fn vlive_video(seq: u64, video_type: &str, on_air: &str, channel_name: &str) -> Value {
    json!({
        "videoSeq": seq,
        "videoType": video_type,
        "onAirStartAt": on_air,
        "title": format!("Video {seq}"),
        "thumbnail": format!("https://cdn.example/t{seq}.jpg"),
        "representChannelName": channel_name,
    })
}

pub fn vlive_body(videos: Vec<Value>) -> Value {
    json!({ "result": {
        "channelInfo": {
            "channelCode": "E1F3A7",
            "channelProfileImage": "https://cdn.example/channel.png",
            "backgroundColor": "#ff8ac8"
        },
        "videoList": videos
    }})
}

/// Destination client recording every delivery in memory
///
/// Channels listed in `missing` never resolve.
#[derive(Default)]
pub struct RecordingClient {
    pub missing: Vec<String>,
    pub deliveries: Mutex<Vec<(String, String, RenderedMessage)>>,
}

impl RecordingClient {
    pub fn with_missing(channels: &[&str]) -> Self {
        Self {
            missing: channels.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    /// (channel, text) pairs, sorted by channel
    pub fn delivered(&self) -> Vec<(String, String)> {
        let mut delivered: Vec<_> = self
            .deliveries
            .lock()
            .unwrap()
            .iter()
            .map(|(channel, text, _)| (channel.clone(), text.clone()))
            .collect();
        delivered.sort();
        delivered
    }
}

#[async_trait]
impl DestinationClient for RecordingClient {
    fn name(&self) -> &str {
        "recording"
    }

    async fn resolve_destination(
        &self,
        community_id: &str,
        channel_id: &str,
    ) -> ChannelResult<Option<Destination>> {
        if self.missing.iter().any(|c| c == channel_id) {
            return Ok(None);
        }
        Ok(Some(Destination {
            community_id: community_id.to_string(),
            channel_id: channel_id.to_string(),
        }))
    }

    async fn deliver(
        &self,
        destination: &Destination,
        text: &str,
        message: &RenderedMessage,
    ) -> ChannelResult<()> {
        self.deliveries.lock().unwrap().push((
            destination.channel_id.clone(),
            text.to_string(),
            message.clone(),
        ));
        Ok(())
    }
}
