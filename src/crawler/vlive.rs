//! VLIVE channel video list fetcher

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::HeaderMap;
use serde_json::Value;

use super::fetcher::PlatformClient;
use super::{FeedKind, SourceFetcher};
use crate::config::VliveConfig;
use crate::models::{ChannelInfo, ContentItem, ItemPayload, Platform, Source, VideoPayload, VideoType};
use crate::utils::error::FetchError;
use crate::utils::{parse_hex_color, parse_kst_datetime};

const FEEDS: &[FeedKind] = &[FeedKind::Videos];

/// VLIVE implementation of [`SourceFetcher`]
///
/// The video list API is public, so no session is involved.
pub struct VliveFetcher {
    client: Arc<PlatformClient>,
    api_url: String,
    app_id: String,
    page_size: u32,
}

impl VliveFetcher {
    pub fn new(client: Arc<PlatformClient>, config: &VliveConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            page_size: config.page_size,
        }
    }
}

#[async_trait]
impl SourceFetcher for VliveFetcher {
    fn platform(&self) -> Platform {
        Platform::Vlive
    }

    fn feeds(&self) -> &'static [FeedKind] {
        FEEDS
    }

    async fn fetch(&self, source: &Source, feed: FeedKind) -> Result<Vec<ContentItem>, FetchError> {
        if feed != FeedKind::Videos {
            return Ok(Vec::new());
        }

        let url = format!("{}/getChannelVideoList", self.api_url);
        let params = [
            ("app_id", self.app_id.clone()),
            ("channelSeq", source.source_id.clone()),
            ("maxNumOfRows", self.page_size.to_string()),
            ("pageNo", "1".to_string()),
        ];
        let body = self.client.get_json(&url, &params, HeaderMap::new()).await?;
        parse_video_list(source, &body)
    }
}

/// Parse a `getChannelVideoList` response
pub fn parse_video_list(source: &Source, body: &Value) -> Result<Vec<ContentItem>, FetchError> {
    let result = body
        .get("result")
        .filter(|r| !r.is_null())
        .ok_or_else(|| FetchError::Malformed("missing result".into()))?;

    let info = result
        .get("channelInfo")
        .ok_or_else(|| FetchError::Malformed("missing result.channelInfo".into()))?;
    let channel = ChannelInfo {
        channel_code: info
            .get("channelCode")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        profile_image: info
            .get("channelProfileImage")
            .and_then(Value::as_str)
            .map(String::from),
        color: info
            .get("backgroundColor")
            .and_then(Value::as_str)
            .and_then(parse_hex_color),
    };

    let videos = result
        .get("videoList")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Malformed("missing result.videoList".into()))?;

    Ok(videos
        .iter()
        .filter_map(|video| parse_video(source, &channel, video))
        .collect())
}

fn parse_video(source: &Source, channel: &ChannelInfo, video: &Value) -> Option<ContentItem> {
    let video_seq = match video.get("videoSeq")? {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return None,
    };

    let published_at = video
        .get("onAirStartAt")
        .and_then(Value::as_str)
        .and_then(parse_kst_datetime)
        .unwrap_or_else(|| {
            tracing::debug!(source = %source, video = %video_seq, "Unparseable onAirStartAt");
            Utc::now()
        });

    let text = |key: &str| video.get(key).and_then(Value::as_str);

    Some(ContentItem {
        item_id: video_seq.clone(),
        source: source.clone(),
        published_at,
        payload: ItemPayload::Video(VideoPayload {
            video_seq,
            title: text("title").unwrap_or_default().to_string(),
            thumbnail: text("thumbnail").map(String::from),
            channel_name: text("representChannelName").unwrap_or_default().to_string(),
            video_type: VideoType::parse(text("videoType").unwrap_or_default()),
            channel: channel.clone(),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> Source {
        Source::new(Platform::Vlive, "13")
    }

    #[test]
    fn test_parse_video_list() {
        let body = json!({ "result": {
            "channelInfo": {
                "channelCode": "E1F3A7", "channelProfileImage": "https://cdn/ch.png",
                "backgroundColor": "#ff8ac8"
            },
            "videoList": [
                { "videoSeq": 200, "videoType": "LIVE", "onAirStartAt": "2020-03-01 21:00:00",
                  "title": "Live!", "thumbnail": "https://cdn/t200.jpg", "representChannelName": "LOONA" },
                { "videoSeq": 199, "videoType": "PLAYLIST", "onAirStartAt": "2020-02-29 10:00:00",
                  "title": "List", "thumbnail": "https://cdn/t199.jpg", "representChannelName": "LOONA" },
                { "title": "no seq" }
            ]
        }});

        let items = parse_video_list(&source(), &body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].item_id, "200");
        assert_eq!(items[0].published_at.to_rfc3339(), "2020-03-01T12:00:00+00:00");

        let ItemPayload::Video(live) = &items[0].payload else {
            panic!("expected video");
        };
        assert_eq!(live.video_type, VideoType::Live);
        assert_eq!(live.channel.color, Some(0xff8ac8));
        assert_eq!(live.channel.channel_code, "E1F3A7");

        assert!(!items[1].is_notifiable());
    }

    #[test]
    fn test_missing_result_is_malformed() {
        assert!(matches!(
            parse_video_list(&source(), &json!({ "result": null })),
            Err(FetchError::Malformed(_))
        ));
        assert!(matches!(
            parse_video_list(&source(), &json!({ "result": { "channelInfo": {} } })),
            Err(FetchError::Malformed(_))
        ));
    }
}
