//! Discord REST destination client
//!
//! Delivers rendered messages to guild text channels through the Discord
//! REST API (v10). A destination resolves only when the channel exists, the
//! bot can see it, and it belongs to the subscription's guild.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::{ChannelError, ChannelResult, Destination, DestinationClient};
use crate::notifications::RenderedMessage;

/// Discord client configuration
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    /// REST API base, e.g. `https://discord.com/api/v10`
    pub api_url: String,
    /// Bot token (sent as `Authorization: Bot <token>`)
    pub token: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

const DEFAULT_TIMEOUT_SECS: u64 = 10;

impl DiscordConfig {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            token: token.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.token.is_empty() {
            return Err("Discord token cannot be empty".to_string());
        }

        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err("Discord API URL must start with http:// or https://".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Channel object fields needed for resolution
#[derive(Debug, Deserialize)]
struct ChannelObject {
    id: String,
    #[serde(default)]
    guild_id: Option<String>,
}

/// Discord implementation of [`DestinationClient`]
///
/// # Payload Format
///
/// Messages without attachments are posted as JSON:
///
/// ```json
/// {
///   "content": "https://www.instagram.com/p/B8x/ <@&123>",
///   "embeds": [{ "title": "New Photo", "color": 16777215 }]
/// }
/// ```
///
/// With attachments the same object travels as the `payload_json` part of a
/// multipart form, followed by one `files[n]` part per attachment.
pub struct DiscordClient {
    config: DiscordConfig,
    client: Client,
}

impl DiscordClient {
    pub fn new(config: DiscordConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChannelError::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(
            reqwest::header::AUTHORIZATION,
            format!("Bot {}", self.config.token),
        )
    }

    /// Build the message body shared by the JSON and multipart forms
    fn build_payload(text: &str, message: &RenderedMessage) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "content": text,
            "embeds": [message.embed],
        });

        if !message.attachments.is_empty() {
            let attachments: Vec<_> = message
                .attachments
                .iter()
                .enumerate()
                .map(|(id, a)| serde_json::json!({ "id": id, "filename": a.filename }))
                .collect();
            payload["attachments"] = serde_json::Value::Array(attachments);
        }

        payload
    }

    fn build_form(payload: &serde_json::Value, message: &RenderedMessage) -> ChannelResult<Form> {
        let mut form = Form::new().part(
            "payload_json",
            Part::text(serde_json::to_string(payload)?).mime_str("application/json")?,
        );

        for (index, attachment) in message.attachments.iter().enumerate() {
            let part = Part::bytes(attachment.data.to_vec())
                .file_name(attachment.filename.clone())
                .mime_str(&attachment.content_type)?;
            form = form.part(format!("files[{index}]"), part);
        }

        Ok(form)
    }

    async fn rejection(response: Response) -> ChannelError {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());

        if status == StatusCode::TOO_MANY_REQUESTS {
            ChannelError::RateLimited(body)
        } else {
            ChannelError::Rejected {
                status: status.as_u16(),
                body,
            }
        }
    }
}

#[async_trait]
impl DestinationClient for DiscordClient {
    fn name(&self) -> &str {
        "discord"
    }

    async fn resolve_destination(
        &self,
        community_id: &str,
        channel_id: &str,
    ) -> ChannelResult<Option<Destination>> {
        let url = self.endpoint(&format!("/channels/{channel_id}"));
        let response = self.authorized(self.client.get(&url)).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => {
                tracing::debug!(channel = %channel_id, status = %response.status(), "Channel not accessible");
                return Ok(None);
            }
            status if !status.is_success() => return Err(Self::rejection(response).await),
            _ => {}
        }

        let channel: ChannelObject = serde_json::from_slice(&response.bytes().await?)?;
        if channel.guild_id.as_deref() != Some(community_id) {
            tracing::debug!(
                channel = %channel_id,
                guild = ?channel.guild_id,
                community = %community_id,
                "Channel belongs to another community"
            );
            return Ok(None);
        }

        Ok(Some(Destination {
            community_id: community_id.to_string(),
            channel_id: channel.id,
        }))
    }

    async fn deliver(
        &self,
        destination: &Destination,
        text: &str,
        message: &RenderedMessage,
    ) -> ChannelResult<()> {
        let url = self.endpoint(&format!("/channels/{}/messages", destination.channel_id));
        let payload = Self::build_payload(text, message);

        let request = self.authorized(self.client.post(&url));
        let request = if message.attachments.is_empty() {
            request.json(&payload)
        } else {
            request.multipart(Self::build_form(&payload, message)?)
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        tracing::debug!(destination = %destination, "Message delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{Attachment, Embed};
    use bytes::Bytes;

    fn message(attachments: Vec<Attachment>) -> RenderedMessage {
        RenderedMessage {
            text: "https://www.instagram.com/p/B8x/".to_string(),
            embed: Embed {
                title: Some("New Post".to_string()),
                ..Default::default()
            },
            attachments,
        }
    }

    #[test]
    fn test_discord_config_validation() {
        assert!(DiscordConfig::new("https://discord.com/api/v10", "t").validate().is_ok());
        assert!(DiscordConfig::new("https://discord.com/api/v10", "").validate().is_err());
        assert!(DiscordConfig::new("discord.com", "t").validate().is_err());
        assert!(DiscordConfig::new("https://discord.com/api/v10", "t")
            .with_timeout(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_client_creation() {
        let client = DiscordClient::new(DiscordConfig::new("https://discord.com/api/v10", "t"));
        assert!(client.is_ok());
        assert_eq!(client.unwrap().name(), "discord");

        assert!(DiscordClient::new(DiscordConfig::new("not-a-url", "t")).is_err());
    }

    #[test]
    fn test_payload_without_attachments() {
        let payload = DiscordClient::build_payload("hello <@&9>", &message(Vec::new()));
        assert_eq!(payload["content"], "hello <@&9>");
        assert_eq!(payload["embeds"][0]["title"], "New Post");
        assert!(payload.get("attachments").is_none());
    }

    #[test]
    fn test_payload_lists_attachments() {
        let attachment = Attachment {
            filename: "B8x-media-collage.png".to_string(),
            content_type: "image/png".to_string(),
            data: Bytes::from_static(b"png"),
        };
        let payload = DiscordClient::build_payload("hello", &message(vec![attachment]));
        assert_eq!(payload["attachments"][0]["id"], 0);
        assert_eq!(payload["attachments"][0]["filename"], "B8x-media-collage.png");
    }
}
