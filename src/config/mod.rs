//! Configuration management for feedrelay
//!
//! This module handles loading and validating configuration from environment variables,
//! TOML files, and command-line arguments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Subscription;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shared HTTP client configuration
    pub http: HttpConfig,

    /// Instagram polling configuration
    pub instagram: InstagramConfig,

    /// VLIVE polling configuration
    pub vlive: VliveConfig,

    /// Expired story record cleanup
    pub cleanup: CleanupConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Notification rendering and delivery
    pub notifications: NotificationsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Subscriptions upserted into the store at startup
    pub subscriptions: Vec<Subscription>,
}

/// HTTP client configuration shared by every platform fetcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Rate limit per platform (requests per second)
    pub requests_per_second: u32,

    /// Fixed user agent; a browser user agent is rotated when unset
    pub user_agent: Option<String>,
}

/// Instagram configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstagramConfig {
    pub enabled: bool,

    /// GraphQL base URL (the `/query/` endpoint is appended)
    pub graphql_url: String,

    /// Web base URL used for login and profile lookups
    pub web_url: String,

    /// Query hash for the owner timeline
    pub timeline_hash: String,

    /// Query hash for the story reel
    pub stories_hash: String,

    /// Number of timeline posts requested per poll
    pub page_size: u32,

    pub username: Option<String>,
    pub password: Option<String>,

    pub poll_interval_secs: u64,

    /// Minimum wait per polled source between cycles
    pub per_source_delay_ms: u64,

    /// Login attempts per fetch before the source is abandoned
    pub max_login_attempts: u32,
}

/// VLIVE configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VliveConfig {
    pub enabled: bool,

    /// Base URL of the channel video list API
    pub api_url: String,

    pub app_id: String,

    /// Number of videos requested per poll
    pub page_size: u32,

    pub poll_interval_secs: u64,

    pub per_source_delay_ms: u64,

    /// Request timeout in seconds (shorter than the shared default)
    pub request_timeout_secs: u64,
}

/// Cleanup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub interval_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Public base URL serving cached sidecar media (`/insta/img/<id>`)
    pub media_base_url: String,

    /// Collage rendering endpoint; compositing is disabled when unset
    pub collage_url: Option<String>,

    /// Discord REST API base URL
    pub discord_api_url: String,

    /// Discord bot token
    pub discord_token: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            requests_per_second: 5,
            user_agent: None,
        }
    }
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            graphql_url: String::from("https://www.instagram.com/graphql"),
            web_url: String::from("https://www.instagram.com"),
            timeline_hash: String::from("e769aa130647d2354c40ea6a439bfc08"),
            stories_hash: String::from("de8017ee0a7c9c45ec4260733d81ea31"),
            page_size: 20,
            username: None,
            password: None,
            poll_interval_secs: 60,
            per_source_delay_ms: 4000,
            max_login_attempts: 3,
        }
    }
}

impl Default for VliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: String::from("http://api.vfan.vlive.tv/vproxy/channelplus"),
            app_id: String::from("8c6cc7b45d2568fb668be6e05b6e5a3b"),
            page_size: 10,
            poll_interval_secs: 30,
            per_source_delay_ms: 0,
            request_timeout_secs: 5,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/feedrelay.db"),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            media_base_url: String::from("http://localhost:8080"),
            collage_url: None,
            discord_api_url: String::from("https://discord.com/api/v10"),
            discord_token: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_var(name).and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Overlay `FEEDRELAY_*` environment variables
    ///
    /// Secrets are normally supplied this way rather than written to the
    /// config file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("FEEDRELAY_REQUEST_TIMEOUT") {
            self.http.request_timeout_secs = v;
        }
        if let Some(v) = env_parse("FEEDRELAY_REQUESTS_PER_SECOND") {
            self.http.requests_per_second = v;
        }
        if let Some(v) = env_var("FEEDRELAY_USER_AGENT") {
            self.http.user_agent = Some(v);
        }

        if let Some(v) = env_parse("FEEDRELAY_INSTAGRAM_ENABLED") {
            self.instagram.enabled = v;
        }
        if let Some(v) = env_var("FEEDRELAY_INSTAGRAM_USERNAME") {
            self.instagram.username = Some(v);
        }
        if let Some(v) = env_var("FEEDRELAY_INSTAGRAM_PASSWORD") {
            self.instagram.password = Some(v);
        }
        if let Some(v) = env_var("FEEDRELAY_INSTAGRAM_TIMELINE_HASH") {
            self.instagram.timeline_hash = v;
        }
        if let Some(v) = env_var("FEEDRELAY_INSTAGRAM_STORIES_HASH") {
            self.instagram.stories_hash = v;
        }

        if let Some(v) = env_parse("FEEDRELAY_VLIVE_ENABLED") {
            self.vlive.enabled = v;
        }
        if let Some(v) = env_var("FEEDRELAY_VLIVE_APP_ID") {
            self.vlive.app_id = v;
        }

        if let Some(v) = env_var("FEEDRELAY_SQLITE_PATH") {
            self.database.sqlite_path = PathBuf::from(v);
        }

        if let Some(v) = env_var("FEEDRELAY_MEDIA_BASE_URL") {
            self.notifications.media_base_url = v;
        }
        if let Some(v) = env_var("FEEDRELAY_COLLAGE_URL") {
            self.notifications.collage_url = Some(v);
        }
        if let Some(v) = env_var("FEEDRELAY_DISCORD_TOKEN").or_else(|| env_var("DISCORD_TOKEN")) {
            self.notifications.discord_token = Some(v);
        }

        if let Some(v) = env_var("FEEDRELAY_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env_var("FEEDRELAY_LOG_FORMAT") {
            self.logging.format = v;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.http.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        if self.http.requests_per_second == 0 {
            anyhow::bail!("requests_per_second must be greater than 0");
        }

        if self.instagram.enabled {
            if self.instagram.poll_interval_secs == 0 {
                anyhow::bail!("instagram.poll_interval_secs must be greater than 0");
            }
            if self.instagram.max_login_attempts == 0 {
                anyhow::bail!("instagram.max_login_attempts must be greater than 0");
            }
            if self.instagram.username.is_none() || self.instagram.password.is_none() {
                anyhow::bail!("instagram.username and instagram.password are required when Instagram is enabled");
            }
            check_http_url("instagram.graphql_url", &self.instagram.graphql_url)?;
            check_http_url("instagram.web_url", &self.instagram.web_url)?;
        }

        if self.vlive.enabled {
            if self.vlive.poll_interval_secs == 0 {
                anyhow::bail!("vlive.poll_interval_secs must be greater than 0");
            }
            if self.vlive.request_timeout_secs == 0 {
                anyhow::bail!("vlive.request_timeout_secs must be greater than 0");
            }
            check_http_url("vlive.api_url", &self.vlive.api_url)?;
        }

        if self.cleanup.interval_secs == 0 {
            anyhow::bail!("cleanup.interval_secs must be greater than 0");
        }

        check_http_url("notifications.media_base_url", &self.notifications.media_base_url)?;
        check_http_url("notifications.discord_api_url", &self.notifications.discord_api_url)?;
        if let Some(collage_url) = &self.notifications.collage_url {
            check_http_url("notifications.collage_url", collage_url)?;
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.request_timeout_secs)
    }
}

fn check_http_url(field: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value).with_context(|| format!("{field} is not a valid URL"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("{field} must be an http(s) URL");
    }
    Ok(())
}
