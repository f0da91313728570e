//! Rate-limited JSON HTTP client shared by the platform fetchers
//!
//! This module provides the transport used by every platform fetcher,
//! with features including:
//! - User-Agent rotation
//! - Rate limiting with governor
//! - Fixed per-request timeout
//! - Classification of non-success statuses into [`FetchError`]

use crate::utils::error::FetchError;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::seq::SliceRandom;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT},
    Client, Response,
};
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;

/// Pool of realistic User-Agent strings for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// HTTP client for one platform
///
/// Each platform gets its own instance so one platform's rate limit never
/// delays another's requests.
pub struct PlatformClient {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Fixed user agent overriding rotation
    user_agent: Option<HeaderValue>,
}

impl PlatformClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Transport` if the HTTP client cannot be created
    pub fn new(
        requests_per_second: u32,
        timeout: Duration,
        user_agent: Option<&str>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).gzip(true).build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
            user_agent: user_agent.and_then(|ua| HeaderValue::from_str(ua).ok()),
        })
    }

    /// Underlying reqwest client, for exchanges that need raw responses
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Wait for the rate limiter
    pub async fn ready(&self) {
        self.rate_limiter.until_ready().await;
    }

    /// GET a JSON document
    ///
    /// `extra` headers are layered over the browser defaults.
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        extra: HeaderMap,
    ) -> Result<Value, FetchError> {
        self.ready().await;

        let mut headers = self.build_headers(None);
        headers.extend(extra);

        tracing::debug!(url = %url, "Fetching JSON");

        let response = self
            .client
            .get(url)
            .query(query)
            .headers(headers)
            .send()
            .await?;

        Self::decode_json(response).await
    }

    /// Classify the status and decode the body of a JSON response
    pub async fn decode_json(response: Response) -> Result<Value, FetchError> {
        if let Some(err) = FetchError::from_status(response.status()) {
            return Err(err);
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::Malformed(format!("undecodable body: {e}")))
    }

    /// Build browser-like request headers
    pub fn build_headers(&self, referer: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let user_agent = self
            .user_agent
            .clone()
            .unwrap_or_else(|| HeaderValue::from_static(self.random_user_agent()));
        headers.insert(USER_AGENT, user_agent);

        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9,ko-KR;q=0.8"),
        );

        if let Some(referer_value) = referer.and_then(|r| HeaderValue::from_str(r).ok()) {
            headers.insert(REFERER, referer_value);
        }

        headers
    }

    /// Get a random user agent from the pool
    fn random_user_agent(&self) -> &'static str {
        let mut rng = rand::thread_rng();
        USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0])
    }
}
