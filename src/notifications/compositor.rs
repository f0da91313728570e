//! Collage rendering for multi-image posts

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Errors returned by an [`ImageCompositor`]
#[derive(Debug, thiserror::Error)]
pub enum CompositeError {
    #[error("Compositing unavailable: {0}")]
    Unavailable(String),

    #[error("Compositor request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Compositor returned status {0}")]
    Status(u16),
}

/// Lays image tiles out on a canvas and returns the encoded PNG
#[async_trait]
pub trait ImageCompositor: Send + Sync {
    async fn composite(
        &self,
        image_urls: &[String],
        canvas_width: u32,
        canvas_height: u32,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<Bytes, CompositeError>;
}

#[derive(Debug, Serialize)]
struct CompositeRequest<'a> {
    images: &'a [String],
    canvas_width: u32,
    canvas_height: u32,
    tile_width: u32,
    tile_height: u32,
}

/// Compositor backed by an external rendering endpoint
///
/// Without an endpoint every call fails with [`CompositeError::Unavailable`].
pub struct HttpCompositor {
    client: Client,
    endpoint: Option<String>,
}

impl HttpCompositor {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<Self, CompositeError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    /// Compositor that never renders
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            endpoint: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }
}

#[async_trait]
impl ImageCompositor for HttpCompositor {
    async fn composite(
        &self,
        image_urls: &[String],
        canvas_width: u32,
        canvas_height: u32,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<Bytes, CompositeError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| CompositeError::Unavailable("no collage endpoint configured".into()))?;

        let request = CompositeRequest {
            images: image_urls,
            canvas_width,
            canvas_height,
            tile_width,
            tile_height,
        };

        let response = self.client.post(endpoint).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(CompositeError::Status(response.status().as_u16()));
        }

        Ok(response.bytes().await?)
    }
}
