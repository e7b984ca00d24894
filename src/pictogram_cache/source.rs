//! Remote pictogram repositories

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::PictogramId;
use crate::config::CacheConfig;
use crate::errors::{AppError, AppResult, FetchError, FetchResult};

/// Where pictogram images come from when they are not cached locally
#[async_trait]
pub trait PictogramSource: Send + Sync {
    /// Download the raw image bytes for `id`
    async fn fetch(&self, id: PictogramId) -> FetchResult<Bytes>;

    /// Human-readable origin recorded in the cache metadata
    fn locate(&self, id: PictogramId) -> String;
}

/// HTTP source laid out as `{base}/{id}/{id}_{size}.png`
pub struct HttpPictogramSource {
    client: Client,
    base_url: String,
    image_size: u32,
}

impl HttpPictogramSource {
    pub fn new(
        base_url: impl Into<String>,
        image_size: u32,
        user_agent: &str,
        timeout: Duration,
    ) -> AppResult<Self> {
        let base_url = base_url.into();
        let parsed = Url::parse(&base_url).map_err(|e| {
            AppError::configuration(format!("Invalid pictogram base URL '{base_url}': {e}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::configuration(format!(
                "Pictogram base URL '{base_url}' must use http or https"
            )));
        }

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            image_size,
        })
    }

    pub fn from_config(config: &CacheConfig) -> AppResult<Self> {
        Self::new(
            config.remote_base_url.clone(),
            config.image_size,
            &config.user_agent,
            config.request_timeout,
        )
    }

    pub fn url_for(&self, id: PictogramId) -> String {
        format!("{}/{id}/{id}_{}.png", self.base_url, self.image_size)
    }
}

#[async_trait]
impl PictogramSource for HttpPictogramSource {
    async fn fetch(&self, id: PictogramId) -> FetchResult<Bytes> {
        let url = self.url_for(id);
        debug!("Fetching pictogram {} from {}", id, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::network(id, e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(FetchError::NotFound { id }),
            status if !status.is_success() => {
                return Err(FetchError::network(
                    id,
                    format!(
                        "HTTP {} {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown")
                    ),
                ));
            }
            _ => {}
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::network(id, format!("Failed to read response: {e}")))?;

        if image::guess_format(&bytes).is_err() {
            return Err(FetchError::InvalidImage { id });
        }
        Ok(bytes)
    }

    fn locate(&self, id: PictogramId) -> String {
        self.url_for(id)
    }
}
