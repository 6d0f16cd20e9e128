use crate::types::{FetchConfig, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Boundary to whatever retrieves a feed document. The refresh orchestrator
/// and URL validation only depend on this trait; tests substitute stubs.
#[async_trait]
pub trait FetchDocument: Send + Sync {
    /// Fetch the raw document at `url`, bounded by the fetcher's configured
    /// timeout. Fails with a descriptive error, never hangs past the bound.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Self {
        let redirect_policy = if config.follow_redirects {
            reqwest::redirect::Policy::limited(config.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(redirect_policy)
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(FetchConfig::default())
    }
}

#[async_trait]
impl FetchDocument for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching feed document: {}", url);

        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.bytes().await?;

        info!("Fetched feed document: {} ({} bytes)", url, body.len());
        Ok(body.to_vec())
    }
}
