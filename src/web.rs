//! HTTP access for plugin lookups.
//!
//! - `get`: fetch a plugin page or registry response as text
//! - `status`: probe a URL and report the response status

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::plugins::PluginError;

/// Fetches remote documents
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fetch `url` and return its body. Non-success statuses are errors.
    async fn get(&self, url: &str) -> Result<String, PluginError>;

    /// Fetch `url` and return only the response status code
    async fn status(&self, url: &str) -> Result<u16, PluginError>;
}

/// [`DocumentFetcher`] backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, PluginError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tpm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PluginError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<String, PluginError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PluginError::Transport(format!("Failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PluginError::Transport(format!(
                "HTTP error: {} - {}",
                status, url
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PluginError::Transport(format!("Failed to read response: {}", e)))?;
        debug!(url = %url, bytes = body.len(), "Fetched document");
        Ok(body)
    }

    async fn status(&self, url: &str) -> Result<u16, PluginError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PluginError::Transport(format!("Failed to fetch {}: {}", url, e)))?;
        Ok(response.status().as_u16())
    }
}
