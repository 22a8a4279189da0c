//! `PageFetcher` over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use dtc_report_core::contract::{FetchError, PageFetcher};
use reqwest::Client;

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        tracing::debug!(url, "Fetching page");
        let response = self.client.get(url).send().await.map_err(|e| {
            tracing::error!(url, error = %e, "Page request failed");
            FetchError::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url, status = status.as_u16(), "Page returned non-success status");
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        tracing::info!(url, bytes = body.len(), "Fetched page");
        Ok(body)
    }
}
