use std::time::Duration;

use reqwest::Client;
use sealane_core::error::AppError;
use sealane_core::traits::Fetcher;
use url::Url;

/// HTTP fetcher using reqwest.
///
/// Downloads raw page text with a configurable User-Agent and timeout.
/// Only `http`/`https` URLs are accepted; everything the pipeline fetches
/// lives under one operator host, so there is no allow-list beyond that.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let timeout_secs = timeout.as_secs();
        let client = Client::builder()
            .user_agent("sealane/0.2")
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Fetch(e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs,
        })
    }
}

fn validate_scheme(url: &str) -> Result<(), AppError> {
    let parsed = Url::parse(url).map_err(|e| AppError::Fetch(format!("invalid URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(AppError::Fetch(format!(
            "URL scheme '{scheme}' is not allowed (only http/https)"
        ))),
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        validate_scheme(url)?;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::Network(format!("connection failed: {e}"))
            } else {
                AppError::Fetch(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Fetch(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::Fetch(format!("failed to read response body: {e}")))
    }
}
