// Upstream HTTP client.
// Handles request construction and status-to-error mapping.

use std::time::Duration;

use reqwest::{
    Client, Response, StatusCode,
    header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT},
};
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::error::FetchError;

/// HTTP client for a list-and-detail API laid out like the Hacker News v0 API.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
    base_url: String,
}

impl HttpUpstream {
    /// Create a new client from upstream settings.
    pub fn new(config: &UpstreamConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();

        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| FetchError::UpstreamUnavailable(e.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL every endpoint is resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make a GET request to the upstream API.
    pub(super) async fn get(&self, endpoint: &str) -> Result<Response, FetchError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(%url, "GET");
        let response = self.client.get(&url).send().await?;

        check_response(response).await
    }
}

/// Check response status and convert errors.
///
/// A 404 is passed through so the caller can decide whether it means a
/// missing item.
async fn check_response(response: Response) -> Result<Response, FetchError> {
    match response.status() {
        status if status.is_success() || status == StatusCode::NOT_FOUND => Ok(response),
        status => Err(FetchError::UpstreamUnavailable(format!(
            "HTTP {}: {}",
            status,
            response.text().await.unwrap_or_default()
        ))),
    }
}
