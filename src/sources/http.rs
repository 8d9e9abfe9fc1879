//! HTTP transport.

use std::time::Duration;

use crate::sources::SourceError;

/// A completed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Map the status to a capability error, keeping 2xx responses.
    pub fn error_for_status(self, url: &str) -> Result<Self, SourceError> {
        match self.status {
            200..=299 => Ok(self),
            404 | 410 => Err(SourceError::NotFound(url.to_string())),
            408 | 429 | 500..=599 => Err(SourceError::Transport(format!(
                "HTTP {} from {}",
                self.status, url
            ))),
            status => Err(SourceError::Invalid(format!("HTTP {} from {}", status, url))),
        }
    }
}

/// Minimal blocking HTTP GET.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, SourceError>;
}

/// `HttpClient` backed by a blocking reqwest client.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| SourceError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(ReqwestClient { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<HttpResponse, SourceError> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| SourceError::Transport(format!("request to {} failed: {}", url, e)))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| SourceError::Transport(format!("failed to read body from {}: {}", url, e)))?
            .to_vec();

        Ok(HttpResponse { status, body })
    }
}
