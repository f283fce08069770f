//! HTTP transport for fetching resources
//!
//! The orchestrator only needs a status and a body for a resource identifier.
//! [`HttpTransport`] provides that over `reqwest`; tests plug in their own
//! [`Transport`] implementations.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use crate::error::TransportError;

/// Status and raw body of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Undecoded response body
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs a bare GET for a resource identifier
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError>;
}

/// `reqwest`-backed transport
///
/// Relative identifiers such as `/people` are resolved against the base URL,
/// if one is configured.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Option<Url>,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    /// Create a new HttpTransport with default settings
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a new HttpTransport with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            base_url: None,
        }
    }

    /// Create a new HttpTransport whose requests give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client))
    }

    /// Resolve relative identifiers against `base_url`
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, TransportError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        self.base_url = Some(parsed);
        Ok(self)
    }

    /// Turns a resource identifier into an absolute request URL
    pub fn resolve(&self, url: &str) -> Result<Url, TransportError> {
        let resolved = match &self.base_url {
            Some(base) => base.join(url),
            None => Url::parse(url),
        };
        resolved.map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let request_url = self.resolve(url)?;

        let response = self.client.get(request_url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(RawResponse::new(status, body.to_vec()))
    }
}
