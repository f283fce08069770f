//! Configuration for building a [`CachingFetch`]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::cache::{Cache, FreshnessPolicy, DEFAULT_FRESHNESS_SECS};
use crate::error::TransportError;
use crate::fetch::{CachingFetch, HttpTransport};

/// Settings for the cache and its HTTP transport
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum age of an entry before it is refetched
    pub freshness_window: Duration,
    /// Base URL that relative resource identifiers are resolved against
    pub base_url: Option<String>,
    /// Per-request timeout; `None` waits as long as the server does
    pub request_timeout: Option<StdDuration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_window: Duration::seconds(DEFAULT_FRESHNESS_SECS),
            base_url: None,
            request_timeout: None,
        }
    }
}

impl CacheConfig {
    pub fn policy(&self) -> FreshnessPolicy {
        FreshnessPolicy::new(self.freshness_window)
    }

    /// Builds the HTTP transport described by this configuration
    pub fn transport(&self) -> Result<HttpTransport, TransportError> {
        let transport = match self.request_timeout {
            Some(timeout) => HttpTransport::with_timeout(timeout)?,
            None => HttpTransport::new(),
        };
        match &self.base_url {
            Some(base_url) => transport.with_base_url(base_url),
            None => Ok(transport),
        }
    }

    /// Builds an orchestrator over `cache` using this configuration
    pub fn build(&self, cache: Cache) -> Result<CachingFetch, TransportError> {
        let transport = self.transport()?;
        Ok(CachingFetch::new(cache, Arc::new(transport)).with_policy(self.policy()))
    }
}
