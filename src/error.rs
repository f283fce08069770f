//! Error types for fetching, transport and cache transfer
//!
//! `FetchError` is `Clone` because a single settlement is handed to every
//! caller that joined the same in-flight request.

use thiserror::Error;

/// Errors raised by a [`Transport`](crate::fetch::Transport) implementation
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The resource identifier could not be turned into a request URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Broad category of a fetch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Non-success status, network failure or an abandoned request
    Transport,
    /// The response body was not valid JSON
    Parse,
}

/// Outcome of a failed fetch, shared by every caller of that fetch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request never produced a response
    #[error("Failed to fetch {url}: {reason}")]
    Transport { url: String, reason: String },

    /// The server answered with a non-success status
    #[error("Failed to fetch {url}: HTTP status {status}")]
    Status { url: String, status: u16 },

    /// The response body could not be parsed
    #[error("Failed to parse response from {url}: {reason}")]
    Parse { url: String, reason: String },

    /// The fetch task went away before it could report a result
    #[error("Fetch for {url} was abandoned before completing")]
    Abandoned { url: String },
}

impl FetchError {
    /// Returns whether this is a transport or a parse failure
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Parse { .. } => FailureKind::Parse,
            FetchError::Transport { .. }
            | FetchError::Status { .. }
            | FetchError::Abandoned { .. } => FailureKind::Transport,
        }
    }

    /// The resource identifier the failure belongs to
    pub fn url(&self) -> &str {
        match self {
            FetchError::Transport { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Parse { url, .. }
            | FetchError::Abandoned { url } => url,
        }
    }
}

/// Errors raised while encoding or decoding a cache transfer string
#[derive(Debug, Error)]
pub enum TransferError {
    /// The cache could not be encoded
    #[error("Failed to serialize cache: {0}")]
    Encode(#[source] serde_json::Error),

    /// The transfer string is malformed
    #[error("Malformed cache transfer string: {0}")]
    Decode(#[source] serde_json::Error),
}
