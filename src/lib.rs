//! Caching Fetch Library
//!
//! A request-deduplicating, time-bounded cache for fetched resources. Data
//! fetched while rendering on the server is serialized into the delivered page
//! and rehydrated on the client, so the client never refetches what the server
//! already obtained.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;

pub use cache::{Cache, CacheEntry, CacheStore, FreshnessPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use error::{FailureKind, FetchError, TransferError, TransportError};
pub use fetch::{CachingFetch, FetchState, FetchView, HttpTransport, RawResponse, Transport};
