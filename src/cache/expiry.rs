//! Freshness window for cached entries

use chrono::{DateTime, Duration, Utc};

use super::CacheEntry;

/// Default maximum age of a cache entry, in seconds (5 minutes)
pub const DEFAULT_FRESHNESS_SECS: i64 = 5 * 60;

/// Decides whether a cached entry may still be served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    window: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_FRESHNESS_SECS))
    }
}

impl FreshnessPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns true while `now - stored_at <= window`
    ///
    /// A `now` earlier than `stored_at` (clock skew between the server that
    /// stored the entry and this process) counts as fresh.
    pub fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.stored_at) <= self.window
    }
}
