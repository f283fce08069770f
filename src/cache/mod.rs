//! Shared cache state for fetched resources
//!
//! This module provides the per-process cache: a store of fetched values with
//! their storage time, the markers for fetches still underway, the freshness
//! rule deciding when an entry must be refetched, and the transfer codec that
//! moves the store from a server process to a client process.
//!
//! [`Cache`] is a cheap, cloneable handle. Create one per process (or per test)
//! and hand it to every [`CachingFetch`](crate::fetch::CachingFetch) that should
//! share it.

mod expiry;
mod inflight;
mod store;
mod transfer;

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

pub use expiry::{FreshnessPolicy, DEFAULT_FRESHNESS_SECS};
pub use inflight::{FetchOutcome, FlightHandle, FlightId, InFlight};
pub use store::{CacheEntry, CacheStore};

/// Everything guarded by the cache lock
#[derive(Debug, Default)]
pub(crate) struct CacheState {
    pub(crate) store: CacheStore,
    pub(crate) in_flight: InFlight,
}

/// Handle to the process-wide cache
///
/// The lock is only ever held between suspension points, never across an
/// `.await`.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    state: Arc<Mutex<CacheState>>,
}

impl Cache {
    /// Creates an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock()
    }

    /// Returns a copy of the entry stored for `key`, fresh or not
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.lock().store.get(key).cloned()
    }

    /// Returns a copy of every stored entry
    pub fn snapshot(&self) -> CacheStore {
        self.lock().store.clone()
    }

    /// Returns true while a fetch for `key` is outstanding
    pub fn is_pending(&self, key: &str) -> bool {
        self.lock().in_flight.is_pending(key)
    }

    pub fn len(&self) -> usize {
        self.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().store.is_empty()
    }
}
