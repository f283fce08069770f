//! Caching, deduplicating fetches
//!
//! [`CachingFetch`] answers a request for a resource identifier from the cache
//! when a fresh entry exists. Otherwise it either joins the fetch already
//! underway for that identifier or starts one, so that at most one network
//! request is made per identifier per freshness window no matter how many
//! callers ask for it at once.

mod transport;
mod view;

pub use transport::{HttpTransport, RawResponse, Transport};
pub use view::{FetchState, FetchView};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{Cache, FetchOutcome, FlightId, FreshnessPolicy};
use crate::clock::{Clock, SystemClock};
use crate::error::FetchError;

/// Fetch orchestrator over a shared [`Cache`]
///
/// Cloning is cheap; clones share the cache, transport and request counter.
#[derive(Clone)]
pub struct CachingFetch {
    cache: Cache,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    policy: FreshnessPolicy,
    requests: Arc<AtomicUsize>,
}

impl std::fmt::Debug for CachingFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingFetch")
            .field("cache", &self.cache)
            .field("policy", &self.policy)
            .field("requests", &self.network_requests())
            .finish_non_exhaustive()
    }
}

impl CachingFetch {
    /// Creates an orchestrator with the system clock and the default
    /// freshness window
    pub fn new(cache: Cache, transport: Arc<dyn Transport>) -> Self {
        Self {
            cache,
            transport,
            clock: Arc::new(SystemClock),
            policy: FreshnessPolicy::default(),
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Use `clock` for storage times and freshness checks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use `policy` to decide when entries must be refetched
    pub fn with_policy(mut self, policy: FreshnessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn policy(&self) -> FreshnessPolicy {
        self.policy
    }

    /// Number of network requests this orchestrator (and its clones) started
    pub fn network_requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Returns the cached value for `url` if it is still fresh
    ///
    /// Never suspends and never touches the network.
    pub fn cached(&self, url: &str) -> Option<Value> {
        let state = self.cache.lock();
        let entry = state.store.get(url)?;
        self.policy
            .is_fresh(entry, self.clock.now())
            .then(|| entry.value.clone())
    }

    /// Fetches `url`, going to the network only when no fresh entry exists
    /// and no other caller is already fetching it
    ///
    /// Every caller that asks for the same identifier while a request is
    /// underway receives the outcome of that one request. A failed request
    /// leaves the cache untouched, so the next call tries again.
    ///
    /// Must be polled within a tokio runtime unless `url` is already fresh in
    /// the cache, since a new request runs on a spawned task.
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let (is_new, handle) = {
            let mut state = self.cache.lock();
            if let Some(entry) = state.store.get(url) {
                if self.policy.is_fresh(entry, self.clock.now()) {
                    debug!(url, "Cache hit");
                    return Ok(entry.value.clone());
                }
            }
            state.in_flight.join(url)
        };

        if is_new {
            debug!(url, "Cache miss, starting request");
            self.spawn_request(url.to_string(), handle.id());
        } else {
            debug!(url, "Joining request already in flight");
        }

        handle.wait().await
    }

    /// Fetches `url` ahead of rendering
    ///
    /// Failures are logged and swallowed: rendering goes on without the
    /// resource and a later fetch may recover it. Nothing is cached for a
    /// failed preload.
    ///
    /// Must be called within a tokio runtime, like [`fetch`](Self::fetch).
    pub async fn preload(&self, url: &str) {
        match self.fetch(url).await {
            Ok(_) => info!(url, "Preloaded"),
            Err(e) => warn!(url, error = %e, "Preload failed"),
        }
    }

    /// Runs the request for a new in-flight marker on its own task
    ///
    /// The task outlives the caller that started it, so dropping that caller
    /// never strands the other callers joined to the marker. If the task
    /// itself is torn down (panic, runtime shutdown) the marker is settled as
    /// abandoned.
    fn spawn_request(&self, url: String, flight: FlightId) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let mut pending = PendingRequest {
            fetcher: self.clone(),
            url,
            flight,
            settled: false,
        };
        tokio::spawn(async move {
            let outcome = pending.fetcher.request(&pending.url).await;
            pending.settle(outcome);
        });
    }

    async fn request(&self, url: &str) -> FetchOutcome {
        let response = self
            .transport
            .get(url)
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }

        serde_json::from_slice(&response.body).map_err(|e| FetchError::Parse {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Stores a successful value and wakes every joined caller
    ///
    /// A result for a marker that was abandoned in the meantime (see
    /// [`Cache::wipe`]) is dropped.
    fn settle(&self, url: &str, flight: FlightId, outcome: FetchOutcome) {
        let mut state = self.cache.lock();
        if !state.in_flight.is_current(url, flight) {
            debug!(url, "Discarding result of abandoned request");
            return;
        }
        match &outcome {
            Ok(value) => {
                state.store.put(url, value.clone(), self.clock.now());
                debug!(url, "Request succeeded");
            }
            Err(e) => debug!(url, error = %e, "Request failed"),
        }
        state.in_flight.settle(url, outcome);
    }
}

/// Owned by the task running a request; settles its marker exactly once
struct PendingRequest {
    fetcher: CachingFetch,
    url: String,
    flight: FlightId,
    settled: bool,
}

impl PendingRequest {
    fn settle(&mut self, outcome: FetchOutcome) {
        self.settled = true;
        self.fetcher.settle(&self.url, self.flight, outcome);
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if !self.settled {
            let outcome = Err(FetchError::Abandoned {
                url: self.url.clone(),
            });
            self.settle(outcome);
        }
    }
}
