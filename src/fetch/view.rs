//! Per-consumer view of a fetched resource
//!
//! A [`FetchView`] is what a rendering component holds: the resource it is
//! interested in plus a live `{ is_loading, data, error }` state. Changing the
//! resource identifier starts over, and a result that arrives for an
//! identifier the view has already moved away from is discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::CachingFetch;
use crate::error::FetchError;

/// Observable state of a [`FetchView`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchState {
    /// True only while this view's own fetch is outstanding
    pub is_loading: bool,
    /// Last resolved value
    pub data: Option<Value>,
    /// Last failure
    pub error: Option<FetchError>,
}

impl FetchState {
    fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    fn resolved(value: Value) -> Self {
        Self {
            is_loading: false,
            data: Some(value),
            error: None,
        }
    }

    fn failed(error: FetchError) -> Self {
        Self {
            is_loading: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Live view of one resource, backed by a shared [`CachingFetch`]
///
/// Dropping the view discards interest in any outstanding result; the
/// underlying request still completes and fills the cache for everyone else.
pub struct FetchView {
    fetcher: CachingFetch,
    url: Option<String>,
    state: Arc<watch::Sender<FetchState>>,
    generation: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl FetchView {
    /// Creates a view that is not yet looking at any resource
    pub fn new(fetcher: CachingFetch) -> Self {
        let (state, _) = watch::channel(FetchState::default());
        Self {
            fetcher,
            url: None,
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Creates a view and immediately points it at `url`
    ///
    /// Must be called within a tokio runtime unless `url` is already fresh in
    /// the cache.
    pub fn mount(fetcher: CachingFetch, url: &str) -> Self {
        let mut view = Self::new(fetcher);
        view.set_url(url);
        view
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Points the view at `url`; a no-op if it already looks at `url`
    ///
    /// A fresh cached value is reflected synchronously with `is_loading`
    /// false. Otherwise the view switches to loading and fetches in the
    /// background.
    pub fn set_url(&mut self, url: &str) {
        if self.url.as_deref() == Some(url) {
            return;
        }
        self.url = Some(url.to_string());
        self.activate();
    }

    /// Runs the fetch for the current identifier again, e.g. after a failure
    pub fn refetch(&mut self) {
        if self.url.is_some() {
            self.activate();
        }
    }

    /// Current state
    pub fn state(&self) -> FetchState {
        self.state.borrow().clone()
    }

    /// Receiver that is notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<FetchState> {
        self.state.subscribe()
    }

    /// Waits until the view is no longer loading and returns its state
    pub async fn settled(&self) -> FetchState {
        let mut rx = self.state.subscribe();
        let settled = match rx.wait_for(|state| !state.is_loading).await {
            Ok(state) => Some(state.clone()),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| self.state())
    }

    fn activate(&mut self) {
        let Some(url) = self.url.clone() else {
            return;
        };
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(value) = self.fetcher.cached(&url) {
            self.state.send_replace(FetchState::resolved(value));
            return;
        }

        self.state.send_replace(FetchState::loading());

        let fetcher = self.fetcher.clone();
        let state = Arc::clone(&self.state);
        let current = Arc::clone(&self.generation);
        self.task = Some(tokio::spawn(async move {
            let outcome = fetcher.fetch(&url).await;
            state.send_if_modified(|view| {
                // The view moved on to another identifier while we waited
                if current.load(Ordering::SeqCst) != generation {
                    return false;
                }
                *view = match outcome {
                    Ok(value) => FetchState::resolved(value),
                    Err(e) => FetchState::failed(e),
                };
                true
            });
        }));
    }
}

impl Drop for FetchView {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for FetchView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchView")
            .field("url", &self.url)
            .field("state", &*self.state.borrow())
            .finish()
    }
}
