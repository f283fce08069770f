//! Bookkeeping for fetches that are currently underway
//!
//! Every caller asking for a key while a fetch for it is outstanding gets a
//! handle onto the same settlement instead of starting another request.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::watch;

use crate::error::FetchError;

/// Result of one fetch, delivered to every joined caller
pub type FetchOutcome = Result<Value, FetchError>;

/// Identifies one marker, so a late result cannot settle a newer marker for
/// the same key
pub type FlightId = u64;

/// Awaitable view of an in-flight fetch
#[derive(Debug, Clone)]
pub struct FlightHandle {
    url: String,
    id: FlightId,
    rx: watch::Receiver<Option<FetchOutcome>>,
}

impl FlightHandle {
    /// The marker this handle is attached to
    pub fn id(&self) -> FlightId {
        self.id
    }

    /// Waits for the fetch to settle and returns its outcome
    ///
    /// Resolves to [`FetchError::Abandoned`] if the marker is dropped without
    /// ever being settled.
    pub async fn wait(mut self) -> FetchOutcome {
        let settled = match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => Option::clone(&outcome),
            Err(_) => None,
        };
        settled.unwrap_or(Err(FetchError::Abandoned { url: self.url }))
    }
}

#[derive(Debug)]
struct Marker {
    id: FlightId,
    tx: watch::Sender<Option<FetchOutcome>>,
}

/// In-flight markers keyed by resource identifier
#[derive(Debug, Default)]
pub struct InFlight {
    markers: HashMap<String, Marker>,
    next_id: FlightId,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches to the marker for `url`, creating it if none exists
    ///
    /// The returned flag is true only for the caller that created the marker;
    /// that caller is responsible for eventually calling [`settle`](Self::settle).
    pub fn join(&mut self, url: &str) -> (bool, FlightHandle) {
        if let Some(marker) = self.markers.get(url) {
            let handle = FlightHandle {
                url: url.to_string(),
                id: marker.id,
                rx: marker.tx.subscribe(),
            };
            return (false, handle);
        }

        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = watch::channel(None);
        self.markers.insert(url.to_string(), Marker { id, tx });
        let handle = FlightHandle {
            url: url.to_string(),
            id,
            rx,
        };
        (true, handle)
    }

    /// Publishes `outcome` to every handle for `url` and removes the marker
    ///
    /// Returns false if there was no marker for `url`.
    pub fn settle(&mut self, url: &str, outcome: FetchOutcome) -> bool {
        match self.markers.remove(url) {
            Some(marker) => {
                marker.tx.send_replace(Some(outcome));
                true
            }
            None => false,
        }
    }

    /// Returns true if the marker for `url` is still the one identified by `id`
    pub fn is_current(&self, url: &str, id: FlightId) -> bool {
        self.markers.get(url).is_some_and(|marker| marker.id == id)
    }

    /// Settles every marker as [`FetchError::Abandoned`] and removes it
    ///
    /// Returns the number of markers abandoned.
    pub fn abandon_all(&mut self) -> usize {
        let count = self.markers.len();
        for (url, marker) in self.markers.drain() {
            marker
                .tx
                .send_replace(Some(Err(FetchError::Abandoned { url })));
        }
        count
    }

    pub fn is_pending(&self, url: &str) -> bool {
        self.markers.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_joiners_share_the_marker_id() {
        let mut in_flight = InFlight::new();

        let (_, first) = in_flight.join("/people");
        let (_, second) = in_flight.join("/people");

        assert_eq!(first.id(), second.id());
        assert!(in_flight.is_current("/people", first.id()));
    }

    #[test]
    fn test_replacement_marker_gets_a_new_id() {
        let mut in_flight = InFlight::new();
        let (_, old) = in_flight.join("/people");
        in_flight.settle("/people", Ok(json!(null)));

        let (_, new) = in_flight.join("/people");

        assert_ne!(old.id(), new.id());
        assert!(!in_flight.is_current("/people", old.id()));
        assert!(in_flight.is_current("/people", new.id()));
    }

    #[tokio::test]
    async fn test_abandon_all_settles_and_removes_every_marker() {
        let mut in_flight = InFlight::new();
        let (_, people) = in_flight.join("/people");
        let (_, planets) = in_flight.join("/planets");

        assert_eq!(in_flight.abandon_all(), 2);

        assert!(in_flight.is_empty());
        assert_eq!(
            people.wait().await,
            Err(FetchError::Abandoned {
                url: "/people".to_string()
            })
        );
        assert_eq!(
            planets.wait().await,
            Err(FetchError::Abandoned {
                url: "/planets".to_string()
            })
        );
    }

    #[test]
    fn test_first_join_creates_marker() {
        let mut in_flight = InFlight::new();

        let (is_new, _handle) = in_flight.join("/people");

        assert!(is_new);
        assert!(in_flight.is_pending("/people"));
        assert_eq!(in_flight.len(), 1);
    }

    #[test]
    fn test_second_join_attaches_to_existing_marker() {
        let mut in_flight = InFlight::new();

        let (first, _a) = in_flight.join("/people");
        let (second, _b) = in_flight.join("/people");

        assert!(first);
        assert!(!second);
        assert_eq!(in_flight.len(), 1);
    }

    #[test]
    fn test_markers_are_per_key() {
        let mut in_flight = InFlight::new();

        let (a, _) = in_flight.join("/people");
        let (b, _) = in_flight.join("/planets");

        assert!(a && b);
        assert_eq!(in_flight.len(), 2);
    }

    #[tokio::test]
    async fn test_settle_delivers_same_outcome_to_all_handles() {
        let mut in_flight = InFlight::new();
        let (_, first) = in_flight.join("/people");
        let (_, second) = in_flight.join("/people");

        assert!(in_flight.settle("/people", Ok(json!(["Ada", "Grace"]))));

        assert_eq!(first.wait().await, Ok(json!(["Ada", "Grace"])));
        assert_eq!(second.wait().await, Ok(json!(["Ada", "Grace"])));
    }

    #[tokio::test]
    async fn test_settle_delivers_failure_to_all_handles() {
        let mut in_flight = InFlight::new();
        let (_, first) = in_flight.join("/broken");
        let (_, second) = in_flight.join("/broken");
        let failure = FetchError::Status {
            url: "/broken".to_string(),
            status: 500,
        };

        in_flight.settle("/broken", Err(failure.clone()));

        assert_eq!(first.wait().await, Err(failure.clone()));
        assert_eq!(second.wait().await, Err(failure));
    }

    #[tokio::test]
    async fn test_handle_waits_until_settled() {
        let mut in_flight = InFlight::new();
        let (_, handle) = in_flight.join("/people");

        let waiter = tokio::spawn(handle.wait());
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        in_flight.settle("/people", Ok(json!(1)));

        assert_eq!(waiter.await.unwrap(), Ok(json!(1)));
    }

    #[test]
    fn test_settle_removes_marker_so_next_join_is_new() {
        let mut in_flight = InFlight::new();
        let (_, _handle) = in_flight.join("/people");

        in_flight.settle("/people", Ok(json!(null)));
        let (is_new, _) = in_flight.join("/people");

        assert!(is_new);
    }

    #[test]
    fn test_settle_without_marker_returns_false() {
        let mut in_flight = InFlight::new();

        assert!(!in_flight.settle("/people", Ok(json!(null))));
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_marker_reports_abandoned() {
        let mut in_flight = InFlight::new();
        let (_, handle) = in_flight.join("/people");

        drop(in_flight);

        assert_eq!(
            handle.wait().await,
            Err(FetchError::Abandoned {
                url: "/people".to_string()
            })
        );
    }
}
