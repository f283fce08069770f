//! Moving the cache from the server process to the client process
//!
//! The transfer string is a JSON object keyed by resource identifier:
//!
//! ```json
//! {"/people":{"data":[{"name":"Ada"}],"stored_at":"2024-07-15T12:00:00Z"}}
//! ```
//!
//! Keys are emitted in sorted order. Characters that could terminate a
//! surrounding `<script>` element are written as `\uXXXX` escapes, so the
//! string can be embedded verbatim in page markup and still parses to the same
//! entries.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::{Cache, CacheEntry, CacheStore};
use crate::error::TransferError;

/// Encodes every entry of `store` as a transfer string
pub fn encode(store: &CacheStore) -> Result<String, TransferError> {
    let by_key: BTreeMap<&str, &CacheEntry> = store
        .entries()
        .map(|entry| (entry.key.as_str(), entry))
        .collect();
    let json = serde_json::to_string(&by_key).map_err(TransferError::Encode)?;
    Ok(escape_for_html(&json))
}

/// Decodes a transfer string into entries, without touching any cache
pub fn decode(serialized: &str) -> Result<Vec<CacheEntry>, TransferError> {
    let by_key: BTreeMap<String, CacheEntry> =
        serde_json::from_str(serialized).map_err(TransferError::Decode)?;
    Ok(by_key
        .into_iter()
        .map(|(key, mut entry)| {
            entry.key = key;
            entry
        })
        .collect())
}

/// Escapes characters that are legal in JSON strings but unsafe inside HTML
fn escape_for_html(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            c => escaped.push(c),
        }
    }
    escaped
}

impl Cache {
    /// Serializes every stored entry, including its original storage time
    pub fn serialize(&self) -> Result<String, TransferError> {
        encode(&self.lock().store)
    }

    /// Replaces the stored entries with those in `serialized`
    ///
    /// The input is fully parsed before the store is touched; on error the
    /// existing entries are left exactly as they were. Fetches already
    /// underway are not affected and store their result when it arrives.
    /// Returns the number of entries now in the store.
    pub fn deserialize(&self, serialized: &str) -> Result<usize, TransferError> {
        let entries = decode(serialized)?;
        let count = entries.len();
        self.lock().store.replace_all(entries);
        Ok(count)
    }

    /// Client bootstrap entry point: like [`deserialize`](Self::deserialize),
    /// but a malformed string is logged and otherwise ignored
    pub fn initialize(&self, serialized: &str) {
        match self.deserialize(serialized) {
            Ok(count) => debug!(entries = count, "Initialized cache from transfer string"),
            Err(e) => warn!(error = %e, "Ignoring malformed cache transfer string"),
        }
    }

    /// Removes every stored entry and abandons every outstanding fetch
    ///
    /// Callers waiting on an abandoned fetch receive
    /// [`FetchError::Abandoned`](crate::error::FetchError::Abandoned), and a
    /// result that arrives afterwards is discarded rather than stored. The
    /// next request for any key goes to the network.
    pub fn wipe(&self) {
        let mut state = self.lock();
        state.store.clear();
        let abandoned = state.in_flight.abandon_all();
        if abandoned > 0 {
            debug!(abandoned, "Abandoned in-flight fetches on wipe");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap()
    }

    fn seeded_cache() -> Cache {
        let cache = Cache::new();
        {
            let mut state = cache.lock();
            state
                .store
                .put("/people", json!([{"name": "Ada"}, {"name": "Grace"}]), t0());
            state
                .store
                .put("/planets", json!({"count": 8}), t0() + chrono::Duration::seconds(1));
        }
        cache
    }

    #[test]
    fn test_serialize_uses_keyed_object_shape() {
        let cache = Cache::new();
        cache.lock().store.put("/people", json!(["Ada"]), t0());

        let serialized = cache.serialize().expect("serialize should succeed");
        let parsed: serde_json::Value = serde_json::from_str(&serialized).unwrap();

        assert_eq!(parsed["/people"]["data"], json!(["Ada"]));
        assert!(parsed["/people"]["stored_at"].is_string());
    }

    #[test]
    fn test_serialize_empty_cache() {
        let cache = Cache::new();

        assert_eq!(cache.serialize().unwrap(), "{}");
    }

    #[test]
    fn test_deserialize_restores_equivalent_store() {
        let source = seeded_cache();
        let serialized = source.serialize().unwrap();

        let target = Cache::new();
        let count = target.deserialize(&serialized).expect("deserialize should succeed");

        assert_eq!(count, 2);
        assert_eq!(target.snapshot(), source.snapshot());
    }

    #[test]
    fn test_deserialize_preserves_sub_second_stored_at() {
        let stored_at = t0() + chrono::Duration::nanoseconds(123_456_789);
        let source = Cache::new();
        source.lock().store.put("/people", json!([]), stored_at);

        let target = Cache::new();
        target.deserialize(&source.serialize().unwrap()).unwrap();

        assert_eq!(target.entry("/people").map(|e| e.stored_at), Some(stored_at));
    }

    #[test]
    fn test_deserialize_replaces_rather_than_merges() {
        let target = Cache::new();
        target.lock().store.put("/stale", json!("old"), t0());

        target
            .deserialize(&seeded_cache().serialize().unwrap())
            .unwrap();

        assert!(target.entry("/stale").is_none());
        assert!(target.entry("/people").is_some());
    }

    #[test]
    fn test_malformed_input_leaves_store_untouched() {
        let target = seeded_cache();
        let before = target.snapshot();

        let result = target.deserialize("{\"/people\": {\"data\": [1, 2");

        assert!(matches!(result, Err(TransferError::Decode(_))));
        assert_eq!(target.snapshot(), before);
    }

    #[test]
    fn test_entry_missing_timestamp_is_rejected() {
        let target = seeded_cache();
        let before = target.snapshot();

        let result = target.deserialize(r#"{"/people": {"data": []}}"#);

        assert!(result.is_err());
        assert_eq!(target.snapshot(), before);
    }

    #[test]
    fn test_initialize_ignores_malformed_input() {
        let target = seeded_cache();
        let before = target.snapshot();

        target.initialize("not json at all");

        assert_eq!(target.snapshot(), before);
    }

    #[test]
    fn test_initialize_replaces_prior_state() {
        let target = Cache::new();
        target.lock().store.put("/stale", json!(1), t0());

        target.initialize(&seeded_cache().serialize().unwrap());

        assert_eq!(target.len(), 2);
        assert!(target.entry("/stale").is_none());
    }

    #[tokio::test]
    async fn test_wipe_abandons_outstanding_markers() {
        let cache = Cache::new();
        let (_, handle) = cache.lock().in_flight.join("/people");

        cache.wipe();

        assert!(!cache.is_pending("/people"));
        assert_eq!(
            handle.wait().await,
            Err(crate::error::FetchError::Abandoned {
                url: "/people".to_string()
            })
        );
        let (is_new, _) = cache.lock().in_flight.join("/people");
        assert!(is_new);
    }

    #[test]
    fn test_deserialize_keeps_outstanding_markers() {
        let cache = Cache::new();
        let (_, _handle) = cache.lock().in_flight.join("/people");

        cache.deserialize(&seeded_cache().serialize().unwrap()).unwrap();

        assert!(cache.is_pending("/people"));
    }

    #[test]
    fn test_wipe_clears_everything() {
        let cache = seeded_cache();

        cache.wipe();

        assert!(cache.is_empty());
        assert!(cache.entry("/people").is_none());
    }

    #[test]
    fn test_serialized_string_is_safe_inside_script_element() {
        let cache = Cache::new();
        let hostile = json!({"bio": "</script><script>alert('x') && 1</script>\u{2028}"});
        cache.lock().store.put("/people?<x>", hostile.clone(), t0());

        let serialized = cache.serialize().unwrap();

        assert!(!serialized.contains('<'));
        assert!(!serialized.contains('>'));
        assert!(!serialized.contains('&'));
        assert!(!serialized.contains('\u{2028}'));

        let target = Cache::new();
        target.deserialize(&serialized).unwrap();
        assert_eq!(target.entry("/people?<x>").map(|e| e.value), Some(hostile));
    }

    #[test]
    fn test_keys_are_emitted_in_sorted_order() {
        let cache = Cache::new();
        {
            let mut state = cache.lock();
            state.store.put("/b", json!(2), t0());
            state.store.put("/a", json!(1), t0());
        }

        let serialized = cache.serialize().unwrap();

        let a = serialized.find("\"/a\"").unwrap();
        let b = serialized.find("\"/b\"").unwrap();
        assert!(a < b);
    }
}
