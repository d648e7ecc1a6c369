//! Process-wide key/value store shared by every handler.
//!
//! Individual reads and writes are safe from any task (the map is sharded via
//! `DashMap`), but there is no transaction, namespacing, or compare-and-set:
//! two concurrent read-modify-write sequences on the same key can lose an
//! update, and the last write wins.

use std::sync::Arc;

use dashmap::DashMap;
use rpa_core::Params;
use serde_json::Value;

/// Cheaply clonable handle to the shared session map.
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    entries: Arc<DashMap<String, Value>>,
}

impl SharedSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Drops every entry. This is the only way the session is reset.
    pub fn clear(&self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point-in-time copy of all entries. Not atomic with respect to
    /// concurrent writers.
    #[must_use]
    pub fn snapshot(&self) -> Params {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn set_get_remove() {
        let session = SharedSession::new();
        assert!(session.is_empty());

        assert!(session.set("window", json!({"hwnd": 42})).is_none());
        assert_eq!(session.get("window"), Some(json!({"hwnd": 42})));
        assert!(session.contains_key("window"));

        let previous = session.set("window", json!(null));
        assert_eq!(previous, Some(json!({"hwnd": 42})));

        assert_eq!(session.remove("window"), Some(json!(null)));
        assert!(session.get("window").is_none());
    }

    #[test]
    fn clones_share_the_same_map() {
        let a = SharedSession::new();
        let b = a.clone();
        a.set("count", json!(1));
        assert_eq!(b.get("count"), Some(json!(1)));
        b.clear();
        assert!(a.is_empty());
    }

    #[test]
    fn snapshot_copies_entries() {
        let session = SharedSession::new();
        session.set("a", json!(1));
        session.set("b", json!("two"));
        let snap = session.snapshot();
        session.set("c", json!(3));
        assert_eq!(snap.len(), 2);
        assert_eq!(snap["b"], json!("two"));
        assert_eq!(session.len(), 3);
    }

    #[tokio::test]
    async fn concurrent_writers_to_one_key_leave_one_of_their_values() {
        let session = SharedSession::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let s = session.clone();
            handles.push(tokio::spawn(async move {
                s.set("shared", json!(i));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let value = session.get("shared").unwrap().as_i64().unwrap();
        assert!((0..16).contains(&value));
        assert_eq!(session.len(), 1);
    }
}
