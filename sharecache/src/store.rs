//! Cache entries and the per-name key/value store.
//!
//! A [`CacheStore`] is one isolated key space. The coordinator keeps one
//! store per cache name, creates it on first reference and drops it when the
//! last referencing client disconnects. `set` overwrites unconditionally;
//! the write-race rule is the coordinator's job, applied before the store
//! is touched.
//!
//! Keys are strings (human-readable in logs, flexible for any domain) and
//! values are arbitrary JSON data, matching the message-passing boundary.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::WriterId;

// =============================================================================
// Status
// =============================================================================

/// Lifecycle of a cached entry.
///
/// `Sync`, `Fulfilled` and `Rejected` are terminal. `Pending` means a
/// client's computation is still in flight and no read may treat the stored
/// value as final; readers block on the owning writer instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Stored as an immediately known value.
    Sync,
    /// A deferred computation owns this key and has not settled yet.
    Pending,
    /// The deferred computation completed successfully.
    Fulfilled,
    /// The deferred computation failed; the value is the rejection reason.
    Rejected,
}

impl Status {
    /// Terminal statuses carry a final value; `Pending` does not.
    pub fn is_settled(self) -> bool {
        !matches!(self, Status::Pending)
    }

    /// True for the two statuses that settle a deferred computation.
    pub fn settles_deferred(self) -> bool {
        matches!(self, Status::Fulfilled | Status::Rejected)
    }
}

// =============================================================================
// Entry
// =============================================================================

/// One cached value together with its lifecycle state and owner.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// The cached data (or the rejection reason for `Rejected`).
    pub value: Value,

    /// Where the entry is in its lifecycle.
    pub status: Status,

    /// The logical write operation that produced this entry. Arbitrates
    /// concurrent writers: while the entry is `Pending`, only this writer
    /// may replace it.
    pub writer: WriterId,
}

impl Entry {
    pub fn new(value: Value, status: Status, writer: WriterId) -> Self {
        Self {
            value,
            status,
            writer,
        }
    }
}

// =============================================================================
// CacheStore
// =============================================================================

/// Key/value store for a single cache name.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: HashMap<String, Entry>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `key` holds an entry, regardless of status.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Stores `entry` under `key`, replacing any previous entry.
    ///
    /// The coordinator decides whether a write is allowed before calling
    /// this.
    pub fn set(&mut self, key: impl Into<String>, entry: Entry) {
        self.entries.insert(key.into(), entry);
    }

    /// Drops the entry under `key`. Returns true when one existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every entry in this store.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_then_get_returns_entry() {
        let mut store = CacheStore::new();
        store.set("a", Entry::new(json!(42), Status::Sync, WriterId(1)));

        let entry = store.get("a").unwrap();
        assert_eq!(entry.value, json!(42));
        assert_eq!(entry.status, Status::Sync);
        assert!(store.contains("a"));
        assert!(!store.contains("b"));
    }

    #[test]
    fn set_overwrites_unconditionally() {
        let mut store = CacheStore::new();
        store.set("a", Entry::new(json!(null), Status::Pending, WriterId(1)));
        store.set("a", Entry::new(json!(7), Status::Sync, WriterId(2)));

        let entry = store.get("a").unwrap();
        assert_eq!(entry.status, Status::Sync);
        assert_eq!(entry.writer, WriterId(2));
    }

    #[test]
    fn remove_and_clear_drop_entries() {
        let mut store = CacheStore::new();
        store.set("a", Entry::new(json!(1), Status::Sync, WriterId(1)));
        store.set("b", Entry::new(json!(2), Status::Sync, WriterId(2)));

        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn status_wire_form_is_uppercase() {
        assert_eq!(serde_json::to_string(&Status::Pending).unwrap(), "\"PENDING\"");
        assert_eq!(
            serde_json::from_str::<Status>("\"FULFILLED\"").unwrap(),
            Status::Fulfilled
        );
    }

    #[test]
    fn settled_statuses() {
        assert!(Status::Sync.is_settled());
        assert!(Status::Fulfilled.is_settled());
        assert!(Status::Rejected.is_settled());
        assert!(!Status::Pending.is_settled());

        assert!(Status::Fulfilled.settles_deferred());
        assert!(Status::Rejected.settles_deferred());
        assert!(!Status::Sync.settles_deferred());
    }
}
