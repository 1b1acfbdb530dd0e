//! Watch Registry
//!
//! The only shared mutable state of the tracker. Every access goes through
//! one reader/writer lock:
//! - `keys()` and `get()` take the read lock and copy out, so callers iterate
//!   a point-in-time snapshot while writers proceed.
//! - `add`, `remove` and `replace` take the write lock.
//!
//! Each record carries a last-touched timestamp (`YYYYMMDDHHMMSS`, UTC) that
//! is refreshed whenever the engine advances it.

use super::model::{WatchKey, WatchedTransaction};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
struct Entry {
    record: WatchedTransaction,
    touched: String,
}

#[derive(Debug, Default)]
pub struct WatchRegistry {
    entries: RwLock<FxHashMap<WatchKey, Entry>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, FxHashMap<WatchKey, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FxHashMap<WatchKey, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert unless a record with the same key exists.
    /// Returns `false` when the record was dropped as a duplicate.
    pub fn add(&self, record: WatchedTransaction, touched: String) -> bool {
        let mut entries = self.write();
        let key = record.key();
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, Entry { record, touched });
        true
    }

    /// Swap a record for its advanced version under a single write lock.
    /// Nothing happens if the key disappeared meanwhile (swept or finalized).
    pub fn replace(&self, record: WatchedTransaction, touched: String) -> bool {
        let mut entries = self.write();
        let key = record.key();
        if entries.remove(&key).is_none() {
            return false;
        }
        entries.insert(key, Entry { record, touched });
        true
    }

    pub fn remove(&self, key: &WatchKey) -> Option<WatchedTransaction> {
        self.write().remove(key).map(|e| e.record)
    }

    pub fn contains(&self, key: &WatchKey) -> bool {
        self.read().contains_key(key)
    }

    /// Point-in-time copy of every record.
    pub fn keys(&self) -> Vec<WatchedTransaction> {
        self.read().values().map(|e| e.record.clone()).collect()
    }

    /// Last-touched timestamp of a record.
    pub fn get(&self, key: &WatchKey) -> Option<String> {
        self.read().get(key).map(|e| e.touched.clone())
    }

    pub fn record(&self, key: &WatchKey) -> Option<WatchedTransaction> {
        self.read().get(key).map(|e| e.record.clone())
    }

    /// Records paired with their timestamps, for persistence.
    pub fn entries(&self) -> Vec<(WatchedTransaction, String)> {
        self.read()
            .values()
            .map(|e| (e.record.clone(), e.touched.clone()))
            .collect()
    }

    /// Drop every record whose `watched_since` is older than `cutoff`.
    pub fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Vec<WatchedTransaction> {
        let mut entries = self.write();
        let expired: Vec<WatchKey> = entries
            .iter()
            .filter(|(_, e)| e.record.watched_since < cutoff)
            .map(|(k, _)| k.clone())
            .collect();
        expired
            .iter()
            .filter_map(|k| entries.remove(k).map(|e| e.record))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
