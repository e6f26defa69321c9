//! Subscriber Registry Module
//!
//! Tracks the notification callbacks registered per cache key.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::cache::QueryKey;

/// Zero-argument notification callback.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

// == Subscriber Registry ==
/// Maps each key to its callbacks, in registration order.
///
/// A key whose last callback is removed is dropped from the registry so
/// the map only grows with live subscriptions. The data map is untouched.
#[derive(Default)]
pub struct SubscriberRegistry {
    by_key: HashMap<QueryKey, BTreeMap<u64, Callback>>,
    next_id: u64,
}

impl SubscriberRegistry {
    // == Add ==
    /// Registers `callback` for `key` and returns its id.
    pub fn add(&mut self, key: QueryKey, callback: Callback) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.by_key.entry(key).or_default().insert(id, callback);
        id
    }

    // == Remove ==
    /// Removes one callback, pruning the key if it was the last.
    ///
    /// Returns false if the callback was already gone.
    pub fn remove(&mut self, key: &QueryKey, id: u64) -> bool {
        let Some(callbacks) = self.by_key.get_mut(key) else {
            return false;
        };
        let removed = callbacks.remove(&id).is_some();
        if callbacks.is_empty() {
            self.by_key.remove(key);
        }
        removed
    }

    // == Snapshot ==
    /// Clones out the callbacks for `key` so they can run without the
    /// store's lock held.
    pub fn callbacks(&self, key: &QueryKey) -> Vec<Callback> {
        self.by_key
            .get(key)
            .map(|callbacks| callbacks.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Keys with at least one subscriber.
    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.by_key.keys()
    }

    pub fn count(&self, key: &QueryKey) -> usize {
        self.by_key.get(key).map_or(0, BTreeMap::len)
    }

    /// Number of keys with at least one subscriber.
    pub fn key_count(&self) -> usize {
        self.by_key.len()
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
    }
}
