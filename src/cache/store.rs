//! Cache Store Module
//!
//! Keyed store of time-stamped entries with per-key change notification.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::inflight::{FetchFn, FetchOutcome, InFlightSlot, InFlightTracker, SharedFetch};
use crate::cache::subscribers::{Callback, SubscriberRegistry};
use crate::cache::{CacheEntry, CacheStats, QueryKey, Snapshot, DEFAULT_CACHE_TIME};
use crate::config::Config;
use crate::error::CacheError;

// == Set Options ==
/// Per-write options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Entry lifetime; `None` uses the store default
    pub cache_time: Option<Duration>,
}

impl SetOptions {
    pub fn with_cache_time(cache_time: Duration) -> Self {
        Self {
            cache_time: Some(cache_time),
        }
    }
}

// == Cache Store ==
/// The single source of truth for cached values.
///
/// Cloning is cheap and every clone addresses the same entries. Create one
/// per application or session root and hand clones to the controllers;
/// separate instances share nothing.
///
/// Every operation is synchronous. `set` and `invalidate` run the key's
/// subscriber callbacks before returning, after the internal lock has been
/// released so callbacks may read the store.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    state: Mutex<StoreState>,
    default_cache_time: Duration,
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<QueryKey, CacheEntry>,
    subscribers: SubscriberRegistry,
    inflight: InFlightTracker,
    stats: CacheStats,
}

impl StoreState {
    /// Reads `key`, evicting it if expired.
    fn live_entry(&mut self, key: &QueryKey) -> Option<&CacheEntry> {
        match self.entries.get(key).map(CacheEntry::is_live) {
            None => {
                self.stats.record_miss();
                None
            }
            Some(false) => {
                debug!(key = %key, "Evicting expired entry on read");
                self.entries.remove(key);
                self.stats.record_expiration();
                self.stats.set_total_entries(self.entries.len());
                None
            }
            Some(true) => {
                self.stats.record_hit();
                self.entries.get(key)
            }
        }
    }

    fn write(&mut self, key: QueryKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
        self.stats.set_total_entries(self.entries.len());
    }
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store whose entries live `default_cache_time`
    /// unless a write says otherwise.
    pub fn new(default_cache_time: Duration) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState::default()),
                default_cache_time,
            }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cache_time())
    }

    pub fn default_cache_time(&self) -> Duration {
        self.inner.default_cache_time
    }

    // == Get ==
    /// Returns a clone of the live value at `key`.
    ///
    /// An expired entry is removed and reads as absent. A value stored under
    /// a different type also reads as absent, but is left in place.
    pub fn get<T>(&self, key: &QueryKey) -> Option<T>
    where
        T: Clone + 'static,
    {
        self.entry_snapshot(key).map(|snapshot| snapshot.data)
    }

    /// Like [`get`](Self::get), but also returns when the value was written.
    pub fn entry_snapshot<T>(&self, key: &QueryKey) -> Option<Snapshot<T>>
    where
        T: Clone + 'static,
    {
        let mut state = self.inner.state.lock();
        let entry = state.live_entry(key)?;
        let created_at = entry.created_at;
        match entry.value::<T>() {
            Some(data) => Some(Snapshot { data, created_at }),
            None => {
                warn!(
                    key = %key,
                    expected = std::any::type_name::<T>(),
                    "Cached value has a different type"
                );
                None
            }
        }
    }

    // == Set ==
    /// Stores `value` at `key`, then notifies the key's subscribers.
    ///
    /// A direct write counts as the newest issue for the key: any fetch
    /// still running for it will not commit.
    pub fn set<T>(&self, key: QueryKey, value: T, options: SetOptions)
    where
        T: Clone + Send + Sync + 'static,
    {
        let ttl = options.cache_time.unwrap_or(self.inner.default_cache_time);
        {
            let mut state = self.inner.state.lock();
            state.inflight.supersede(&key);
            state.write(key.clone(), CacheEntry::new(value, ttl));
        }
        debug!(key = %key, ttl = ?ttl, "Cache entry written");
        self.notify(&key);
    }

    // == Subscribe ==
    /// Registers `callback` to run after every write or invalidation of
    /// `key`. The callback is removed when the returned guard is dropped.
    pub fn subscribe<F>(&self, key: QueryKey, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        let id = self
            .inner
            .state
            .lock()
            .subscribers
            .add(key.clone(), callback);
        debug!(key = %key, id, "Subscriber registered");
        Subscription {
            store: Arc::downgrade(&self.inner),
            key,
            id,
            released: false,
        }
    }

    // == Invalidate ==
    /// Deletes `key` whether or not it is live and notifies its subscribers.
    ///
    /// Fetches for `key` issued before this call will not commit.
    pub fn invalidate(&self, key: &QueryKey) {
        {
            let mut state = self.inner.state.lock();
            state.entries.remove(key);
            state.inflight.supersede(key);
            state.stats.record_invalidation();
            let len = state.entries.len();
            state.stats.set_total_entries(len);
        }
        debug!(key = %key, "Cache entry invalidated");
        self.notify(key);
    }

    /// Invalidates `resource` and every page cached for it.
    ///
    /// Returns the number of keys invalidated.
    pub fn invalidate_resource(&self, resource: &str) -> usize {
        let keys: BTreeSet<QueryKey> = {
            let state = self.inner.state.lock();
            state
                .entries
                .keys()
                .chain(state.subscribers.keys())
                .filter(|key| key.belongs_to(resource))
                .cloned()
                .collect()
        };
        for key in &keys {
            self.invalidate(key);
        }
        debug!(resource, count = keys.len(), "Resource invalidated");
        keys.len()
    }

    // == Clear ==
    /// Drops every entry and every subscription without notifying anyone.
    ///
    /// Fetches issued before the reset will not commit.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.entries.clear();
        state.subscribers.clear();
        state.inflight.reset();
        state.stats.set_total_entries(0);
        info!("Cache store cleared");
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.entries.len());
        stats
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().entries.is_empty()
    }

    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.inner.state.lock().subscribers.count(key)
    }

    /// Number of keys with at least one subscriber.
    pub fn subscribed_keys(&self) -> usize {
        self.inner.state.lock().subscribers.key_count()
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.state.lock().inflight.running_count()
    }

    // == Load ==
    /// Starts a fetch for `key`, or attaches to the one already running.
    ///
    /// Without `force`, a caller finds the newest running fetch for the key
    /// and shares its result. With `force`, a fresh fetch is always issued
    /// and supersedes whatever was running. A result is committed only if
    /// no newer fetch, write or invalidation was issued for the key while
    /// it ran.
    ///
    /// The fetch function is not called until the returned future is first
    /// polled.
    pub fn load<T>(
        &self,
        key: &QueryKey,
        fetch: &FetchFn<T>,
        options: SetOptions,
        force: bool,
    ) -> SharedFetch<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock();
        if !force {
            if let Some(slot) = state.inflight.running(key) {
                match slot.operation.downcast_ref::<SharedFetch<T>>() {
                    Some(operation) => {
                        debug!(key = %key, version = slot.version, "Joining in-flight fetch");
                        return operation.clone();
                    }
                    None => {
                        warn!(key = %key, "In-flight fetch has a different value type");
                    }
                }
            }
        }

        let version = state.inflight.issue();
        let operation = fetch_operation(
            Arc::downgrade(&self.inner),
            key.clone(),
            Arc::clone(fetch),
            version,
            options,
        );
        state.inflight.register(
            key.clone(),
            InFlightSlot {
                version,
                operation: Box::new(operation.clone()),
            },
        );
        debug!(key = %key, version, force, "Fetch issued");
        operation
    }

    /// Writes a fetched value if `version` is still the running fetch for
    /// `key`, then notifies. Returns whether the write happened.
    fn commit<T>(&self, key: &QueryKey, version: u64, value: T, options: SetOptions) -> bool
    where
        T: Clone + Send + Sync + 'static,
    {
        let ttl = options.cache_time.unwrap_or(self.inner.default_cache_time);
        {
            let mut state = self.inner.state.lock();
            if !state.inflight.finish(key, version) {
                debug!(
                    key = %key,
                    version,
                    current = ?state.inflight.current(key),
                    "Discarding superseded fetch result"
                );
                return false;
            }
            state.write(key.clone(), CacheEntry::new(value, ttl));
        }
        debug!(key = %key, version, "Fetch result committed");
        self.notify(key);
        true
    }

    fn finish(&self, key: &QueryKey, version: u64) {
        self.inner.state.lock().inflight.finish(key, version);
    }

    fn notify(&self, key: &QueryKey) {
        let callbacks = self.inner.state.lock().subscribers.callbacks(key);
        for callback in callbacks {
            callback();
        }
    }
}

/// Builds the shared future behind one issued fetch.
///
/// Holds the store weakly so an abandoned store is not kept alive by the
/// fetches parked in its own in-flight map.
fn fetch_operation<T>(
    store: Weak<StoreInner>,
    key: QueryKey,
    fetch: FetchFn<T>,
    version: u64,
    options: SetOptions,
) -> SharedFetch<T>
where
    T: Clone + Send + Sync + 'static,
{
    async move {
        let result = fetch().await;
        let store = store.upgrade().map(|inner| CacheStore { inner });
        match (result, store) {
            (Ok(value), Some(store)) => {
                let committed = store.commit(&key, version, value.clone(), options);
                Ok(FetchOutcome {
                    value,
                    version,
                    committed,
                })
            }
            (Ok(value), None) => Ok(FetchOutcome {
                value,
                version,
                committed: false,
            }),
            (Err(err), store) => {
                if let Some(store) = store {
                    store.finish(&key, version);
                }
                debug!(key = %key, version, error = %err, "Fetch failed");
                Err(CacheError::fetch(&key, err))
            }
        }
    }
    .boxed()
    .shared()
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TIME)
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CacheStore")
            .field("entries", &state.entries.len())
            .field("subscribed_keys", &state.subscribers.key_count())
            .field("in_flight", &state.inflight.running_count())
            .field("default_cache_time", &self.inner.default_cache_time)
            .finish()
    }
}

// == Subscription ==
/// Guard for one registered callback; unsubscribes on drop.
pub struct Subscription {
    store: Weak<StoreInner>,
    key: QueryKey,
    id: u64,
    released: bool,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Removes the callback now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(inner) = self.store.upgrade() {
            inner.state.lock().subscribers.remove(&self.key, self.id);
            debug!(key = %self.key, id = self.id, "Subscriber removed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
