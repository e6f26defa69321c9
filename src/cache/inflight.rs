//! In-Flight Tracking Module
//!
//! Per-key issue versions and the map of fetches currently running.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};

use crate::cache::QueryKey;
use crate::error::Result;

/// Caller-supplied fetch function, opaque to the cache.
pub type FetchFn<T> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// One fetch shared by every caller that attached to it.
pub type SharedFetch<T> = Shared<BoxFuture<'static, Result<FetchOutcome<T>>>>;

// == Fetch Outcome ==
/// A successful fetch and whether its value made it into the store.
///
/// `committed` is false when a newer fetch or an invalidation superseded
/// this one before it resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome<T> {
    pub value: T,
    pub version: u64,
    pub committed: bool,
}

// == In-Flight Slot ==
/// A running fetch: the version it was issued under and its shared
/// future, type-erased because the store holds every resource type.
pub struct InFlightSlot {
    pub version: u64,
    pub operation: Box<dyn Any + Send + Sync>,
}

// == In-Flight Tracker ==
/// Hands out versions from one store-wide counter and remembers the
/// newest running fetch for each key.
///
/// A result may only be committed while its fetch is still the running
/// one for its key. Issuing a newer fetch, or superseding the key, replaces
/// or removes that slot, so a fetch that resolves late cannot overwrite
/// anything issued after it. Versions never repeat, so a key needs no
/// state once nothing runs for it and the map is bounded by the fetches
/// in flight.
#[derive(Default)]
pub struct InFlightTracker {
    last_version: u64,
    running: HashMap<QueryKey, InFlightSlot>,
}

impl InFlightTracker {
    // == Issue ==
    /// Returns a version newer than every one issued before.
    pub fn issue(&mut self) -> u64 {
        self.last_version += 1;
        self.last_version
    }

    /// Version of the running fetch for `key`, if any.
    pub fn current(&self, key: &QueryKey) -> Option<u64> {
        self.running.get(key).map(|slot| slot.version)
    }

    pub fn is_current(&self, key: &QueryKey, version: u64) -> bool {
        self.current(key) == Some(version)
    }

    // == Running Operations ==
    /// Makes `slot` the running fetch for `key`, superseding any other.
    pub fn register(&mut self, key: QueryKey, slot: InFlightSlot) {
        self.running.insert(key, slot);
    }

    pub fn running(&self, key: &QueryKey) -> Option<&InFlightSlot> {
        self.running.get(key)
    }

    /// Forgets the running fetch for `key` if it is the one at `version`.
    ///
    /// Returns whether it was.
    pub fn finish(&mut self, key: &QueryKey, version: u64) -> bool {
        let current = self.is_current(key, version);
        if current {
            self.running.remove(key);
        }
        current
    }

    /// Supersedes whatever is in flight for `key`.
    ///
    /// Used by writes and invalidation: a fetch issued before must not commit.
    pub fn supersede(&mut self, key: &QueryKey) {
        self.running.remove(key);
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Drops every running fetch, so nothing issued before the reset can
    /// commit after it.
    pub fn reset(&mut self) {
        self.running.clear();
    }
}
