//! Cache Module
//!
//! In-memory keyed store with lazy TTL expiry, change notification,
//! per-key fetch versioning and in-flight fetch sharing.

mod entry;
mod inflight;
mod key;
mod stats;
mod store;
mod subscribers;


use std::time::Duration;

// Re-export public types
pub use entry::{CacheEntry, Snapshot};
pub use inflight::{FetchFn, FetchOutcome, SharedFetch};
pub use key::QueryKey;
pub use stats::CacheStats;
pub use store::{CacheStore, SetOptions, Subscription};

// == Public Constants ==
/// Entry lifetime when neither the write nor the store specifies one
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_secs(5 * 60);
