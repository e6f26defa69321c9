//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

// == Cache Entry ==
/// A single stored value with its freshness metadata.
///
/// The value is type-erased so one store can hold every resource type;
/// it is cloned out on read and never handed out by reference.
#[derive(Clone)]
pub struct CacheEntry {
    data: Arc<dyn Any + Send + Sync>,
    /// When the value was written
    pub created_at: Instant,
    /// How long the value stays live
    pub ttl: Duration,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry stamped with the current time.
    pub fn new<T>(data: T, ttl: Duration) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self {
            data: Arc::new(data),
            created_at: Instant::now(),
            ttl,
        }
    }

    // == Liveness ==
    /// Live iff `now < created_at + ttl`.
    ///
    /// An entry whose deadline overflows the clock never expires.
    pub fn is_live_at(&self, now: Instant) -> bool {
        match self.created_at.checked_add(self.ttl) {
            Some(deadline) => now < deadline,
            None => true,
        }
    }

    pub fn is_live(&self) -> bool {
        self.is_live_at(Instant::now())
    }

    // == Time To Live ==
    /// Returns how long the entry stays live, zero once expired.
    pub fn ttl_remaining(&self) -> Duration {
        let age = Instant::now().saturating_duration_since(self.created_at);
        self.ttl.saturating_sub(age)
    }

    // == Downcast ==
    /// Clones the stored value out as `T`, or `None` on a type mismatch.
    pub fn value<T>(&self) -> Option<T>
    where
        T: Clone + 'static,
    {
        self.data.downcast_ref::<T>().cloned()
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("created_at", &self.created_at)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

// == Snapshot ==
/// A value read out of the store together with its write time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub data: T,
    pub created_at: Instant,
}

impl<T> Snapshot<T> {
    /// Stale iff `now > created_at + stale_time`.
    ///
    /// Judged at read time and independent of liveness.
    pub fn is_stale_at(&self, stale_time: Duration, now: Instant) -> bool {
        match self.created_at.checked_add(stale_time) {
            Some(fresh_until) => now > fresh_until,
            None => false,
        }
    }

    pub fn is_stale(&self, stale_time: Duration) -> bool {
        self.is_stale_at(stale_time, Instant::now())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_live_until_ttl() {
        let entry = CacheEntry::new("rent".to_string(), Duration::from_secs(10));
        assert!(entry.is_live());

        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert!(entry.is_live());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!entry.is_live(), "entry must expire exactly at created_at + ttl");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_remaining() {
        let entry = CacheEntry::new(1u32, Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(entry.ttl_remaining(), Duration::from_secs(6));

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(entry.ttl_remaining(), Duration::ZERO);
    }

    #[test]
    fn test_value_type_mismatch() {
        let entry = CacheEntry::new(42u64, Duration::from_secs(1));
        assert_eq!(entry.value::<u64>(), Some(42));
        assert_eq!(entry.value::<String>(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_staleness_boundary() {
        let snapshot = Snapshot {
            data: (),
            created_at: Instant::now(),
        };
        let stale_time = Duration::from_secs(30);

        tokio::time::advance(stale_time).await;
        assert!(!snapshot.is_stale(stale_time), "not stale at the boundary");

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(snapshot.is_stale(stale_time));
    }

    #[test]
    fn test_zero_stale_time_is_stale_after_any_delay() {
        let created_at = Instant::now();
        let snapshot = Snapshot { data: (), created_at };
        assert!(snapshot.is_stale_at(Duration::ZERO, created_at + Duration::from_nanos(1)));
    }
}
