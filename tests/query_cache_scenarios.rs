//! Integration Tests
//!
//! End-to-end behavior of the store and its controllers through the public
//! crate API, on a paused tokio clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use rental_query_cache::{
    CacheStore, MutationController, MutationOptions, PageData, PaginationController,
    PaginationOptions, QueryController, QueryKey, QueryOptions, QueryState, SetOptions,
};

// == Helpers ==
async fn settle<T: Clone>(
    rx: &mut watch::Receiver<QueryState<T>>,
    ready: impl FnMut(&QueryState<T>) -> bool,
) -> QueryState<T> {
    rx.wait_for(ready).await.expect("query dropped").clone()
}

/// Fetch function that returns the next letter on each call.
fn letters(
    calls: Arc<AtomicUsize>,
) -> impl Fn() -> futures::future::Ready<anyhow::Result<String>> {
    move || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        let letter = char::from(b'A' + n as u8).to_string();
        futures::future::ready(Ok(letter))
    }
}

fn tenant_listing(
    store: &CacheStore,
    total: u64,
    options: PaginationOptions,
) -> PaginationController<u64> {
    PaginationController::new(
        store.clone(),
        "tenants",
        move |page, page_size| {
            let start = u64::from(page - 1) * u64::from(page_size);
            let end = (start + u64::from(page_size)).min(total);
            let rows = (start..end).collect();
            async move { Ok(PageData::from_range(rows, total, page, page_size)) }
        },
        options,
    )
}

// == Scenario Tests ==

#[tokio::test(start_paused = true)]
async fn test_second_mount_serves_cache_then_refreshes() {
    let store = CacheStore::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let options = QueryOptions::default().stale_time(Duration::ZERO);

    let first = QueryController::new(store.clone(), "tenants", letters(calls.clone()), options);
    let mut rx = first.watch();
    first.activate();
    assert!(first.state().is_loading);
    let state = settle(&mut rx, |s| !s.is_loading).await;
    assert_eq!(state.data.as_deref(), Some("A"));
    drop(first);

    tokio::time::advance(Duration::from_millis(1)).await;

    let second = QueryController::new(store.clone(), "tenants", letters(calls.clone()), options);
    let mut rx = second.watch();
    second.activate();
    let state = second.state();
    assert_eq!(state.data.as_deref(), Some("A"));
    assert!(!state.is_loading);
    assert!(state.is_stale);

    let state = settle(&mut rx, |s| s.data.as_deref() == Some("B")).await;
    assert!(!state.is_loading);
    assert!(!state.is_stale);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.get::<String>(&QueryKey::from("tenants")).as_deref(), Some("B"));
}

#[tokio::test(start_paused = true)]
async fn test_mutation_invalidates_before_resolving() {
    let store = CacheStore::default();
    let fetches = Arc::new(AtomicUsize::new(0));
    let query = QueryController::new(
        store.clone(),
        "leases",
        letters(fetches.clone()),
        QueryOptions::default(),
    );
    let mut rx = query.watch();
    query.activate();
    settle(&mut rx, |s| s.data.is_some()).await;

    let mutation = MutationController::new(
        store.clone(),
        |lease: String| async move { Ok(lease.len()) },
        MutationOptions::new().invalidate_query("leases"),
    );
    let written = mutation.mutate("lease-42".to_string()).await.unwrap();

    assert_eq!(written, 8);
    assert_eq!(store.get::<String>(&QueryKey::from("leases")), None);
    assert_eq!(fetches.load(Ordering::SeqCst), 1, "no new fetch issued");
    let state = query.state();
    assert_eq!(state.data.as_deref(), Some("A"));
    assert!(state.is_stale);
}

#[tokio::test(start_paused = true)]
async fn test_mutation_during_first_fetch_triggers_reload() {
    let store = CacheStore::default();
    let fetches = Arc::new(AtomicUsize::new(0));
    let counted = fetches.clone();
    let query = QueryController::new(
        store.clone(),
        "leases",
        move || {
            let n = counted.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(n)
            }
        },
        QueryOptions::default(),
    );
    let mut rx = query.watch();
    query.activate();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let mutation = MutationController::new(
        store.clone(),
        |_: ()| async { Ok(()) },
        MutationOptions::new().invalidate_query("leases"),
    );
    mutation.mutate(()).await.unwrap();

    let state = settle(&mut rx, |s| !s.is_loading && s.data.is_some()).await;
    assert_eq!(state.data, Some(2), "value fetched after the invalidation");
    assert!(state.error.is_none());
    assert!(!state.is_stale);
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
    assert_eq!(store.get::<usize>(&QueryKey::from("leases")), Some(2));
    assert_eq!(store.in_flight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pagination_bounds() {
    let store = CacheStore::default();
    let listing = tenant_listing(&store, 25, PaginationOptions::default().initial_page(3));

    listing.activate();
    let state = listing.settled().await;
    assert_eq!(state.total_pages, 3);
    assert_eq!(state.current_page, 3);
    assert_eq!(state.data, Some(vec![20, 21, 22, 23, 24]));
    assert!(!state.has_next_page);
    assert!(state.has_previous_page);

    listing.go_to_page(0);
    assert_eq!(listing.current_page(), 3);
    listing.go_to_page(4);
    assert_eq!(listing.current_page(), 3);
    listing.next_page();
    assert_eq!(listing.current_page(), 3);
    assert_eq!(listing.current_key(), QueryKey::page("tenants", 3, 10));

    listing.go_to_page(1);
    let state = listing.settled().await;
    assert_eq!(state.current_page, 1);
    assert!(state.has_next_page);
    assert!(!state.has_previous_page);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_mounts_share_one_fetch() {
    let store = CacheStore::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = {
        let calls = calls.clone();
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(1000 + n)
            }
        }
    };

    let first = QueryController::new(
        store.clone(),
        "units",
        fetch.clone(),
        QueryOptions::default(),
    );
    let second = QueryController::new(store.clone(), "units", fetch, QueryOptions::default());
    let mut first_rx = first.watch();
    let mut second_rx = second.watch();

    first.activate();
    second.activate();
    assert_eq!(store.in_flight_count(), 1);

    let a = settle(&mut first_rx, |s| !s.is_loading).await;
    let b = settle(&mut second_rx, |s| !s.is_loading).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.data, Some(1000));
    assert_eq!(b.data, Some(1000));
    assert_eq!(store.in_flight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_forced_refetch_wins_over_slower_background_refresh() {
    let store = CacheStore::default();
    let key = QueryKey::from("payments");
    store.set(key.clone(), "seeded".to_string(), SetOptions::default());
    tokio::time::advance(Duration::from_secs(31)).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    let query = QueryController::new(
        store.clone(),
        key.clone(),
        move || {
            let n = counted.fetch_add(1, Ordering::SeqCst);
            async move {
                // The first call is the background refresh and resolves last
                let (delay, value) = if n == 0 {
                    (100, "background")
                } else {
                    (10, "forced")
                };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(value.to_string())
            }
        },
        QueryOptions::default(),
    );

    query.activate();
    assert!(query.state().is_stale);
    tokio::task::yield_now().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    query.refetch().await;
    assert_eq!(store.get::<String>(&key).as_deref(), Some("forced"));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.get::<String>(&key).as_deref(), Some("forced"));
    assert_eq!(query.state().data.as_deref(), Some("forced"));
}

// == Store Tests ==

#[tokio::test(start_paused = true)]
async fn test_entry_expires_at_cache_time() {
    let store = CacheStore::new(Duration::from_secs(10));
    let key = QueryKey::from("agencies");
    store.set(key.clone(), 5u32, SetOptions::default());

    tokio::time::advance(Duration::from_millis(9_999)).await;
    assert_eq!(store.get::<u32>(&key), Some(5));

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(store.get::<u32>(&key), None);
    assert!(store.is_empty(), "expired entry is evicted on read");
    assert_eq!(store.stats().expirations, 1);
}

#[tokio::test]
async fn test_subscribers_follow_their_key_until_unsubscribed() {
    let store = CacheStore::default();
    let notified = Arc::new(AtomicUsize::new(0));
    let counter = notified.clone();
    let subscription = store.subscribe(QueryKey::from("expenses"), move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    store.set(QueryKey::from("expenses"), 1u8, SetOptions::default());
    store.set(QueryKey::from("payments"), 1u8, SetOptions::default());
    store.invalidate(&QueryKey::from("expenses"));
    assert_eq!(notified.load(Ordering::SeqCst), 2);

    subscription.unsubscribe();
    store.set(QueryKey::from("expenses"), 2u8, SetOptions::default());
    assert_eq!(notified.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stores_are_isolated() {
    let first = CacheStore::default();
    let second = CacheStore::default();
    first.set(QueryKey::from("tenants"), 1u8, SetOptions::default());

    assert_eq!(second.get::<u8>(&QueryKey::from("tenants")), None);
    assert_eq!(first.clone().get::<u8>(&QueryKey::from("tenants")), Some(1));
}

#[tokio::test]
async fn test_page_keys_do_not_collide_with_plain_keys() {
    let store = CacheStore::default();
    store.set(QueryKey::from("tenants-page-1-size-10"), "plain", SetOptions::default());
    store.set(QueryKey::page("tenants", 1, 10), "page", SetOptions::default());

    assert_eq!(store.len(), 2);
    assert_eq!(store.invalidate_resource("tenants"), 1);
    assert_eq!(
        store.get::<&str>(&QueryKey::from("tenants-page-1-size-10")),
        Some("plain")
    );
}
