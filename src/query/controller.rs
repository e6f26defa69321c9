//! Query Controller Module
//!
//! Per-key reactive unit over the cache store with stale-while-revalidate
//! refresh.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::{CacheStore, FetchFn, FetchOutcome, QueryKey, Subscription};
use crate::error::Result;
use crate::query::{QueryOptions, QueryState};

// == Query Controller ==
/// Keeps a [`QueryState`] for one key in sync with the cache store.
///
/// On activation the controller subscribes to its key and loads it:
/// a fresh cached value is shown as is, a stale one is shown while a
/// background refresh runs, and a missing one is fetched in the
/// foreground. Writes to the key by anyone else sharing the store are
/// picked up through the subscription.
///
/// Every activation gets a new generation. Fetch results that arrive after
/// the controller was deactivated (or reactivated) are not applied to its
/// state. Dropping the controller deactivates it.
///
/// `activate`, `set_enabled` and `refetch` must be called inside a tokio
/// runtime.
pub struct QueryController<T> {
    inner: Arc<QueryInner<T>>,
}

struct QueryInner<T> {
    store: CacheStore,
    key: QueryKey,
    fetch: FetchFn<T>,
    options: Mutex<QueryOptions>,
    state: watch::Sender<QueryState<T>>,
    activation: Mutex<Activation>,
}

#[derive(Default)]
struct Activation {
    generation: u64,
    active: bool,
    subscription: Option<Subscription>,
}

impl<T> QueryController<T>
where
    T: Clone + Send + Sync + 'static,
{
    // == Constructors ==
    /// Creates an inactive controller for `key`.
    pub fn new<F, Fut>(
        store: CacheStore,
        key: impl Into<QueryKey>,
        fetch: F,
        options: QueryOptions,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let fetch: FetchFn<T> = Arc::new(move || fetch().boxed());
        Self::with_fetch_fn(store, key.into(), fetch, options)
    }

    pub fn with_fetch_fn(
        store: CacheStore,
        key: QueryKey,
        fetch: FetchFn<T>,
        options: QueryOptions,
    ) -> Self {
        let (state, _) = watch::channel(QueryState::default());
        Self {
            inner: Arc::new(QueryInner {
                store,
                key,
                fetch,
                options: Mutex::new(options),
                state,
                activation: Mutex::new(Activation::default()),
            }),
        }
    }

    // == Activation ==
    /// Subscribes to the key and starts the initial load.
    ///
    /// Activating an active controller does nothing.
    pub fn activate(&self) {
        let Some(generation) = self.inner.begin_activation() else {
            return;
        };
        debug!(key = %self.inner.key, generation, "Query activated");
        if let Some(work) = self.inner.start(generation, false) {
            tokio::spawn(work);
        }
    }

    // == Refetch ==
    /// Fetches in the foreground regardless of what is cached.
    ///
    /// The fetch runs in a spawned task started by this call; the returned
    /// future only waits for it to settle and may be dropped. An inactive
    /// or disabled controller does nothing.
    pub fn refetch(&self) -> impl Future<Output = ()> + Send + 'static {
        let task = self
            .inner
            .current_generation()
            .and_then(|generation| self.inner.start(generation, true))
            .map(tokio::spawn);
        async move {
            if let Some(task) = task {
                if let Err(err) = task.await {
                    warn!(error = %err, "Refetch task failed");
                }
            }
        }
    }

    /// Invalidates this controller's key in the store.
    pub fn invalidate(&self) {
        self.inner.store.invalidate(&self.inner.key);
    }

    // == Enabled Gate ==
    /// Enabling an active controller that was disabled starts its load.
    pub fn set_enabled(&self, enabled: bool) {
        let was_enabled = std::mem::replace(&mut self.inner.options.lock().enabled, enabled);
        if !enabled || was_enabled {
            return;
        }
        if let Some(generation) = self.inner.current_generation() {
            if let Some(work) = self.inner.start(generation, false) {
                tokio::spawn(work);
            }
        }
    }

    // == Accessors ==
    pub fn state(&self) -> QueryState<T> {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn watch(&self) -> watch::Receiver<QueryState<T>> {
        self.inner.state.subscribe()
    }
}

impl<T> QueryController<T> {
    /// Unsubscribes and stops applying fetch results.
    pub fn deactivate(&self) {
        self.inner.deactivate();
    }

    pub fn is_active(&self) -> bool {
        self.inner.current_generation().is_some()
    }

    pub fn key(&self) -> &QueryKey {
        &self.inner.key
    }

    pub fn options(&self) -> QueryOptions {
        *self.inner.options.lock()
    }

    pub fn store(&self) -> &CacheStore {
        &self.inner.store
    }
}

impl<T> QueryInner<T> {
    fn current_generation(&self) -> Option<u64> {
        let activation = self.activation.lock();
        activation.active.then_some(activation.generation)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == Some(generation)
    }

    fn deactivate(&self) {
        let subscription = {
            let mut activation = self.activation.lock();
            if !activation.active {
                return;
            }
            activation.active = false;
            activation.generation += 1;
            activation.subscription.take()
        };
        drop(subscription);
        debug!(key = %self.key, "Query deactivated");
    }
}

impl<T> QueryInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn begin_activation(self: &Arc<Self>) -> Option<u64> {
        let mut activation = self.activation.lock();
        if activation.active {
            return None;
        }
        activation.generation += 1;
        activation.active = true;
        let generation = activation.generation;

        let query = Arc::downgrade(self);
        activation.subscription = Some(self.store.subscribe(self.key.clone(), move || {
            if let Some(query) = query.upgrade() {
                query.on_store_change(generation);
            }
        }));
        Some(generation)
    }

    /// Decides what a load needs and updates the state synchronously.
    ///
    /// Returns the remaining asynchronous work, if any.
    fn start(self: &Arc<Self>, generation: u64, force: bool) -> Option<BoxFuture<'static, ()>> {
        if !self.is_current(generation) {
            return None;
        }
        let options = *self.options.lock();
        if !options.enabled {
            debug!(key = %self.key, "Query disabled, not fetching");
            return None;
        }

        if !force {
            if let Some(snapshot) = self.store.entry_snapshot::<T>(&self.key) {
                let stale = snapshot.is_stale(options.stale_time);
                self.state.send_modify(|state| {
                    state.data = Some(snapshot.data);
                    state.is_loading = false;
                    state.is_stale = stale;
                });
                if !stale {
                    return None;
                }

                debug!(key = %self.key, "Serving stale data, refreshing in background");
                let operation =
                    self.store
                        .load(&self.key, &self.fetch, options.set_options(), false);
                let query = Arc::clone(self);
                return Some(
                    async move { query.finish_background(generation, operation.await) }.boxed(),
                );
            }
        }

        self.state.send_modify(|state| {
            state.is_loading = true;
            state.error = None;
        });
        let operation = self
            .store
            .load(&self.key, &self.fetch, options.set_options(), force);
        let query = Arc::clone(self);
        Some(
            async move {
                let result = operation.await;
                if let Some(reload) = query.finish_foreground(generation, result) {
                    reload.await;
                }
            }
            .boxed(),
        )
    }

    /// Applies a foreground result.
    ///
    /// A superseded result is never shown. The query loads again for the
    /// same activation instead: that shows a value written meanwhile, joins
    /// the newer fetch that replaced this one, or issues a fresh fetch after
    /// an invalidation. Returns that reload, if any.
    fn finish_foreground(
        self: &Arc<Self>,
        generation: u64,
        result: Result<FetchOutcome<T>>,
    ) -> Option<BoxFuture<'static, ()>> {
        if !self.is_current(generation) {
            debug!(key = %self.key, generation, "Dropping fetch result for inactive query");
            return None;
        }
        match result {
            Ok(outcome) if outcome.committed => {
                self.state.send_modify(|state| {
                    state.data = Some(outcome.value);
                    state.is_stale = false;
                    state.is_loading = false;
                });
                None
            }
            Ok(outcome) => {
                debug!(
                    key = %self.key,
                    version = outcome.version,
                    "Fetch result superseded, loading again"
                );
                self.state.send_modify(|state| state.is_loading = false);
                self.start(generation, false)
            }
            Err(err) => {
                warn!(key = %self.key, error = %err, "Query failed");
                self.state.send_modify(|state| {
                    state.error = Some(err);
                    state.is_loading = false;
                });
                None
            }
        }
    }

    /// Background failures are only logged; the shown data stays.
    fn finish_background(&self, generation: u64, result: Result<FetchOutcome<T>>) {
        match result {
            Ok(outcome) if outcome.committed && self.is_current(generation) => {
                self.state.send_modify(|state| {
                    state.data = Some(outcome.value);
                    state.is_stale = false;
                });
            }
            Ok(_) => {}
            Err(err) => {
                warn!(key = %self.key, error = %err, "Background refetch failed");
            }
        }
    }

    /// Runs synchronously inside every write or invalidation of the key.
    ///
    /// An invalidation keeps the shown data and marks it stale.
    fn on_store_change(&self, generation: u64) {
        if !self.is_current(generation) {
            return;
        }
        match self.store.entry_snapshot::<T>(&self.key) {
            Some(snapshot) => self.state.send_modify(|state| {
                state.data = Some(snapshot.data);
                state.is_stale = false;
            }),
            None => {
                self.state.send_if_modified(|state| {
                    let changed = state.data.is_some() && !state.is_stale;
                    if changed {
                        state.is_stale = true;
                    }
                    changed
                });
            }
        }
    }
}

impl<T> Drop for QueryController<T> {
    fn drop(&mut self) {
        self.inner.deactivate();
    }
}

impl<T> fmt::Debug for QueryController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryController")
            .field("key", &self.inner.key)
            .field("active", &self.is_active())
            .field("options", &self.options())
            .finish()
    }
}
