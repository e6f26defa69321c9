//! Mutation Controller Module
//!
//! Runs one side-effecting operation per call and invalidates the cache
//! entries it makes obsolete.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::{CacheStore, QueryKey};
use crate::error::{CacheError, Result};

type MutationFn<TData, TVars> =
    Arc<dyn Fn(TVars) -> BoxFuture<'static, anyhow::Result<TData>> + Send + Sync>;
type SuccessHook<TData, TVars> = Arc<dyn Fn(&TData, &TVars) + Send + Sync>;
type ErrorHook<TVars> = Arc<dyn Fn(&CacheError, &TVars) + Send + Sync>;

// == Mutation Options ==
/// Callbacks and invalidation targets for a mutation.
pub struct MutationOptions<TData, TVars> {
    on_success: Option<SuccessHook<TData, TVars>>,
    on_error: Option<ErrorHook<TVars>>,
    invalidate_queries: Vec<QueryKey>,
    invalidate_resources: Vec<String>,
}

impl<TData, TVars> MutationOptions<TData, TVars> {
    pub fn new() -> Self {
        Self {
            on_success: None,
            on_error: None,
            invalidate_queries: Vec::new(),
            invalidate_resources: Vec::new(),
        }
    }

    /// Runs after a successful mutation, once its keys are invalidated.
    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TData, &TVars) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(hook));
        self
    }

    /// Runs after a failed mutation, before the error is returned.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CacheError, &TVars) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Invalidates exactly `key` after each success.
    pub fn invalidate_query(mut self, key: impl Into<QueryKey>) -> Self {
        self.invalidate_queries.push(key.into());
        self
    }

    pub fn invalidate_queries<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<QueryKey>,
    {
        self.invalidate_queries
            .extend(keys.into_iter().map(Into::into));
        self
    }

    /// Invalidates `resource` and all of its cached pages after each success.
    pub fn invalidate_resource(mut self, resource: impl Into<String>) -> Self {
        self.invalidate_resources.push(resource.into());
        self
    }
}

impl<TData, TVars> Default for MutationOptions<TData, TVars> {
    fn default() -> Self {
        Self::new()
    }
}

// == Mutation State ==
/// What a caller sees of a mutation controller.
#[derive(Debug, Clone, Default)]
pub struct MutationState {
    /// True while at least one `mutate` call is pending
    pub is_loading: bool,
    /// Failure of the most recent `mutate` call, cleared when the next starts
    pub error: Option<CacheError>,
}

// == Mutation Controller ==
/// Wraps a side-effecting operation.
///
/// Each [`mutate`](Self::mutate) call runs the operation exactly once;
/// there are no retries. A failure is reported twice: through the
/// `error` field of the state and as the returned `Err`.
pub struct MutationController<TData, TVars> {
    store: CacheStore,
    mutation: MutationFn<TData, TVars>,
    options: MutationOptions<TData, TVars>,
    state: watch::Sender<MutationState>,
    pending: AtomicUsize,
}

impl<TData, TVars> MutationController<TData, TVars>
where
    TData: Send + 'static,
    TVars: Clone + Send + 'static,
{
    pub fn new<F, Fut>(
        store: CacheStore,
        mutation: F,
        options: MutationOptions<TData, TVars>,
    ) -> Self
    where
        F: Fn(TVars) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<TData>> + Send + 'static,
    {
        let (state, _) = watch::channel(MutationState::default());
        Self {
            store,
            mutation: Arc::new(move |variables| mutation(variables).boxed()),
            options,
            state,
            pending: AtomicUsize::new(0),
        }
    }

    // == Mutate ==
    /// Runs the operation with `variables`.
    ///
    /// On success the configured keys are invalidated before `on_success`
    /// runs and before this returns, so the next read of each is a miss.
    pub async fn mutate(&self, variables: TVars) -> Result<TData> {
        let _pending = self.begin();
        let result = (self.mutation)(variables.clone()).await;

        match result {
            Ok(data) => {
                self.invalidate_targets();
                if let Some(hook) = &self.options.on_success {
                    hook(&data, &variables);
                }
                Ok(data)
            }
            Err(err) => {
                let err = CacheError::mutation(err);
                warn!(error = %err, "Mutation failed");
                self.state.send_modify(|state| state.error = Some(err.clone()));
                if let Some(hook) = &self.options.on_error {
                    hook(&err, &variables);
                }
                Err(err)
            }
        }
    }

    fn invalidate_targets(&self) {
        for key in &self.options.invalidate_queries {
            self.store.invalidate(key);
        }
        for resource in &self.options.invalidate_resources {
            self.store.invalidate_resource(resource);
        }
        debug!(
            queries = self.options.invalidate_queries.len(),
            resources = self.options.invalidate_resources.len(),
            "Mutation succeeded, targets invalidated"
        );
    }
}

impl<TData, TVars> MutationController<TData, TVars> {
    fn begin(&self) -> PendingGuard<'_> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.state.send_modify(|state| {
            state.is_loading = true;
            state.error = None;
        });
        PendingGuard {
            pending: &self.pending,
            state: &self.state,
        }
    }

    pub fn state(&self) -> MutationState {
        self.state.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    pub fn error(&self) -> Option<CacheError> {
        self.state.borrow().error.clone()
    }

    pub fn watch(&self) -> watch::Receiver<MutationState> {
        self.state.subscribe()
    }
}

impl<TData, TVars> fmt::Debug for MutationController<TData, TVars> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationController")
            .field("invalidate_queries", &self.options.invalidate_queries)
            .field("invalidate_resources", &self.options.invalidate_resources)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

/// Clears `is_loading` when the last pending call settles or is dropped.
struct PendingGuard<'a> {
    pending: &'a AtomicUsize,
    state: &'a watch::Sender<MutationState>,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.send_modify(|state| state.is_loading = false);
        }
    }
}
