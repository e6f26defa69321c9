//! Pagination Controller Module
//!
//! A page-addressable listing built from one query per page key.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{CacheStore, FetchFn, QueryKey};
use crate::pagination::{PageData, PaginatedState, PaginationOptions};
use crate::query::{QueryController, QueryOptions};

type PageFetchFn<T> =
    Arc<dyn Fn(u32, u32) -> BoxFuture<'static, anyhow::Result<PageData<T>>> + Send + Sync>;

// == Pagination Controller ==
/// Drives one [`QueryController`] keyed by `(resource, page, page_size)`.
///
/// The current page is local to the controller. Each page is cached and
/// invalidated on its own: invalidating the plain resource key leaves the
/// page keys alone (use [`invalidate_all`](Self::invalidate_all) for
/// that). Navigating swaps the inner query for the new page's key.
///
/// `next_page` and `previous_page` trust the flags of the last fetch of
/// the current page. They are not recomputed, so they can lag behind a
/// changed total until that page's key is invalidated or refetched.
pub struct PaginationController<T> {
    store: CacheStore,
    resource: String,
    page_fetch: PageFetchFn<T>,
    options: PaginationOptions,
    cursor: Mutex<Cursor<T>>,
}

struct Cursor<T> {
    current_page: u32,
    page_size: u32,
    active: bool,
    query: QueryController<PageData<T>>,
}

impl<T> PaginationController<T>
where
    T: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates an inactive listing of `resource` positioned on the initial
    /// page.
    pub fn new<F, Fut>(
        store: CacheStore,
        resource: impl Into<String>,
        page_fetch: F,
        options: PaginationOptions,
    ) -> Self
    where
        F: Fn(u32, u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<PageData<T>>> + Send + 'static,
    {
        let page_fetch: PageFetchFn<T> =
            Arc::new(move |page, page_size| page_fetch(page, page_size).boxed());
        let resource = resource.into();
        let page_size = options.page_size.max(1);
        let current_page = options.initial_page.max(1);
        let query = page_query(
            &store,
            &resource,
            &page_fetch,
            &options,
            current_page,
            page_size,
        );

        Self {
            store,
            resource,
            page_fetch,
            options,
            cursor: Mutex::new(Cursor {
                current_page,
                page_size,
                active: false,
                query,
            }),
        }
    }

    // == Activation ==
    pub fn activate(&self) {
        let mut cursor = self.cursor.lock();
        cursor.active = true;
        cursor.query.activate();
    }

    pub fn deactivate(&self) {
        let mut cursor = self.cursor.lock();
        cursor.active = false;
        cursor.query.deactivate();
    }

    // == Navigation ==
    /// Moves to page `page` if `1 <= page <= total_pages`; otherwise does
    /// nothing.
    pub fn go_to_page(&self, page: u32) {
        let mut cursor = self.cursor.lock();
        let total_pages = self.derive(&cursor).total_pages;
        if page < 1 || page > total_pages {
            debug!(resource = %self.resource, page, total_pages, "Page out of range, ignored");
            return;
        }
        if page != cursor.current_page {
            let page_size = cursor.page_size;
            self.move_to(&mut cursor, page, page_size);
        }
    }

    /// Moves forward one page if the current page reported a next one.
    pub fn next_page(&self) {
        let mut cursor = self.cursor.lock();
        if self.derive(&cursor).has_next_page {
            let page = cursor.current_page.saturating_add(1);
            let page_size = cursor.page_size;
            self.move_to(&mut cursor, page, page_size);
        }
    }

    /// Moves back one page if the current page reported a previous one.
    pub fn previous_page(&self) {
        let mut cursor = self.cursor.lock();
        if self.derive(&cursor).has_previous_page && cursor.current_page > 1 {
            let page = cursor.current_page - 1;
            let page_size = cursor.page_size;
            self.move_to(&mut cursor, page, page_size);
        }
    }

    /// Switches to `page_size` rows per page, staying on the current page
    /// number. Zero is ignored.
    pub fn set_page_size(&self, page_size: u32) {
        let mut cursor = self.cursor.lock();
        if page_size == 0 || page_size == cursor.page_size {
            return;
        }
        let page = cursor.current_page;
        self.move_to(&mut cursor, page, page_size);
    }

    fn move_to(&self, cursor: &mut Cursor<T>, page: u32, page_size: u32) {
        debug!(
            resource = %self.resource,
            from = cursor.current_page,
            to = page,
            page_size,
            "Changing page"
        );
        let query = page_query(
            &self.store,
            &self.resource,
            &self.page_fetch,
            &self.options,
            page,
            page_size,
        );
        cursor.current_page = page;
        cursor.page_size = page_size;
        // The old page's query deactivates when dropped here
        cursor.query = query;
        if cursor.active {
            cursor.query.activate();
        }
    }

    // == Refresh ==
    /// Forces a fetch of the current page only.
    pub fn refetch(&self) -> impl Future<Output = ()> + Send + 'static {
        self.cursor.lock().query.refetch()
    }

    /// Invalidates the current page's key.
    pub fn invalidate(&self) {
        let key = self.cursor.lock().query.key().clone();
        self.store.invalidate(&key);
    }

    /// Invalidates every cached page of this resource, whatever its size.
    pub fn invalidate_all(&self) -> usize {
        self.store.invalidate_resource(&self.resource)
    }

    // == Accessors ==
    pub fn state(&self) -> PaginatedState<T> {
        self.derive(&self.cursor.lock())
    }

    /// Waits until the current page has no foreground fetch running, then
    /// returns the state.
    pub async fn settled(&self) -> PaginatedState<T> {
        let mut rx = self.cursor.lock().query.watch();
        // A closed channel means the page was swapped out; report what is current.
        let _ = rx.wait_for(|state| !state.is_loading).await;
        self.state()
    }

    pub fn current_key(&self) -> QueryKey {
        self.cursor.lock().query.key().clone()
    }

    fn derive(&self, cursor: &Cursor<T>) -> PaginatedState<T> {
        PaginatedState::derive(cursor.query.state(), cursor.current_page, cursor.page_size)
    }
}

impl<T> PaginationController<T> {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn current_page(&self) -> u32 {
        self.cursor.lock().current_page
    }

    pub fn page_size(&self) -> u32 {
        self.cursor.lock().page_size
    }

    pub fn is_active(&self) -> bool {
        self.cursor.lock().active
    }
}

impl<T> fmt::Debug for PaginationController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cursor = self.cursor.lock();
        f.debug_struct("PaginationController")
            .field("resource", &self.resource)
            .field("current_page", &cursor.current_page)
            .field("page_size", &cursor.page_size)
            .field("active", &cursor.active)
            .finish()
    }
}

fn page_query<T>(
    store: &CacheStore,
    resource: &str,
    page_fetch: &PageFetchFn<T>,
    options: &PaginationOptions,
    page: u32,
    page_size: u32,
) -> QueryController<PageData<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let page_fetch = Arc::clone(page_fetch);
    let fetch: FetchFn<PageData<T>> = Arc::new(move || page_fetch(page, page_size));
    QueryController::with_fetch_fn(
        store.clone(),
        QueryKey::page(resource, page, page_size),
        fetch,
        QueryOptions::default()
            .stale_time(options.stale_time)
            .cache_time(options.cache_time),
    )
}
