//! Page payloads, options and the derived paginated view.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::CacheError;
use crate::query::QueryState;

// == Page Data ==
/// One page as returned by a page fetch function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageData<T> {
    /// Rows of this page
    pub data: Vec<T>,
    /// Rows across all pages
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl<T> PageData<T> {
    /// Builds a page from a row range query.
    ///
    /// Page `page` covers rows `(page - 1) * page_size ..= page * page_size - 1`;
    /// there is a next page iff rows remain past that range.
    pub fn from_range(data: Vec<T>, total: u64, page: u32, page_size: u32) -> Self {
        let end = u64::from(page) * u64::from(page_size);
        Self {
            data,
            total,
            page,
            page_size,
            has_next_page: total > end,
            has_previous_page: page > 1,
        }
    }
}

// == Pagination Options ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationOptions {
    pub page_size: u32,
    pub initial_page: u32,
    /// Age after which a cached page is refreshed in the background
    pub stale_time: Duration,
    /// Lifetime of cached pages
    pub cache_time: Duration,
}

impl PaginationOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.page_size,
            initial_page: 1,
            stale_time: config.pagination_stale_time(),
            cache_time: config.pagination_cache_time(),
        }
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn initial_page(mut self, initial_page: u32) -> Self {
        self.initial_page = initial_page;
        self
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            page_size: 10,
            initial_page: 1,
            stale_time: Duration::from_secs(60),
            cache_time: Duration::from_secs(5 * 60),
        }
    }
}

// == Paginated State ==
/// The query view of the current page plus navigation fields.
///
/// `total`, `total_pages` and both navigation flags come from the last
/// page fetched for the current key; before any page arrives they are
/// zero and false.
#[derive(Debug, Clone)]
pub struct PaginatedState<T> {
    pub data: Option<Vec<T>>,
    pub is_loading: bool,
    pub error: Option<CacheError>,
    pub is_stale: bool,
    pub total: u64,
    pub current_page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl<T> PaginatedState<T> {
    pub(crate) fn derive(
        query: QueryState<PageData<T>>,
        current_page: u32,
        page_size: u32,
    ) -> Self {
        let QueryState {
            data,
            is_loading,
            error,
            is_stale,
        } = query;
        let (rows, total, has_next_page, has_previous_page) = match data {
            Some(page) => (
                Some(page.data),
                page.total,
                page.has_next_page,
                page.has_previous_page,
            ),
            None => (None, 0, false, false),
        };
        Self {
            data: rows,
            is_loading,
            error,
            is_stale,
            total,
            current_page,
            page_size,
            total_pages: total_pages(total, page_size),
            has_next_page,
            has_previous_page,
        }
    }
}

/// `ceil(total / page_size)`, saturating at `u32::MAX`.
pub fn total_pages(total: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    let pages = total.div_ceil(u64::from(page_size));
    u32::try_from(pages).unwrap_or(u32::MAX)
}
