//! The view a query exposes to its caller.

use crate::error::CacheError;

// == Query State ==
/// Snapshot of one query as its caller sees it.
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    /// Last value shown; kept through background refreshes and invalidations
    pub data: Option<T>,
    /// True only while a foreground fetch runs
    pub is_loading: bool,
    /// Failure of the last foreground fetch; background failures never land here
    pub error: Option<CacheError>,
    /// The shown value is older than the stale time, or its entry was invalidated
    pub is_stale: bool,
}

impl<T> QueryState<T> {
    /// Data is present and no foreground fetch or error is pending.
    pub fn is_success(&self) -> bool {
        self.data.is_some() && !self.is_loading && self.error.is_none()
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
            is_stale: false,
        }
    }
}
