//! Query options.

use std::time::Duration;

use crate::cache::SetOptions;
use crate::config::Config;

/// How long a cached value counts as fresh unless configured otherwise
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(30);

// == Query Options ==
/// Freshness and gating options for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Age after which a live value is refreshed in the background
    pub stale_time: Duration,
    /// Lifetime of values this query writes; `None` uses the store default
    pub cache_time: Option<Duration>,
    /// While false the query never fetches
    pub enabled: bool,
}

impl QueryOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stale_time: config.stale_time(),
            cache_time: Some(config.cache_time()),
            enabled: true,
        }
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = Some(cache_time);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub(crate) fn set_options(&self) -> SetOptions {
        SetOptions {
            cache_time: self.cache_time,
        }
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: DEFAULT_STALE_TIME,
            cache_time: None,
            enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = QueryOptions::default();
        assert_eq!(options.stale_time, Duration::from_secs(30));
        assert_eq!(options.cache_time, None);
        assert!(options.enabled);
        assert_eq!(options.set_options(), SetOptions::default());
    }

    #[test]
    fn test_builder() {
        let options = QueryOptions::default()
            .stale_time(Duration::from_secs(180))
            .cache_time(Duration::from_secs(600))
            .enabled(false);
        assert_eq!(options.stale_time, Duration::from_secs(180));
        assert_eq!(
            options.set_options(),
            SetOptions::with_cache_time(Duration::from_secs(600))
        );
        assert!(!options.enabled);
    }
}
