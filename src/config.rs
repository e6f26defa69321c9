//! Configuration Module
//!
//! Handles loading the cache defaults from environment variables.

use std::env;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Default freshness and paging parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long an entry stays live before lazy eviction, in milliseconds
    pub cache_time_ms: u64,
    /// How long a live entry counts as fresh, in milliseconds
    pub stale_time_ms: u64,
    /// Rows per page for paginated listings
    pub page_size: u32,
    /// Freshness window of paginated listings, in milliseconds
    pub pagination_stale_time_ms: u64,
    /// Lifetime of cached pages, in milliseconds
    pub pagination_cache_time_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `QUERY_CACHE_TIME_MS` - Default entry TTL (default: 300000)
    /// - `QUERY_STALE_TIME_MS` - Default query stale time (default: 30000)
    /// - `PAGINATION_PAGE_SIZE` - Rows per page (default: 10)
    /// - `PAGINATION_STALE_TIME_MS` - Page stale time (default: 60000)
    /// - `PAGINATION_CACHE_TIME_MS` - Page TTL (default: 300000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_time_ms: env_or("QUERY_CACHE_TIME_MS", defaults.cache_time_ms),
            stale_time_ms: env_or("QUERY_STALE_TIME_MS", defaults.stale_time_ms),
            page_size: env_or("PAGINATION_PAGE_SIZE", defaults.page_size),
            pagination_stale_time_ms: env_or(
                "PAGINATION_STALE_TIME_MS",
                defaults.pagination_stale_time_ms,
            ),
            pagination_cache_time_ms: env_or(
                "PAGINATION_CACHE_TIME_MS",
                defaults.pagination_cache_time_ms,
            ),
        }
    }

    /// Rejects combinations the controllers cannot honor.
    ///
    /// A stale window longer than the entry lifetime would never be observed,
    /// and a zero page size has no pages.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(CacheError::InvalidConfig(
                "page size must be at least 1".to_string(),
            ));
        }
        if self.stale_time_ms > self.cache_time_ms {
            return Err(CacheError::InvalidConfig(format!(
                "stale time {}ms exceeds cache time {}ms",
                self.stale_time_ms, self.cache_time_ms
            )));
        }
        if self.pagination_stale_time_ms > self.pagination_cache_time_ms {
            return Err(CacheError::InvalidConfig(format!(
                "pagination stale time {}ms exceeds pagination cache time {}ms",
                self.pagination_stale_time_ms, self.pagination_cache_time_ms
            )));
        }
        Ok(())
    }

    pub fn cache_time(&self) -> Duration {
        Duration::from_millis(self.cache_time_ms)
    }

    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    pub fn pagination_stale_time(&self) -> Duration {
        Duration::from_millis(self.pagination_stale_time_ms)
    }

    pub fn pagination_cache_time(&self) -> Duration {
        Duration::from_millis(self.pagination_cache_time_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_time_ms: 5 * 60 * 1000,
            stale_time_ms: 30 * 1000,
            page_size: 10,
            pagination_stale_time_ms: 60 * 1000,
            pagination_cache_time_ms: 5 * 60 * 1000,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.cache_time(), Duration::from_secs(300));
        assert_eq!(config.stale_time(), Duration::from_secs(30));
        assert_eq!(config.page_size, 10);
        assert_eq!(config.pagination_stale_time(), Duration::from_secs(60));
        assert_eq!(config.pagination_cache_time(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("QUERY_CACHE_TIME_MS");
        env::remove_var("QUERY_STALE_TIME_MS");
        env::remove_var("PAGINATION_PAGE_SIZE");
        env::remove_var("PAGINATION_STALE_TIME_MS");
        env::remove_var("PAGINATION_CACHE_TIME_MS");

        let config = Config::from_env();
        assert_eq!(config.cache_time_ms, 300_000);
        assert_eq!(config.stale_time_ms, 30_000);
        assert_eq!(config.page_size, 10);
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let config = Config {
            page_size: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CacheError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_stale_longer_than_ttl() {
        let config = Config {
            stale_time_ms: 600_000,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CacheError::InvalidConfig(_))
        ));
    }
}
