//! Error types for the query cache
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;

use thiserror::Error;

use crate::cache::QueryKey;

// == Cache Error Enum ==
/// Unified error type for queries, mutations and configuration.
///
/// Cloneable so one failed fetch can be handed to every caller that
/// attached to the same in-flight operation. The wrapped `anyhow::Error`
/// is whatever the caller-supplied function returned; it is never
/// inspected.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// A fetch function failed
    #[error("Fetch failed for {key}: {cause}")]
    Fetch {
        key: QueryKey,
        cause: Arc<anyhow::Error>,
    },

    /// A mutation function failed
    #[error("Mutation failed: {0}")]
    Mutation(Arc<anyhow::Error>),

    /// A configuration value was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    /// Wraps a fetch failure for `key`.
    pub fn fetch(key: &QueryKey, cause: anyhow::Error) -> Self {
        CacheError::Fetch {
            key: key.clone(),
            cause: Arc::new(cause),
        }
    }

    /// Wraps a mutation failure.
    pub fn mutation(cause: anyhow::Error) -> Self {
        CacheError::Mutation(Arc::new(cause))
    }

    /// Returns the caller's original error, if this wraps one.
    pub fn inner(&self) -> Option<&anyhow::Error> {
        match self {
            CacheError::Fetch { cause, .. } | CacheError::Mutation(cause) => Some(cause),
            CacheError::InvalidConfig(_) => None,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the query cache.
pub type Result<T> = std::result::Result<T, CacheError>;
