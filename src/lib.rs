//! Rental Query Cache - client-side data-fetch cache
//!
//! An in-memory store with lazy TTL expiry and change notification, and the
//! controllers built on it: stale-while-revalidate queries, mutations that
//! invalidate what they change, and page-addressable listings.

pub mod cache;
pub mod config;
pub mod error;
pub mod mutation;
pub mod pagination;
pub mod query;

pub use cache::{CacheStore, QueryKey, SetOptions};
pub use config::Config;
pub use error::{CacheError, Result};
pub use mutation::{MutationController, MutationOptions, MutationState};
pub use pagination::{PageData, PaginatedState, PaginationController, PaginationOptions};
pub use query::{QueryController, QueryOptions, QueryState};
