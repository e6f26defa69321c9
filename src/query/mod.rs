//! Query Module
//!
//! Binds one cache key to one fetch function and keeps a
//! stale-while-revalidate view of it.

mod controller;
mod options;
mod state;

pub use controller::QueryController;
pub use options::{QueryOptions, DEFAULT_STALE_TIME};
pub use state::QueryState;
