//! Pagination Module
//!
//! Page-addressable listings composed from per-page queries.

mod controller;
mod page;

pub use controller::PaginationController;
pub use page::{total_pages, PageData, PaginatedState, PaginationOptions};
