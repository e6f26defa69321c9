//! Mutation Module
//!
//! One-shot side effects that keep the cache consistent afterwards.

mod controller;

pub use controller::{MutationController, MutationOptions, MutationState};
