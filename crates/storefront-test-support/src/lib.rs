//! Shared test mocks and utilities for the Storefront services.

mod backend;
mod clock;

pub use backend::{BackendCalls, CountingEventStreams, FailingEventStreams};
pub use clock::FixedClock;
