//! Shared application state.

use std::sync::Arc;

use storefront_core::clock::Clock;
use storefront_event_store::AggregateStore;
use storefront_orders::application::retry::RetryPolicy;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Timestamp source for raised events.
    pub clock: Arc<dyn Clock>,
    /// Loads and saves order aggregates.
    pub aggregate_store: AggregateStore,
    /// Conflict retry policy for commands on existing orders.
    pub retry_policy: RetryPolicy,
    /// Name of the active stream backend, reported by the health check.
    pub event_store: &'static str,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        aggregate_store: AggregateStore,
        retry_policy: RetryPolicy,
        event_store: &'static str,
    ) -> Self {
        Self {
            clock,
            aggregate_store,
            retry_policy,
            event_store,
        }
    }
}
