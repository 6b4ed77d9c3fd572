//! Query handlers for the Orders context.
//!
//! This module contains query handlers that replay an order's stream and
//! return read-only view DTOs.

use serde::Serialize;
use storefront_core::aggregate::AggregateRoot;
use storefront_core::error::StoreError;
use storefront_event_store::AggregateStore;

use crate::domain::aggregates::{Order, OrderStatus};

/// Read-only view of an order aggregate.
#[derive(Debug, Serialize)]
pub struct OrderView {
    /// The order identifier.
    pub order_id: String,
    /// Lifecycle state.
    pub status: Option<OrderStatus>,
    /// Order total in minor currency units.
    pub total: u64,
    /// Cancellation reason, if any.
    pub cancellation_reason: Option<String>,
    /// Current version (event count).
    pub version: u64,
}

/// Retrieves an order by replaying its full stream.
///
/// # Errors
///
/// Returns `StoreError::StreamNotFound` if the order has no stream and any
/// other `StoreError` if loading fails.
pub async fn get_order_by_id(
    order_id: &str,
    store: &AggregateStore,
) -> Result<OrderView, StoreError> {
    let mut order = Order::new(order_id);
    store.load(&mut order).await?;
    Ok(OrderView {
        order_id: order.id.clone(),
        status: order.status(),
        total: order.total(),
        cancellation_reason: order.cancellation_reason().map(str::to_owned),
        version: order.version(),
    })
}

/// Checks that an order exists without replaying it.
///
/// # Errors
///
/// Returns `StoreError::StreamNotFound` if the order has no stream.
pub async fn order_exists(order_id: &str, store: &AggregateStore) -> Result<(), StoreError> {
    store.exists(order_id).await
}
