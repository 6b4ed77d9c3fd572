//! Commands for the Orders context.

use uuid::Uuid;

/// Command to place a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Identifier of the new order (and its stream).
    pub order_id: String,
    /// Order total in minor currency units.
    pub total: u64,
}

/// Command to record payment of an order.
#[derive(Debug, Clone)]
pub struct PayOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The order being paid.
    pub order_id: String,
}

/// Command to ship a paid order.
#[derive(Debug, Clone)]
pub struct ShipOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The order being shipped.
    pub order_id: String,
}

/// Command to cancel an order that has not shipped.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The order being cancelled.
    pub order_id: String,
    /// Optional free-text reason.
    pub reason: Option<String>,
}
