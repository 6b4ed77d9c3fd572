//! Domain events for the Orders context.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use storefront_core::error::DomainError;
use storefront_core::event::{DomainEvent, EventMetadata};
use storefront_core::stream::{ProposedEvent, RecordedEvent};

/// Type name of [`OrderCreated`].
pub const ORDER_CREATED: &str = "orders.order_created";
/// Type name of [`OrderPaid`].
pub const ORDER_PAID: &str = "orders.order_paid";
/// Type name of [`OrderShipped`].
pub const ORDER_SHIPPED: &str = "orders.order_shipped";
/// Type name of [`OrderCancelled`].
pub const ORDER_CANCELLED: &str = "orders.order_cancelled";

/// Emitted when an order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    /// Order total in minor currency units.
    pub total: u64,
}

/// Emitted when an order is paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaid {}

/// Emitted when an order leaves the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShipped {}

/// Emitted when an order is cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    /// Optional free-text reason.
    pub reason: Option<String>,
}

/// Event payload variants for the Orders context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEventKind {
    /// The order was placed.
    Created(OrderCreated),
    /// The order was paid.
    Paid(OrderPaid),
    /// The order was shipped.
    Shipped(OrderShipped),
    /// The order was cancelled.
    Cancelled(OrderCancelled),
}

impl OrderEventKind {
    /// Returns the persisted type name of this variant.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Created(_) => ORDER_CREATED,
            Self::Paid(_) => ORDER_PAID,
            Self::Shipped(_) => ORDER_SHIPPED,
            Self::Cancelled(_) => ORDER_CANCELLED,
        }
    }

    fn encode(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Created(payload) => serde_json::to_value(payload),
            Self::Paid(payload) => serde_json::to_value(payload),
            Self::Shipped(payload) => serde_json::to_value(payload),
            Self::Cancelled(payload) => serde_json::to_value(payload),
        }
    }

    fn decode(event_type: &str, payload: &serde_json::Value) -> Result<Self, DomainError> {
        fn payload_as<T: DeserializeOwned>(payload: &serde_json::Value) -> Result<T, DomainError> {
            T::deserialize(payload).map_err(|e| DomainError::Serialization(e.to_string()))
        }

        match event_type {
            ORDER_CREATED => payload_as(payload).map(Self::Created),
            ORDER_PAID => payload_as(payload).map(Self::Paid),
            ORDER_SHIPPED => payload_as(payload).map(Self::Shipped),
            ORDER_CANCELLED => payload_as(payload).map(Self::Cancelled),
            other => Err(DomainError::UnknownEventType(other.to_owned())),
        }
    }
}

/// Domain event envelope for the Orders context.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: OrderEventKind,
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        self.kind.type_name()
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn to_proposed(&self) -> Result<ProposedEvent, DomainError> {
        let payload = self
            .kind
            .encode()
            .map_err(|e| DomainError::Serialization(e.to_string()))?;
        Ok(self.metadata.to_proposed(payload))
    }

    fn from_recorded(recorded: &RecordedEvent) -> Result<Self, DomainError> {
        Ok(Self {
            metadata: EventMetadata::from_recorded(recorded),
            kind: OrderEventKind::decode(&recorded.event_type, &recorded.payload)?,
        })
    }
}
