//! Aggregate roots for the Orders context.

use std::fmt;

use serde::Serialize;
use storefront_core::aggregate::AggregateRoot;
use storefront_core::clock::Clock;
use storefront_core::error::DomainError;
use storefront_core::event::EventMetadata;
use uuid::Uuid;

use super::events::{
    OrderCancelled, OrderCreated, OrderEvent, OrderEventKind, OrderPaid, OrderShipped,
};

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed, awaiting payment.
    Pending,
    /// Paid, awaiting shipment.
    Paid,
    /// Handed to the carrier.
    Shipped,
    /// Cancelled before shipment.
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Cancelled => "cancelled",
        })
    }
}

/// The aggregate root for a customer order.
#[derive(Debug)]
pub struct Order {
    /// Aggregate identifier (and stream name).
    pub id: String,
    /// Current version (event count).
    pub(crate) version: u64,
    /// Lifecycle state; `None` until `OrderCreated` has been applied.
    pub(crate) status: Option<OrderStatus>,
    /// Order total in minor currency units.
    pub(crate) total: u64,
    /// Cancellation reason, if any.
    pub(crate) cancellation_reason: Option<String>,
    /// Uncommitted events pending persistence.
    uncommitted_events: Vec<OrderEvent>,
}

impl Order {
    /// Creates an empty order shell to load history into.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: 0,
            status: None,
            total: 0,
            cancellation_reason: None,
            uncommitted_events: Vec::new(),
        }
    }

    /// Places a new order, producing an `OrderCreated` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the id is blank or the total is
    /// zero.
    pub fn create(
        id: impl Into<String>,
        total: u64,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        let mut order = Self::new(id);
        if order.id.trim().is_empty() {
            return Err(DomainError::Validation("order id must not be blank".into()));
        }
        if total == 0 {
            return Err(DomainError::Validation(
                "order total must be positive".into(),
            ));
        }

        order.raise(
            OrderEventKind::Created(OrderCreated { total }),
            correlation_id,
            clock,
        )?;
        Ok(order)
    }

    /// Records payment, producing an `OrderPaid` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the order is pending.
    pub fn pay(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<(), DomainError> {
        self.require("pay", &[OrderStatus::Pending])?;
        self.raise(OrderEventKind::Paid(OrderPaid {}), correlation_id, clock)
    }

    /// Ships the order, producing an `OrderShipped` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the order is paid.
    pub fn ship(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<(), DomainError> {
        self.require("ship", &[OrderStatus::Paid])?;
        self.raise(
            OrderEventKind::Shipped(OrderShipped {}),
            correlation_id,
            clock,
        )
    }

    /// Cancels the order, producing an `OrderCancelled` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` once the order has shipped or
    /// was already cancelled.
    pub fn cancel(
        &mut self,
        reason: Option<String>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.require("cancel", &[OrderStatus::Pending, OrderStatus::Paid])?;
        self.raise(
            OrderEventKind::Cancelled(OrderCancelled { reason }),
            correlation_id,
            clock,
        )
    }

    /// Returns the lifecycle state, `None` for an order with no history.
    #[must_use]
    pub fn status(&self) -> Option<OrderStatus> {
        self.status
    }

    /// Returns the order total in minor currency units.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Returns the cancellation reason, if the order was cancelled with one.
    #[must_use]
    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    fn require(&self, action: &'static str, allowed: &[OrderStatus]) -> Result<(), DomainError> {
        match self.status {
            Some(status) if allowed.contains(&status) => Ok(()),
            Some(status) => Err(DomainError::InvalidTransition {
                action,
                state: status.to_string(),
            }),
            None => Err(DomainError::InvalidTransition {
                action,
                state: "not created".to_owned(),
            }),
        }
    }

    /// Applies a freshly raised event and queues it for persistence.
    fn raise(
        &mut self,
        kind: OrderEventKind,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        // TODO: event_id uses Uuid::new_v4(); inject an id generator to make
        // raised events reproducible in tests.
        let event = OrderEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: kind.type_name().to_owned(),
                aggregate_id: self.id.clone(),
                correlation_id,
                causation_id: correlation_id,
                occurred_at: clock.now(),
            },
            kind,
        };

        self.apply(&event)?;
        self.uncommitted_events.push(event);
        Ok(())
    }
}

impl AggregateRoot for Order {
    type Event = OrderEvent;

    fn aggregate_id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) -> Result<(), DomainError> {
        match (&event.kind, self.status) {
            (OrderEventKind::Created(_), Some(_)) => {
                return Err(DomainError::InvalidTransition {
                    action: "create",
                    state: "already created".to_owned(),
                });
            }
            (OrderEventKind::Created(payload), None) => {
                self.total = payload.total;
                self.status = Some(OrderStatus::Pending);
            }
            (_, None) => {
                return Err(DomainError::InvalidTransition {
                    action: "apply history",
                    state: "not created".to_owned(),
                });
            }
            (OrderEventKind::Paid(_), Some(_)) => self.status = Some(OrderStatus::Paid),
            (OrderEventKind::Shipped(_), Some(_)) => self.status = Some(OrderStatus::Shipped),
            (OrderEventKind::Cancelled(payload), Some(_)) => {
                self.status = Some(OrderStatus::Cancelled);
                self.cancellation_reason.clone_from(&payload.reason);
            }
        }
        self.version += 1;
        Ok(())
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}
