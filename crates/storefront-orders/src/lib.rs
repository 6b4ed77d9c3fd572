//! Storefront Orders bounded context.
//!
//! Responsible for the order lifecycle: creation, payment, shipment and
//! cancellation, persisted as an event-sourced `Order` aggregate.

pub mod application;
pub mod domain;
