//! Storefront Core: shared event-sourcing abstractions.
//!
//! This crate defines the aggregate and domain event traits, the event stream
//! backend port consumed by the aggregate store, and the error taxonomy shared
//! by every layer. It contains no infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod event;
pub mod stream;
