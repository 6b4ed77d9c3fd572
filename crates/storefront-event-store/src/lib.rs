//! Storefront Event Store: aggregate persistence over append-only streams.
//!
//! [`AggregateStore`] loads aggregates by replaying their stream and saves
//! newly raised events under an optimistic-concurrency guard. Two stream
//! backends are provided: [`InMemoryEventStreams`] for tests and local runs,
//! and [`PgEventStreams`] backed by PostgreSQL.

pub mod aggregate_store;
pub mod in_memory;
pub mod pg_event_streams;

pub use aggregate_store::{AggregateStore, AggregateStoreConfig};
pub use in_memory::InMemoryEventStreams;
pub use pg_event_streams::PgEventStreams;
