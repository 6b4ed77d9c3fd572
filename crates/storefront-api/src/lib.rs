//! Storefront API: HTTP surface of the orders service.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;
