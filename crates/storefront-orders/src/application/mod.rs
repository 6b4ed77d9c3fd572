//! Application layer for the Orders context.

pub mod command_handlers;
pub mod error;
pub mod query_handlers;
pub mod retry;
