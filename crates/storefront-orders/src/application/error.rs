//! Errors surfaced by the Orders application layer.

use storefront_core::error::{DomainError, StoreError};
use thiserror::Error;

/// Failure of an Orders command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The order rejected the command.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Loading or saving the order failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CommandError {
    /// Returns whether the command lost an optimistic-concurrency race and a
    /// reload-and-retry may succeed.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_conflict())
    }
}
