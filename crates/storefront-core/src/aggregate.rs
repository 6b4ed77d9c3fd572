//! Aggregate root abstraction.

use crate::error::DomainError;
use crate::event::DomainEvent;

/// An aggregate whose committed history lives in a single event stream.
///
/// The aggregate identifier doubles as the stream name. `version` counts every
/// event folded into the aggregate, whether it was replayed from the stream or
/// raised locally by a domain operation and still awaiting persistence.
pub trait AggregateRoot: Send + Sync {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Returns the aggregate identifier (and stream name).
    fn aggregate_id(&self) -> &str;

    /// Returns the current version (number of events applied).
    fn version(&self) -> u64;

    /// Folds one event into the in-memory state and advances the version by
    /// one.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the event cannot be applied to the current
    /// state, e.g. a history that starts with anything other than a creation
    /// event.
    fn apply(&mut self, event: &Self::Event) -> Result<(), DomainError>;

    /// Returns events raised since the last successful save, oldest first.
    fn uncommitted_events(&self) -> &[Self::Event];

    /// Clears uncommitted events after persistence.
    fn clear_uncommitted_events(&mut self);

    /// Version the aggregate had before any uncommitted event was raised.
    ///
    /// Zero means the aggregate has never been persisted.
    fn persisted_version(&self) -> u64 {
        let pending = u64::try_from(self.uncommitted_events().len()).unwrap_or(u64::MAX);
        self.version().saturating_sub(pending)
    }
}
