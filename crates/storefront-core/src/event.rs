//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::stream::{ProposedEvent, RecordedEvent};

/// Metadata attached to every domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Type name for deserialization routing.
    pub event_type: String,
    /// Aggregate/stream this event belongs to.
    pub aggregate_id: String,
    /// Correlation ID for tracing a command through its effects.
    pub correlation_id: Uuid,
    /// Causation ID linking this event to the event/command that caused it.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

impl EventMetadata {
    /// Builds the metadata of a historical event from its wire record.
    #[must_use]
    pub fn from_recorded(recorded: &RecordedEvent) -> Self {
        Self {
            event_id: recorded.event_id,
            event_type: recorded.event_type.clone(),
            aggregate_id: recorded.stream_id.clone(),
            correlation_id: recorded.correlation_id,
            causation_id: recorded.causation_id,
            occurred_at: recorded.occurred_at,
        }
    }

    /// Pairs this metadata with a serialized payload in the append format.
    #[must_use]
    pub fn to_proposed(&self, payload: serde_json::Value) -> ProposedEvent {
        ProposedEvent {
            event_id: self.event_id,
            event_type: self.event_type.clone(),
            payload,
            correlation_id: self.correlation_id,
            causation_id: self.causation_id,
            occurred_at: self.occurred_at,
        }
    }
}

/// Trait that all domain events implement.
///
/// The conversions in both directions belong to the event layer: the aggregate
/// store only moves wire records around and never inspects payloads.
pub trait DomainEvent: Send + Sync + std::fmt::Debug + Sized {
    /// Returns the event type name (used for serialization routing).
    fn event_type(&self) -> &'static str;

    /// Returns the metadata for this event.
    fn metadata(&self) -> &EventMetadata;

    /// Converts the event into the backend's append format.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the payload cannot be encoded.
    fn to_proposed(&self) -> Result<ProposedEvent, DomainError>;

    /// Rebuilds a domain event from a persisted wire record.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` for type names this event type
    /// does not recognise and `DomainError::Serialization` for payloads that
    /// do not decode.
    fn from_recorded(recorded: &RecordedEvent) -> Result<Self, DomainError>;
}
