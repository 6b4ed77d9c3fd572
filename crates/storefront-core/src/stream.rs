//! Event stream backend port.
//!
//! The aggregate store talks to durable storage only through
//! [`EventStreamBackend`]: an append-only, per-stream log that supports
//! forward reads, backward reads from the tail and conditional appends guarded
//! by an [`ExpectedRevision`].

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StreamError;

/// Read count meaning "the whole stream".
pub const READ_ALL: u64 = u64::MAX;

/// Optimistic-concurrency token supplied with every append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedRevision {
    /// The stream must not exist yet.
    NoStream,
    /// The stream's last event must have exactly this revision.
    Exact(u64),
}

impl ExpectedRevision {
    /// Returns whether a stream whose last revision is `actual` (`None` for a
    /// missing stream) satisfies this expectation.
    #[must_use]
    pub fn is_satisfied_by(self, actual: Option<u64>) -> bool {
        match self {
            Self::NoStream => actual.is_none(),
            Self::Exact(revision) => actual == Some(revision),
        }
    }
}

impl fmt::Display for ExpectedRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoStream => f.write_str("no stream"),
            Self::Exact(revision) => write!(f, "revision {revision}"),
        }
    }
}

/// Stored representation of a domain event, as read back from a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Stream (aggregate identifier) this event belongs to.
    pub stream_id: String,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Zero-based position within the stream, assigned on append.
    pub revision: u64,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

/// An event on its way into a stream. The backend assigns the revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

impl ProposedEvent {
    /// Turns the proposal into the record a backend stores at `revision`.
    #[must_use]
    pub fn into_recorded(self, stream_id: &str, revision: u64) -> RecordedEvent {
        RecordedEvent {
            event_id: self.event_id,
            stream_id: stream_id.to_owned(),
            event_type: self.event_type,
            payload: self.payload,
            revision,
            correlation_id: self.correlation_id,
            causation_id: self.causation_id,
            occurred_at: self.occurred_at,
        }
    }
}

/// Outcome of a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResult {
    /// Revision of the last event written; the token for the next append.
    pub next_expected_revision: u64,
}

/// Server-streamed sequence of recorded events.
///
/// Dropping the stream releases whatever cursor the backend holds for it.
pub type RecordedEventStream<'a> = BoxStream<'a, Result<RecordedEvent, StreamError>>;

/// Append-only, per-stream event log.
///
/// A missing stream is reported as [`StreamError::NotFound`], either when the
/// read is opened or as the first item of the returned stream.
#[async_trait]
pub trait EventStreamBackend: Send + Sync {
    /// Reads up to `max_count` events oldest-first, starting at
    /// `from_revision`. Pass [`READ_ALL`] to read the remainder of the stream.
    async fn read_stream_forward<'a>(
        &'a self,
        stream_id: &'a str,
        from_revision: u64,
        max_count: u64,
    ) -> Result<RecordedEventStream<'a>, StreamError>;

    /// Reads up to `max_count` events newest-first, starting at the end of the
    /// stream.
    async fn read_stream_backward<'a>(
        &'a self,
        stream_id: &'a str,
        max_count: u64,
    ) -> Result<RecordedEventStream<'a>, StreamError>;

    /// Appends `events` atomically if the stream matches `expected`.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::WrongExpectedRevision` when the stream's actual
    /// state does not match `expected`; nothing is written in that case.
    async fn append_to_stream(
        &self,
        stream_id: &str,
        expected: ExpectedRevision,
        events: Vec<ProposedEvent>,
    ) -> Result<AppendResult, StreamError>;
}
