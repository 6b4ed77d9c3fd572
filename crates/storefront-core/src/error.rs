//! Error types shared across the workspace.

use std::fmt;

use thiserror::Error;

use crate::stream::ExpectedRevision;

/// Errors reported by an event stream backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The stream has never been written to.
    #[error("stream not found: {0}")]
    NotFound(String),

    /// The conditional append was rejected.
    #[error(
        "wrong expected revision on stream {stream_id}: expected {expected}, found {}",
        describe_tail(.actual.as_ref())
    )]
    WrongExpectedRevision {
        /// The stream the append targeted.
        stream_id: String,
        /// The token supplied with the append.
        expected: ExpectedRevision,
        /// The stream's last revision at append time (`None` if absent).
        actual: Option<u64>,
    },

    /// Network, storage or any other backend-internal failure.
    #[error("event store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by aggregates and their events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A command was rejected by a business rule.
    #[error("validation error: {0}")]
    Validation(String),

    /// The aggregate cannot move to the requested state.
    #[error("invalid transition: cannot {action} when {state}")]
    InvalidTransition {
        /// What was attempted.
        action: &'static str,
        /// The state the aggregate was in.
        state: String,
    },

    /// A recorded event carries a type name nobody dispatches on.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// A payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// The backend interaction an aggregate store error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    /// Forward read of a whole stream during load.
    ReadStream,
    /// Backward read of the most recent event.
    ReadLastEvent,
    /// Conditional append during save.
    AppendToStream,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadStream => "read stream",
            Self::ReadLastEvent => "read last event",
            Self::AppendToStream => "append to stream",
        })
    }
}

/// Errors returned by the aggregate store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The requested stream has no history.
    #[error("{operation}: stream not found: {stream_id}")]
    StreamNotFound {
        /// The failing operation.
        operation: StoreOperation,
        /// The stream that was missing.
        stream_id: String,
    },

    /// Reading a stream failed for any other reason.
    #[error("{operation}: {source}")]
    ReadFailure {
        /// The failing operation.
        operation: StoreOperation,
        /// The backend error.
        #[source]
        source: StreamError,
    },

    /// Another writer appended to the stream first.
    #[error(
        "{operation}: concurrency conflict on stream {stream_id}: expected {expected}, found {}",
        describe_tail(.actual.as_ref())
    )]
    ConcurrencyConflict {
        /// The failing operation. `ReadLastEvent` when the pre-append head
        /// check caught the stale expectation and nothing was appended;
        /// `AppendToStream` when the backend rejected the append itself.
        operation: StoreOperation,
        /// The contended stream.
        stream_id: String,
        /// What the aggregate believed the stream's tail to be.
        expected: ExpectedRevision,
        /// The stream's actual last revision (`None` if absent).
        actual: Option<u64>,
    },

    /// Appending failed for any other reason.
    #[error("{operation}: {source}")]
    AppendFailure {
        /// The failing operation.
        operation: StoreOperation,
        /// The backend error.
        #[source]
        source: StreamError,
    },

    /// The aggregate rejected a historical event.
    #[error("replaying revision {revision} of stream {stream_id}: {source}")]
    ReplayFailure {
        /// The stream being replayed.
        stream_id: String,
        /// Revision of the offending event.
        revision: u64,
        /// The domain error.
        #[source]
        source: DomainError,
    },

    /// `load` was called on an aggregate holding unsaved events.
    ///
    /// Replaying committed history after local events would fold them out of
    /// stream order; reload into a fresh instance instead.
    #[error("refusing to load stream {stream_id}: {pending} uncommitted event(s) pending")]
    UncommittedEvents {
        /// The stream that was to be loaded.
        stream_id: String,
        /// How many unsaved events the aggregate holds.
        pending: usize,
    },

    /// An uncommitted event could not be converted to the append format.
    #[error("encoding event for stream {stream_id}: {source}")]
    EncodingFailure {
        /// The stream being saved.
        stream_id: String,
        /// The domain error.
        #[source]
        source: DomainError,
    },
}

impl StoreError {
    /// Classifies a backend error raised while performing `operation`.
    #[must_use]
    pub fn from_stream(operation: StoreOperation, source: StreamError) -> Self {
        match source {
            StreamError::NotFound(stream_id) => Self::StreamNotFound {
                operation,
                stream_id,
            },
            StreamError::WrongExpectedRevision {
                stream_id,
                expected,
                actual,
            } => Self::ConcurrencyConflict {
                operation,
                stream_id,
                expected,
                actual,
            },
            other if operation == StoreOperation::AppendToStream => Self::AppendFailure {
                operation,
                source: other,
            },
            other => Self::ReadFailure {
                operation,
                source: other,
            },
        }
    }

    /// Returns whether a reload-and-retry may succeed.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Returns whether the error reports a missing stream.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::StreamNotFound { .. })
    }
}

fn describe_tail(actual: Option<&u64>) -> String {
    actual.map_or_else(|| "no stream".to_owned(), |rev| format!("revision {rev}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_classified_as_stream_not_found() {
        let err = StoreError::from_stream(
            StoreOperation::ReadStream,
            StreamError::NotFound("order-1".into()),
        );

        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "read stream: stream not found: order-1");
    }

    #[test]
    fn test_wrong_revision_is_classified_as_conflict() {
        let err = StoreError::from_stream(
            StoreOperation::AppendToStream,
            StreamError::WrongExpectedRevision {
                stream_id: "order-1".into(),
                expected: ExpectedRevision::Exact(1),
                actual: Some(2),
            },
        );

        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "append to stream: concurrency conflict on stream order-1: expected revision 1, found revision 2"
        );
    }

    #[test]
    fn test_unavailable_depends_on_operation() {
        let read = StoreError::from_stream(
            StoreOperation::ReadLastEvent,
            StreamError::Unavailable("connection refused".into()),
        );
        let append = StoreError::from_stream(
            StoreOperation::AppendToStream,
            StreamError::Unavailable("connection refused".into()),
        );

        assert!(matches!(read, StoreError::ReadFailure { .. }));
        assert!(matches!(append, StoreError::AppendFailure { .. }));
        assert_eq!(
            read.to_string(),
            "read last event: event store unavailable: connection refused"
        );
    }

    #[test]
    fn test_conflict_against_missing_stream_mentions_no_stream() {
        let err = StreamError::WrongExpectedRevision {
            stream_id: "order-9".into(),
            expected: ExpectedRevision::Exact(0),
            actual: None,
        };

        assert_eq!(
            err.to_string(),
            "wrong expected revision on stream order-9: expected revision 0, found no stream"
        );
    }
}
