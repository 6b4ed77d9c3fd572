//! In-memory implementation of the `EventStreamBackend` trait.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use storefront_core::error::StreamError;
use storefront_core::stream::{
    AppendResult, EventStreamBackend, ExpectedRevision, ProposedEvent, RecordedEvent,
    RecordedEventStream,
};

/// Process-local event streams with the same conditional-append semantics as
/// the durable backend.
#[derive(Debug, Default)]
pub struct InMemoryEventStreams {
    streams: RwLock<HashMap<String, Vec<RecordedEvent>>>,
}

impl InMemoryEventStreams {
    /// Creates an empty set of streams.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every event in `stream_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Unavailable` if the lock is poisoned.
    pub fn stream_events(&self, stream_id: &str) -> Result<Vec<RecordedEvent>, StreamError> {
        let streams = self.streams.read().map_err(poisoned)?;
        Ok(streams.get(stream_id).cloned().unwrap_or_default())
    }

    fn snapshot(
        &self,
        stream_id: &str,
        select: impl FnOnce(&[RecordedEvent]) -> Vec<RecordedEvent>,
    ) -> Result<Vec<RecordedEvent>, StreamError> {
        let streams = self.streams.read().map_err(poisoned)?;
        match streams.get(stream_id) {
            Some(events) => Ok(select(events)),
            None => Err(StreamError::NotFound(stream_id.to_owned())),
        }
    }
}

fn poisoned<T>(_: PoisonError<T>) -> StreamError {
    StreamError::Unavailable("in-memory stream lock poisoned".into())
}

fn take_count(max_count: u64) -> usize {
    usize::try_from(max_count).unwrap_or(usize::MAX)
}

#[async_trait]
impl EventStreamBackend for InMemoryEventStreams {
    async fn read_stream_forward<'a>(
        &'a self,
        stream_id: &'a str,
        from_revision: u64,
        max_count: u64,
    ) -> Result<RecordedEventStream<'a>, StreamError> {
        let events = self.snapshot(stream_id, |events| {
            events
                .iter()
                .filter(|e| e.revision >= from_revision)
                .take(take_count(max_count))
                .cloned()
                .collect()
        })?;
        Ok(stream::iter(events.into_iter().map(Ok)).boxed())
    }

    async fn read_stream_backward<'a>(
        &'a self,
        stream_id: &'a str,
        max_count: u64,
    ) -> Result<RecordedEventStream<'a>, StreamError> {
        let events = self.snapshot(stream_id, |events| {
            events
                .iter()
                .rev()
                .take(take_count(max_count))
                .cloned()
                .collect()
        })?;
        Ok(stream::iter(events.into_iter().map(Ok)).boxed())
    }

    async fn append_to_stream(
        &self,
        stream_id: &str,
        expected: ExpectedRevision,
        events: Vec<ProposedEvent>,
    ) -> Result<AppendResult, StreamError> {
        let mut streams = self.streams.write().map_err(poisoned)?;
        let actual = streams
            .get(stream_id)
            .and_then(|existing| existing.last())
            .map(|last| last.revision);

        if !expected.is_satisfied_by(actual) {
            return Err(StreamError::WrongExpectedRevision {
                stream_id: stream_id.to_owned(),
                expected,
                actual,
            });
        }

        let stream = streams.entry(stream_id.to_owned()).or_default();
        let mut next = actual.map_or(0, |revision| revision + 1);
        for event in events {
            stream.push(event.into_recorded(stream_id, next));
            next += 1;
        }

        // An empty batch against a new stream leaves no stream behind.
        if stream.is_empty() {
            streams.remove(stream_id);
        }

        Ok(AppendResult {
            next_expected_revision: next.saturating_sub(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use futures::TryStreamExt;
    use storefront_core::stream::READ_ALL;
    use uuid::Uuid;

    use super::*;

    fn proposed(event_type: &str) -> ProposedEvent {
        ProposedEvent {
            event_id: Uuid::new_v4(),
            event_type: event_type.to_owned(),
            payload: serde_json::json!({"key": "value"}),
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_append_to_new_stream_assigns_revisions_from_zero() {
        // Arrange
        let streams = InMemoryEventStreams::new();

        // Act
        let result = streams
            .append_to_stream(
                "order-1",
                ExpectedRevision::NoStream,
                vec![proposed("a"), proposed("b")],
            )
            .await
            .unwrap();

        // Assert
        assert_eq!(result.next_expected_revision, 1);
        let events = streams.stream_events("order-1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].revision, 0);
        assert_eq!(events[1].revision, 1);
        assert_eq!(events[0].stream_id, "order-1");
    }

    #[tokio::test]
    async fn test_no_stream_rejected_when_stream_exists() {
        // Arrange
        let streams = InMemoryEventStreams::new();
        streams
            .append_to_stream("order-1", ExpectedRevision::NoStream, vec![proposed("a")])
            .await
            .unwrap();

        // Act
        let result = streams
            .append_to_stream("order-1", ExpectedRevision::NoStream, vec![proposed("b")])
            .await;

        // Assert
        assert_eq!(
            result,
            Err(StreamError::WrongExpectedRevision {
                stream_id: "order-1".into(),
                expected: ExpectedRevision::NoStream,
                actual: Some(0),
            })
        );
        assert_eq!(streams.stream_events("order-1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exact_revision_rejected_when_stale() {
        // Arrange
        let streams = InMemoryEventStreams::new();
        streams
            .append_to_stream(
                "order-1",
                ExpectedRevision::NoStream,
                vec![proposed("a"), proposed("b")],
            )
            .await
            .unwrap();

        // Act
        let stale = streams
            .append_to_stream("order-1", ExpectedRevision::Exact(0), vec![proposed("c")])
            .await;
        let current = streams
            .append_to_stream("order-1", ExpectedRevision::Exact(1), vec![proposed("d")])
            .await;

        // Assert
        assert!(matches!(
            stale,
            Err(StreamError::WrongExpectedRevision {
                actual: Some(1),
                ..
            })
        ));
        assert_eq!(current.unwrap().next_expected_revision, 2);
        let types: Vec<String> = streams
            .stream_events("order-1")
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(types, ["a", "b", "d"]);
    }

    #[tokio::test]
    async fn test_exact_revision_rejected_when_stream_missing() {
        let streams = InMemoryEventStreams::new();

        let result = streams
            .append_to_stream("order-1", ExpectedRevision::Exact(0), vec![proposed("a")])
            .await;

        assert!(matches!(
            result,
            Err(StreamError::WrongExpectedRevision { actual: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_reads_report_missing_stream() {
        let streams = InMemoryEventStreams::new();

        let forward = streams.read_stream_forward("nope", 0, READ_ALL).await;
        let backward = streams.read_stream_backward("nope", 1).await;

        assert!(matches!(forward, Err(StreamError::NotFound(id)) if id == "nope"));
        assert!(matches!(backward, Err(StreamError::NotFound(id)) if id == "nope"));
    }

    #[tokio::test]
    async fn test_forward_and_backward_reads_respect_order_and_count() {
        // Arrange
        let streams = InMemoryEventStreams::new();
        streams
            .append_to_stream(
                "order-1",
                ExpectedRevision::NoStream,
                vec![proposed("a"), proposed("b"), proposed("c")],
            )
            .await
            .unwrap();

        // Act
        let forward: Vec<RecordedEvent> = streams
            .read_stream_forward("order-1", 1, READ_ALL)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let backward: Vec<RecordedEvent> = streams
            .read_stream_backward("order-1", 1)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        // Assert
        let forward_revisions: Vec<u64> = forward.iter().map(|e| e.revision).collect();
        assert_eq!(forward_revisions, [1, 2]);
        assert_eq!(backward.len(), 1);
        assert_eq!(backward[0].revision, 2);
        assert_eq!(backward[0].event_type, "c");
    }

    #[tokio::test]
    async fn test_empty_append_to_new_stream_creates_nothing() {
        let streams = InMemoryEventStreams::new();

        streams
            .append_to_stream("order-1", ExpectedRevision::NoStream, vec![])
            .await
            .unwrap();

        assert!(streams.read_stream_backward("order-1", 1).await.is_err());
    }
}
