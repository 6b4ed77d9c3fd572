//! Aggregate store: replay-driven loading and revision-guarded saving.

use std::sync::Arc;

use futures::StreamExt;
use storefront_core::aggregate::AggregateRoot;
use storefront_core::error::{StoreError, StoreOperation, StreamError};
use storefront_core::event::DomainEvent;
use storefront_core::stream::{EventStreamBackend, ExpectedRevision, ProposedEvent, READ_ALL};
use tracing::{debug, instrument};

/// Tunables for [`AggregateStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateStoreConfig {
    /// Check the stream's last event before appending to an existing stream.
    ///
    /// The conditional append alone rejects stale writers. The head check also
    /// reports a missing stream for an aggregate that claims prior persistence,
    /// and fails a stale save before any append is attempted.
    pub verify_stream_head: bool,
}

impl Default for AggregateStoreConfig {
    fn default() -> Self {
        Self {
            verify_stream_head: true,
        }
    }
}

/// Loads aggregates from, and saves them to, their event streams.
///
/// The store holds no per-aggregate state. Concurrent writers to the same
/// stream are arbitrated by the backend's conditional append: exactly one
/// save wins and the others fail with `StoreError::ConcurrencyConflict`.
/// Retrying is left to the caller.
#[derive(Clone)]
pub struct AggregateStore {
    backend: Arc<dyn EventStreamBackend>,
    config: AggregateStoreConfig,
}

impl std::fmt::Debug for AggregateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AggregateStore {
    /// Creates a store with the default configuration.
    #[must_use]
    pub fn new(backend: Arc<dyn EventStreamBackend>) -> Self {
        Self::with_config(backend, AggregateStoreConfig::default())
    }

    /// Creates a store with an explicit configuration.
    #[must_use]
    pub fn with_config(backend: Arc<dyn EventStreamBackend>, config: AggregateStoreConfig) -> Self {
        Self { backend, config }
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> AggregateStoreConfig {
        self.config
    }

    /// Hydrates `aggregate` by replaying its stream in order.
    ///
    /// Reading starts at `aggregate.persisted_version()`: the beginning of
    /// the stream for a freshly constructed aggregate, the first unseen event
    /// for one loaded earlier. An aggregate holding uncommitted events is
    /// refused, since committed history would be folded after its local
    /// events. On error the aggregate may be partially hydrated and must be
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UncommittedEvents` if the aggregate has unsaved
    /// events, `StoreError::StreamNotFound` if the stream has never been
    /// written, `StoreError::ReadFailure` for other backend failures and
    /// `StoreError::ReplayFailure` if the aggregate rejects an event.
    #[instrument(skip_all, fields(stream_id = %aggregate.aggregate_id()))]
    pub async fn load<A: AggregateRoot>(&self, aggregate: &mut A) -> Result<(), StoreError> {
        let stream_id = aggregate.aggregate_id().to_owned();
        let pending = aggregate.uncommitted_events().len();
        if pending > 0 {
            return Err(StoreError::UncommittedEvents { stream_id, pending });
        }

        let mut events = self
            .backend
            .read_stream_forward(&stream_id, aggregate.persisted_version(), READ_ALL)
            .await
            .map_err(|e| StoreError::from_stream(StoreOperation::ReadStream, e))?;

        while let Some(recorded) = events.next().await {
            let recorded =
                recorded.map_err(|e| StoreError::from_stream(StoreOperation::ReadStream, e))?;
            let replay_failure = |source| StoreError::ReplayFailure {
                stream_id: stream_id.clone(),
                revision: recorded.revision,
                source,
            };

            let event = A::Event::from_recorded(&recorded).map_err(replay_failure)?;
            aggregate.apply(&event).map_err(replay_failure)?;

            debug!(
                revision = recorded.revision,
                event_type = %recorded.event_type,
                "replayed event"
            );
        }

        Ok(())
    }

    /// Appends the aggregate's uncommitted events to its stream.
    ///
    /// An aggregate that has never been persisted is appended with
    /// `ExpectedRevision::NoStream`, so two creators of the same id cannot
    /// both succeed. Otherwise the append expects the stream to end at the
    /// revision the aggregate was loaded at. Uncommitted events are cleared
    /// only after the append succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConcurrencyConflict` if another writer appended
    /// first, `StoreError::StreamNotFound` if a previously persisted
    /// aggregate's stream has disappeared, `StoreError::EncodingFailure` if an
    /// event cannot be encoded, and `ReadFailure` / `AppendFailure` for other
    /// backend failures.
    #[instrument(skip_all, fields(stream_id = %aggregate.aggregate_id()))]
    pub async fn save<A: AggregateRoot>(&self, aggregate: &mut A) -> Result<(), StoreError> {
        if aggregate.uncommitted_events().is_empty() {
            return Ok(());
        }

        let stream_id = aggregate.aggregate_id().to_owned();
        let proposed = aggregate
            .uncommitted_events()
            .iter()
            .map(DomainEvent::to_proposed)
            .collect::<Result<Vec<ProposedEvent>, _>>()
            .map_err(|source| StoreError::EncodingFailure {
                stream_id: stream_id.clone(),
                source,
            })?;

        let expected = match aggregate.persisted_version() {
            0 => ExpectedRevision::NoStream,
            version => {
                let expected = ExpectedRevision::Exact(version - 1);
                if self.config.verify_stream_head {
                    self.verify_stream_head(&stream_id, expected).await?;
                }
                expected
            }
        };

        let count = proposed.len();
        let result = self
            .backend
            .append_to_stream(&stream_id, expected, proposed)
            .await
            .map_err(|e| StoreError::from_stream(StoreOperation::AppendToStream, e))?;

        aggregate.clear_uncommitted_events();

        debug!(
            %expected,
            next_expected_revision = result.next_expected_revision,
            count,
            "appended events"
        );

        Ok(())
    }

    /// Succeeds if `stream_id` holds at least one event.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::StreamNotFound` if the stream does not exist and
    /// `StoreError::ReadFailure` for other backend failures.
    #[instrument(skip(self))]
    pub async fn exists(&self, stream_id: &str) -> Result<(), StoreError> {
        self.last_revision(stream_id).await.map(|_| ())
    }

    /// Reads the revision of the stream's most recent event.
    async fn last_revision(&self, stream_id: &str) -> Result<u64, StoreError> {
        let read_failure = |e| StoreError::from_stream(StoreOperation::ReadLastEvent, e);
        let mut events = self
            .backend
            .read_stream_backward(stream_id, 1)
            .await
            .map_err(read_failure)?;

        match events.next().await {
            Some(Ok(last)) => Ok(last.revision),
            Some(Err(e)) => Err(read_failure(e)),
            None => Err(read_failure(StreamError::NotFound(stream_id.to_owned()))),
        }
    }

    async fn verify_stream_head(
        &self,
        stream_id: &str,
        expected: ExpectedRevision,
    ) -> Result<(), StoreError> {
        let actual = self.last_revision(stream_id).await?;
        if expected.is_satisfied_by(Some(actual)) {
            return Ok(());
        }

        Err(StoreError::ConcurrencyConflict {
            operation: StoreOperation::ReadLastEvent,
            stream_id: stream_id.to_owned(),
            expected,
            actual: Some(actual),
        })
    }
}
