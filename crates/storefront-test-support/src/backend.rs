//! Test backends: mock and instrumented `EventStreamBackend` implementations.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use storefront_core::error::StreamError;
use storefront_core::stream::{
    AppendResult, EventStreamBackend, ExpectedRevision, ProposedEvent, RecordedEventStream,
};

/// A backend that fails every call with `StreamError::Unavailable`. Useful for
/// testing error-handling paths.
#[derive(Debug, Default)]
pub struct FailingEventStreams;

#[async_trait]
impl EventStreamBackend for FailingEventStreams {
    async fn read_stream_forward<'a>(
        &'a self,
        _stream_id: &'a str,
        _from_revision: u64,
        _max_count: u64,
    ) -> Result<RecordedEventStream<'a>, StreamError> {
        Err(StreamError::Unavailable("connection refused".into()))
    }

    async fn read_stream_backward<'a>(
        &'a self,
        _stream_id: &'a str,
        _max_count: u64,
    ) -> Result<RecordedEventStream<'a>, StreamError> {
        Err(StreamError::Unavailable("connection refused".into()))
    }

    async fn append_to_stream(
        &self,
        _stream_id: &str,
        _expected: ExpectedRevision,
        _events: Vec<ProposedEvent>,
    ) -> Result<AppendResult, StreamError> {
        Err(StreamError::Unavailable("connection refused".into()))
    }
}

/// Snapshot of the calls a `CountingEventStreams` has forwarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCalls {
    /// Number of `read_stream_forward` calls.
    pub forward_reads: usize,
    /// Number of `read_stream_backward` calls.
    pub backward_reads: usize,
    /// Number of `append_to_stream` calls.
    pub appends: usize,
}

impl BackendCalls {
    /// Total number of backend round-trips.
    #[must_use]
    pub fn total(&self) -> usize {
        self.forward_reads + self.backward_reads + self.appends
    }
}

/// Wraps another backend and counts every call before delegating to it.
#[derive(Debug, Default)]
pub struct CountingEventStreams<B> {
    inner: B,
    forward_reads: AtomicUsize,
    backward_reads: AtomicUsize,
    appends: AtomicUsize,
}

impl<B> CountingEventStreams<B> {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            forward_reads: AtomicUsize::new(0),
            backward_reads: AtomicUsize::new(0),
            appends: AtomicUsize::new(0),
        }
    }

    /// Returns the wrapped backend.
    #[must_use]
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Returns the calls forwarded so far.
    #[must_use]
    pub fn calls(&self) -> BackendCalls {
        BackendCalls {
            forward_reads: self.forward_reads.load(Ordering::SeqCst),
            backward_reads: self.backward_reads.load(Ordering::SeqCst),
            appends: self.appends.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl<B: EventStreamBackend> EventStreamBackend for CountingEventStreams<B> {
    async fn read_stream_forward<'a>(
        &'a self,
        stream_id: &'a str,
        from_revision: u64,
        max_count: u64,
    ) -> Result<RecordedEventStream<'a>, StreamError> {
        self.forward_reads.fetch_add(1, Ordering::SeqCst);
        self.inner
            .read_stream_forward(stream_id, from_revision, max_count)
            .await
    }

    async fn read_stream_backward<'a>(
        &'a self,
        stream_id: &'a str,
        max_count: u64,
    ) -> Result<RecordedEventStream<'a>, StreamError> {
        self.backward_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_stream_backward(stream_id, max_count).await
    }

    async fn append_to_stream(
        &self,
        stream_id: &str,
        expected: ExpectedRevision,
        events: Vec<ProposedEvent>,
    ) -> Result<AppendResult, StreamError> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        self.inner
            .append_to_stream(stream_id, expected, events)
            .await
    }
}
