//! `PostgreSQL` implementation of the `EventStreamBackend` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use sqlx::migrate::MigrateError;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use storefront_core::error::StreamError;
use storefront_core::stream::{
    AppendResult, EventStreamBackend, ExpectedRevision, ProposedEvent, RecordedEvent,
    RecordedEventStream,
};
use tracing::debug;
use uuid::Uuid;

const READ_FORWARD: &str = "SELECT stream_id, revision, event_id, event_type, payload, \
     correlation_id, causation_id, occurred_at \
     FROM stream_events WHERE stream_id = $1 AND revision >= $2 \
     ORDER BY revision ASC LIMIT $3";

const READ_BACKWARD: &str = "SELECT stream_id, revision, event_id, event_type, payload, \
     correlation_id, causation_id, occurred_at \
     FROM stream_events WHERE stream_id = $1 \
     ORDER BY revision DESC LIMIT $2";

const LAST_REVISION: &str = "SELECT MAX(revision) FROM stream_events WHERE stream_id = $1";

/// Primary key over `(stream_id, revision)`; only its violation is a lost race.
const STREAM_REVISION_KEY: &str = "stream_events_pkey";

/// PostgreSQL-backed event streams stored in the `stream_events` table.
#[derive(Debug, Clone)]
pub struct PgEventStreams {
    pool: PgPool,
}

impl PgEventStreams {
    /// Creates a new `PgEventStreams`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `MigrateError` if a migration fails to apply.
    pub async fn run_migrations(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    async fn last_revision(&self, stream_id: &str) -> Result<Option<u64>, StreamError> {
        let revision: Option<i64> = sqlx::query_scalar(LAST_REVISION)
            .bind(stream_id)
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?;
        revision.map(to_revision).transpose()
    }

    async fn require_stream(&self, stream_id: &str) -> Result<(), StreamError> {
        match self.last_revision(stream_id).await? {
            Some(_) => Ok(()),
            None => Err(StreamError::NotFound(stream_id.to_owned())),
        }
    }
}

fn unavailable(err: sqlx::Error) -> StreamError {
    StreamError::Unavailable(err.to_string())
}

fn is_revision_clash(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db)
            if db.is_unique_violation() && db.constraint() == Some(STREAM_REVISION_KEY)
    )
}

fn to_revision(value: i64) -> Result<u64, StreamError> {
    u64::try_from(value)
        .map_err(|_| StreamError::Unavailable(format!("negative revision {value} in store")))
}

fn to_column(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn decode_row(row: &PgRow) -> Result<RecordedEvent, sqlx::Error> {
    Ok(RecordedEvent {
        stream_id: row.try_get("stream_id")?,
        revision: u64::try_from(row.try_get::<i64, _>("revision")?)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        event_id: row.try_get::<Uuid, _>("event_id")?,
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        correlation_id: row.try_get("correlation_id")?,
        causation_id: row.try_get("causation_id")?,
        occurred_at: row.try_get::<DateTime<Utc>, _>("occurred_at")?,
    })
}

fn into_recorded_stream<'a>(
    rows: futures::stream::BoxStream<'a, Result<PgRow, sqlx::Error>>,
) -> RecordedEventStream<'a> {
    rows.and_then(|row| async move { decode_row(&row) })
        .map_err(unavailable)
        .boxed()
}

async fn insert_event(
    tx: &mut Transaction<'_, Postgres>,
    stream_id: &str,
    revision: u64,
    event: &ProposedEvent,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO stream_events \
         (stream_id, revision, event_id, event_type, payload, correlation_id, causation_id, occurred_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(stream_id)
    .bind(to_column(revision))
    .bind(event.event_id)
    .bind(&event.event_type)
    .bind(&event.payload)
    .bind(event.correlation_id)
    .bind(event.causation_id)
    .bind(event.occurred_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl EventStreamBackend for PgEventStreams {
    async fn read_stream_forward<'a>(
        &'a self,
        stream_id: &'a str,
        from_revision: u64,
        max_count: u64,
    ) -> Result<RecordedEventStream<'a>, StreamError> {
        self.require_stream(stream_id).await?;

        let rows = sqlx::query(READ_FORWARD)
            .bind(stream_id)
            .bind(to_column(from_revision))
            .bind(to_column(max_count))
            .fetch(&self.pool);

        Ok(into_recorded_stream(rows))
    }

    async fn read_stream_backward<'a>(
        &'a self,
        stream_id: &'a str,
        max_count: u64,
    ) -> Result<RecordedEventStream<'a>, StreamError> {
        self.require_stream(stream_id).await?;

        let rows = sqlx::query(READ_BACKWARD)
            .bind(stream_id)
            .bind(to_column(max_count))
            .fetch(&self.pool);

        Ok(into_recorded_stream(rows))
    }

    async fn append_to_stream(
        &self,
        stream_id: &str,
        expected: ExpectedRevision,
        events: Vec<ProposedEvent>,
    ) -> Result<AppendResult, StreamError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        let actual: Option<i64> = sqlx::query_scalar(LAST_REVISION)
            .bind(stream_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(unavailable)?;
        let actual = actual.map(to_revision).transpose()?;

        let conflict = |actual| StreamError::WrongExpectedRevision {
            stream_id: stream_id.to_owned(),
            expected,
            actual,
        };

        if !expected.is_satisfied_by(actual) {
            return Err(conflict(actual));
        }

        let first = actual.map_or(0, |revision| revision + 1);
        let mut next = first;
        for event in &events {
            match insert_event(&mut tx, stream_id, next, event).await {
                Ok(()) => next += 1,
                // A concurrent writer claimed the same revision between our
                // head read and this insert.
                Err(err) if is_revision_clash(&err) => return Err(conflict(Some(next))),
                Err(err) => return Err(unavailable(err)),
            }
        }

        tx.commit().await.map_err(|err| {
            if is_revision_clash(&err) {
                conflict(Some(first))
            } else {
                unavailable(err)
            }
        })?;

        debug!(stream_id, first, count = events.len(), "inserted stream events");

        Ok(AppendResult {
            next_expected_revision: next.saturating_sub(1),
        })
    }
}
