//! Command handlers for the Orders context.
//!
//! Each handler loads the order through the aggregate store, executes the
//! command and saves the resulting events. Handlers for existing orders reload
//! and retry when the save loses an optimistic-concurrency race.

use backon::Retryable;
use storefront_core::aggregate::AggregateRoot;
use storefront_core::clock::Clock;
use storefront_core::error::{DomainError, StoreError};
use storefront_core::event::DomainEvent;
use storefront_event_store::AggregateStore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::error::CommandError;
use crate::application::retry::RetryPolicy;
use crate::domain::aggregates::Order;
use crate::domain::commands::{CancelOrder, CreateOrder, PayOrder, ShipOrder};

/// What a successfully handled command persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReceipt {
    /// The order the command targeted.
    pub order_id: String,
    /// IDs of the events appended to the order's stream.
    pub event_ids: Vec<Uuid>,
    /// Order version after the save.
    pub version: u64,
}

async fn persist(store: &AggregateStore, order: &mut Order) -> Result<CommandReceipt, StoreError> {
    let event_ids = order
        .uncommitted_events()
        .iter()
        .map(|e| e.metadata().event_id)
        .collect();

    store.save(order).await?;

    Ok(CommandReceipt {
        order_id: order.id.clone(),
        event_ids,
        version: order.version(),
    })
}

/// Loads `order_id`, runs `command` against it and saves, retrying from a
/// fresh load on concurrency conflicts with the backoff `retry` describes.
async fn execute<F>(
    store: &AggregateStore,
    order_id: &str,
    retry: RetryPolicy,
    command: F,
) -> Result<CommandReceipt, CommandError>
where
    F: Fn(&mut Order) -> Result<(), DomainError> + Send + Sync,
{
    let attempt = || async {
        let mut order = Order::new(order_id);
        store.load(&mut order).await?;
        command(&mut order)?;
        Ok::<_, CommandError>(persist(store, &mut order).await?)
    };

    attempt
        .retry(retry.backoff())
        .when(CommandError::is_conflict)
        .notify(|err, delay| {
            warn!(order_id, error = %err, ?delay, "lost concurrency race, reloading order");
        })
        .await
}

/// Handles the `CreateOrder` command: raises `OrderCreated` on a new order and
/// persists it. Creating an id that already has a stream fails with a
/// concurrency conflict; it is never retried.
///
/// # Errors
///
/// Returns `CommandError::Domain` if the order is invalid and
/// `CommandError::Store` if persisting fails.
pub async fn handle_create_order(
    command: &CreateOrder,
    clock: &dyn Clock,
    store: &AggregateStore,
) -> Result<CommandReceipt, CommandError> {
    info!(order_id = %command.order_id, correlation_id = %command.correlation_id, "creating order");

    let mut order = Order::create(
        command.order_id.clone(),
        command.total,
        command.correlation_id,
        clock,
    )?;
    Ok(persist(store, &mut order).await?)
}

/// Handles the `PayOrder` command.
///
/// # Errors
///
/// Returns `CommandError` if the order cannot be loaded, rejects payment, or
/// cannot be saved within the retry policy.
pub async fn handle_pay_order(
    command: &PayOrder,
    clock: &dyn Clock,
    store: &AggregateStore,
    retry: RetryPolicy,
) -> Result<CommandReceipt, CommandError> {
    execute(store, &command.order_id, retry, |order| {
        order.pay(command.correlation_id, clock)
    })
    .await
}

/// Handles the `ShipOrder` command.
///
/// # Errors
///
/// Returns `CommandError` if the order cannot be loaded, rejects shipment, or
/// cannot be saved within the retry policy.
pub async fn handle_ship_order(
    command: &ShipOrder,
    clock: &dyn Clock,
    store: &AggregateStore,
    retry: RetryPolicy,
) -> Result<CommandReceipt, CommandError> {
    execute(store, &command.order_id, retry, |order| {
        order.ship(command.correlation_id, clock)
    })
    .await
}

/// Handles the `CancelOrder` command.
///
/// # Errors
///
/// Returns `CommandError` if the order cannot be loaded, rejects cancellation,
/// or cannot be saved within the retry policy.
pub async fn handle_cancel_order(
    command: &CancelOrder,
    clock: &dyn Clock,
    store: &AggregateStore,
    retry: RetryPolicy,
) -> Result<CommandReceipt, CommandError> {
    execute(store, &command.order_id, retry, |order| {
        order.cancel(command.reason.clone(), command.correlation_id, clock)
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use storefront_core::error::{StoreOperation, StreamError};
    use storefront_core::stream::{
        AppendResult, EventStreamBackend, ExpectedRevision, ProposedEvent, RecordedEventStream,
    };
    use storefront_event_store::InMemoryEventStreams;
    use storefront_test_support::{FailingEventStreams, FixedClock};

    use super::*;
    use crate::domain::aggregates::OrderStatus;
    use crate::domain::events::{OrderEventKind, OrderPaid};

    fn in_memory() -> (Arc<InMemoryEventStreams>, AggregateStore) {
        let streams = Arc::new(InMemoryEventStreams::new());
        (streams.clone(), AggregateStore::new(streams))
    }

    fn create_command(order_id: &str, total: u64) -> CreateOrder {
        CreateOrder {
            correlation_id: Uuid::new_v4(),
            order_id: order_id.to_owned(),
            total,
        }
    }

    async fn load(store: &AggregateStore, order_id: &str) -> Order {
        let mut order = Order::new(order_id);
        store.load(&mut order).await.unwrap();
        order
    }

    #[tokio::test]
    async fn test_create_then_pay_then_reload() {
        // Arrange
        let clock = FixedClock::default();
        let (streams, store) = in_memory();

        // Act: create order-123 and save.
        let mut order = Order::create("order-123", 100, Uuid::new_v4(), &clock).unwrap();
        store.save(&mut order).await.unwrap();
        let after_create = streams.stream_events("order-123").unwrap();

        // Act: pay on a freshly loaded copy and save.
        let mut copy = load(&store, "order-123").await;
        copy.pay(Uuid::new_v4(), &clock).unwrap();
        store.save(&mut copy).await.unwrap();
        let after_pay = streams.stream_events("order-123").unwrap();

        // Assert
        assert_eq!(after_create.len(), 1);
        assert_eq!(after_create[0].revision, 0);
        assert_eq!(after_pay.len(), 2);
        assert_eq!(after_pay[1].revision, 1);

        let reloaded = load(&store, "order-123").await;
        assert_eq!(reloaded.version(), 2);
        assert_eq!(reloaded.status(), Some(OrderStatus::Paid));
        assert_eq!(reloaded.total(), 100);
    }

    #[tokio::test]
    async fn test_stale_writer_conflicts_and_stream_keeps_winner() {
        // Arrange: order-123 created and paid, then loaded twice.
        let clock = FixedClock::default();
        let (streams, store) = in_memory();
        let mut order = Order::create("order-123", 100, Uuid::new_v4(), &clock).unwrap();
        order.pay(Uuid::new_v4(), &clock).unwrap();
        store.save(&mut order).await.unwrap();
        let mut a1 = load(&store, "order-123").await;
        let mut a2 = load(&store, "order-123").await;
        assert_eq!(a1.version(), 2);
        assert_eq!(a2.version(), 2);

        // Act
        a1.ship(Uuid::new_v4(), &clock).unwrap();
        let a1_result = store.save(&mut a1).await;
        a2.cancel(None, Uuid::new_v4(), &clock).unwrap();
        let a2_result = store.save(&mut a2).await;

        // Assert
        assert!(a1_result.is_ok());
        assert_eq!(a1.version(), 3);
        assert!(a2_result.unwrap_err().is_conflict());

        let stored = streams.stream_events("order-123").unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[2].revision, 2);
        assert_eq!(stored[2].event_type, "orders.order_shipped");
        assert_eq!(
            load(&store, "order-123").await.status(),
            Some(OrderStatus::Shipped)
        );
    }

    #[tokio::test]
    async fn test_handle_create_order_persists_order_created_event() {
        // Arrange
        let clock = FixedClock::default();
        let (streams, store) = in_memory();
        let command = create_command("order-1", 250);

        // Act
        let receipt = handle_create_order(&command, &clock, &store)
            .await
            .unwrap();

        // Assert
        assert_eq!(receipt.order_id, "order-1");
        assert_eq!(receipt.version, 1);
        assert_eq!(receipt.event_ids.len(), 1);

        let stored = streams.stream_events("order-1").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_id, receipt.event_ids[0]);
        assert_eq!(stored[0].event_type, "orders.order_created");
        assert_eq!(stored[0].correlation_id, command.correlation_id);
        assert_eq!(stored[0].occurred_at, clock.0);
        assert_eq!(stored[0].payload, serde_json::json!({"total": 250}));
    }

    #[tokio::test]
    async fn test_handle_create_order_twice_is_a_conflict() {
        let clock = FixedClock::default();
        let (_, store) = in_memory();
        handle_create_order(&create_command("order-1", 10), &clock, &store)
            .await
            .unwrap();

        let result = handle_create_order(&create_command("order-1", 20), &clock, &store).await;

        match result {
            Err(CommandError::Store(err)) => assert!(err.is_conflict()),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(load(&store, "order-1").await.total(), 10);
    }

    #[tokio::test]
    async fn test_handle_create_order_rejects_invalid_total_without_writing() {
        let (streams, store) = in_memory();

        let result =
            handle_create_order(&create_command("order-1", 0), &FixedClock::default(), &store)
                .await;

        assert!(matches!(
            result,
            Err(CommandError::Domain(DomainError::Validation(_)))
        ));
        assert!(streams.stream_events("order-1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handle_pay_order_appends_to_existing_stream() {
        // Arrange
        let clock = FixedClock::default();
        let (streams, store) = in_memory();
        handle_create_order(&create_command("order-1", 10), &clock, &store)
            .await
            .unwrap();
        let command = PayOrder {
            correlation_id: Uuid::new_v4(),
            order_id: "order-1".to_owned(),
        };

        // Act
        let receipt = handle_pay_order(&command, &clock, &store, RetryPolicy::default())
            .await
            .unwrap();

        // Assert
        assert_eq!(receipt.version, 2);
        let stored = streams.stream_events("order-1").unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].event_type, "orders.order_paid");
        assert_eq!(stored[1].event_id, receipt.event_ids[0]);
    }

    #[tokio::test]
    async fn test_handle_ship_order_of_unknown_order_is_not_found() {
        let (_, store) = in_memory();
        let command = ShipOrder {
            correlation_id: Uuid::new_v4(),
            order_id: "order-404".to_owned(),
        };

        let result = handle_ship_order(
            &command,
            &FixedClock::default(),
            &store,
            RetryPolicy::default(),
        )
        .await;

        match result {
            Err(CommandError::Store(StoreError::StreamNotFound {
                operation,
                stream_id,
            })) => {
                assert_eq!(operation, StoreOperation::ReadStream);
                assert_eq!(stream_id, "order-404");
            }
            other => panic!("expected StreamNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handle_ship_order_of_pending_order_is_rejected() {
        let clock = FixedClock::default();
        let (_, store) = in_memory();
        handle_create_order(&create_command("order-1", 10), &clock, &store)
            .await
            .unwrap();
        let command = ShipOrder {
            correlation_id: Uuid::new_v4(),
            order_id: "order-1".to_owned(),
        };

        let result = handle_ship_order(&command, &clock, &store, RetryPolicy::default()).await;

        assert!(matches!(
            result,
            Err(CommandError::Domain(DomainError::InvalidTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn test_handler_surfaces_backend_failure() {
        let store = AggregateStore::new(Arc::new(FailingEventStreams));
        let command = PayOrder {
            correlation_id: Uuid::new_v4(),
            order_id: "order-1".to_owned(),
        };

        let result = handle_pay_order(
            &command,
            &FixedClock::default(),
            &store,
            RetryPolicy::default(),
        )
        .await;

        assert!(matches!(
            result,
            Err(CommandError::Store(StoreError::ReadFailure { .. }))
        ));
    }

    /// Lets another writer append one event right before the first append it
    /// forwards, so that append loses the race.
    struct InterferingStreams {
        inner: InMemoryEventStreams,
        competing: Mutex<Option<ProposedEvent>>,
    }

    #[async_trait]
    impl EventStreamBackend for InterferingStreams {
        async fn read_stream_forward<'a>(
            &'a self,
            stream_id: &'a str,
            from_revision: u64,
            max_count: u64,
        ) -> Result<RecordedEventStream<'a>, StreamError> {
            self.inner
                .read_stream_forward(stream_id, from_revision, max_count)
                .await
        }

        async fn read_stream_backward<'a>(
            &'a self,
            stream_id: &'a str,
            max_count: u64,
        ) -> Result<RecordedEventStream<'a>, StreamError> {
            self.inner.read_stream_backward(stream_id, max_count).await
        }

        async fn append_to_stream(
            &self,
            stream_id: &str,
            expected: ExpectedRevision,
            events: Vec<ProposedEvent>,
        ) -> Result<AppendResult, StreamError> {
            let competing = self.competing.lock().unwrap().take();
            if let Some(event) = competing {
                let last = self.inner.stream_events(stream_id)?.last().map(|e| e.revision);
                let token = last.map_or(ExpectedRevision::NoStream, ExpectedRevision::Exact);
                self.inner
                    .append_to_stream(stream_id, token, vec![event])
                    .await?;
            }
            self.inner
                .append_to_stream(stream_id, expected, events)
                .await
        }
    }

    async fn interfered_store() -> (Arc<InterferingStreams>, AggregateStore) {
        let clock = FixedClock::default();
        let streams = Arc::new(InterferingStreams {
            inner: InMemoryEventStreams::new(),
            competing: Mutex::new(None),
        });
        let store = AggregateStore::new(streams.clone());
        let order = handle_create_order(&create_command("order-1", 10), &clock, &store)
            .await
            .unwrap();
        assert_eq!(order.version, 1);

        let mut competitor = load(&store, "order-1").await;
        competitor.pay(Uuid::new_v4(), &clock).unwrap();
        let paid = competitor.uncommitted_events()[0].clone();
        assert_eq!(paid.kind, OrderEventKind::Paid(OrderPaid {}));
        *streams.competing.lock().unwrap() = Some(paid.to_proposed().unwrap());

        (streams, store)
    }

    #[tokio::test]
    async fn test_conflict_is_retried_from_fresh_load() {
        // Arrange
        let (streams, store) = interfered_store().await;
        let command = CancelOrder {
            correlation_id: Uuid::new_v4(),
            order_id: "order-1".to_owned(),
            reason: Some("customer request".to_owned()),
        };
        let retry = RetryPolicy {
            max_attempts: 2,
            min_delay: std::time::Duration::ZERO,
        };

        // Act
        let receipt = handle_cancel_order(&command, &FixedClock::default(), &store, retry)
            .await
            .unwrap();

        // Assert
        assert_eq!(receipt.version, 3);
        let types: Vec<String> = streams
            .inner
            .stream_events("order-1")
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            types,
            [
                "orders.order_created",
                "orders.order_paid",
                "orders.order_cancelled"
            ]
        );
        let reloaded = load(&store, "order-1").await;
        assert_eq!(reloaded.status(), Some(OrderStatus::Cancelled));
        assert_eq!(reloaded.cancellation_reason(), Some("customer request"));
    }

    #[tokio::test]
    async fn test_conflict_without_retry_budget_is_returned() {
        // Arrange
        let (streams, store) = interfered_store().await;
        let command = CancelOrder {
            correlation_id: Uuid::new_v4(),
            order_id: "order-1".to_owned(),
            reason: None,
        };

        // Act
        let result = handle_cancel_order(
            &command,
            &FixedClock::default(),
            &store,
            RetryPolicy::no_retry(),
        )
        .await;

        // Assert
        match result {
            Err(CommandError::Store(err)) => assert!(err.is_conflict()),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(streams.inner.stream_events("order-1").unwrap().len(), 2);
    }
}
