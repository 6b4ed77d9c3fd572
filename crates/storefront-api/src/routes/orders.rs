//! Routes for the Orders bounded context.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Json, Router, routing::get, routing::post};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use storefront_orders::application::command_handlers::{self, CommandReceipt};
use storefront_orders::application::query_handlers::{self, OrderView};
use storefront_orders::domain::commands;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Identifier for the new order; generated when omitted.
    #[serde(default)]
    pub order_id: Option<String>,
    /// Order total in minor currency units.
    pub total: u64,
}

/// Request body for POST /{order_id}/cancel.
#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderRequest {
    /// Why the order is being cancelled.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Response body returned after a command is successfully handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// The order the command targeted.
    pub order_id: String,
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
    /// Order version after the command.
    pub version: u64,
}

impl From<CommandReceipt> for CommandResponse {
    fn from(receipt: CommandReceipt) -> Self {
        Self {
            order_id: receipt.order_id,
            event_ids: receipt.event_ids,
            version: receipt.version,
        }
    }
}

/// POST /
#[instrument(skip_all, fields(order_id))]
async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let command = commands::CreateOrder {
        correlation_id: Uuid::new_v4(),
        order_id: request
            .order_id
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        total: request.total,
    };
    tracing::Span::current().record("order_id", command.order_id.as_str());

    info!(correlation_id = %command.correlation_id, "handling create_order command");

    let receipt = command_handlers::handle_create_order(
        &command,
        state.clock.as_ref(),
        &state.aggregate_store,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(receipt.into())))
}

/// POST /{order_id}/pay
#[instrument(skip(state))]
async fn pay_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::PayOrder {
        correlation_id: Uuid::new_v4(),
        order_id,
    };

    info!(correlation_id = %command.correlation_id, "handling pay_order command");

    let receipt = command_handlers::handle_pay_order(
        &command,
        state.clock.as_ref(),
        &state.aggregate_store,
        state.retry_policy,
    )
    .await?;

    Ok(Json(receipt.into()))
}

/// POST /{order_id}/ship
#[instrument(skip(state))]
async fn ship_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::ShipOrder {
        correlation_id: Uuid::new_v4(),
        order_id,
    };

    info!(correlation_id = %command.correlation_id, "handling ship_order command");

    let receipt = command_handlers::handle_ship_order(
        &command,
        state.clock.as_ref(),
        &state.aggregate_store,
        state.retry_policy,
    )
    .await?;

    Ok(Json(receipt.into()))
}

/// POST /{order_id}/cancel
#[instrument(skip(state, request))]
async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(request): Json<CancelOrderRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::CancelOrder {
        correlation_id: Uuid::new_v4(),
        order_id,
        reason: request.reason,
    };

    info!(correlation_id = %command.correlation_id, "handling cancel_order command");

    let receipt = command_handlers::handle_cancel_order(
        &command,
        state.clock.as_ref(),
        &state.aggregate_store,
        state.retry_policy,
    )
    .await?;

    Ok(Json(receipt.into()))
}

/// GET /{order_id}
#[instrument(skip(state))]
async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let view = query_handlers::get_order_by_id(&order_id, &state.aggregate_store).await?;
    Ok(Json(view))
}

/// HEAD /{order_id}
#[instrument(skip(state))]
async fn order_exists(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    query_handlers::order_exists(&order_id, &state.aggregate_store).await?;
    Ok(StatusCode::OK)
}

/// Returns the router for the orders context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/{order_id}", get(get_order).head(order_exists))
        .route("/{order_id}/pay", post(pay_order))
        .route("/{order_id}/ship", post(ship_order))
        .route("/{order_id}/cancel", post(cancel_order))
}
