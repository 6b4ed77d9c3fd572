//! Route modules.

pub mod health;
pub mod orders;

use axum::Router;

use crate::state::AppState;

/// Builds the full application router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest("/api/v1/orders", orders::router())
        .with_state(state)
}
