//! Storefront API server entry point.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use storefront_core::clock::SystemClock;
use storefront_core::stream::EventStreamBackend;
use storefront_event_store::{AggregateStore, InMemoryEventStreams, PgEventStreams};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use storefront_api::config::AppConfig;
use storefront_api::error::AppError;
use storefront_api::routes;
use storefront_api::state::AppState;
use storefront_api::telemetry;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let _telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    tracing::info!("Starting Storefront API server");

    let (backend, event_store): (Arc<dyn EventStreamBackend>, &'static str) =
        match &config.database_url {
            Some(database_url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.database_max_connections)
                    .connect(database_url)
                    .await?;
                let streams = PgEventStreams::new(pool);
                streams.run_migrations().await?;
                (Arc::new(streams), "postgres")
            }
            None => {
                tracing::warn!("DATABASE_URL not set, events are kept in memory only");
                (Arc::new(InMemoryEventStreams::new()), "in-memory")
            }
        };

    let aggregate_store = AggregateStore::with_config(backend, config.store);
    let app_state = AppState::new(
        Arc::new(SystemClock),
        aggregate_store,
        config.retry,
        event_store,
    );

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = routes::app_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.bind_addr()?;
    tracing::info!(%addr, event_store, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
