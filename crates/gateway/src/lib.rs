//! HTTP API for braindump.
//!
//! Exposes the ingestion pipeline and read-only views of the store over
//! REST. Built on Axum.

pub mod api_v1;

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tracing::{info, warn};

use braindump_config::AppConfig;
use braindump_pipeline::Ingestor;

pub use api_v1::{ApiState, SharedApiState};

/// Request body limit for every route.
pub const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Build the full router: `/health` plus the v1 API under `/v1`.
///
/// Layers applied:
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the HTTP server and run until the listener fails.
///
/// Builds the store, the model gateway and the ingestor once and shares
/// them across requests.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let store = braindump_store::open(&config.store.backend, &config.store.database_path()).await?;
    let gateway = braindump_providers::build_from_config(&config)?;
    let ingestor = Arc::new(Ingestor::from_config(store, gateway, &config));

    let app = build_router(Arc::new(ApiState::new(ingestor)));

    info!(
        addr = %addr,
        store = %config.store.backend,
        model = %config.provider.default_model,
        "braindump API listening"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    store: String,
    gateway: String,
    gateway_reachable: bool,
    uptime_secs: i64,
}

async fn health_handler(State(state): State<SharedApiState>) -> Json<HealthResponse> {
    let gateway = state.ingestor.gateway();
    let gateway_reachable = gateway
        .health_check()
        .await
        .inspect_err(|e| warn!(gateway = gateway.name(), "Gateway health check failed: {e}"))
        .unwrap_or(false);

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store: state.ingestor.store().name().to_string(),
        gateway: gateway.name().to_string(),
        gateway_reachable,
        uptime_secs: (chrono::Utc::now() - state.start_time).num_seconds(),
    })
}
