//! HTTP surface of the relay.
//!
//! | Route      | Purpose                                   |
//! |------------|-------------------------------------------|
//! | `/live`    | Client WebSocket, one relay session each  |
//! | `/healthz` | Liveness probe                            |
//! | `/metrics` | Prometheus text exposition                |
//!
//! CORS is permissive: browser clients connect from arbitrary origins.

pub mod metrics;
pub mod settings;
pub mod ws;

pub use settings::{Settings, SettingsError};

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use livebridge_link::TokenProvider;

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    /// Resolved server configuration.
    pub settings: Arc<Settings>,
    /// Bearer-token source for upstream connections.
    pub tokens: Arc<dyn TokenProvider>,
    /// Handle for rendering `/metrics`; absent when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// State with the token provider implied by the settings.
    pub fn new(settings: Settings, metrics: Option<PrometheusHandle>) -> Self {
        let tokens = settings.token_provider();
        Self { settings: Arc::new(settings), tokens, metrics }
    }
}

/// The complete router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/live", get(ws::live_handler))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
