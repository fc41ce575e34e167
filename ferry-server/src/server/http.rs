use super::Server;
use crate::replication::FollowerStatus;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Create the Axum router for the status endpoints
pub fn create_router(server: Arc<Server>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/replication", get(replication_status))
        .route("/stats", get(data_stats))
        .route("/metrics", get(metrics_handler))
        .with_state(server)
        .layer(TraceLayer::new_for_http())
}

/// GET /health
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "ferry",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /replication - follow target, session status and registered followers
async fn replication_status(State(server): State<Arc<Server>>) -> Json<FollowerStatus> {
    Json(server.follower_status().await)
}

/// GET /stats - key/value store and pub/sub counters
async fn data_stats(State(server): State<Arc<Server>>) -> Json<serde_json::Value> {
    let state = server.state().read().await;
    Json(serde_json::json!({
        "kv": state.db.kv().stats(),
        "pubsub": state.db.pubsub().stats(),
    }))
}

/// GET /metrics - Prometheus metrics endpoint
async fn metrics_handler() -> impl IntoResponse {
    match crate::metrics::encode_metrics() {
        Ok(metrics) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            metrics,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}
