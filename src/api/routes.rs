use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;
use crate::triggers::send_message;

use super::health::{health, service_info, stats};
use super::metrics::prometheus_metrics;
use super::sessions::list_sessions;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(service_info))
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Control plane
        .nest(
            "/api",
            Router::new()
                .route("/send-message", post(send_message))
                .route("/sessions", get(list_sessions)),
        )
}
