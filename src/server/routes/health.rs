//! Health/readiness probe.

use axum::Json;
use axum::response::IntoResponse;

/// Lightweight readiness probe: no auth, no storage access.
pub async fn healthcheck() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
