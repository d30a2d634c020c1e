use axum::Json;
use serde_json::{json, Value};

/// GET /health
/// Liveness only; platform readiness is reported by `/api/v1/session`.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "resumind-api"
    }))
}
