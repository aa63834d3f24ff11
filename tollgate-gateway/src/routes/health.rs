//! Health check.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::Json;
use serde_json::{Value, json};

/// `GET /health`
pub async fn health() -> Json<Value> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    Json(json!({
        "status": "ok",
        "timestamp": timestamp,
        "service": "tollgate-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
