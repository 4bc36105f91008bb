use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::SharedState;

/// Liveness plus a database round trip.
pub async fn health(State(state): State<SharedState>) -> (StatusCode, Json<Value>) {
    let database_up = state.db.health_check().await;
    let status = if database_up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if database_up { "up" } else { "down" },
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
