use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use crate::auth::AppState;

/// GET /liveness: 200 only when the database answers a trivial query.
pub async fn liveness(State(state): State<AppState>) -> impl IntoResponse {
    let result = tokio::task::spawn_blocking(move || state.db.ping()).await;

    match result {
        Ok(Ok(())) => (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))),
        Ok(Err(e)) => {
            error!("Liveness check failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "status": "unavailable" })),
            )
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "status": "unavailable" })),
            )
        }
    }
}
