use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::AppState;

/// Liveness plus a round trip to the database.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => (StatusCode::OK, "OK"),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database unhealthy")
        }
    }
}
