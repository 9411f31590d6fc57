//! Liveness endpoint.

use axum::Json;
use chrono::Utc;

use crate::models::HealthResponse;

/// `GET /api/health`: process is up and serving.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: warden_core::version().into(),
        timestamp: Utc::now().to_rfc3339(),
    })
}
