//! Liveness, readiness, and health probes.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

/// Health check payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status string.
    pub status: &'static str,
    /// When the check ran.
    pub timestamp: DateTime<Utc>,
    /// Service version.
    pub version: &'static str,
}

/// Reports overall service health.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: state.clock.now(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness probe: can the store answer a query?
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    match state.batches.open_batches().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Liveness probe: is the process responding at all?
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}
