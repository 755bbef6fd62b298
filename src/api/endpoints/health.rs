//! Health check endpoint.

use axum::Json;
use serde::Serialize;

use crate::api::types::Envelope;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /api/health`: liveness probe.
pub async fn check() -> Json<Envelope<HealthResponse>> {
    Json(Envelope::ok(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
    }))
}
