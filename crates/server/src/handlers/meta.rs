//! Health and capability discovery handlers.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;
use serde_json::{Value, json};

/// Capability discovery response.
#[derive(Debug, Serialize)]
pub struct CapabilitiesResponse {
    /// API version identifier.
    pub api_version: &'static str,
    /// Largest accepted chunk payload in bytes.
    pub max_chunk_size: u64,
    /// Suggested client-side parallel chunk uploads.
    pub max_parallel_chunks: u32,
}

/// GET /v1/health - liveness probe.
///
/// Intentionally unauthenticated and dependency-free: upload clients use it
/// to decide whether a failed chunk transfer is worth retrying.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /v1/capabilities - server limits for client self-configuration.
pub async fn get_capabilities(State(state): State<AppState>) -> Json<CapabilitiesResponse> {
    Json(CapabilitiesResponse {
        api_version: "v1",
        max_chunk_size: state.config.server.max_chunk_size,
        max_parallel_chunks: state.config.server.max_parallel_chunks,
    })
}
