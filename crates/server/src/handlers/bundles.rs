//! Bundle upload control plane handlers.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{BYTES_RECEIVED, CHUNKS_RECEIVED};
use crate::process;
use crate::state::AppState;
use airlock_core::MAX_TOTAL_CHUNKS;
use airlock_core::bundle::{
    BundleId, BundleState, BundleStatusResponse, ChunkStatus, ProcessRequest, ProcessResponse,
};
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use serde::Deserialize;

/// Additional buffer for chunk uploads beyond the max chunk size, covering
/// HTTP framing overhead before the strict size check runs.
const CHUNK_UPLOAD_BUFFER: usize = 1024;

/// Query parameters carrying the expected chunk count.
#[derive(Debug, Deserialize)]
pub struct TotalChunksQuery {
    /// Total number of chunks the bundle was split into.
    pub total: u32,
}

fn parse_bundle_id(id: &str) -> ApiResult<BundleId> {
    BundleId::parse(id).map_err(ApiError::Core)
}

fn validate_total(total: u32) -> ApiResult<()> {
    if total == 0 || total > MAX_TOTAL_CHUNKS {
        return Err(ApiError::Core(airlock_core::Error::InvalidChunkCount {
            count: total,
            max: MAX_TOTAL_CHUNKS,
        }));
    }
    Ok(())
}

/// PUT /v1/bundles/{id}/chunks/{index}?total=N - store one chunk.
///
/// Chunks may arrive out of order and concurrently; re-uploading an index is
/// an idempotent overwrite.
#[tracing::instrument(skip(state, req), fields(bundle_id = %id, chunk_index = index))]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, u32)>,
    Query(query): Query<TotalChunksQuery>,
    req: Request,
) -> ApiResult<StatusCode> {
    let bundle = parse_bundle_id(&id)?;
    validate_total(query.total)?;
    if index >= query.total {
        return Err(ApiError::Core(airlock_core::Error::ChunkIndexOutOfRange {
            index,
            total: query.total,
        }));
    }

    let max_chunk_size = state.config.server.max_chunk_size as usize;
    let data = axum::body::to_bytes(req.into_body(), max_chunk_size + CHUNK_UPLOAD_BUFFER)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read chunk: {e}")))?;

    if data.is_empty() {
        return Err(ApiError::BadRequest("chunk payload is empty".to_string()));
    }
    if data.len() > max_chunk_size {
        return Err(ApiError::BadRequest(format!(
            "chunk size {} exceeds maximum {}",
            data.len(),
            max_chunk_size
        )));
    }

    let size = data.len() as u64;
    state.staging.put_chunk(&bundle, index, data).await?;

    CHUNKS_RECEIVED.inc();
    BYTES_RECEIVED.inc_by(size);
    Ok(StatusCode::OK)
}

/// GET /v1/bundles/{id}/chunks?total=N - existence check.
///
/// Used both to resume an interrupted upload (the client skips stored
/// chunks) and to short-circuit re-processing.
#[tracing::instrument(skip(state), fields(bundle_id = %id))]
pub async fn chunk_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TotalChunksQuery>,
) -> ApiResult<Json<ChunkStatus>> {
    let bundle = parse_bundle_id(&id)?;
    validate_total(query.total)?;

    let status = state.staging.chunk_status(&bundle, query.total).await?;
    Ok(Json(status))
}

/// GET /v1/bundles/{id} - session state for diagnostics.
#[tracing::instrument(skip(state), fields(bundle_id = %id))]
pub async fn get_bundle(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<BundleStatusResponse>> {
    let bundle = parse_bundle_id(&id)?;

    let received_chunks = state.staging.received_count(&bundle).await?;
    let state_value = if state.staging.load_outcome(&bundle).await?.is_some() {
        BundleState::Succeeded
    } else if state.jobs.is_running(&bundle) {
        BundleState::Running
    } else {
        BundleState::Pending
    };

    if received_chunks == 0 && state_value == BundleState::Pending {
        return Err(ApiError::NotFound(format!("bundle {id} not found")));
    }

    Ok(Json(BundleStatusResponse {
        state: state_value,
        received_chunks,
    }))
}

/// POST /v1/bundles/{id}/process - trigger processing.
///
/// Idempotent under duplicate invocation: an already-processed bundle is a
/// fast-path success, and concurrent calls result in exactly one extraction.
#[tracing::instrument(skip(state, req), fields(bundle_id = %id))]
pub async fn trigger_process(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ProcessRequest>,
) -> ApiResult<Json<ProcessResponse>> {
    let bundle = parse_bundle_id(&id)?;
    validate_total(req.total_chunks)?;

    if let Some(expected) = &req.sha256 {
        airlock_core::ContentHash::from_hex(expected).map_err(ApiError::Core)?;
    }

    let response = process::process_bundle(&state, &bundle, &req).await?;
    Ok(Json(response))
}
