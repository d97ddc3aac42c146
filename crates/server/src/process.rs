//! Bundle processing pipeline.
//!
//! `process_bundle` drives the full chain once all chunks are staged:
//! reassemble -> verify digest -> extract -> resolve image references ->
//! optionally run the configured worker and await its status report ->
//! record the outcome.
//!
//! Processing is idempotent under concurrent duplicate triggers: a per-bundle
//! async mutex in [`JobRegistry`] serializes attempts, and an already
//! recorded outcome short-circuits before any work is repeated.

use crate::extract::{self, ExtractError};
use crate::metrics;
use crate::staging::{StagingError, StoredOutcome};
use crate::state::AppState;
use crate::status::{StatusChannel, StatusChannelError, StatusVerdict};
use airlock_core::bundle::{BundleId, BundleState, ProcessRequest, ProcessResponse};
use airlock_core::image_ref;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use time::OffsetDateTime;

/// Processing error type.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("bundle is incomplete: {missing} chunks missing")]
    Incomplete { missing: usize },

    #[error("bundle digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("status channel failed: {0}")]
    Status(#[from] StatusChannelError),

    #[error("failed to spawn worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("failed to write install manifest: {0}")]
    Manifest(#[source] std::io::Error),
}

/// Result type for processing operations.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

/// Per-bundle locks serializing processing attempts.
///
/// Only one extraction may execute per bundle; losers of a concurrent race
/// block on the mutex and then observe the recorded outcome.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: &BundleId) -> Arc<tokio::sync::Mutex<()>> {
        let mut jobs = self.jobs.lock().expect("job registry poisoned");
        jobs.entry(id.as_str().to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Acquire the processing lock for a bundle, waiting if another attempt
    /// is in flight.
    pub async fn acquire(&self, id: &BundleId) -> tokio::sync::OwnedMutexGuard<()> {
        self.entry(id).lock_owned().await
    }

    /// Check whether a processing attempt currently holds the lock.
    pub fn is_running(&self, id: &BundleId) -> bool {
        self.entry(id).try_lock().is_err()
    }
}

/// One resolved image in the install manifest.
#[derive(Clone, Debug, Serialize)]
pub struct ImageEntry {
    /// Canonical reference, e.g. `quay.io/couches/redis@sha256:abcd`.
    pub name: String,
    /// Compact display form, e.g. `redis@sha256:abcd`.
    pub short_name: String,
}

/// Process a staged bundle end to end.
#[tracing::instrument(skip(state, req), fields(bundle_id = %id))]
pub async fn process_bundle(
    state: &AppState,
    id: &BundleId,
    req: &ProcessRequest,
) -> ProcessResult<ProcessResponse> {
    let _guard = state.jobs.acquire(id).await;
    let timer = metrics::PROCESS_DURATION.start_timer();

    // Fast path: a completed bundle is never re-extracted.
    if let Some(outcome) = state.staging.load_outcome(id).await? {
        metrics::BUNDLES_ALREADY_PROCESSED.inc();
        tracing::info!(bundle_id = %id, "Bundle already processed, skipping");
        timer.observe_duration();
        return Ok(ProcessResponse {
            state: BundleState::Succeeded,
            already_processed: true,
            image_count: outcome.image_count,
        });
    }

    let status = state.staging.chunk_status(id, req.total_chunks).await?;
    if !status.complete {
        metrics::record_process_error("incomplete_upload");
        return Err(ProcessError::Incomplete {
            missing: status.missing.len(),
        });
    }

    let workspace = state.staging.workspace_dir(id).await?;
    let archive = workspace.join("bundle.tar.gz");
    let digest = state
        .staging
        .assemble(id, req.total_chunks, &archive)
        .await?;

    if let Some(expected) = &req.sha256 {
        let actual = digest.to_hex();
        if !expected.eq_ignore_ascii_case(&actual) {
            metrics::record_process_error("digest_mismatch");
            tracing::warn!(
                bundle_id = %id,
                expected = %expected,
                actual = %actual,
                "Reassembled bundle digest mismatch"
            );
            return Err(ProcessError::DigestMismatch {
                expected: expected.to_lowercase(),
                actual,
            });
        }
    }

    let contents = workspace.join("contents");
    let extract_timer = metrics::EXTRACT_DURATION.start_timer();
    let summary = extract::extract_file(&archive, &contents).await.map_err(|e| {
        metrics::record_process_error("extraction_failed");
        e
    })?;
    extract_timer.observe_duration();

    tracing::info!(
        bundle_id = %id,
        files = summary.files_written,
        bytes = summary.bytes_written,
        "Bundle extracted"
    );

    let images = resolve_images(&contents);
    metrics::IMAGES_RESOLVED.inc_by(images.len() as u64);
    write_install_manifest(&workspace, &images).map_err(ProcessError::Manifest)?;

    if state.config.worker.is_enabled() {
        run_worker(state, id, &workspace).await?;
    }

    let outcome = StoredOutcome {
        image_count: images.len(),
        completed_at: OffsetDateTime::now_utc(),
    };
    state.staging.store_outcome(id, &outcome).await?;
    state.staging.clear_chunks(id).await?;

    metrics::BUNDLES_PROCESSED.inc();
    timer.observe_duration();

    Ok(ProcessResponse {
        state: BundleState::Succeeded,
        already_processed: false,
        image_count: images.len(),
    })
}

/// Walk the extracted tree and resolve every file into an image reference.
///
/// Files whose paths don't parse are logged and skipped; one bad path must
/// not poison the whole install manifest.
fn resolve_images(contents: &Path) -> Vec<ImageEntry> {
    let mut images = Vec::new();
    for file in image_ref::list_files(contents) {
        match (
            image_ref::image_name(contents, &file),
            image_ref::short_image_name(contents, &file),
        ) {
            (Ok(name), Ok(short_name)) => images.push(ImageEntry { name, short_name }),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(
                    path = %file.display(),
                    error = %e,
                    "Skipping unresolvable image path"
                );
            }
        }
    }
    images
}

/// Write `images.json` into the job workspace.
fn write_install_manifest(workspace: &Path, images: &[ImageEntry]) -> std::io::Result<()> {
    let data = serde_json::to_vec_pretty(images)?;
    std::fs::write(workspace.join("images.json"), data)
}

/// Spawn the configured worker and await its status report.
///
/// The worker learns the socket path from `AIRLOCK_STATUS_SOCKET`. Its exit
/// status is irrelevant for success: only an explicit completion frame on
/// the channel counts.
async fn run_worker(state: &AppState, id: &BundleId, workspace: &Path) -> ProcessResult<()> {
    let channel = StatusChannel::bind(workspace, state.config.status.connect_timeout())?;

    let command = &state.config.worker.command;
    let mut cmd = tokio::process::Command::new(&command[0]);
    cmd.args(&command[1..])
        .env("AIRLOCK_STATUS_SOCKET", channel.socket_path())
        .env("AIRLOCK_BUNDLE_WORKSPACE", workspace)
        .env("AIRLOCK_BUNDLE_ID", id.as_str());

    let mut child = cmd.spawn().map_err(ProcessError::WorkerSpawn)?;
    tracing::info!(bundle_id = %id, command = %command[0], "Worker spawned");

    match channel.wait(worker_verdict).await {
        Ok(()) => {
            let _ = child.wait().await;
            Ok(())
        }
        Err(e) => {
            metrics::STATUS_CHANNEL_FAILURES
                .with_label_values(&[status_failure_kind(&e)])
                .inc();
            metrics::record_process_error("worker_failed");
            let _ = child.kill().await;
            Err(e.into())
        }
    }
}

/// Interpret one worker status frame.
///
/// The worker protocol is `{"status": "running" | "complete" | "error",
/// "message"?: string, ...}`; unknown statuses are treated as progress.
fn worker_verdict(value: Value) -> StatusVerdict {
    match value.get("status").and_then(Value::as_str) {
        Some("complete") => StatusVerdict::Done,
        Some("error") => StatusVerdict::Failed(
            value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("worker reported an unspecified error")
                .to_string(),
        ),
        _ => {
            if let Some(progress) = value.get("progress") {
                tracing::debug!(progress = %progress, "Worker progress");
            }
            StatusVerdict::Pending
        }
    }
}

fn status_failure_kind(e: &StatusChannelError) -> &'static str {
    match e {
        StatusChannelError::ConnectTimeout => "connect_timeout",
        StatusChannelError::DisconnectedEarly => "disconnected_early",
        StatusChannelError::MalformedFrame(_) => "malformed_frame",
        StatusChannelError::WorkerReported(_) => "worker_reported",
        StatusChannelError::Io(_) => "io",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn worker_verdict_maps_protocol() {
        assert_eq!(
            worker_verdict(json!({"status": "complete"})),
            StatusVerdict::Done
        );
        assert_eq!(
            worker_verdict(json!({"status": "running", "progress": 0.4})),
            StatusVerdict::Pending
        );
        assert_eq!(
            worker_verdict(json!({"unrelated": true})),
            StatusVerdict::Pending
        );
        match worker_verdict(json!({"status": "error", "message": "no space"})) {
            StatusVerdict::Failed(reason) => assert_eq!(reason, "no space"),
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[test]
    fn resolve_images_skips_malformed_paths() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("fmt/docker.io/library/redis")).unwrap();
        std::fs::write(root.join("fmt/docker.io/library/redis/2.0"), b"").unwrap();
        // Too short to carry registry/repo/tag once the format is dropped.
        std::fs::write(root.join("stray"), b"").unwrap();

        let images = resolve_images(root);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].name, "redis:2.0");
        assert_eq!(images[0].short_name, "redis:2.0");
    }

    #[tokio::test]
    async fn job_registry_serializes_and_reports_running() {
        let registry = JobRegistry::new();
        let id = BundleId::parse("job1").unwrap();

        assert!(!registry.is_running(&id));
        let guard = registry.acquire(&id).await;
        assert!(registry.is_running(&id));
        drop(guard);
        assert!(!registry.is_running(&id));
    }
}
