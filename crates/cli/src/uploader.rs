//! Chunked resumable bundle upload.
//!
//! The bundle file is split into fixed-size chunks uploaded with bounded
//! concurrency. Before uploading, the server's existence check is consulted
//! so an interrupted upload resumes from the missing indices only. A failed
//! chunk transfer triggers a liveness probe with backoff against the health
//! endpoint; once the server answers, the same chunk is retried.

use crate::api_client::ApiClient;
use airlock_core::ContentHash;
use airlock_core::bundle::{ProcessRequest, ProcessResponse};
use anyhow::{Context, Result, bail};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Attempts per chunk before the upload is declared failed.
const CHUNK_RETRY_BUDGET: u32 = 3;

/// Liveness probe attempts while waiting for the server to come back.
const PROBE_ATTEMPTS: u32 = 5;

/// Initial probe backoff, doubled after each failed probe.
const PROBE_BACKOFF: Duration = Duration::from_millis(500);

/// Read buffer for digest computation (256 KiB).
const DIGEST_BUF_SIZE: usize = 256 * 1024;

/// Upload tuning knobs, usually filled from `/v1/capabilities`.
#[derive(Clone, Debug)]
pub struct UploadOptions {
    /// Chunk size in bytes.
    pub chunk_size: u64,
    /// Maximum simultaneous chunk transfers.
    pub max_parallel: usize,
}

/// Summary of a completed push.
#[derive(Debug)]
pub struct UploadReport {
    /// Number of chunks the bundle was split into.
    pub total_chunks: u32,
    /// Chunks actually transferred (0 when the upload was resumed complete).
    pub uploaded_chunks: usize,
    /// Processing result reported by the server.
    pub process: ProcessResponse,
}

/// Upload a bundle file and trigger processing.
pub async fn push_bundle(
    client: &ApiClient,
    bundle_id: &str,
    path: &Path,
    options: &UploadOptions,
) -> Result<UploadReport> {
    let (digest, file_size) = digest_file(path).await?;
    if file_size == 0 {
        bail!("bundle file is empty: {}", path.display());
    }
    let total_chunks = chunk_count(file_size, options.chunk_size);

    let status = client
        .chunk_status(bundle_id, total_chunks)
        .await
        .context("failed to query chunk status")?;

    let uploaded_chunks = if status.complete {
        tracing::info!(bundle_id, "All chunks already stored, skipping upload");
        0
    } else {
        upload_missing(client, bundle_id, path, options, total_chunks, status.missing).await?
    };

    let process = client
        .trigger_process(
            bundle_id,
            &ProcessRequest {
                total_chunks,
                sha256: Some(digest.to_hex()),
            },
        )
        .await
        .context("processing trigger failed")?;

    Ok(UploadReport {
        total_chunks,
        uploaded_chunks,
        process,
    })
}

/// Number of chunks a file of `size` bytes splits into.
fn chunk_count(size: u64, chunk_size: u64) -> u32 {
    size.div_ceil(chunk_size) as u32
}

/// Upload the given missing indices with bounded concurrency.
async fn upload_missing(
    client: &ApiClient,
    bundle_id: &str,
    path: &Path,
    options: &UploadOptions,
    total_chunks: u32,
    missing: Vec<u32>,
) -> Result<usize> {
    let count = missing.len();
    let mut indices = missing.into_iter();
    let mut in_flight = FuturesUnordered::new();

    let spawn = |index: u32| {
        let client = client.clone();
        let bundle_id = bundle_id.to_string();
        let path = path.to_path_buf();
        let chunk_size = options.chunk_size;
        async move {
            let data = read_chunk(&path, index, chunk_size).await?;
            upload_chunk_with_retry(&client, &bundle_id, index, total_chunks, data).await
        }
    };

    for index in indices.by_ref().take(options.max_parallel.max(1)) {
        in_flight.push(spawn(index));
    }

    while let Some(result) = in_flight.next().await {
        result?;
        if let Some(index) = indices.next() {
            in_flight.push(spawn(index));
        }
    }

    tracing::info!(bundle_id, chunks = count, "Chunk upload complete");
    Ok(count)
}

/// Read one chunk of the bundle file.
async fn read_chunk(path: &PathBuf, index: u32, chunk_size: u64) -> Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.seek(std::io::SeekFrom::Start(index as u64 * chunk_size))
        .await?;

    let mut data = Vec::with_capacity(chunk_size as usize);
    file.take(chunk_size).read_to_end(&mut data).await?;
    Ok(data)
}

/// Upload one chunk, probing the health endpoint between attempts.
async fn upload_chunk_with_retry(
    client: &ApiClient,
    bundle_id: &str,
    index: u32,
    total_chunks: u32,
    data: Vec<u8>,
) -> Result<()> {
    let mut last_error = None;
    for attempt in 1..=CHUNK_RETRY_BUDGET {
        match client
            .upload_chunk(bundle_id, index, total_chunks, data.clone())
            .await
        {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(
                    bundle_id,
                    chunk_index = index,
                    attempt,
                    error = %e,
                    "Chunk transfer failed"
                );
                last_error = Some(e);
                if attempt < CHUNK_RETRY_BUDGET {
                    wait_for_liveness(client).await?;
                }
            }
        }
    }

    // Deliberately generic: the caller can simply re-run the push.
    bail!(
        "chunk {index} failed after {CHUNK_RETRY_BUDGET} attempts, try the upload again \
         (last error: {})",
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )
}

/// Probe the health endpoint with exponential backoff until it answers.
async fn wait_for_liveness(client: &ApiClient) -> Result<()> {
    let mut backoff = PROBE_BACKOFF;
    for _ in 0..PROBE_ATTEMPTS {
        tokio::time::sleep(backoff).await;
        if client.ping().await.is_ok() {
            return Ok(());
        }
        backoff *= 2;
    }
    bail!("server did not become reachable, try the upload again")
}

/// Compute the SHA-256 digest and size of a file.
async fn digest_file(path: &Path) -> Result<(ContentHash, u64)> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut hasher = ContentHash::hasher();
    let mut buf = vec![0u8; DIGEST_BUF_SIZE];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((hasher.finalize(), size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(chunk_count(1, 10), 1);
        assert_eq!(chunk_count(10, 10), 1);
        assert_eq!(chunk_count(11, 10), 2);
        assert_eq!(chunk_count(100, 10), 10);
    }

    #[tokio::test]
    async fn read_chunk_handles_short_tail() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bundle.bin");
        std::fs::write(&path, b"0123456789AB").unwrap();

        let first = read_chunk(&path, 0, 5).await.unwrap();
        let last = read_chunk(&path, 2, 5).await.unwrap();
        assert_eq!(first, b"01234");
        assert_eq!(last, b"AB");
    }

    #[tokio::test]
    async fn digest_file_matches_oneshot() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bundle.bin");
        std::fs::write(&path, b"bundle bytes").unwrap();

        let (digest, size) = digest_file(&path).await.unwrap();
        assert_eq!(size, 12);
        assert_eq!(digest, ContentHash::compute(b"bundle bytes"));
    }
}
