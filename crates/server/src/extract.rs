//! Streaming gzip+tar extraction.
//!
//! The pipeline is: source bytes -> gzip decompression -> tar entry
//! demultiplexer -> per-file writes. Entries are consumed strictly in stream
//! order and one at a time, so memory use stays bounded by the pipeline's
//! buffers regardless of archive size: a slow disk write backpressures the
//! demultiplexer instead of growing a queue.
//!
//! The demux itself is blocking (flate2 + tar), so it runs on the blocking
//! pool; async sources are handed over through [`SyncIoBridge`].

use flate2::read::GzDecoder;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::io::SyncIoBridge;

/// Extraction error type.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to open archive: {0}")]
    Open(#[source] std::io::Error),

    #[error("archive read failed: {0}")]
    Archive(#[source] std::io::Error),

    #[error("unsafe entry path: {0}")]
    UnsafePath(String),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("extraction task aborted: {0}")]
    TaskAborted(String),
}

/// Result type for extraction operations.
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;

/// Counts reported once every archive entry has been consumed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Regular files written.
    pub files_written: u64,
    /// Total file bytes written.
    pub bytes_written: u64,
    /// Non-file entries whose content was discarded.
    pub entries_skipped: u64,
}

/// Extract a gzip+tar byte stream into `dest`.
///
/// Resolves when every archive entry has been consumed. On failure the
/// partially-written destination is left as-is for the caller to discard or
/// retry into a fresh directory.
pub async fn extract<R>(source: R, dest: &Path) -> ExtractResult<ExtractSummary>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let dest = dest.to_path_buf();
    // The bridge captures the runtime handle, so it must be created here on
    // the async side before moving to the blocking pool.
    let reader = SyncIoBridge::new(source);
    tokio::task::spawn_blocking(move || extract_sync(reader, &dest))
        .await
        .map_err(|e| ExtractError::TaskAborted(e.to_string()))?
}

/// Extract a gzip+tar archive file into `dest`.
pub async fn extract_file(archive: &Path, dest: &Path) -> ExtractResult<ExtractSummary> {
    let file = tokio::fs::File::open(archive)
        .await
        .map_err(ExtractError::Open)?;
    extract(file, dest).await
}

fn extract_sync(source: impl Read, dest: &Path) -> ExtractResult<ExtractSummary> {
    let decoder = GzDecoder::new(BufReader::new(source));
    let mut archive = tar::Archive::new(decoder);
    let mut summary = ExtractSummary::default();

    for entry in archive.entries().map_err(ExtractError::Archive)? {
        let mut entry = entry.map_err(ExtractError::Archive)?;

        let rel = entry
            .path()
            .map_err(ExtractError::Archive)?
            .into_owned();
        validate_entry_path(&rel)?;

        // Only regular files are materialized. Directories come into being
        // lazily from file paths; symlinks and special entries are dropped.
        if !entry.header().entry_type().is_file() {
            summary.entries_skipped += 1;
            continue;
        }

        let target = dest.join(&rel);
        if let Some(parent) = target.parent() {
            // Idempotent; sibling entries may already have created part of
            // the chain.
            std::fs::create_dir_all(parent).map_err(|source| ExtractError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut out = std::fs::File::create(&target).map_err(|source| ExtractError::Write {
            path: target.clone(),
            source,
        })?;
        let written =
            std::io::copy(&mut entry, &mut out).map_err(|source| ExtractError::Write {
                path: target.clone(),
                source,
            })?;

        summary.files_written += 1;
        summary.bytes_written += written;
    }

    tracing::debug!(
        files = summary.files_written,
        bytes = summary.bytes_written,
        skipped = summary.entries_skipped,
        dest = %dest.display(),
        "Archive extracted"
    );
    Ok(summary)
}

/// Reject entry paths that could escape the destination directory.
fn validate_entry_path(path: &Path) -> ExtractResult<()> {
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(ExtractError::UnsafePath(path.display().to_string()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_path_validation() {
        assert!(validate_entry_path(Path::new("a/b/c")).is_ok());
        assert!(validate_entry_path(Path::new("./a")).is_ok());
        assert!(validate_entry_path(Path::new("../escape")).is_err());
        assert!(validate_entry_path(Path::new("a/../../b")).is_err());
        assert!(validate_entry_path(Path::new("/abs/path")).is_err());
    }
}
