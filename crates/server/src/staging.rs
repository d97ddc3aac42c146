//! Filesystem chunk staging.
//!
//! Each bundle gets a directory under the storage root:
//!
//! ```text
//! <root>/<bundle_id>/chunks/<index>.chunk   staged upload pieces
//! <root>/<bundle_id>/workspace/             job workspace (assembly, extraction, socket)
//! <root>/<bundle_id>/outcome.json           recorded processing outcome
//! ```
//!
//! Chunk writes go to a temp file first and are renamed into place, so a
//! chunk file either exists completely or not at all. Re-uploading an index
//! simply replaces it.

use airlock_core::bundle::{BundleId, ChunkStatus};
use airlock_core::hash::ContentHash;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

/// Buffer size for chunk reassembly reads (64 KiB).
const COPY_BUF_SIZE: usize = 64 * 1024;

/// Staging store error type.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("chunk {index} is missing")]
    MissingChunk { index: u32 },

    #[error("corrupt outcome record: {0}")]
    CorruptOutcome(#[source] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for staging operations.
pub type StagingResult<T> = std::result::Result<T, StagingError>;

/// Recorded outcome of a completed processing attempt.
///
/// Only successful attempts are recorded; a failed attempt leaves the staged
/// chunks in place so the client can retry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredOutcome {
    /// Number of image references discovered.
    pub image_count: usize,
    /// When processing finished.
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

/// Filesystem-backed chunk staging store.
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    /// Create a new staging store rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> StagingResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn bundle_dir(&self, id: &BundleId) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn chunks_dir(&self, id: &BundleId) -> PathBuf {
        self.bundle_dir(id).join("chunks")
    }

    fn chunk_path(&self, id: &BundleId, index: u32) -> PathBuf {
        self.chunks_dir(id).join(format!("{index}.chunk"))
    }

    fn outcome_path(&self, id: &BundleId) -> PathBuf {
        self.bundle_dir(id).join("outcome.json")
    }

    /// The per-job workspace directory, created on first use.
    pub async fn workspace_dir(&self, id: &BundleId) -> StagingResult<PathBuf> {
        let dir = self.bundle_dir(id).join("workspace");
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Store one chunk. Arrival order and concurrency don't matter; the
    /// final rename makes the write atomic and overwrite-idempotent.
    pub async fn put_chunk(&self, id: &BundleId, index: u32, data: Bytes) -> StagingResult<()> {
        let chunks_dir = self.chunks_dir(id);
        fs::create_dir_all(&chunks_dir).await?;

        let tmp = chunks_dir.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        let target = self.chunk_path(id, index);
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!(
            bundle_id = %id,
            chunk_index = index,
            size_bytes = data.len(),
            "Chunk staged"
        );
        Ok(())
    }

    /// Report which of chunks `0..total` are stored and which are missing.
    pub async fn chunk_status(&self, id: &BundleId, total: u32) -> StagingResult<ChunkStatus> {
        let mut missing = Vec::new();
        for index in 0..total {
            if !fs::try_exists(self.chunk_path(id, index)).await? {
                missing.push(index);
            }
        }
        Ok(ChunkStatus {
            complete: missing.is_empty(),
            missing,
        })
    }

    /// True iff every chunk `0..total` has been durably stored.
    pub async fn chunks_complete(&self, id: &BundleId, total: u32) -> StagingResult<bool> {
        Ok(self.chunk_status(id, total).await?.complete)
    }

    /// Count the chunk files currently staged for a bundle.
    pub async fn received_count(&self, id: &BundleId) -> StagingResult<u32> {
        let chunks_dir = self.chunks_dir(id);
        if !fs::try_exists(&chunks_dir).await? {
            return Ok(0);
        }
        let mut count = 0;
        let mut entries = fs::read_dir(&chunks_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().ends_with(".chunk") {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Reassemble chunks `0..total` strictly by index into `dest`, computing
    /// the SHA-256 digest of the concatenated stream.
    pub async fn assemble(
        &self,
        id: &BundleId,
        total: u32,
        dest: &Path,
    ) -> StagingResult<ContentHash> {
        let mut out = fs::File::create(dest).await?;
        let mut hasher = ContentHash::hasher();
        let mut buf = vec![0u8; COPY_BUF_SIZE];

        for index in 0..total {
            let path = self.chunk_path(id, index);
            let mut chunk = match fs::File::open(&path).await {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(StagingError::MissingChunk { index });
                }
                Err(e) => return Err(e.into()),
            };

            loop {
                let n = chunk.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                out.write_all(&buf[..n]).await?;
            }
        }

        out.flush().await?;
        Ok(hasher.finalize())
    }

    /// Remove staged chunk files once processing has succeeded.
    pub async fn clear_chunks(&self, id: &BundleId) -> StagingResult<()> {
        let chunks_dir = self.chunks_dir(id);
        if fs::try_exists(&chunks_dir).await? {
            fs::remove_dir_all(&chunks_dir).await?;
        }
        Ok(())
    }

    /// Load the recorded outcome of a prior successful processing attempt.
    pub async fn load_outcome(&self, id: &BundleId) -> StagingResult<Option<StoredOutcome>> {
        match fs::read(self.outcome_path(id)).await {
            Ok(data) => {
                let outcome =
                    serde_json::from_slice(&data).map_err(StagingError::CorruptOutcome)?;
                Ok(Some(outcome))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Record a successful processing outcome.
    pub async fn store_outcome(&self, id: &BundleId, outcome: &StoredOutcome) -> StagingResult<()> {
        let data = serde_json::to_vec(outcome).map_err(StagingError::CorruptOutcome)?;
        let tmp = self.bundle_dir(id).join(".outcome.tmp");
        fs::write(&tmp, &data).await?;
        fs::rename(&tmp, self.outcome_path(id)).await?;
        Ok(())
    }
}
