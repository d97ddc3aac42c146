//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid bundle id: {0}")]
    InvalidBundleId(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid chunk count: {count} (must be between 1 and {max})")]
    InvalidChunkCount { count: u32, max: u32 },

    #[error("chunk index {index} out of range for {total} chunks")]
    ChunkIndexOutOfRange { index: u32, total: u32 },

    #[error("malformed image path: {0}")]
    MalformedImagePath(String),

    #[error("path is not inside the bundle root: {0}")]
    OutsideRoot(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
