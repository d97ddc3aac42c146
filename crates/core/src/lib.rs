//! Core domain types and shared logic for the airlock ingestion pipeline.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Bundle identifiers and upload session lifecycle
//! - Chunked upload wire types
//! - Content hashing for bundle digest verification
//! - Image reference resolution over extracted bundle trees
//! - Application configuration

pub mod bundle;
pub mod config;
pub mod error;
pub mod hash;
pub mod image_ref;

pub use bundle::{BundleId, BundleState, ChunkStatus, ProcessRequest, ProcessResponse};
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use image_ref::ImageReference;

/// Default chunk size: 8 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Maximum chunk size: 32 MiB
pub const MAX_CHUNK_SIZE: u64 = 32 * 1024 * 1024;

/// Minimum chunk size: 1 MiB
pub const MIN_CHUNK_SIZE: u64 = 1024 * 1024;

/// Maximum number of chunks a single bundle may be split into.
pub const MAX_TOTAL_CHUNKS: u32 = 100_000;
