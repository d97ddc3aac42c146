//! HTTP control plane and ingestion pipeline for airlock bundles.
//!
//! This crate provides:
//! - Chunk upload, existence-check and processing-trigger endpoints
//! - Filesystem chunk staging with ordered reassembly
//! - Streaming gzip+tar extraction
//! - The per-job unix-socket status channel for worker progress reporting

pub mod error;
pub mod extract;
pub mod handlers;
pub mod metrics;
pub mod process;
pub mod routes;
pub mod staging;
pub mod state;
pub mod status;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
