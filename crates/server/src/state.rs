//! Application state shared across handlers.

use crate::process::JobRegistry;
use crate::staging::{ChunkStore, StagingResult};
use airlock_core::config::AppConfig;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Chunk staging store.
    pub staging: Arc<ChunkStore>,
    /// Per-bundle processing locks.
    pub jobs: Arc<JobRegistry>,
}

impl AppState {
    /// Create application state, initializing the staging store under the
    /// configured storage root.
    pub async fn new(config: AppConfig) -> StagingResult<Self> {
        let staging = ChunkStore::new(&config.storage.path).await?;
        Ok(Self {
            config: Arc::new(config),
            staging: Arc::new(staging),
            jobs: Arc::new(JobRegistry::new()),
        })
    }
}
