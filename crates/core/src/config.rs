//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3030").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum parallel chunk uploads a client should run.
    #[serde(default = "default_max_parallel_chunks")]
    pub max_parallel_chunks: u32,
    /// Maximum accepted chunk size in bytes.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:3030".to_string()
}

fn default_max_parallel_chunks() -> u32 {
    3
}

fn default_max_chunk_size() -> u64 {
    crate::MAX_CHUNK_SIZE
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_parallel_chunks: default_max_parallel_chunks(),
            max_chunk_size: default_max_chunk_size(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Storage layout configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for chunk staging and job workspaces.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/bundles")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// Status channel configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusConfig {
    /// How long to wait for the worker's first connection, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    20
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl StatusConfig {
    /// Get the connection-wait timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Worker process configuration.
///
/// When `command` is set, the processor spawns it after extraction and waits
/// for completion to be reported over the status channel. The socket path is
/// passed in the `AIRLOCK_STATUS_SOCKET` environment variable.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker command and arguments. Empty/unset disables the worker step.
    #[serde(default)]
    pub command: Vec<String>,
}

impl WorkerConfig {
    /// Check whether a worker command is configured.
    pub fn is_enabled(&self) -> bool {
        !self.command.is_empty()
    }
}

/// Top-level application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// Create a test configuration rooted at the given scratch directory.
    ///
    /// **For testing only.** Uses a short status timeout so failing tests
    /// don't stall the suite.
    pub fn for_testing(storage_path: PathBuf) -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig { path: storage_path },
            status: StatusConfig {
                connect_timeout_secs: 2,
            },
            worker: WorkerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.max_parallel_chunks, 3);
        assert_eq!(config.server.max_chunk_size, crate::MAX_CHUNK_SIZE);
        assert_eq!(config.status.connect_timeout(), Duration::from_secs(20));
        assert!(!config.worker.is_enabled());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            bind = "0.0.0.0:9000"

            [worker]
            command = ["airlock-worker", "--verbose"]
            "#,
        )
        .unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.max_parallel_chunks, 3);
        assert!(config.worker.is_enabled());
    }
}
