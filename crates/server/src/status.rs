//! Per-job worker status channel.
//!
//! A short-lived worker process reports progress and completion to the
//! server over a unix domain socket scoped to one job's workspace:
//! `<workspace>/.socket/<token>.sock`. The random token guarantees no
//! collision between concurrent jobs, and the filesystem scoping avoids
//! port contention entirely.
//!
//! Wire format: newline-delimited UTF-8, one JSON object per line. The
//! message schema belongs to the caller; the channel parses each line and
//! hands the value to a handler that decides whether the job is still
//! running, done, or failed. Connection closure is NOT a completion signal:
//! a disconnect before the handler marks completion is its own error kind.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixListener;
use uuid::Uuid;

/// Status channel error type. Each failure kind is distinct so callers can
/// tell transport problems apart from "the worker ran and reported failure".
#[derive(Debug, Error)]
pub enum StatusChannelError {
    #[error("timed out waiting for worker connection")]
    ConnectTimeout,

    #[error("worker disconnected before reporting completion")]
    DisconnectedEarly,

    #[error("malformed status frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),

    #[error("worker reported failure: {0}")]
    WorkerReported(String),

    #[error("status socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for status channel operations.
pub type StatusResult<T> = std::result::Result<T, StatusChannelError>;

/// Handler verdict for one status message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusVerdict {
    /// Keep reading; the worker is still going.
    Pending,
    /// The worker finished successfully; resolve now.
    Done,
    /// The worker finished and reported failure; reject now.
    Failed(String),
}

/// A bound, not-yet-connected status channel.
///
/// Created immediately before the worker is spawned and torn down (socket
/// file and directory removed) when dropped. Accepts at most one connection;
/// there is no multiplexing of multiple workers on one socket.
pub struct StatusChannel {
    listener: UnixListener,
    socket_path: PathBuf,
    socket_dir: PathBuf,
    connect_timeout: Duration,
}

impl StatusChannel {
    /// Bind a fresh channel under `workspace/.socket/`.
    pub fn bind(workspace: &Path, connect_timeout: Duration) -> StatusResult<Self> {
        let socket_dir = workspace.join(".socket");
        std::fs::create_dir_all(&socket_dir)?;
        let socket_path = socket_dir.join(format!("{}.sock", Uuid::new_v4()));
        let listener = UnixListener::bind(&socket_path)?;

        tracing::debug!(socket = %socket_path.display(), "Status channel bound");
        Ok(Self {
            listener,
            socket_path,
            socket_dir,
            connect_timeout,
        })
    }

    /// The socket path to hand to the worker process.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Wait for the worker to connect, then feed each parsed status message
    /// to `handler` until it marks completion or the worker disconnects.
    ///
    /// - no connection within the timeout -> [`StatusChannelError::ConnectTimeout`]
    /// - EOF before completion            -> [`StatusChannelError::DisconnectedEarly`]
    /// - unparseable line                 -> [`StatusChannelError::MalformedFrame`]
    /// - handler returns `Failed`         -> [`StatusChannelError::WorkerReported`]
    ///
    /// Once the handler marks completion the channel resolves immediately;
    /// whatever the peer does afterwards (including disconnecting) cannot
    /// override the outcome.
    pub async fn wait<F>(self, mut handler: F) -> StatusResult<()>
    where
        F: FnMut(Value) -> StatusVerdict + Send,
    {
        let (stream, _addr) = tokio::time::timeout(self.connect_timeout, self.listener.accept())
            .await
            .map_err(|_| StatusChannelError::ConnectTimeout)??;

        let mut lines = BufReader::new(stream).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let value: Value =
                serde_json::from_str(&line).map_err(StatusChannelError::MalformedFrame)?;

            match handler(value) {
                StatusVerdict::Pending => continue,
                StatusVerdict::Done => return Ok(()),
                StatusVerdict::Failed(reason) => {
                    return Err(StatusChannelError::WorkerReported(reason));
                }
            }
        }

        Err(StatusChannelError::DisconnectedEarly)
    }
}

impl Drop for StatusChannel {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
        let _ = std::fs::remove_dir(&self.socket_dir);
    }
}
