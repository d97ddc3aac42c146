//! Bundle identifiers and upload session wire types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a bundle id.
const MAX_BUNDLE_ID_LEN: usize = 128;

/// Opaque identifier for a bundle upload session.
///
/// Bundle ids are caller-supplied tokens. They double as staging directory
/// names, so the accepted alphabet is restricted to characters that are safe
/// as a single path component on every platform.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleId(String);

impl BundleId {
    /// Parse and validate a bundle id.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.is_empty() || s.len() > MAX_BUNDLE_ID_LEN {
            return Err(crate::Error::InvalidBundleId(format!(
                "length must be 1..={MAX_BUNDLE_ID_LEN}"
            )));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(crate::Error::InvalidBundleId(
                "only ASCII alphanumerics, '-' and '_' are allowed".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BundleId({})", self.0)
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processing state of a bundle.
///
/// An extraction job transitions `Pending -> Running -> {Succeeded | Failed}`
/// exactly once; a bundle with no processing attempt yet reports `Pending`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleState {
    /// Chunks may still be arriving; no processing attempted.
    Pending,
    /// Extraction/processing is in flight.
    Running,
    /// Processing completed successfully.
    Succeeded,
    /// Processing failed; staged chunks are retained for retry.
    Failed,
}

impl BundleState {
    /// Check if the state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Response from the chunk existence check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkStatus {
    /// True iff every chunk 0..total_chunks-1 is durably stored.
    pub complete: bool,
    /// Indices not yet stored, in ascending order.
    pub missing: Vec<u32>,
}

/// Request to trigger bundle processing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessRequest {
    /// Total number of chunks the bundle was split into.
    pub total_chunks: u32,
    /// Hex-encoded SHA-256 digest of the reassembled bundle.
    /// When present, reassembly is verified before extraction begins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Response from triggering bundle processing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessResponse {
    /// Final state of the job (succeeded, or failed with `error` set).
    pub state: BundleState,
    /// True when this call observed an already-processed bundle and
    /// skipped extraction.
    pub already_processed: bool,
    /// Number of image references discovered in the extracted tree.
    pub image_count: usize,
}

/// Response from querying bundle session state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BundleStatusResponse {
    /// Current processing state.
    pub state: BundleState,
    /// Number of chunks stored so far.
    pub received_chunks: u32,
}
