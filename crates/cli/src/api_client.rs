use airlock_core::bundle::{BundleStatusResponse, ChunkStatus, ProcessRequest, ProcessResponse};
use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, de::DeserializeOwned};
use std::time::Duration;

/// Per-request timeout for chunk transfers and control calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Short timeout for the liveness probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid server URL")?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_empty(&self, req: reqwest::RequestBuilder) -> Result<()> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(())
    }

    /// Probe the server's health endpoint. Cheap and unauthenticated; used
    /// to decide whether a failed chunk transfer is worth retrying.
    pub async fn ping(&self) -> Result<()> {
        let url = self.url("/v1/health")?;
        self.send_empty(self.http.get(url).timeout(PROBE_TIMEOUT))
            .await
    }

    pub async fn get_capabilities(&self) -> Result<CapabilitiesResponse> {
        let url = self.url("/v1/capabilities")?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn chunk_status(&self, bundle_id: &str, total: u32) -> Result<ChunkStatus> {
        let mut url = self.url(&format!("/v1/bundles/{bundle_id}/chunks"))?;
        url.query_pairs_mut().append_pair("total", &total.to_string());
        self.send_json(self.http.get(url)).await
    }

    pub async fn upload_chunk(
        &self,
        bundle_id: &str,
        index: u32,
        total: u32,
        data: Vec<u8>,
    ) -> Result<()> {
        let mut url = self.url(&format!("/v1/bundles/{bundle_id}/chunks/{index}"))?;
        url.query_pairs_mut().append_pair("total", &total.to_string());
        self.send_empty(self.http.put(url).body(data)).await
    }

    pub async fn trigger_process(
        &self,
        bundle_id: &str,
        req: &ProcessRequest,
    ) -> Result<ProcessResponse> {
        let url = self.url(&format!("/v1/bundles/{bundle_id}/process"))?;
        self.send_json(self.http.post(url).json(req)).await
    }

    pub async fn get_bundle(&self, bundle_id: &str) -> Result<BundleStatusResponse> {
        let url = self.url(&format!("/v1/bundles/{bundle_id}"))?;
        self.send_json(self.http.get(url)).await
    }
}

// =============================================================================
// Response types mirrored from server handlers
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CapabilitiesResponse {
    pub api_version: String,
    pub max_chunk_size: u64,
    pub max_parallel_chunks: u32,
}
