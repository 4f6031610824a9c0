use std::path::Path;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use crate::UploadTransport;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    path: String,
}

/// Posts the raw file body to `{service_url}/upload?filename=...`; the
/// service answers with the path it stored the video under.
pub struct HttpUploadTransport {
    http: Client,
    service_url: String,
}

impl HttpUploadTransport {
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            service_url: service_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl UploadTransport for HttpUploadTransport {
    async fn upload(&self, local_path: &Path) -> Result<String> {
        let filename = local_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("video path has no usable file name: {}", local_path.display()))?
            .to_string();
        let body = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("failed to read video file {}", local_path.display()))?;
        let size_bytes = body.len();

        let response: UploadResponse = self
            .http
            .post(format!("{}/upload", self.service_url))
            .query(&[("filename", filename.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .context("upload request failed")?
            .error_for_status()
            .context("upload rejected by service")?
            .json()
            .await
            .context("invalid upload response")?;

        if response.path.trim().is_empty() {
            return Err(anyhow!("service returned an empty path for {filename}"));
        }
        info!(filename = %filename, size_bytes, server_path = %response.path, "uploaded video");
        Ok(response.path)
    }
}

#[cfg(test)]
#[path = "tests/upload_tests.rs"]
mod tests;
