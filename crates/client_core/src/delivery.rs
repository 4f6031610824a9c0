use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::FileDelivery;

const FALLBACK_FILENAME: &str = "rendered.mp4";

/// Writes rendered artifacts into a fixed output directory.
pub struct DiskFileDelivery {
    output_dir: PathBuf,
}

impl DiskFileDelivery {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl FileDelivery for DiskFileDelivery {
    async fn deliver(&self, filename: &str, payload: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create output directory {}",
                    self.output_dir.display()
                )
            })?;
        let target = self.output_dir.join(sanitize_filename(filename)?);
        tokio::fs::write(&target, payload)
            .await
            .with_context(|| format!("failed to save artifact to {}", target.display()))?;
        info!(path = %target.display(), size_bytes = payload.len(), "saved rendered artifact");
        Ok(target)
    }
}

/// Keeps only the final path component so a service-supplied name cannot
/// escape the output directory.
fn sanitize_filename(filename: &str) -> Result<String> {
    let normalized = filename.replace('\\', "/");
    let name = normalized
        .rsplit('/')
        .next()
        .map(str::trim)
        .unwrap_or_default();
    match name {
        "" => Ok(FALLBACK_FILENAME.to_string()),
        "." | ".." => Err(anyhow!("refusing to save artifact named {filename:?}")),
        name => Ok(name.to_string()),
    }
}
