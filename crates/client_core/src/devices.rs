use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::domain::Source;

use crate::DeviceEnumerator;

/// Sources known from configuration: local device indices and RTSP streams.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredDevices {
    local_devices: Vec<u32>,
    rtsp_streams: Vec<String>,
}

impl ConfiguredDevices {
    pub fn new(local_devices: Vec<u32>, rtsp_streams: Vec<String>) -> Self {
        Self {
            local_devices,
            rtsp_streams,
        }
    }
}

#[async_trait]
impl DeviceEnumerator for ConfiguredDevices {
    async fn enumerate(&self) -> Result<Vec<Source>> {
        let mut sources = Vec::with_capacity(self.local_devices.len() + self.rtsp_streams.len());
        for index in &self.local_devices {
            sources.push(Source::local(
                format!("local-{index}"),
                format!("Camera {index}"),
                *index,
            ));
        }
        for (position, uri) in self.rtsp_streams.iter().enumerate() {
            let uri = uri.trim();
            if !uri.starts_with("rtsp://") && !uri.starts_with("rtsps://") {
                return Err(anyhow!("configured stream is not an rtsp uri: {uri}"));
            }
            sources.push(Source::remote_stream(
                format!("rtsp-{}", position + 1),
                stream_label(uri),
                uri,
            ));
        }
        Ok(sources)
    }
}

/// Host part of the stream URI without credentials, e.g. `rtsp 10.0.0.4:554`.
fn stream_label(uri: &str) -> String {
    let without_scheme = uri.split_once("://").map(|(_, rest)| rest).unwrap_or(uri);
    let authority = without_scheme.split('/').next().unwrap_or(without_scheme);
    let host = authority.rsplit('@').next().unwrap_or(authority);
    format!("rtsp {host}")
}
