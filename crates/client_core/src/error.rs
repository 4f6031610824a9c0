use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("event channel is closed")]
    Closed,
    #[error("event channel outbound queue is full")]
    Full,
}

/// Failures a user action can surface. Everything else (stale or anomalous
/// inbound events) is absorbed inside the controller.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("detection service unavailable; could not send {command}: {source}")]
    ChannelUnavailable {
        command: &'static str,
        source: ChannelError,
    },
    #[error("video upload failed for {}: {reason}", .path.display())]
    UploadFailed { path: PathBuf, reason: String },
    #[error("session controller has stopped")]
    ControllerStopped,
}

impl SessionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ChannelUnavailable { .. })
    }
}
