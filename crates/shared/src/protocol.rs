use serde::{Deserialize, Serialize};

use crate::{
    domain::{Detection, Epoch, Source, SourceLocator},
    error::ApiError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientCommand {
    ListSources,
    OpenLiveSource {
        epoch: Epoch,
        locator: SourceLocator,
    },
    CloseLiveSource {
        epoch: Epoch,
    },
    SubmitVideo {
        epoch: Epoch,
        server_path: String,
    },
    PauseVideo {
        epoch: Epoch,
    },
    ContinueVideo {
        epoch: Epoch,
    },
    ClearVideo {
        epoch: Epoch,
    },
    RenderVideo {
        epoch: Epoch,
    },
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ListSources => "list_sources",
            Self::OpenLiveSource { .. } => "open_live_source",
            Self::CloseLiveSource { .. } => "close_live_source",
            Self::SubmitVideo { .. } => "submit_video",
            Self::PauseVideo { .. } => "pause_video",
            Self::ContinueVideo { .. } => "continue_video",
            Self::ClearVideo { .. } => "clear_video",
            Self::RenderVideo { .. } => "render_video",
        }
    }

    pub fn epoch(&self) -> Option<Epoch> {
        match self {
            Self::ListSources => None,
            Self::OpenLiveSource { epoch, .. }
            | Self::CloseLiveSource { epoch }
            | Self::SubmitVideo { epoch, .. }
            | Self::PauseVideo { epoch }
            | Self::ContinueVideo { epoch }
            | Self::ClearVideo { epoch }
            | Self::RenderVideo { epoch } => Some(*epoch),
        }
    }
}

/// Which pipeline produced a frame or a reset on the service side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameMode {
    Live,
    Batch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub epoch: Epoch,
    pub mode: FrameMode,
    /// Base64 JPEG as sent by the service.
    pub image: String,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_inference_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedArtifact {
    pub epoch: Epoch,
    pub filename: String,
    /// Base64 file contents.
    pub artifact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServiceEvent {
    CameraList {
        sources: Vec<Source>,
    },
    FrameResult(FrameResult),
    Cleared {
        epoch: Epoch,
        mode: FrameMode,
    },
    BatchFinished {
        epoch: Epoch,
    },
    RenderFinished(RenderedArtifact),
    Error(ApiError),
}

impl ServiceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CameraList { .. } => "camera_list",
            Self::FrameResult(_) => "frame_result",
            Self::Cleared { .. } => "cleared",
            Self::BatchFinished { .. } => "batch_finished",
            Self::RenderFinished(_) => "render_finished",
            Self::Error(_) => "error",
        }
    }

    /// Epoch the event was produced under, or `None` for events that are not
    /// scoped to a session.
    pub fn epoch(&self) -> Option<Epoch> {
        match self {
            Self::FrameResult(frame) => Some(frame.epoch),
            Self::Cleared { epoch, .. } | Self::BatchFinished { epoch } => Some(*epoch),
            Self::RenderFinished(artifact) => Some(artifact.epoch),
            Self::CameraList { .. } | Self::Error(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_frame_result_with_class_field() {
        let raw = r#"{
            "type": "frame_result",
            "payload": {
                "epoch": 4,
                "mode": "batch",
                "image": "aGVsbG8=",
                "detections": [{"class": "helmet", "confidence": 87.5}],
                "avg_inference_ms": 12.0
            }
        }"#;
        let event: ServiceEvent = serde_json::from_str(raw).expect("decode");
        assert_eq!(event.epoch(), Some(Epoch(4)));
        let ServiceEvent::FrameResult(frame) = event else {
            panic!("expected frame result");
        };
        assert_eq!(frame.mode, FrameMode::Batch);
        assert_eq!(frame.detections, vec![Detection::new("helmet", 87.5)]);
    }

    #[test]
    fn encodes_open_live_source_with_tagged_locator() {
        let command = ClientCommand::OpenLiveSource {
            epoch: Epoch(2),
            locator: SourceLocator::StreamUri("rtsp://cam/1".to_string()),
        };
        let value = serde_json::to_value(&command).expect("encode");
        assert_eq!(value["type"], "open_live_source");
        assert_eq!(value["payload"]["epoch"], 2);
        assert_eq!(value["payload"]["locator"]["kind"], "stream_uri");
        assert_eq!(value["payload"]["locator"]["value"], "rtsp://cam/1");
    }

    #[test]
    fn unit_command_serializes_without_payload() {
        let value = serde_json::to_value(ClientCommand::ListSources).expect("encode");
        assert_eq!(value["type"], "list_sources");
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn session_scoped_event_without_epoch_is_rejected() {
        let raw = r#"{"type": "batch_finished", "payload": {}}"#;
        assert!(serde_json::from_str::<ServiceEvent>(raw).is_err());
    }
}
