use std::path::PathBuf;

use chrono::{DateTime, Utc};
use shared::domain::{Detection, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    #[default]
    Idle,
    CameraLive,
    VideoBatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    Detecting,
    Paused,
    Done,
    Rendering,
}

impl SessionStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Detecting => "detecting",
            Self::Paused => "paused",
            Self::Done => "done",
            Self::Rendering => "rendering",
        }
    }
}

/// Server-side location of a submitted video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadHandle {
    pub server_path: String,
    /// Set when the video was uploaded from this machine.
    pub local_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Camera(Source),
    Upload(UploadHandle),
}

impl SourceRef {
    pub fn label(&self) -> String {
        match self {
            Self::Camera(source) => source.display_label.clone(),
            Self::Upload(handle) => match &handle.local_path {
                Some(path) => path.display().to_string(),
                None => handle.server_path.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    pub filename: String,
}

/// The unit of work in progress. Owned and mutated by the controller only.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Session {
    pub mode: SessionMode,
    pub status: SessionStatus,
    pub source: Option<SourceRef>,
    pub last_detections: Vec<Detection>,
    /// Base64 JPEG of the last accepted frame.
    pub last_frame: Option<String>,
    pub average_inference_ms: Option<f64>,
    pub renderable_artifact: Option<ArtifactHandle>,
    pub started_at: Option<DateTime<Utc>>,
    pub frames_received: u64,
}

impl Session {
    pub fn idle() -> Self {
        Self::default()
    }

    pub(crate) fn begin(mode: SessionMode, source: SourceRef) -> Self {
        Self {
            mode,
            status: SessionStatus::Detecting,
            source: Some(source),
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.mode != SessionMode::Idle
    }

    pub fn can_start_camera(&self) -> bool {
        matches!(self.mode, SessionMode::Idle | SessionMode::CameraLive)
    }

    pub fn can_stop_camera(&self) -> bool {
        self.mode == SessionMode::CameraLive
    }

    pub fn can_start_video(&self) -> bool {
        match self.mode {
            SessionMode::Idle => true,
            SessionMode::VideoBatch => self.status == SessionStatus::Done,
            SessionMode::CameraLive => false,
        }
    }

    pub fn can_pause(&self) -> bool {
        self.mode == SessionMode::VideoBatch && self.status == SessionStatus::Detecting
    }

    pub fn can_resume(&self) -> bool {
        self.mode == SessionMode::VideoBatch && self.status == SessionStatus::Paused
    }

    pub fn can_clear(&self) -> bool {
        self.mode == SessionMode::VideoBatch
            && matches!(self.status, SessionStatus::Paused | SessionStatus::Done)
    }

    pub fn can_render(&self) -> bool {
        self.mode == SessionMode::VideoBatch && self.status == SessionStatus::Done
    }
}
