//! Detection session controller.
//!
//! Owns the session state machine and the epoch counter. User intents are
//! validated against the current session, turned into epoch-tagged commands
//! and applied locally in the same turn. Inbound service events pass the
//! epoch fence before any event-specific logic runs.
//!
//! The controller is a plain `&mut self` state machine. Hosts that call it
//! from several tasks must serialize every entry point, including
//! [`DetectionSessionController::on_inbound_event`], through one owner; see
//! [`crate::runtime`].

use std::{fmt, path::PathBuf, sync::Arc};

use shared::{
    domain::{Epoch, Source, SourceId},
    error::ApiError,
    protocol::{ClientCommand, FrameMode, FrameResult, RenderedArtifact, ServiceEvent},
};
use tracing::{debug, info, trace, warn};

use crate::{
    epoch::EpochGuard,
    error::SessionError,
    session::{ArtifactHandle, Session, SessionMode, SessionStatus, SourceRef, UploadHandle},
    EventChannel, UploadTransport,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoInput {
    /// A path the service can already read.
    ServerPath(String),
    /// A file on this machine that has to be uploaded first.
    LocalFile(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Nothing to do; the session is already in the requested state.
    Unchanged,
    Rejected(Rejection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    UnknownSource(SourceId),
    SessionBusy(SessionMode),
    NotLive,
    NotVideo,
    InvalidStatus(SessionStatus),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSource(id) => write!(f, "unknown source '{id}'"),
            Self::SessionBusy(mode) => write!(f, "another session is active ({mode:?})"),
            Self::NotLive => f.write_str("no live camera session is active"),
            Self::NotVideo => f.write_str("no video session is active"),
            Self::InvalidStatus(status) => {
                write!(f, "not allowed while session is {}", status.label())
            }
        }
    }
}

/// Side effects the host performs on behalf of the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionIntent {
    DeliverArtifact { filename: String, payload_b64: String },
    SourcesRefreshed,
    ServiceError(ApiError),
}

/// An inbound event that passed the epoch fence but does not fit the current
/// session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolAnomaly {
    pub event: &'static str,
    pub reason: String,
}

impl ProtocolAnomaly {
    fn new(event: &'static str, reason: impl Into<String>) -> Self {
        Self {
            event,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ProtocolAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.event, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    Applied(Vec<SessionIntent>),
    Stale { event_epoch: Epoch, current: Epoch },
    Anomaly(ProtocolAnomaly),
}

impl InboundOutcome {
    fn applied() -> Self {
        Self::Applied(Vec::new())
    }
}

/// Read-only copy of the controller state handed to views.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub epoch: Epoch,
    pub session: Session,
    pub sources: Vec<Source>,
}

pub struct DetectionSessionController {
    channel: Arc<dyn EventChannel>,
    uploads: Arc<dyn UploadTransport>,
    guard: EpochGuard,
    session: Session,
    configured: Vec<Source>,
    reported: Vec<Source>,
    /// `configured` followed by reported sources with ids not configured.
    sources: Vec<Source>,
}

impl DetectionSessionController {
    pub fn new(channel: Arc<dyn EventChannel>, uploads: Arc<dyn UploadTransport>) -> Self {
        Self {
            channel,
            uploads,
            guard: EpochGuard::new(),
            session: Session::idle(),
            configured: Vec::new(),
            reported: Vec::new(),
            sources: Vec::new(),
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.guard.current()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            epoch: self.guard.current(),
            session: self.session.clone(),
            sources: self.sources.clone(),
        }
    }

    /// Sources found by local enumeration. They stay selectable whatever the
    /// service later reports.
    pub fn set_configured_sources(&mut self, sources: Vec<Source>) {
        self.configured = sources;
        self.merge_sources();
    }

    /// Latest `camera_list` from the service; replaces the previous one.
    pub fn set_reported_sources(&mut self, sources: Vec<Source>) {
        self.reported = sources;
        self.merge_sources();
    }

    fn merge_sources(&mut self) {
        let mut merged = self.configured.clone();
        for source in &self.reported {
            if !merged.iter().any(|known| known.id == source.id) {
                merged.push(source.clone());
            }
        }
        debug!(
            configured = self.configured.len(),
            reported = self.reported.len(),
            total = merged.len(),
            "source catalog updated"
        );
        self.sources = merged;
    }

    pub fn request_sources(&self) -> Result<(), SessionError> {
        self.send(ClientCommand::ListSources)
    }

    pub fn start_camera_session(&mut self, source_id: &SourceId) -> Result<Outcome, SessionError> {
        let Some(source) = self.sources.iter().find(|s| &s.id == source_id).cloned() else {
            warn!(source_id = %source_id, "cannot open unknown source");
            return Ok(reject(Rejection::UnknownSource(source_id.clone())));
        };
        if !self.session.can_start_camera() {
            return Ok(reject(Rejection::SessionBusy(self.session.mode)));
        }

        let epoch = self.guard.peek_next();
        self.send(ClientCommand::OpenLiveSource {
            epoch,
            locator: source.locator.clone(),
        })?;
        self.guard.advance();
        info!(epoch = %epoch, source_id = %source.id, locator = %source.locator, "live session started");
        self.session = Session::begin(SessionMode::CameraLive, SourceRef::Camera(source));
        Ok(Outcome::Applied)
    }

    /// Also retires the live epoch, so frames still in flight for the closed
    /// source are fenced off instead of reaching the idle session.
    pub fn stop_camera_session(&mut self) -> Result<Outcome, SessionError> {
        match self.session.mode {
            SessionMode::Idle => return Ok(Outcome::Unchanged),
            SessionMode::VideoBatch => return Ok(reject(Rejection::NotLive)),
            SessionMode::CameraLive => {}
        }

        let epoch = self.guard.current();
        self.send(ClientCommand::CloseLiveSource { epoch })?;
        let next = self.guard.advance();
        info!(closed_epoch = %epoch, epoch = %next, "live session stopped");
        self.session = Session::idle();
        Ok(Outcome::Applied)
    }

    pub async fn start_video_session(&mut self, input: VideoInput) -> Result<Outcome, SessionError> {
        if !self.session.can_start_video() {
            return Ok(reject(match self.session.mode {
                SessionMode::VideoBatch => Rejection::InvalidStatus(self.session.status),
                mode => Rejection::SessionBusy(mode),
            }));
        }

        let handle = match input {
            VideoInput::ServerPath(server_path) => UploadHandle {
                server_path,
                local_path: None,
            },
            VideoInput::LocalFile(path) => {
                let server_path = self.uploads.upload(&path).await.map_err(|err| {
                    warn!(path = %path.display(), "video upload failed: {err:#}");
                    SessionError::UploadFailed {
                        path: path.clone(),
                        reason: format!("{err:#}"),
                    }
                })?;
                UploadHandle {
                    server_path,
                    local_path: Some(path),
                }
            }
        };

        let epoch = self.guard.peek_next();
        self.send(ClientCommand::SubmitVideo {
            epoch,
            server_path: handle.server_path.clone(),
        })?;
        self.guard.advance();
        info!(epoch = %epoch, server_path = %handle.server_path, "video session started");
        self.session = Session::begin(SessionMode::VideoBatch, SourceRef::Upload(handle));
        Ok(Outcome::Applied)
    }

    pub fn pause_video_session(&mut self) -> Result<Outcome, SessionError> {
        if let Some(rejection) = self.video_rejection(SessionStatus::Detecting) {
            return Ok(reject(rejection));
        }
        self.send(ClientCommand::PauseVideo {
            epoch: self.guard.current(),
        })?;
        self.session.status = SessionStatus::Paused;
        Ok(Outcome::Applied)
    }

    pub fn resume_video_session(&mut self) -> Result<Outcome, SessionError> {
        if let Some(rejection) = self.video_rejection(SessionStatus::Paused) {
            return Ok(reject(rejection));
        }
        self.send(ClientCommand::ContinueVideo {
            epoch: self.guard.current(),
        })?;
        self.session.status = SessionStatus::Detecting;
        Ok(Outcome::Applied)
    }

    pub fn toggle_pause(&mut self) -> Result<Outcome, SessionError> {
        if self.session.can_resume() {
            self.resume_video_session()
        } else {
            self.pause_video_session()
        }
    }

    /// Local cancellation: the old epoch is retired right after the clear
    /// command is queued, so late results for it are never applied.
    pub fn clear_video_session(&mut self) -> Result<Outcome, SessionError> {
        if self.session.mode != SessionMode::VideoBatch {
            return Ok(reject(Rejection::NotVideo));
        }
        if !self.session.can_clear() {
            return Ok(reject(Rejection::InvalidStatus(self.session.status)));
        }

        let epoch = self.guard.current();
        self.send(ClientCommand::ClearVideo { epoch })?;
        let next = self.guard.advance();
        info!(cleared_epoch = %epoch, epoch = %next, "video session cleared");
        self.session = Session::idle();
        Ok(Outcome::Applied)
    }

    pub fn render_current_video(&mut self) -> Result<Outcome, SessionError> {
        if let Some(rejection) = self.video_rejection(SessionStatus::Done) {
            return Ok(reject(rejection));
        }
        self.send(ClientCommand::RenderVideo {
            epoch: self.guard.current(),
        })?;
        self.session.status = SessionStatus::Rendering;
        Ok(Outcome::Applied)
    }

    /// Single entry point for events coming off the channel.
    pub fn on_inbound_event(&mut self, event: ServiceEvent) -> InboundOutcome {
        if let Some(event_epoch) = event.epoch() {
            let current = self.guard.current();
            if !self.guard.accepts(event_epoch) {
                trace!(event = event.name(), event_epoch = %event_epoch, current = %current, "dropping stale event");
                return InboundOutcome::Stale {
                    event_epoch,
                    current,
                };
            }
        }

        let outcome = match event {
            ServiceEvent::CameraList { sources } => {
                self.set_reported_sources(sources);
                InboundOutcome::Applied(vec![SessionIntent::SourcesRefreshed])
            }
            ServiceEvent::FrameResult(frame) => self.apply_frame(frame),
            ServiceEvent::Cleared { mode, .. } => self.apply_peer_clear(mode),
            ServiceEvent::BatchFinished { .. } => self.apply_batch_finished(),
            ServiceEvent::RenderFinished(artifact) => self.apply_render_finished(artifact),
            ServiceEvent::Error(error) => {
                warn!(code = ?error.code, "detection service reported: {}", error.message);
                InboundOutcome::Applied(vec![SessionIntent::ServiceError(error)])
            }
        };

        if let InboundOutcome::Anomaly(anomaly) = &outcome {
            warn!(epoch = %self.guard.current(), status = self.session.status.label(), "ignoring protocol anomaly: {anomaly}");
        }
        outcome
    }

    fn apply_frame(&mut self, frame: FrameResult) -> InboundOutcome {
        let expected_mode = match frame.mode {
            FrameMode::Live => SessionMode::CameraLive,
            FrameMode::Batch => SessionMode::VideoBatch,
        };
        if self.session.mode != expected_mode {
            return InboundOutcome::Anomaly(ProtocolAnomaly::new(
                "frame_result",
                format!(
                    "{:?} frame while session mode is {:?}",
                    frame.mode, self.session.mode
                ),
            ));
        }
        if !matches!(
            self.session.status,
            SessionStatus::Detecting | SessionStatus::Paused
        ) {
            return InboundOutcome::Anomaly(ProtocolAnomaly::new(
                "frame_result",
                format!("frame while session is {}", self.session.status.label()),
            ));
        }
        if let Some(bad) = frame.detections.iter().find(|d| !d.has_valid_confidence()) {
            return InboundOutcome::Anomaly(ProtocolAnomaly::new(
                "frame_result",
                format!(
                    "confidence {} for '{}' is outside [0, 100]",
                    bad.confidence, bad.class_name
                ),
            ));
        }

        self.session.last_frame = Some(frame.image);
        self.session.last_detections = frame.detections;
        self.session.average_inference_ms = frame.avg_inference_ms;
        self.session.frames_received += 1;
        InboundOutcome::applied()
    }

    fn apply_peer_clear(&mut self, mode: FrameMode) -> InboundOutcome {
        let matches_session = match mode {
            FrameMode::Live => self.session.mode == SessionMode::CameraLive,
            FrameMode::Batch => self.session.mode == SessionMode::VideoBatch,
        };
        if !matches_session {
            return InboundOutcome::Anomaly(ProtocolAnomaly::new(
                "cleared",
                format!("{mode:?} reset while session mode is {:?}", self.session.mode),
            ));
        }
        info!(epoch = %self.guard.current(), ?mode, "session reset by service");
        self.session = Session::idle();
        InboundOutcome::applied()
    }

    fn apply_batch_finished(&mut self) -> InboundOutcome {
        let status = self.session.status;
        if self.session.mode != SessionMode::VideoBatch
            || !matches!(status, SessionStatus::Detecting | SessionStatus::Paused)
        {
            return InboundOutcome::Anomaly(ProtocolAnomaly::new(
                "batch_finished",
                format!("batch finished while session is {}", status.label()),
            ));
        }
        info!(epoch = %self.guard.current(), frames = self.session.frames_received, "video batch finished");
        self.session.status = SessionStatus::Done;
        InboundOutcome::applied()
    }

    fn apply_render_finished(&mut self, artifact: RenderedArtifact) -> InboundOutcome {
        if self.session.status != SessionStatus::Rendering {
            return InboundOutcome::Anomaly(ProtocolAnomaly::new(
                "render_finished",
                format!(
                    "render finished while session is {}",
                    self.session.status.label()
                ),
            ));
        }
        info!(epoch = %self.guard.current(), filename = %artifact.filename, "render finished");
        self.session.status = SessionStatus::Done;
        self.session.renderable_artifact = Some(ArtifactHandle {
            filename: artifact.filename.clone(),
        });
        InboundOutcome::Applied(vec![SessionIntent::DeliverArtifact {
            filename: artifact.filename,
            payload_b64: artifact.artifact,
        }])
    }

    fn video_rejection(&self, required: SessionStatus) -> Option<Rejection> {
        if self.session.mode != SessionMode::VideoBatch {
            Some(Rejection::NotVideo)
        } else if self.session.status != required {
            Some(Rejection::InvalidStatus(self.session.status))
        } else {
            None
        }
    }

    fn send(&self, command: ClientCommand) -> Result<(), SessionError> {
        let name = command.name();
        match self.channel.send(command) {
            Ok(()) => {
                debug!(command = name, "queued command for detection service");
                Ok(())
            }
            Err(source) => {
                warn!(command = name, "detection service channel unavailable: {source}");
                Err(SessionError::ChannelUnavailable {
                    command: name,
                    source,
                })
            }
        }
    }
}

fn reject(rejection: Rejection) -> Outcome {
    debug!("session command rejected: {rejection}");
    Outcome::Rejected(rejection)
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
