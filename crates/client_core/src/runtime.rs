//! Actor host for [`DetectionSessionController`].
//!
//! One task owns the controller. User requests and inbound service events
//! both arrive through its mailbox, so every controller entry point runs to
//! completion before the next one starts. Views read the latest projection
//! from a `watch` channel; notices and delivery results go out on a
//! `broadcast` channel.

use std::{path::PathBuf, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::{
    domain::{Source, SourceId},
    protocol::ServiceEvent,
};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    controller::{DetectionSessionController, InboundOutcome, Outcome, SessionIntent, VideoInput},
    error::SessionError,
    projection::{project, PriorityClasses, SessionView},
    DeviceEnumerator, FileDelivery,
};

const REQUEST_QUEUE_CAPACITY: usize = 64;
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRequest {
    StartCamera(SourceId),
    StopCamera,
    StartVideo(VideoInput),
    Pause,
    Resume,
    TogglePause,
    Clear,
    Render,
    RefreshSources,
}

impl SessionRequest {
    fn name(&self) -> &'static str {
        match self {
            Self::StartCamera(_) => "start_camera",
            Self::StopCamera => "stop_camera",
            Self::StartVideo(_) => "start_video",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::TogglePause => "toggle_pause",
            Self::Clear => "clear",
            Self::Render => "render",
            Self::RefreshSources => "refresh_sources",
        }
    }
}

#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    Notice(String),
    UploadFailed(String),
    /// Sent when the service reports its sources; carries the merged catalog.
    SourcesUpdated(Vec<Source>),
    ArtifactSaved(PathBuf),
    ArtifactFailed(String),
    EventStreamEnded,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    pub priority: PriorityClasses,
    /// Start a live session on the first listed source once, if nothing else
    /// is running by then.
    pub auto_select_first_source: bool,
}

struct Envelope {
    request: SessionRequest,
    reply: oneshot::Sender<Result<Outcome, SessionError>>,
}

#[derive(Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<Envelope>,
    views: watch::Receiver<SessionView>,
    events: broadcast::Sender<RuntimeEvent>,
}

impl SessionHandle {
    pub async fn request(&self, request: SessionRequest) -> Result<Outcome, SessionError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Envelope { request, reply })
            .await
            .map_err(|_| SessionError::ControllerStopped)?;
        response.await.map_err(|_| SessionError::ControllerStopped)?
    }

    pub fn view(&self) -> SessionView {
        self.views.borrow().clone()
    }

    pub fn watch_view(&self) -> watch::Receiver<SessionView> {
        self.views.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events.subscribe()
    }
}

/// Spawns the actor. Devices are enumerated once before the first request is
/// served.
pub fn spawn(
    controller: DetectionSessionController,
    inbound: mpsc::Receiver<ServiceEvent>,
    devices: Arc<dyn DeviceEnumerator>,
    delivery: Arc<dyn FileDelivery>,
    options: RuntimeOptions,
) -> (SessionHandle, JoinHandle<()>) {
    let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
    let initial_view = project(&controller.snapshot(), &options.priority);
    let (view_tx, view_rx) = watch::channel(initial_view);
    let (events, _) = broadcast::channel(EVENT_BUFFER);

    let actor = SessionActor {
        controller,
        delivery,
        options,
        views: view_tx,
        events: events.clone(),
        auto_selected: false,
    };
    let task = tokio::spawn(actor.run(request_rx, inbound, devices));

    (
        SessionHandle {
            requests: request_tx,
            views: view_rx,
            events,
        },
        task,
    )
}

struct SessionActor {
    controller: DetectionSessionController,
    delivery: Arc<dyn FileDelivery>,
    options: RuntimeOptions,
    views: watch::Sender<SessionView>,
    events: broadcast::Sender<RuntimeEvent>,
    auto_selected: bool,
}

impl SessionActor {
    async fn run(
        mut self,
        mut requests: mpsc::Receiver<Envelope>,
        mut inbound: mpsc::Receiver<ServiceEvent>,
        devices: Arc<dyn DeviceEnumerator>,
    ) {
        match devices.enumerate().await {
            Ok(sources) => {
                info!(count = sources.len(), "enumerated configured sources");
                self.controller.set_configured_sources(sources);
            }
            Err(err) => {
                warn!("device enumeration failed: {err:#}");
                self.notify(format!("Device enumeration failed: {err:#}"));
            }
        }
        if let Err(err) = self.controller.request_sources() {
            self.notify(err.to_string());
        }
        self.auto_select();
        self.publish();

        let mut inbound_open = true;
        loop {
            tokio::select! {
                envelope = requests.recv() => match envelope {
                    Some(Envelope { request, reply }) => {
                        let result = self.handle_request(request).await;
                        let _ = reply.send(result);
                    }
                    None => break,
                },
                event = inbound.recv(), if inbound_open => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        inbound_open = false;
                        warn!("detection service event stream closed");
                        let _ = self.events.send(RuntimeEvent::EventStreamEnded);
                    }
                },
            }
        }
        debug!("session actor stopped");
    }

    async fn handle_request(&mut self, request: SessionRequest) -> Result<Outcome, SessionError> {
        let name = request.name();
        let result = match request {
            SessionRequest::StartCamera(source_id) => {
                self.controller.start_camera_session(&source_id)
            }
            SessionRequest::StopCamera => self.controller.stop_camera_session(),
            SessionRequest::StartVideo(input) => self.controller.start_video_session(input).await,
            SessionRequest::Pause => self.controller.pause_video_session(),
            SessionRequest::Resume => self.controller.resume_video_session(),
            SessionRequest::TogglePause => self.controller.toggle_pause(),
            SessionRequest::Clear => self.controller.clear_video_session(),
            SessionRequest::Render => self.controller.render_current_video(),
            SessionRequest::RefreshSources => {
                self.controller.request_sources().map(|()| Outcome::Applied)
            }
        };

        match &result {
            Ok(Outcome::Applied) => self.publish(),
            Ok(Outcome::Rejected(rejection)) => {
                debug!(request = name, "request had no effect: {rejection}");
            }
            Ok(Outcome::Unchanged) => {}
            Err(err @ SessionError::UploadFailed { .. }) => {
                let _ = self.events.send(RuntimeEvent::UploadFailed(err.to_string()));
            }
            Err(err) => self.notify(err.to_string()),
        }
        result
    }

    fn handle_event(&mut self, event: ServiceEvent) {
        let InboundOutcome::Applied(intents) = self.controller.on_inbound_event(event) else {
            return;
        };
        for intent in intents {
            match intent {
                SessionIntent::DeliverArtifact {
                    filename,
                    payload_b64,
                } => self.deliver_artifact(filename, payload_b64),
                SessionIntent::SourcesRefreshed => self.sources_refreshed(),
                SessionIntent::ServiceError(error) => {
                    self.notify(format!("Detection service error: {}", error.message));
                }
            }
        }
        self.publish();
    }

    fn deliver_artifact(&self, filename: String, payload_b64: String) {
        let payload = match STANDARD.decode(payload_b64.as_bytes()) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(filename = %filename, "rendered artifact is not valid base64: {err}");
                let _ = self.events.send(RuntimeEvent::ArtifactFailed(format!(
                    "Rendered file {filename} could not be decoded: {err}"
                )));
                return;
            }
        };
        let delivery = Arc::clone(&self.delivery);
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match delivery.deliver(&filename, &payload).await {
                Ok(path) => RuntimeEvent::ArtifactSaved(path),
                Err(err) => {
                    warn!(filename = %filename, "artifact delivery failed: {err:#}");
                    RuntimeEvent::ArtifactFailed(format!("Failed to save {filename}: {err:#}"))
                }
            };
            let _ = events.send(event);
        });
    }

    fn sources_refreshed(&mut self) {
        let _ = self.events.send(RuntimeEvent::SourcesUpdated(
            self.controller.sources().to_vec(),
        ));
        self.auto_select();
    }

    fn auto_select(&mut self) {
        if !self.options.auto_select_first_source
            || self.auto_selected
            || self.controller.session().is_active()
        {
            return;
        }
        let Some(first) = self.controller.sources().first().map(|s| s.id.clone()) else {
            return;
        };
        self.auto_selected = true;
        info!(source_id = %first, "auto-selecting first source");
        if let Err(err) = self.controller.start_camera_session(&first) {
            self.notify(err.to_string());
        }
    }

    fn publish(&self) {
        self.views
            .send_replace(project(&self.controller.snapshot(), &self.options.priority));
    }

    fn notify(&self, message: String) {
        let _ = self.events.send(RuntimeEvent::Notice(message));
    }
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
