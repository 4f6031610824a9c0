//! View model derived from a session snapshot. Pure; no I/O.

use std::collections::HashSet;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use shared::domain::{Detection, Epoch};

use crate::{
    controller::SessionSnapshot,
    session::{SessionMode, SessionStatus},
};

const INFERENCE_PLACEHOLDER: &str = "n/a";
const NOT_STARTED: &str = "-";

/// Detection classes that must sort to the top of the list, e.g. safety
/// violations such as a missing helmet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriorityClasses(HashSet<String>);

impl PriorityClasses {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(classes.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.0.contains(class_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRow {
    /// 1-based position in the displayed list.
    pub number: usize,
    pub class_name: String,
    pub confidence: f64,
    pub confidence_label: String,
    pub is_priority: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewImage {
    data_uri: String,
}

impl PreviewImage {
    fn from_base64_jpeg(encoded: &str) -> Self {
        Self {
            data_uri: format!("data:image/jpeg;base64,{encoded}"),
        }
    }

    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let encoded = self
            .data_uri
            .split_once(',')
            .map(|(_, data)| data)
            .unwrap_or_default();
        STANDARD.decode(encoded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Affordances {
    pub can_stop_camera: bool,
    pub can_start_video: bool,
    pub can_pause: bool,
    pub can_resume: bool,
    pub can_clear: bool,
    pub can_render: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub epoch: Epoch,
    pub mode: SessionMode,
    pub status: SessionStatus,
    pub source_label: Option<String>,
    pub rows: Vec<DetectionRow>,
    pub priority_hits: usize,
    pub preview: Option<PreviewImage>,
    pub inference_label: String,
    pub frames_received: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub started_label: String,
    pub artifact_filename: Option<String>,
    pub affordances: Affordances,
}

impl SessionView {
    pub fn has_priority_hits(&self) -> bool {
        self.priority_hits > 0
    }
}

pub fn project(snapshot: &SessionSnapshot, priority: &PriorityClasses) -> SessionView {
    let session = &snapshot.session;
    let rows: Vec<DetectionRow> = prioritize(&session.last_detections, priority)
        .into_iter()
        .enumerate()
        .map(|(idx, detection)| DetectionRow {
            number: idx + 1,
            is_priority: priority.contains(&detection.class_name),
            confidence_label: format!("{}%", detection.confidence),
            confidence: detection.confidence,
            class_name: detection.class_name.clone(),
        })
        .collect();
    let priority_hits = rows.iter().filter(|row| row.is_priority).count();

    SessionView {
        epoch: snapshot.epoch,
        mode: session.mode,
        status: session.status,
        source_label: session.source.as_ref().map(|source| source.label()),
        rows,
        priority_hits,
        preview: session
            .last_frame
            .as_deref()
            .map(PreviewImage::from_base64_jpeg),
        inference_label: format_inference_ms(session.average_inference_ms),
        frames_received: session.frames_received,
        started_at: session.started_at,
        started_label: format_started_at(session.started_at),
        artifact_filename: session
            .renderable_artifact
            .as_ref()
            .map(|artifact| artifact.filename.clone()),
        affordances: Affordances {
            can_stop_camera: session.can_stop_camera(),
            can_start_video: session.can_start_video(),
            can_pause: session.can_pause(),
            can_resume: session.can_resume(),
            can_clear: session.can_clear(),
            can_render: session.can_render(),
        },
    }
}

/// Stable partition: priority classes first, each side in arrival order.
pub fn prioritize<'a>(detections: &'a [Detection], priority: &PriorityClasses) -> Vec<&'a Detection> {
    let (mut first, rest): (Vec<&Detection>, Vec<&Detection>) = detections
        .iter()
        .partition(|detection| priority.contains(&detection.class_name));
    first.extend(rest);
    first
}

pub fn format_inference_ms(value: Option<f64>) -> String {
    match value {
        Some(ms) if ms.is_finite() && ms > 0.0 => format!("{ms} ms"),
        _ => INFERENCE_PLACEHOLDER.to_string(),
    }
}

/// Wall-clock start of the session, e.g. `08:30:05 UTC`.
pub fn format_started_at(value: Option<DateTime<Utc>>) -> String {
    match value {
        Some(at) => at.format("%H:%M:%S UTC").to_string(),
        None => NOT_STARTED.to_string(),
    }
}

#[cfg(test)]
#[path = "tests/projection_tests.rs"]
mod tests;
