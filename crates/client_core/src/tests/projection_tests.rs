use super::*;
use chrono::TimeZone;
use shared::domain::Source;

use crate::session::{ArtifactHandle, Session, SourceRef};

fn snapshot(session: Session) -> SessionSnapshot {
    SessionSnapshot {
        epoch: Epoch(3),
        session,
        sources: Vec::new(),
    }
}

fn live_session(detections: Vec<Detection>) -> Session {
    Session {
        mode: SessionMode::CameraLive,
        status: SessionStatus::Detecting,
        source: Some(SourceRef::Camera(Source::local("local-0", "Camera 0", 0))),
        last_detections: detections,
        last_frame: Some("aGVsbG8=".to_string()),
        average_inference_ms: Some(12.5),
        frames_received: 8,
        ..Session::default()
    }
}

#[test]
fn priority_classes_sort_first_and_keep_relative_order() {
    let detections = vec![
        Detection::new("A", 90.0),
        Detection::new("priority", 50.0),
        Detection::new("B", 70.0),
        Detection::new("priority2", 60.0),
    ];
    let classes = PriorityClasses::new(["priority", "priority2"]);

    let view = project(&snapshot(live_session(detections)), &classes);

    let order: Vec<(&str, f64)> = view
        .rows
        .iter()
        .map(|row| (row.class_name.as_str(), row.confidence))
        .collect();
    assert_eq!(
        order,
        vec![("priority", 50.0), ("priority2", 60.0), ("A", 90.0), ("B", 70.0)]
    );
    assert_eq!(
        view.rows.iter().map(|row| row.number).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert_eq!(view.priority_hits, 2);
    assert!(view.has_priority_hits());
}

#[test]
fn without_priority_classes_order_is_untouched() {
    let detections = vec![Detection::new("b", 10.0), Detection::new("a", 20.0)];

    let sorted = prioritize(&detections, &PriorityClasses::default());

    assert_eq!(sorted, vec![&detections[0], &detections[1]]);
}

#[test]
fn confidence_and_inference_are_formatted_for_display() {
    let view = project(
        &snapshot(live_session(vec![Detection::new("person", 87.25)])),
        &PriorityClasses::default(),
    );

    assert_eq!(view.rows[0].confidence_label, "87.25%");
    assert!(!view.rows[0].is_priority);
    assert_eq!(view.inference_label, "12.5 ms");
    assert_eq!(view.source_label.as_deref(), Some("Camera 0"));
    assert_eq!(view.frames_received, 8);
    assert_eq!(view.epoch, Epoch(3));
}

#[test]
fn missing_or_zero_inference_renders_placeholder() {
    assert_eq!(format_inference_ms(None), "n/a");
    assert_eq!(format_inference_ms(Some(0.0)), "n/a");
    assert_eq!(format_inference_ms(Some(f64::NAN)), "n/a");
    assert_eq!(format_inference_ms(Some(33.0)), "33 ms");
}

#[test]
fn frame_maps_to_jpeg_data_uri() {
    let view = project(&snapshot(live_session(Vec::new())), &PriorityClasses::default());

    let preview = view.preview.expect("preview");
    assert_eq!(preview.data_uri(), "data:image/jpeg;base64,aGVsbG8=");
    assert_eq!(preview.decode().expect("decode"), b"hello");
}

#[test]
fn idle_session_projects_to_empty_view() {
    let view = project(&snapshot(Session::idle()), &PriorityClasses::default());

    assert!(view.rows.is_empty());
    assert!(view.preview.is_none());
    assert_eq!(view.inference_label, "n/a");
    assert_eq!(view.source_label, None);
    assert_eq!(view.started_at, None);
    assert_eq!(view.started_label, "-");
    assert_eq!(view.affordances, Affordances {
        can_start_video: true,
        ..Affordances::default()
    });
}

#[test]
fn affordances_follow_video_status() {
    let mut session = Session {
        mode: SessionMode::VideoBatch,
        status: SessionStatus::Done,
        renderable_artifact: Some(ArtifactHandle {
            filename: "out.mp4".to_string(),
        }),
        ..Session::default()
    };

    let done = project(&snapshot(session.clone()), &PriorityClasses::default());
    assert!(done.affordances.can_render);
    assert!(done.affordances.can_clear);
    assert!(done.affordances.can_start_video);
    assert!(!done.affordances.can_pause);
    assert_eq!(done.artifact_filename.as_deref(), Some("out.mp4"));

    session.status = SessionStatus::Detecting;
    let detecting = project(&snapshot(session), &PriorityClasses::default());
    assert!(detecting.affordances.can_pause);
    assert!(!detecting.affordances.can_render);
    assert!(!detecting.affordances.can_clear);
    assert!(!detecting.affordances.can_start_video);
}

#[test]
fn session_start_time_is_shown() {
    let started = Utc
        .with_ymd_and_hms(2024, 5, 1, 8, 30, 5)
        .single()
        .expect("valid timestamp");
    let session = Session {
        started_at: Some(started),
        ..live_session(Vec::new())
    };

    let view = project(&snapshot(session), &PriorityClasses::default());

    assert_eq!(view.started_at, Some(started));
    assert_eq!(view.started_label, "08:30:05 UTC");
}
