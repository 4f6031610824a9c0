use super::*;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct UploadServerState {
    received: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

async fn accept_upload(
    State(state): State<UploadServerState>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let filename = query.get("filename").cloned().ok_or(StatusCode::BAD_REQUEST)?;
    state
        .received
        .lock()
        .await
        .push((filename.clone(), body.to_vec()));
    Ok(Json(serde_json::json!({ "path": format!("/srv/uploads/{filename}") })))
}

async fn reject_upload() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn spawn_upload_server(accept: bool) -> anyhow::Result<(String, UploadServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = UploadServerState::default();
    let app = if accept {
        Router::new()
            .route("/upload", post(accept_upload))
            .with_state(state.clone())
    } else {
        Router::new()
            .route("/upload", post(reject_upload))
            .with_state(state.clone())
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

fn temp_video(contents: &[u8]) -> std::path::PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = std::env::temp_dir().join(format!("detect_upload_{suffix}.mp4"));
    std::fs::write(&path, contents).expect("write temp video");
    path
}

#[tokio::test]
async fn uploads_file_body_and_returns_server_path() {
    let (service_url, state) = spawn_upload_server(true).await.expect("server");
    let video = temp_video(b"fake-mp4-bytes");
    let filename = video
        .file_name()
        .and_then(|name| name.to_str())
        .expect("file name")
        .to_string();

    let server_path = HttpUploadTransport::new(format!("{service_url}/"))
        .upload(&video)
        .await
        .expect("upload");

    assert_eq!(server_path, format!("/srv/uploads/{filename}"));
    let received = state.received.lock().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, filename);
    assert_eq!(received[0].1, b"fake-mp4-bytes");

    let _ = std::fs::remove_file(video);
}

#[tokio::test]
async fn server_error_fails_the_upload() {
    let (service_url, _state) = spawn_upload_server(false).await.expect("server");
    let video = temp_video(b"bytes");

    let err = HttpUploadTransport::new(service_url)
        .upload(&video)
        .await
        .expect_err("upload rejected");

    assert!(format!("{err:#}").contains("upload rejected by service"));
    let _ = std::fs::remove_file(video);
}

#[tokio::test]
async fn missing_file_fails_before_any_request() {
    let transport = HttpUploadTransport::new("http://127.0.0.1:9");

    let err = transport
        .upload(Path::new("/definitely/not/here.mp4"))
        .await
        .expect_err("missing file");

    assert!(format!("{err:#}").contains("failed to read video file"));
}
