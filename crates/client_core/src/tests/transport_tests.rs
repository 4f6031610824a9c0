use super::*;
use std::time::Duration;

use axum::{
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    response::Response,
    routing::get,
    Router,
};
use shared::{
    domain::{Detection, Epoch, Source, SourceLocator},
    protocol::{FrameMode, FrameResult},
};
use tokio::{net::TcpListener, time::timeout};

async fn serve_socket(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(fake_detection_service)
}

async fn fake_detection_service(mut socket: WebSocket) {
    let _ = socket
        .send(WsMessage::Text("definitely not json".to_string()))
        .await;
    let camera_list = ServiceEvent::CameraList {
        sources: vec![Source::local("local-0", "Camera 0", 0)],
    };
    let Ok(text) = serde_json::to_string(&camera_list) else {
        return;
    };
    if socket.send(WsMessage::Text(text)).await.is_err() {
        return;
    }

    while let Some(Ok(msg)) = socket.recv().await {
        let WsMessage::Text(text) = msg else {
            continue;
        };
        let Ok(ClientCommand::OpenLiveSource { epoch, .. }) =
            serde_json::from_str::<ClientCommand>(&text)
        else {
            continue;
        };
        let frame = ServiceEvent::FrameResult(FrameResult {
            epoch,
            mode: FrameMode::Live,
            image: "aGVsbG8=".to_string(),
            detections: vec![Detection::new("person", 88.0)],
            avg_inference_ms: Some(21.0),
        });
        let Ok(text) = serde_json::to_string(&frame) else {
            return;
        };
        if socket.send(WsMessage::Text(text)).await.is_err() {
            return;
        }
    }
}

async fn spawn_fake_service() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new().route("/ws", get(serve_socket));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

async fn next_event(events: &mut mpsc::Receiver<ServiceEvent>) -> ServiceEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event within timeout")
        .expect("event stream open")
}

#[test]
fn maps_http_urls_to_websocket_endpoint() {
    assert_eq!(
        websocket_url("http://localhost:5000").expect("url").as_str(),
        "ws://localhost:5000/ws"
    );
    assert_eq!(
        websocket_url("https://detect.example.com/api/").expect("url").as_str(),
        "wss://detect.example.com/api/ws"
    );
    assert!(websocket_url("ftp://detect.example.com").is_err());
    assert!(websocket_url("not a url").is_err());
}

#[tokio::test]
async fn delivers_events_and_sends_commands() {
    let service_url = spawn_fake_service().await.expect("fake service");
    let (channel, mut events) = WsEventChannel::connect(&service_url)
        .await
        .expect("connect");

    let first = next_event(&mut events).await;
    let ServiceEvent::CameraList { sources } = first else {
        panic!("expected camera list first, got {first:?}");
    };
    assert_eq!(sources[0].id.as_str(), "local-0");

    channel
        .send(ClientCommand::OpenLiveSource {
            epoch: Epoch(7),
            locator: SourceLocator::DeviceIndex(0),
        })
        .expect("send");

    let frame = next_event(&mut events).await;
    assert_eq!(frame.epoch(), Some(Epoch(7)));
    assert_eq!(frame.name(), "frame_result");
    assert!(!channel.is_closed());
}

#[tokio::test]
async fn connect_fails_when_service_is_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let result = WsEventChannel::connect(&format!("http://{addr}")).await;

    assert!(result.is_err());
}
