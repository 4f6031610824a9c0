//! Websocket implementation of [`EventChannel`].
//!
//! One reader task decodes service events into an mpsc queue, one writer task
//! drains the outbound command queue. Undecodable frames are logged and
//! dropped; the channel reports `Closed` once the writer side is gone.

use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use shared::protocol::{ClientCommand, ServiceEvent};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::{error::ChannelError, EventChannel};

const OUTBOUND_QUEUE_CAPACITY: usize = 256;
const INBOUND_QUEUE_CAPACITY: usize = 2048;
const WS_PATH: &str = "/ws";

pub struct WsEventChannel {
    outbound: mpsc::Sender<ClientCommand>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl WsEventChannel {
    /// Connects to `{service_url}/ws` and returns the channel together with
    /// the queue inbound events are delivered on.
    pub async fn connect(service_url: &str) -> Result<(Self, mpsc::Receiver<ServiceEvent>)> {
        let ws_url = websocket_url(service_url)?;
        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
        info!(url = %ws_url, "connected to detection service");
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (outbound, mut outbound_rx) = mpsc::channel::<ClientCommand>(OUTBOUND_QUEUE_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<ServiceEvent>(INBOUND_QUEUE_CAPACITY);

        let writer_task = tokio::spawn(async move {
            while let Some(command) = outbound_rx.recv().await {
                let name = command.name();
                let text = match serde_json::to_string(&command) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(command = name, "failed to encode command: {err}");
                        continue;
                    }
                };
                if let Err(err) = ws_writer.send(Message::Text(text)).await {
                    warn!(command = name, "websocket send failed: {err}");
                    break;
                }
                debug!(command = name, "sent command");
            }
            let _ = ws_writer.close().await;
        });

        let reader_task = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServiceEvent>(&text) {
                        Ok(event) => {
                            if inbound_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!("dropping undecodable service event: {err}"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!("websocket receive failed: {err}");
                        break;
                    }
                }
            }
            info!("detection service event stream ended");
        });

        Ok((
            Self {
                outbound,
                reader_task,
                writer_task,
            },
            inbound_rx,
        ))
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed() || self.writer_task.is_finished()
    }
}

impl EventChannel for WsEventChannel {
    fn send(&self, command: ClientCommand) -> Result<(), ChannelError> {
        if self.writer_task.is_finished() {
            return Err(ChannelError::Closed);
        }
        self.outbound.try_send(command).map_err(|err| match err {
            TrySendError::Full(_) => ChannelError::Full,
            TrySendError::Closed(_) => ChannelError::Closed,
        })
    }
}

impl Drop for WsEventChannel {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

/// Maps an `http(s)` service URL to the `ws(s)` URL of its event endpoint.
pub fn websocket_url(service_url: &str) -> Result<Url> {
    let mut url = Url::parse(service_url.trim())
        .with_context(|| format!("invalid service url: {service_url}"))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(anyhow!(
                "service url must start with http:// or https://, got {other}://"
            ))
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| anyhow!("cannot switch {service_url} to {scheme}://"))?;
    let base = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base}{WS_PATH}"));
    Ok(url)
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
