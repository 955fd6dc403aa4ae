//! Low-level wire session to the remote realtime translation API.
//!
//! Owns the WebSocket connection: a write loop draining an outbound
//! channel and a read loop parsing server events into an inbound channel.
//! Everything above this layer deals in [`ServerEvent`] values.

use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, warn};

use crate::client::ClientConfig;
use crate::error::{Error, Result};
use crate::event::ServerEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Channel depth for both directions of a wire session.
const CHANNEL_DEPTH: usize = 100;

/// Outbound unit: a JSON event or a protocol-level ping.
#[derive(Debug)]
pub enum WireOut {
    /// JSON client event.
    Event(serde_json::Value),
    /// Keep-alive ping.
    Ping,
    /// Orderly close.
    Close,
}

/// Interface of one bi-directional connection to the remote.
///
/// The WebSocket implementation is [`WireSession`]; tests substitute a
/// scripted double behind the same trait.
#[async_trait::async_trait]
pub trait Wire: Send {
    /// Sends a JSON client event.
    async fn send(&mut self, event: serde_json::Value) -> Result<()>;

    /// Sends a keep-alive ping.
    async fn ping(&mut self) -> Result<()>;

    /// Receives the next server event; `None` when the connection is
    /// gone.
    async fn recv(&mut self) -> Option<Result<ServerEvent>>;

    /// Initiates an orderly close.
    async fn close(&mut self);
}

/// One live WebSocket session.
pub struct WireSession {
    outbound: mpsc::Sender<WireOut>,
    events: mpsc::Receiver<Result<ServerEvent>>,
}

impl WireSession {
    /// Connects and spawns the read/write loops.
    pub(crate) async fn connect(config: Arc<ClientConfig>) -> Result<Self> {
        let url = format!("{}?model={}", config.ws_url, config.model);
        debug!(url, "connecting translation session");

        let mut request = http::Request::builder()
            .uri(&url)
            .header("Authorization", format!("Bearer {}", config.api_key))
            .header("OpenAI-Beta", "realtime=v1");
        if let Some(ref org) = config.organization {
            request = request.header("OpenAI-Organization", org);
        }
        let request = request
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", generate_websocket_key())
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", extract_host(&url).unwrap_or("api.openai.com"))
            .body(())
            .map_err(|e| Error::Connection(format!("failed to build request: {e}")))?;

        let (ws_stream, _response) = connect_async(request)
            .await
            .map_err(|e| Error::Connection(format!("failed to connect: {e}")))?;
        let (write, read) = ws_stream.split();

        let (event_tx, event_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_DEPTH);

        tokio::spawn(write_loop(write, out_rx));
        tokio::spawn(read_loop(read, event_tx));

        Ok(Self {
            outbound: out_tx,
            events: event_rx,
        })
    }
}

#[async_trait::async_trait]
impl Wire for WireSession {
    async fn send(&mut self, event: serde_json::Value) -> Result<()> {
        self.outbound
            .send(WireOut::Event(event))
            .await
            .map_err(|_| Error::SessionClosed)
    }

    async fn ping(&mut self) -> Result<()> {
        self.outbound
            .send(WireOut::Ping)
            .await
            .map_err(|_| Error::SessionClosed)
    }

    async fn recv(&mut self) -> Option<Result<ServerEvent>> {
        self.events.recv().await
    }

    async fn close(&mut self) {
        let _ = self.outbound.send(WireOut::Close).await;
    }
}

async fn write_loop(mut write: SplitSink<WsStream, Message>, mut rx: mpsc::Receiver<WireOut>) {
    while let Some(out) = rx.recv().await {
        let msg = match out {
            WireOut::Event(event) => Message::Text(event.to_string().into()),
            WireOut::Ping => Message::Ping(Vec::new().into()),
            WireOut::Close => {
                let _ = write.close().await;
                break;
            }
        };
        if let Err(e) = write.send(msg).await {
            error!("wire write error: {e}");
            break;
        }
    }
}

async fn read_loop(mut read: SplitStream<WsStream>, tx: mpsc::Sender<Result<ServerEvent>>) {
    while let Some(result) = read.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let event = match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => Ok(event),
                    Err(e) => {
                        warn!("unparseable server event: {e}");
                        continue;
                    }
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!("wire closed by remote");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(_) => {}
            Err(e) => {
                error!("wire read error: {e}");
                let _ = tx.send(Err(Error::WebSocket(e))).await;
                break;
            }
        }
    }
}

fn generate_websocket_key() -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(uuid::Uuid::new_v4().as_bytes())
}

fn extract_host(url: &str) -> Option<&str> {
    url.strip_prefix("wss://")
        .or_else(|| url.strip_prefix("ws://"))
        .and_then(|s| s.split('/').next())
        .and_then(|s| s.split('?').next())
}
