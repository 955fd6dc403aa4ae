//! Listener WebSocket endpoint.
//!
//! The first client message must be `audio.hello`; negotiation picks a
//! codec, allocates a stream id and replies `audio.ready`. Afterwards
//! the socket is split: a writer task drains the listener's outbound
//! queue while the read side consumes control messages. Malformed or
//! unknown messages are logged and ignored, never fatal.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use lingcast_transport::{
    Capabilities, ClientMessage, Codec, DEFAULT_CODEC_PREFERENCE, ErrorCode, Listener, Outbound,
    ServerMessage, negotiate,
};

use crate::state::AppState;

/// Budget for the client to introduce itself.
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct AttachParams {
    /// Owning tenant, forwarded to the entitlement resolver.
    pub tenant: Option<String>,
}

/// `GET /v1/sessions/{session_id}/listen`
pub async fn listen(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(params): Query<AttachParams>,
    State(state): State<AppState>,
) -> Response {
    if !state.settings.streaming.enabled {
        return (StatusCode::SERVICE_UNAVAILABLE, "streaming disabled").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, params.tenant, state))
}

async fn handle_socket(socket: WebSocket, session_id: String, tenant: Option<String>, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    // Capability negotiation comes first.
    let hello = match tokio::time::timeout(HELLO_TIMEOUT, next_client_message(&mut stream)).await {
        Ok(Some(msg @ ClientMessage::Hello { .. })) => msg,
        Ok(_) | Err(_) => {
            warn!(session_id, "client never sent audio.hello");
            let _ = sink.close().await;
            return;
        }
    };
    let ClientMessage::Hello {
        client_id,
        capabilities,
        desired_codec,
        desired_sample_rate,
        target_lang,
    } = hello
    else {
        unreachable!()
    };

    let streaming = &state.settings.streaming;
    let codec = match negotiated_codec(&capabilities, desired_codec, streaming.default_codec) {
        Some(codec) => codec,
        None => {
            let error = ServerMessage::Error {
                stream_id: String::new(),
                error_code: ErrorCode::NoCompatibleCodec,
                message: "no codec in common with server preference".to_string(),
            };
            let _ = send_control(&mut sink, &error).await;
            let _ = sink.close().await;
            return;
        }
    };
    let sample_rate = desired_sample_rate.unwrap_or(streaming.default_sample_rate);

    // Entitlement backend loss rejects the attach.
    let entitlements = match state.resolver.resolve(&session_id, tenant.as_deref()).await {
        Ok(entitlements) => entitlements,
        Err(e) => {
            warn!(session_id, "rejecting attach: {e}");
            let error = ServerMessage::Error {
                stream_id: String::new(),
                error_code: ErrorCode::InvalidRequest,
                message: "entitlements unavailable".to_string(),
            };
            let _ = send_control(&mut sink, &error).await;
            let _ = sink.close().await;
            return;
        }
    };

    state
        .registry
        .get_or_create(&session_id, || (tenant, entitlements));
    let stream_id = format!("{}:{}", session_id, chrono::Utc::now().timestamp_millis());
    let (listener, mut outbound) = Listener::new(
        client_id.clone(),
        stream_id.clone(),
        codec,
        sample_rate,
        target_lang,
    );
    let listener = Arc::new(listener);
    state.registry.add_listener(&session_id, listener.clone());
    info!(session_id, client_id, codec = codec.as_str(), "listener attached");

    // Writer task: drain the outbound queue into the socket.
    let writer = tokio::spawn(async move {
        while let Some(out) = outbound.recv().await {
            let message = match out {
                Outbound::Control(msg) => match serde_json::to_string(&msg) {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        warn!("control serialization failed: {e}");
                        continue;
                    }
                },
                Outbound::Audio(bytes) => Message::Binary(bytes.to_vec().into()),
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Exactly one ready, in reply to the hello.
    let _ = listener.send(Outbound::Control(ServerMessage::Ready {
        stream_id,
        codec,
        sample_rate,
        channels: 1,
        jitter_buffer_ms: streaming.jitter_buffer_ms,
    }));

    // Read side: control messages until the client goes away.
    while let Some(msg) = next_client_message(&mut stream).await {
        match msg {
            ClientMessage::SetLang { lang, .. } => {
                debug!(session_id, client_id, lang = lang.as_deref().unwrap_or("*"), "language change");
                state
                    .registry
                    .update_listener_language(&session_id, &client_id, lang);
            }
            ClientMessage::Ack {
                segment_id,
                chunk_index,
                ..
            } => {
                // Advisory only.
                debug!(session_id, client_id, segment_id, chunk_index, "ack");
            }
            ClientMessage::Hello { .. } => {
                warn!(session_id, client_id, "duplicate audio.hello ignored");
            }
            ClientMessage::Unknown => {
                warn!(session_id, client_id, "unknown control message type ignored");
            }
        }
    }

    let outcome = state.registry.remove_listener(&session_id, &client_id);
    if outcome.session_closed {
        state.orchestrators.end_session(&session_id);
    }
    writer.abort();
    info!(session_id, client_id, "listener detached");
}

/// Reads the next parseable control message; protocol errors are logged
/// and skipped, `None` means the socket is gone.
async fn next_client_message(
    stream: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<ClientMessage> {
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => return Some(msg),
                Err(e) => warn!("malformed control message ignored: {e}"),
            },
            Ok(Message::Close(_)) => return None,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Binary(_)) => {
                warn!("unexpected binary frame from listener ignored");
            }
            Err(e) => {
                debug!("socket error: {e}");
                return None;
            }
        }
    }
    None
}

/// Intersects client capabilities with the server preference order. A
/// client that declares nothing gets the configured default; an
/// explicitly desired codec wins when the client also declares it.
fn negotiated_codec(
    capabilities: &Capabilities,
    desired: Option<Codec>,
    default_codec: Codec,
) -> Option<Codec> {
    if capabilities.codecs.is_empty() {
        return Some(desired.unwrap_or(default_codec));
    }
    if let Some(desired) = desired
        && capabilities.codecs.contains(&desired)
    {
        return Some(desired);
    }
    negotiate(capabilities, &DEFAULT_CODEC_PREFERENCE)
}

async fn send_control(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    sink.send(Message::Text(json.into())).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiation_prefers_desired_when_supported() {
        let caps = Capabilities {
            codecs: vec![Codec::Mp3, Codec::OpusWebm],
            max_sample_rate: None,
        };
        assert_eq!(
            negotiated_codec(&caps, Some(Codec::Mp3), Codec::Mp3),
            Some(Codec::Mp3)
        );
        // Desired but undeclared falls back to server preference.
        assert_eq!(
            negotiated_codec(&caps, Some(Codec::OpusOgg), Codec::Mp3),
            Some(Codec::OpusWebm)
        );
    }

    #[test]
    fn test_negotiation_empty_capabilities_uses_default() {
        let caps = Capabilities::default();
        assert_eq!(negotiated_codec(&caps, None, Codec::Mp3), Some(Codec::Mp3));
    }

    #[test]
    fn test_negotiation_empty_intersection() {
        let caps = Capabilities {
            codecs: vec![Codec::OpusOgg],
            max_sample_rate: None,
        };
        assert_eq!(negotiated_codec(&caps, None, Codec::Mp3), None);
    }
}
