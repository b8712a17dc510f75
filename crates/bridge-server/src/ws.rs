//! Streaming audio surface
//!
//! `GET /ws/audio/{call_id}` upgrades to a WebSocket carrying raw audio as
//! fixed-size binary chunks: client→server frames feed the bridge's capture
//! side, server→client frames carry playback audio. Used when the call's
//! audio is captured remotely rather than on this host. Idle periods are
//! answered with a JSON heartbeat so intermediaries keep the socket alive.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use callbridge_audio_core::device::stream::StreamAudioDevice;
use callbridge_audio_core::{bytes_to_pcm, pcm_to_bytes};
use callbridge_bridge_core::{BridgeError, CallId, SessionState};

use crate::api::AppState;

/// Control messages sent to the streaming client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EgressMessage {
    /// Bridge is Active; audio may flow
    Ready { chat_id: Option<String> },
    /// Idle keepalive
    Heartbeat,
    /// Bridge could not start or died
    Error { message: String },
}

/// Control messages accepted from the streaming client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IngressMessage {
    /// Orderly end of the stream
    Close,
}

/// Upgrade handler for the audio WebSocket
pub async fn audio_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| handle_audio_socket(socket, CallId::new(call_id), state))
}

async fn send_control(socket: &mut WebSocket, message: &EgressMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(text) => socket.send(Message::Text(text)).await.is_ok(),
        Err(_) => false,
    }
}

async fn handle_audio_socket(mut socket: WebSocket, call_id: CallId, state: AppState) {
    info!(%call_id, "audio stream connected");

    let (input, source) = StreamAudioDevice::input(call_id.as_str());
    let (output, mut sink) = StreamAudioDevice::output(call_id.as_str());

    let session = match state.controller.start_bridge_with(
        call_id.clone(),
        state.params.clone(),
        input,
        output,
    ) {
        Ok(session) => session,
        Err(BridgeError::DuplicateSession { .. }) => {
            let _ = send_control(
                &mut socket,
                &EgressMessage::Error {
                    message: "bridge already exists for this call".to_string(),
                },
            )
            .await;
            return;
        }
        Err(e) => {
            let _ = send_control(&mut socket, &EgressMessage::Error { message: e.to_string() })
                .await;
            return;
        }
    };

    // hold the audio until the endpoint link is up
    let mut states = session.state_watch();
    loop {
        let current = *states.borrow_and_update();
        if current == SessionState::Active {
            break;
        }
        if current.is_terminal() {
            let message = session
                .stats()
                .last_error
                .unwrap_or_else(|| "bridge failed during setup".to_string());
            let _ = send_control(&mut socket, &EgressMessage::Error { message }).await;
            return;
        }
        if states.changed().await.is_err() {
            return;
        }
    }

    let chat_id = session.stats().chat_id;
    if !send_control(&mut socket, &EgressMessage::Ready { chat_id }).await {
        state.controller.stop_bridge(&call_id);
        return;
    }

    let mut heartbeat = tokio::time::interval(state.heartbeat);
    heartbeat.reset();

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Binary(bytes))) => {
                    heartbeat.reset();
                    if source.push(bytes_to_pcm(&bytes)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<IngressMessage>(&text) {
                        Ok(IngressMessage::Close) => break,
                        Err(_) => debug!(%call_id, "ignoring unknown stream control message"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(%call_id, error = %e, "audio stream receive error");
                    break;
                }
            },

            playback = sink.next() => match playback {
                Some(samples) => {
                    if socket.send(Message::Binary(pcm_to_bytes(&samples))).await.is_err() {
                        break;
                    }
                }
                None => break,
            },

            changed = states.changed() => {
                if changed.is_err() || states.borrow().is_terminal() {
                    debug!(%call_id, "bridge ended, closing audio stream");
                    break;
                }
            }

            _ = heartbeat.tick() => {
                if !send_control(&mut socket, &EgressMessage::Heartbeat).await {
                    break;
                }
            }
        }
    }

    state.controller.stop_bridge(&call_id);
    let _ = socket.send(Message::Close(None)).await;
    info!(%call_id, "audio stream disconnected");
}
