//! In-process voice endpoint
//!
//! A loopback WebSocket server speaking the endpoint protocol, used by the
//! link and bridge test suites and as a local development stub when no real
//! endpoint is reachable. Behaviour (echo, abrupt drops, clean closes,
//! handshake rejection) is scripted through [`EndpointOptions`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::debug;

use tokio_tungstenite::tungstenite::protocol::Message;

use crate::protocol::{ClientMessage, ServerMessage, TranscriptPayload};

/// Scripted behaviour for a [`MockVoiceEndpoint`]
#[derive(Debug, Clone)]
pub struct EndpointOptions {
    /// Chat id reported in `chat_metadata`
    pub chat_id: String,
    /// Echo every `audio_input` back as `audio_output`
    pub echo_audio: bool,
    /// Drop the TCP connection (no close handshake) after this many frames
    pub drop_after_frames: Option<usize>,
    /// Cleanly close the connection after this many frames
    pub close_after_frames: Option<usize>,
    /// Send a transcript pair after this many frames
    pub transcripts_after_frames: Option<usize>,
    /// Answer the handshake with an `error` message instead of metadata
    pub reject_handshake: bool,
    /// Accept the socket but never acknowledge the handshake
    pub silent_handshake: bool,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            chat_id: "chat-test".to_string(),
            echo_audio: false,
            drop_after_frames: None,
            close_after_frames: None,
            transcripts_after_frames: None,
            reject_handshake: false,
            silent_handshake: false,
        }
    }
}

/// Loopback WebSocket server standing in for the voice endpoint
#[derive(Debug)]
pub struct MockVoiceEndpoint {
    addr: SocketAddr,
    accept_task: JoinHandle<()>,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    connections: Arc<AtomicUsize>,
}

impl MockVoiceEndpoint {
    /// Bind on a loopback port and start accepting connections
    pub async fn spawn(options: EndpointOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let received_for_task = received.clone();
        let connections_for_task = connections.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                debug!(%peer, "mock endpoint accepted connection");
                connections_for_task.fetch_add(1, Ordering::SeqCst);
                let options = options.clone();
                let received = received_for_task.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, options, received).await {
                        debug!(error = %e, "mock endpoint connection ended");
                    }
                });
            }
        });

        Ok(Self {
            addr,
            accept_task,
            received,
            connections,
        })
    }

    /// WebSocket URL of this endpoint
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Decoded `audio_input` payloads in arrival order, across connections
    pub fn received_frames(&self) -> Vec<Vec<u8>> {
        self.received.lock().expect("endpoint state lock").clone()
    }

    /// Number of connections accepted so far
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Stop accepting connections; existing ones keep running
    pub fn stop_accepting(&self) {
        self.accept_task.abort();
    }
}

impl Drop for MockVoiceEndpoint {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    options: EndpointOptions,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut ws = tokio_tungstenite::accept_async(stream).await?;

    if options.silent_handshake {
        while ws.next().await.is_some() {}
        return Ok(());
    }

    // handshake: expect session_settings first
    let first = match ws.next().await {
        Some(Ok(Message::Text(text))) => text,
        other => return Err(format!("expected session_settings, got {other:?}").into()),
    };
    let settings: ClientMessage = serde_json::from_str(&first)?;
    if !matches!(settings, ClientMessage::SessionSettings { .. }) {
        return Err("first message was not session_settings".into());
    }

    if options.reject_handshake {
        let reply = serde_json::to_string(&ServerMessage::Error {
            message: "invalid configuration".to_string(),
        })?;
        ws.send(Message::text(reply)).await?;
        ws.close(None).await?;
        return Ok(());
    }

    let metadata = serde_json::to_string(&ServerMessage::ChatMetadata {
        chat_id: Some(options.chat_id.clone()),
    })?;
    ws.send(Message::text(metadata)).await?;

    let mut frames = 0usize;
    while let Some(message) = ws.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(_) => break,
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::AudioInput { data }) => {
                let pcm = BASE64.decode(&data)?;
                received.lock().expect("endpoint state lock").push(pcm);
                frames += 1;

                if options.echo_audio {
                    let echo = serde_json::to_string(&ServerMessage::AudioOutput { data })?;
                    ws.send(Message::text(echo)).await?;
                }
                if options.transcripts_after_frames == Some(frames) {
                    let user = serde_json::to_string(&ServerMessage::UserMessage {
                        message: TranscriptPayload {
                            content: "hello from the caller".to_string(),
                        },
                    })?;
                    let assistant = serde_json::to_string(&ServerMessage::AssistantMessage {
                        message: TranscriptPayload {
                            content: "hello from the assistant".to_string(),
                        },
                    })?;
                    ws.send(Message::text(user)).await?;
                    ws.send(Message::text(assistant)).await?;
                }
                if options.drop_after_frames == Some(frames) {
                    // abrupt TCP drop, no closing handshake
                    return Ok(());
                }
                if options.close_after_frames == Some(frames) {
                    ws.close(None).await?;
                    break;
                }
            }
            Ok(ClientMessage::Pause) | Ok(ClientMessage::Resume) => {}
            Ok(ClientMessage::SessionSettings { .. }) => {}
            Err(e) => return Err(format!("unparseable client message: {e}").into()),
        }
    }

    Ok(())
}
