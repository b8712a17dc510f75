//! Remote voice link
//!
//! One persistent, message-framed duplex connection per session to the
//! conversational-AI voice endpoint. The socket is owned by a supervisor
//! task; callers interact through a cloneable [`LinkSender`] (bounded,
//! fail-fast enqueue) and a stream of [`LinkEvent`]s. An unexpected
//! disconnect while the session is Active is retried with exponential
//! backoff before a fault is reported; a clean remote close is surfaced as
//! [`LinkEvent::Closed`] so the session drains instead of failing.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use http::header::{HeaderName, HeaderValue};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Bytes;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::{ConnectionParams, LinkConfig};
use crate::error::{LinkError, LinkResult};
use crate::protocol::{ClientMessage, ServerMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Header carrying the endpoint API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// How long `close` waits for the supervisor to finish the closing handshake
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Events produced by the link for the owning session
#[derive(Debug)]
pub enum LinkEvent {
    /// Decoded PCM bytes to play into the call
    Audio(Vec<u8>),
    /// Transcript of what the caller said
    TranscriptUser(String),
    /// Transcript of what the assistant said
    TranscriptAssistant(String),
    /// Endpoint-reported error, informational
    EndpointError(String),
    /// Connection lost; reconnect attempt starting
    Reconnecting { attempt: u32 },
    /// Reconnect succeeded; frame relay resumes
    Reconnected,
    /// Clean remote close (end of conversation)
    Closed,
    /// Reconnect budget exhausted; the link is dead
    Fault(LinkError),
}

/// Cloneable sending half of a link
#[derive(Debug, Clone)]
pub struct LinkSender {
    tx: mpsc::Sender<String>,
    capacity: usize,
}

impl LinkSender {
    /// Enqueue one frame of PCM, failing fast when the queue is full
    pub fn send_audio(&self, pcm: &[u8]) -> LinkResult<()> {
        let text = ClientMessage::audio(pcm).to_json()?;
        self.tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => LinkError::Backpressure {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => LinkError::io("link closed"),
        })
    }

    /// Enqueue one frame of PCM, waiting up to `timeout` for queue space
    ///
    /// Used by the session's bounded-blocking backpressure policy; a timeout
    /// here is what the session treats as a link fault.
    pub async fn send_audio_wait(&self, pcm: &[u8], timeout: Duration) -> LinkResult<()> {
        let text = ClientMessage::audio(pcm).to_json()?;
        self.tx
            .send_timeout(text, timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => LinkError::Backpressure {
                    capacity: self.capacity,
                },
                mpsc::error::SendTimeoutError::Closed(_) => LinkError::io("link closed"),
            })
    }

    /// Ask the endpoint to suspend audio processing
    pub fn pause(&self) -> LinkResult<()> {
        self.send_control(ClientMessage::Pause)
    }

    /// Ask the endpoint to resume audio processing
    pub fn resume(&self) -> LinkResult<()> {
        self.send_control(ClientMessage::Resume)
    }

    fn send_control(&self, message: ClientMessage) -> LinkResult<()> {
        let text = message.to_json()?;
        self.tx
            .try_send(text)
            .map_err(|_| LinkError::io("link closed or congested"))
    }
}

/// Persistent duplex connection to the voice endpoint
#[derive(Debug)]
pub struct RemoteVoiceLink {
    sender: LinkSender,
    events_rx: Option<mpsc::Receiver<LinkEvent>>,
    shutdown_tx: watch::Sender<bool>,
    supervisor: Option<JoinHandle<()>>,
    chat_id: Option<String>,
}

impl RemoteVoiceLink {
    /// Connect and perform the session-settings handshake
    pub async fn connect(params: ConnectionParams, config: LinkConfig) -> LinkResult<Self> {
        let (ws, chat_id) = connect_socket(&params, &config).await?;
        info!(endpoint = %params.endpoint, chat_id = ?chat_id, "voice link established");

        let (outbound_tx, outbound_rx) = mpsc::channel(config.send_queue_capacity);
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let capacity = config.send_queue_capacity;
        let supervisor = tokio::spawn(run_supervisor(
            ws,
            params,
            config,
            outbound_rx,
            events_tx,
            shutdown_rx,
        ));

        Ok(Self {
            sender: LinkSender {
                tx: outbound_tx,
                capacity,
            },
            events_rx: Some(events_rx),
            shutdown_tx,
            supervisor: Some(supervisor),
            chat_id,
        })
    }

    /// Endpoint chat id from the handshake, if the endpoint reported one
    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    /// Cloneable sending half
    pub fn sender(&self) -> LinkSender {
        self.sender.clone()
    }

    /// Take the inbound event stream; yields `None` once per link
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<LinkEvent>> {
        self.events_rx.take()
    }

    /// Close the connection, flushing the closing handshake within a bound
    ///
    /// Idempotent; always leaves the supervisor task finished or aborted.
    pub async fn close(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(mut supervisor) = self.supervisor.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut supervisor)
                .await
                .is_err()
            {
                warn!("voice link supervisor did not stop in time, aborting");
                supervisor.abort();
            }
        }
    }
}

impl Drop for RemoteVoiceLink {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            let _ = self.shutdown_tx.send(true);
            supervisor.abort();
        }
    }
}

/// Establish the socket and run the session-settings handshake
async fn connect_socket(
    params: &ConnectionParams,
    config: &LinkConfig,
) -> LinkResult<(WsStream, Option<String>)> {
    let mut request = params
        .endpoint
        .as_str()
        .into_client_request()
        .map_err(|e| LinkError::connect_failed(&params.endpoint, e))?;
    if let Some(api_key) = &params.api_key {
        let value = HeaderValue::from_str(api_key)
            .map_err(|e| LinkError::connect_failed(&params.endpoint, e))?;
        request
            .headers_mut()
            .insert(HeaderName::from_static(API_KEY_HEADER), value);
    }

    let (mut ws, _response) = connect_async(request)
        .await
        .map_err(|e| LinkError::connect_failed(&params.endpoint, e))?;

    let settings = ClientMessage::SessionSettings {
        config_id: params.config_id.clone(),
        audio: params.audio.clone(),
    };
    ws.send(Message::text(settings.to_json()?))
        .await
        .map_err(|e| LinkError::connect_failed(&params.endpoint, e))?;

    let handshake = async {
        while let Some(message) = ws.next().await {
            match message {
                Ok(Message::Text(text)) => match ServerMessage::parse(&text)? {
                    ServerMessage::ChatMetadata { chat_id } => return Ok(chat_id),
                    ServerMessage::Error { message } => {
                        return Err(LinkError::HandshakeRejected { reason: message })
                    }
                    // anything else before the ack is endpoint chatter
                    other => debug!(message = ?other, "ignoring pre-handshake message"),
                },
                Ok(_) => {}
                Err(e) => return Err(LinkError::io(e)),
            }
        }
        Err(LinkError::Closed)
    };

    let chat_id = tokio::time::timeout(config.handshake_timeout, handshake)
        .await
        .map_err(|_| LinkError::HandshakeTimeout {
            timeout_ms: config.handshake_timeout.as_millis() as u64,
        })??;

    Ok((ws, chat_id))
}

/// Socket supervisor: pumps both directions and owns reconnection
async fn run_supervisor(
    mut ws: WsStream,
    params: ConnectionParams,
    config: LinkConfig,
    mut outbound_rx: mpsc::Receiver<String>,
    events_tx: mpsc::Sender<LinkEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut keepalive = tokio::time::interval(config.ping_interval);
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    keepalive.reset(); // skip the immediate first tick

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                let _ = ws.close(None).await;
                debug!("voice link closed by owner");
                return;
            }

            outbound = outbound_rx.recv() => match outbound {
                Some(text) => {
                    if let Err(e) = ws.send(Message::text(text)).await {
                        warn!(error = %e, "voice link send failed");
                        if !reconnect(&mut ws, &params, &config, &events_tx, &e.to_string()).await {
                            return;
                        }
                    }
                }
                None => {
                    let _ = ws.close(None).await;
                    return;
                }
            },

            incoming = ws.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if !dispatch_server_message(&text, &events_tx).await {
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("voice endpoint closed the conversation");
                    let _ = events_tx.send(LinkEvent::Closed).await;
                    return;
                }
                Some(Ok(_)) => {} // binary / ping / pong
                Some(Err(e)) => {
                    warn!(error = %e, "voice link receive failed");
                    if !reconnect(&mut ws, &params, &config, &events_tx, &e.to_string()).await {
                        return;
                    }
                }
            },

            _ = keepalive.tick() => {
                if let Err(e) = ws.send(Message::Ping(Bytes::new())).await {
                    warn!(error = %e, "voice link keepalive failed");
                    if !reconnect(&mut ws, &params, &config, &events_tx, &e.to_string()).await {
                        return;
                    }
                }
            }
        }
    }
}

/// Translate one endpoint message into a link event
///
/// Returns false when the event consumer is gone and the supervisor should
/// stop.
async fn dispatch_server_message(text: &str, events_tx: &mpsc::Sender<LinkEvent>) -> bool {
    let message = match ServerMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "dropping unparseable endpoint message");
            return true;
        }
    };

    let event = match message {
        ServerMessage::AudioOutput { .. } => match message.audio_bytes() {
            Ok(pcm) => LinkEvent::Audio(pcm),
            Err(e) => {
                warn!(error = %e, "dropping malformed audio payload");
                return true;
            }
        },
        ServerMessage::UserMessage { message } => LinkEvent::TranscriptUser(message.content),
        ServerMessage::AssistantMessage { message } => {
            LinkEvent::TranscriptAssistant(message.content)
        }
        ServerMessage::Error { message } => LinkEvent::EndpointError(message),
        ServerMessage::ChatMetadata { .. } | ServerMessage::Unknown => return true,
    };
    events_tx.send(event).await.is_ok()
}

/// Reconnect with backoff; true when the socket has been replaced
async fn reconnect(
    ws: &mut WsStream,
    params: &ConnectionParams,
    config: &LinkConfig,
    events_tx: &mpsc::Sender<LinkEvent>,
    reason: &str,
) -> bool {
    let mut last_error = reason.to_string();

    for attempt in 1..=config.reconnect.max_attempts {
        let delay = config.reconnect.delay_for(attempt);
        warn!(
            attempt,
            max_attempts = config.reconnect.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "voice link lost, reconnecting"
        );
        if events_tx
            .send(LinkEvent::Reconnecting { attempt })
            .await
            .is_err()
        {
            return false;
        }
        tokio::time::sleep(delay).await;

        match connect_socket(params, config).await {
            Ok((fresh, _chat_id)) => {
                *ws = fresh;
                info!(attempt, "voice link reconnected");
                return events_tx.send(LinkEvent::Reconnected).await.is_ok();
            }
            Err(e) => {
                debug!(attempt, error = %e, "reconnect attempt failed");
                last_error = e.to_string();
            }
        }
    }

    let _ = events_tx
        .send(LinkEvent::Fault(LinkError::Fault {
            attempts: config.reconnect.max_attempts,
            reason: last_error,
        }))
        .await;
    false
}
