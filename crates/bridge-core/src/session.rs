//! Bridge session
//!
//! The state machine governing one call's audio relay. A session owns a
//! device port pairing and a remote voice link; while Active it runs two
//! independent data paths (device→link and link→device) so a stall in one
//! direction cannot block the other. Every exit path, orderly or not,
//! releases the device port and closes the link before the session is
//! considered torn down.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use callbridge_audio_core::device::PlaybackHandle;
use callbridge_audio_core::{
    now_timestamp_ms, AudioDevice, AudioFrame, DeviceAudioPort, FrameCodec, FrameDirection,
};
use callbridge_link_core::{ConnectionParams, LinkError, LinkEvent, LinkSender, RemoteVoiceLink};

use crate::error::BridgeError;
use crate::registry::SessionRegistry;
use crate::types::{BridgeConfig, CallId, SessionEvent, SessionState, SessionStats};

/// Capacity of the session event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// External commands delivered to the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionCommand {
    Run,
    Drain,
    Fail,
}

/// Notices raised by the data-path pumps
#[derive(Debug)]
enum SessionNotice {
    /// The endpoint ended the conversation cleanly
    RemoteClosed,
    /// One of the paths hit an unrecoverable fault
    Fault(BridgeError),
}

/// How the Active phase ended
enum Outcome {
    Drain,
    Fail(Option<BridgeError>),
}

/// State shared between the session handle, its supervisor, and the pumps
pub(crate) struct SessionShared {
    call_id: CallId,
    state_tx: watch::Sender<SessionState>,
    created_at: DateTime<Utc>,
    started: Instant,
    last_activity_ms: AtomicU64,
    chat_id: parking_lot::Mutex<Option<String>>,
    last_error: parking_lot::Mutex<Option<String>>,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    frames_evicted: AtomicU64,
    sequence_gaps: AtomicU64,
    reconnects: AtomicU32,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl SessionShared {
    fn new(call_id: CallId) -> Arc<Self> {
        let (state_tx, _) = watch::channel(SessionState::Connecting);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            call_id,
            state_tx,
            created_at: Utc::now(),
            started: Instant::now(),
            last_activity_ms: AtomicU64::new(now_timestamp_ms()),
            chat_id: parking_lot::Mutex::new(None),
            last_error: parking_lot::Mutex::new(None),
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_evicted: AtomicU64::new(0),
            sequence_gaps: AtomicU64::new(0),
            reconnects: AtomicU32::new(0),
            events_tx,
        })
    }

    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Move to a new state, emitting the transition
    ///
    /// Terminal states are final; a transition out of one is ignored.
    fn transition(&self, next: SessionState) {
        let mut moved = false;
        self.state_tx.send_if_modified(|state| {
            if state.is_terminal() || *state == next {
                return false;
            }
            info!(call_id = %self.call_id, from = %state, to = %next, "session state change");
            *state = next;
            moved = true;
            true
        });
        if moved {
            self.emit(SessionEvent::StateChanged {
                call_id: self.call_id.clone(),
                state: next,
            });
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    fn touch(&self) {
        self.last_activity_ms.store(now_timestamp_ms(), Ordering::Relaxed);
    }

    fn set_error(&self, message: impl Into<String>) {
        *self.last_error.lock() = Some(message.into());
    }
}

/// Handle to one live bridge session
///
/// Owned by the registry; the supervising task and both data-path pumps run
/// in the background and retire the registry entry on completion.
pub struct BridgeSession {
    shared: Arc<SessionShared>,
    command_tx: watch::Sender<SessionCommand>,
}

impl std::fmt::Debug for BridgeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeSession")
            .field("call_id", &self.shared.call_id)
            .field("state", &self.shared.state())
            .finish()
    }
}

impl BridgeSession {
    /// Spawn a session for a freshly registered call
    pub(crate) fn spawn(
        call_id: CallId,
        config: BridgeConfig,
        params: ConnectionParams,
        input: Arc<dyn AudioDevice>,
        output: Arc<dyn AudioDevice>,
        registry: Arc<SessionRegistry>,
    ) -> Arc<Self> {
        let shared = SessionShared::new(call_id);
        let (command_tx, command_rx) = watch::channel(SessionCommand::Run);

        tokio::spawn(run_session(
            shared.clone(),
            config,
            params,
            input,
            output,
            command_rx,
            registry,
        ));

        Arc::new(Self { shared, command_tx })
    }

    /// The call this session serves
    pub fn call_id(&self) -> &CallId {
        &self.shared.call_id
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Watch lifecycle transitions
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribe to structured session events
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Begin orderly draining (call ended)
    pub fn begin_drain(&self) {
        let _ = self.command_tx.send(SessionCommand::Drain);
    }

    /// Force immediate failure (call-event source reported a failed call)
    pub fn fail(&self) {
        let _ = self.command_tx.send(SessionCommand::Fail);
    }

    /// Point-in-time statistics
    pub fn stats(&self) -> SessionStats {
        let shared = &self.shared;
        SessionStats {
            call_id: shared.call_id.clone(),
            state: shared.state(),
            created_at: shared.created_at,
            last_activity_at: DateTime::from_timestamp_millis(
                shared.last_activity_ms.load(Ordering::Relaxed) as i64,
            ),
            duration_seconds: shared.started.elapsed().as_secs_f64(),
            frames_sent: shared.frames_sent.load(Ordering::Relaxed),
            frames_received: shared.frames_received.load(Ordering::Relaxed),
            frames_evicted: shared.frames_evicted.load(Ordering::Relaxed),
            sequence_gaps: shared.sequence_gaps.load(Ordering::Relaxed),
            reconnects: shared.reconnects.load(Ordering::Relaxed),
            chat_id: shared.chat_id.lock().clone(),
            last_error: shared.last_error.lock().clone(),
        }
    }
}

/// Session supervisor: setup, relay, teardown
async fn run_session(
    shared: Arc<SessionShared>,
    config: BridgeConfig,
    params: ConnectionParams,
    input: Arc<dyn AudioDevice>,
    output: Arc<dyn AudioDevice>,
    mut command_rx: watch::Receiver<SessionCommand>,
    registry: Arc<SessionRegistry>,
) {
    debug!(call_id = %shared.call_id, "session connecting");

    // Connecting: open the device port, then the link; bounded by
    // setup_timeout. A failure here releases whatever was acquired.
    let setup = async {
        let mut port = DeviceAudioPort::open(
            input,
            output,
            config.device_format.clone(),
            config.playout_window,
        )
        .await
        .map_err(BridgeError::Device)?;

        match RemoteVoiceLink::connect(params.clone(), config.link.clone()).await {
            Ok(link) => Ok((port, link)),
            Err(e) => {
                let _ = port.release().await;
                Err(BridgeError::Link(e))
            }
        }
    };

    let (mut port, mut link) = tokio::select! {
        result = tokio::time::timeout(config.setup_timeout, setup) => match result {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                warn!(call_id = %shared.call_id, error = %e, "session setup failed");
                shared.set_error(e.to_string());
                shared.transition(SessionState::Failed);
                registry.retire(&shared.call_id, SessionState::Failed);
                return;
            }
            Err(_) => {
                let e = BridgeError::SetupTimeout {
                    timeout_ms: config.setup_timeout.as_millis() as u64,
                };
                warn!(call_id = %shared.call_id, error = %e, "session setup timed out");
                shared.set_error(e.to_string());
                shared.transition(SessionState::Failed);
                registry.retire(&shared.call_id, SessionState::Failed);
                return;
            }
        },
        // external stop while still Connecting: nothing to flush
        outcome = wait_for_command(&mut command_rx) => {
            let state = match outcome {
                SessionCommand::Fail => SessionState::Failed,
                _ => SessionState::Closed,
            };
            debug!(call_id = %shared.call_id, "session cancelled during setup");
            shared.transition(state);
            registry.retire(&shared.call_id, state);
            return;
        }
    };

    if let Some(chat_id) = link.chat_id() {
        *shared.chat_id.lock() = Some(chat_id.to_string());
    }

    // Both codecs share formats but carry independent resampler history
    let codecs = (
        FrameCodec::new(config.device_format.clone(), config.wire_format.clone()),
        FrameCodec::new(config.device_format.clone(), config.wire_format.clone()),
    );
    let (encode_codec, decode_codec) = match codecs {
        (Ok(encode), Ok(decode)) => (encode, decode),
        (Err(e), _) | (_, Err(e)) => {
            warn!(call_id = %shared.call_id, error = %e, "codec setup failed");
            shared.set_error(e.to_string());
            let _ = port.release().await;
            link.close().await;
            shared.transition(SessionState::Failed);
            registry.retire(&shared.call_id, SessionState::Failed);
            return;
        }
    };

    let sender = link.sender();
    let Some(link_events) = link.take_events() else {
        // fresh link always carries its event stream; treat defensively
        shared.set_error("link event stream unavailable");
        let _ = port.release().await;
        link.close().await;
        shared.transition(SessionState::Failed);
        registry.retire(&shared.call_id, SessionState::Failed);
        return;
    };
    let playback = port.playback_handle();

    let (notice_tx, mut notice_rx) = mpsc::channel(4);
    let (shutdown_tx, _) = watch::channel(false);

    let inbound = tokio::spawn(inbound_pump(
        port,
        encode_codec,
        sender,
        shared.clone(),
        config.clone(),
        shutdown_tx.subscribe(),
        notice_tx.clone(),
    ));
    let outbound = tokio::spawn(outbound_pump(
        link_events,
        decode_codec,
        playback,
        shared.clone(),
        config.clone(),
        shutdown_tx.subscribe(),
        notice_tx,
    ));
    let inbound_abort = inbound.abort_handle();
    let outbound_abort = outbound.abort_handle();

    shared.transition(SessionState::Active);

    // Active: wait for an external command or a pump notice
    let outcome = loop {
        tokio::select! {
            changed = command_rx.changed() => {
                if changed.is_err() {
                    break Outcome::Drain;
                }
                match *command_rx.borrow_and_update() {
                    SessionCommand::Drain => break Outcome::Drain,
                    SessionCommand::Fail => break Outcome::Fail(None),
                    SessionCommand::Run => {}
                }
            }
            notice = notice_rx.recv() => match notice {
                Some(SessionNotice::RemoteClosed) => break Outcome::Drain,
                Some(SessionNotice::Fault(e)) => break Outcome::Fail(Some(e)),
                None => break Outcome::Fail(Some(BridgeError::Link(LinkError::io(
                    "session data paths ended unexpectedly",
                )))),
            }
        }
    };

    let final_state = match outcome {
        Outcome::Drain => {
            shared.transition(SessionState::Draining);
            let _ = shutdown_tx.send(true);

            // flush the link's closing handshake before tearing the port down
            let orderly = tokio::time::timeout(config.drain_timeout, async {
                link.close().await;
                if let Ok(mut port) = inbound.await {
                    let _ = port.release().await;
                }
                let _ = outbound.await;
            })
            .await;

            if orderly.is_err() {
                let e = BridgeError::DrainTimeout {
                    timeout_ms: config.drain_timeout.as_millis() as u64,
                };
                warn!(call_id = %shared.call_id, error = %e, "forcing session closed");
                shared.set_error(e.to_string());
                inbound_abort.abort();
                outbound_abort.abort();
            }
            SessionState::Closed
        }
        Outcome::Fail(error) => {
            if let Some(e) = &error {
                warn!(call_id = %shared.call_id, error = %e, "session failed");
                shared.set_error(e.to_string());
            }
            let _ = shutdown_tx.send(true);

            let released = tokio::time::timeout(config.drain_timeout, async {
                if let Ok(mut port) = inbound.await {
                    let _ = port.release().await;
                }
                link.close().await;
                let _ = outbound.await;
            })
            .await;

            if released.is_err() {
                warn!(call_id = %shared.call_id, "forced teardown of failed session");
                inbound_abort.abort();
                outbound_abort.abort();
            }
            SessionState::Failed
        }
    };

    shared.transition(final_state);
    registry.retire(&shared.call_id, final_state);
    info!(
        call_id = %shared.call_id,
        state = %final_state,
        frames_sent = shared.frames_sent.load(Ordering::Relaxed),
        frames_received = shared.frames_received.load(Ordering::Relaxed),
        "session torn down"
    );
}

/// Wait for a command other than `Run`
async fn wait_for_command(command_rx: &mut watch::Receiver<SessionCommand>) -> SessionCommand {
    loop {
        if command_rx.changed().await.is_err() {
            return SessionCommand::Drain;
        }
        let command = *command_rx.borrow_and_update();
        if command != SessionCommand::Run {
            return command;
        }
    }
}

/// Device → link data path
///
/// Pulls captured frames in order, encodes, and forwards to the link. A full
/// send queue blocks for at most `send_block_timeout` before it counts as a
/// link fault. Returns the port so the supervisor controls release ordering.
async fn inbound_pump(
    mut port: DeviceAudioPort,
    mut codec: FrameCodec,
    sender: LinkSender,
    shared: Arc<SessionShared>,
    config: BridgeConfig,
    shutdown_rx: watch::Receiver<bool>,
    notice_tx: mpsc::Sender<SessionNotice>,
) -> DeviceAudioPort {
    let mut expected_sequence = 0u64;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let frame = match port.pull_captured(config.capture_poll).await {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                let _ = notice_tx.try_send(SessionNotice::Fault(BridgeError::Device(e)));
                break;
            }
        };

        if frame.sequence != expected_sequence {
            shared.sequence_gaps.fetch_add(1, Ordering::Relaxed);
            debug!(
                call_id = %shared.call_id,
                expected = expected_sequence,
                got = frame.sequence,
                "capture sequence discontinuity"
            );
        }
        expected_sequence = frame.sequence + 1;

        let bytes = match codec.encode(&frame.samples) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = notice_tx.try_send(SessionNotice::Fault(BridgeError::Device(e)));
                break;
            }
        };
        if bytes.is_empty() {
            continue;
        }

        match sender.send_audio(&bytes) {
            Ok(()) => {}
            Err(LinkError::Backpressure { .. }) => {
                match sender.send_audio_wait(&bytes, config.send_block_timeout).await {
                    Ok(()) => {}
                    Err(e) => {
                        let _ = notice_tx.try_send(SessionNotice::Fault(BridgeError::Link(e)));
                        break;
                    }
                }
            }
            Err(e) => {
                let _ = notice_tx.try_send(SessionNotice::Fault(BridgeError::Link(e)));
                break;
            }
        }

        shared.frames_sent.fetch_add(1, Ordering::Relaxed);
        shared.touch();
    }

    port
}

/// Link → device data path
///
/// Decodes endpoint audio in arrival order and queues it for playback; the
/// bounded playout window in the port enforces the eviction policy. Also
/// surfaces transcripts and link lifecycle events.
async fn outbound_pump(
    mut events: mpsc::Receiver<LinkEvent>,
    mut codec: FrameCodec,
    playback: PlaybackHandle,
    shared: Arc<SessionShared>,
    config: BridgeConfig,
    mut shutdown_rx: watch::Receiver<bool>,
    notice_tx: mpsc::Sender<SessionNotice>,
) {
    let mut sequence = 0u64;

    loop {
        let event = tokio::select! {
            _ = shutdown_rx.changed() => break,
            event = events.recv() => event,
        };

        match event {
            Some(LinkEvent::Audio(pcm)) => {
                let samples = match codec.decode(&pcm) {
                    Ok(samples) => samples,
                    Err(e) => {
                        let _ = notice_tx.try_send(SessionNotice::Fault(BridgeError::Device(e)));
                        break;
                    }
                };
                if samples.is_empty() {
                    continue;
                }
                let frame = AudioFrame::new(
                    samples,
                    config.device_format.clone(),
                    FrameDirection::Outbound,
                    sequence,
                    now_timestamp_ms(),
                );
                sequence += 1;

                if playback.push(frame).is_err() {
                    // port released under us: the session is already ending
                    break;
                }
                shared.frames_received.fetch_add(1, Ordering::Relaxed);
                shared
                    .frames_evicted
                    .store(playback.evicted_frames(), Ordering::Relaxed);
                shared.touch();
            }
            Some(LinkEvent::TranscriptUser(text)) => {
                info!(call_id = %shared.call_id, transcript = %text, "caller said");
                shared.emit(SessionEvent::TranscriptUser {
                    call_id: shared.call_id.clone(),
                    text,
                });
            }
            Some(LinkEvent::TranscriptAssistant(text)) => {
                info!(call_id = %shared.call_id, transcript = %text, "assistant said");
                shared.emit(SessionEvent::TranscriptAssistant {
                    call_id: shared.call_id.clone(),
                    text,
                });
            }
            Some(LinkEvent::EndpointError(message)) => {
                warn!(call_id = %shared.call_id, %message, "voice endpoint reported an error");
                shared.emit(SessionEvent::EndpointError {
                    call_id: shared.call_id.clone(),
                    message,
                });
            }
            Some(LinkEvent::Reconnecting { attempt }) => {
                debug!(call_id = %shared.call_id, attempt, "link reconnecting");
            }
            Some(LinkEvent::Reconnected) => {
                shared.reconnects.fetch_add(1, Ordering::Relaxed);
                info!(call_id = %shared.call_id, "link reconnected, relay resumed");
            }
            Some(LinkEvent::Closed) => {
                let _ = notice_tx.try_send(SessionNotice::RemoteClosed);
                break;
            }
            Some(LinkEvent::Fault(e)) => {
                let _ = notice_tx.try_send(SessionNotice::Fault(BridgeError::Link(e)));
                break;
            }
            None => {
                let _ = notice_tx.try_send(SessionNotice::Fault(BridgeError::Link(
                    LinkError::io("link event stream ended"),
                )));
                break;
            }
        }
    }
}
