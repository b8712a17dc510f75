// Tests for RemoteVoiceLink against an in-process voice endpoint
//
// Covers the handshake, in-order frame relay, the clean-close/fault
// distinction, and reconnection with backoff up to budget exhaustion.

use std::time::Duration;

use tokio::sync::mpsc;

use callbridge_link_core::testing::{EndpointOptions, MockVoiceEndpoint};
use callbridge_link_core::{
    ConnectionParams, LinkConfig, LinkError, LinkEvent, ReconnectPolicy, RemoteVoiceLink,
};

fn quick_config() -> LinkConfig {
    LinkConfig {
        handshake_timeout: Duration::from_secs(2),
        ping_interval: Duration::from_secs(60),
        reconnect: ReconnectPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
            jitter: false,
        },
        ..Default::default()
    }
}

async fn next_event(
    events: &mut mpsc::Receiver<LinkEvent>,
    wait: Duration,
) -> Option<LinkEvent> {
    tokio::time::timeout(wait, events.recv()).await.ok().flatten()
}

#[tokio::test]
async fn test_connect_handshake_reports_chat_id() {
    let endpoint = MockVoiceEndpoint::spawn(EndpointOptions::default()).await.unwrap();
    let params = ConnectionParams::new(endpoint.url()).with_api_key("test-key");

    let mut link = RemoteVoiceLink::connect(params, quick_config()).await.unwrap();
    assert_eq!(link.chat_id(), Some("chat-test"));
    link.close().await;
}

#[tokio::test]
async fn test_frames_relayed_in_order_without_gaps() {
    let endpoint = MockVoiceEndpoint::spawn(EndpointOptions {
        echo_audio: true,
        ..Default::default()
    })
    .await
    .unwrap();

    let mut link = RemoteVoiceLink::connect(ConnectionParams::new(endpoint.url()), quick_config())
        .await
        .unwrap();
    let sender = link.sender();
    let mut events = link.take_events().expect("events available once");

    let sent: Vec<Vec<u8>> = (0..20u8).map(|i| vec![i, i, i, i]).collect();
    for frame in &sent {
        sender.send_audio(frame).unwrap();
    }

    // control messages interleave without disturbing the audio stream
    sender.pause().unwrap();
    sender.resume().unwrap();

    // every frame comes back as an echo, in order
    let mut echoed = Vec::new();
    while echoed.len() < sent.len() {
        match next_event(&mut events, Duration::from_secs(2)).await {
            Some(LinkEvent::Audio(pcm)) => echoed.push(pcm),
            Some(other) => panic!("unexpected event: {other:?}"),
            None => panic!("timed out after {} echoes", echoed.len()),
        }
    }
    assert_eq!(echoed, sent);
    assert_eq!(endpoint.received_frames(), sent);

    link.close().await;
}

#[tokio::test]
async fn test_clean_remote_close_is_not_a_fault() {
    let endpoint = MockVoiceEndpoint::spawn(EndpointOptions {
        close_after_frames: Some(2),
        ..Default::default()
    })
    .await
    .unwrap();

    let mut link = RemoteVoiceLink::connect(ConnectionParams::new(endpoint.url()), quick_config())
        .await
        .unwrap();
    let sender = link.sender();
    let mut events = link.take_events().unwrap();

    sender.send_audio(&[1, 2]).unwrap();
    sender.send_audio(&[3, 4]).unwrap();

    match next_event(&mut events, Duration::from_secs(2)).await {
        Some(LinkEvent::Closed) => {}
        other => panic!("expected clean close, got {other:?}"),
    }
    assert_eq!(endpoint.connection_count(), 1);

    link.close().await;
}

#[tokio::test]
async fn test_transcripts_surface_as_events() {
    let endpoint = MockVoiceEndpoint::spawn(EndpointOptions {
        transcripts_after_frames: Some(1),
        ..Default::default()
    })
    .await
    .unwrap();

    let mut link = RemoteVoiceLink::connect(ConnectionParams::new(endpoint.url()), quick_config())
        .await
        .unwrap();
    let sender = link.sender();
    let mut events = link.take_events().unwrap();

    sender.send_audio(&[0; 8]).unwrap();

    match next_event(&mut events, Duration::from_secs(2)).await {
        Some(LinkEvent::TranscriptUser(text)) => assert_eq!(text, "hello from the caller"),
        other => panic!("expected user transcript, got {other:?}"),
    }
    match next_event(&mut events, Duration::from_secs(2)).await {
        Some(LinkEvent::TranscriptAssistant(text)) => {
            assert_eq!(text, "hello from the assistant")
        }
        other => panic!("expected assistant transcript, got {other:?}"),
    }

    link.close().await;
}

#[tokio::test]
async fn test_reconnect_resumes_relay_after_abrupt_drop() {
    let endpoint = MockVoiceEndpoint::spawn(EndpointOptions {
        drop_after_frames: Some(2),
        ..Default::default()
    })
    .await
    .unwrap();

    let mut link = RemoteVoiceLink::connect(ConnectionParams::new(endpoint.url()), quick_config())
        .await
        .unwrap();
    let sender = link.sender();
    let mut events = link.take_events().unwrap();

    sender.send_audio(&[1]).unwrap();
    sender.send_audio(&[2]).unwrap();

    // the endpoint drops the socket without a close handshake
    let mut reconnecting_seen = false;
    loop {
        match next_event(&mut events, Duration::from_secs(2)).await {
            Some(LinkEvent::Reconnecting { .. }) => reconnecting_seen = true,
            Some(LinkEvent::Reconnected) => break,
            Some(other) => panic!("unexpected event: {other:?}"),
            None => panic!("reconnect did not complete"),
        }
    }
    assert!(reconnecting_seen);
    assert_eq!(endpoint.connection_count(), 2);

    // relay resumes on the fresh connection
    sender.send_audio(&[3]).unwrap();
    sender.send_audio(&[4]).unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while endpoint.received_frames().len() < 4 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("frames after reconnect");

    assert_eq!(
        endpoint.received_frames(),
        vec![vec![1], vec![2], vec![3], vec![4]]
    );

    link.close().await;
}

#[tokio::test]
async fn test_reconnect_budget_exhaustion_reports_fault() {
    let endpoint = MockVoiceEndpoint::spawn(EndpointOptions {
        drop_after_frames: Some(1),
        ..Default::default()
    })
    .await
    .unwrap();

    let mut link = RemoteVoiceLink::connect(ConnectionParams::new(endpoint.url()), quick_config())
        .await
        .unwrap();
    let sender = link.sender();
    let mut events = link.take_events().unwrap();

    // no more connections will be accepted, so every retry must fail
    endpoint.stop_accepting();
    sender.send_audio(&[9]).unwrap();

    let mut attempts = 0;
    loop {
        match next_event(&mut events, Duration::from_secs(3)).await {
            Some(LinkEvent::Reconnecting { attempt }) => attempts = attempt,
            Some(LinkEvent::Fault(LinkError::Fault { attempts: reported, .. })) => {
                assert_eq!(reported, 3);
                break;
            }
            Some(other) => panic!("unexpected event: {other:?}"),
            None => panic!("fault never reported"),
        }
    }
    assert_eq!(attempts, 3);

    link.close().await;
}

#[tokio::test]
async fn test_handshake_rejection_fails_connect() {
    let endpoint = MockVoiceEndpoint::spawn(EndpointOptions {
        reject_handshake: true,
        ..Default::default()
    })
    .await
    .unwrap();

    let result =
        RemoteVoiceLink::connect(ConnectionParams::new(endpoint.url()), quick_config()).await;
    assert!(matches!(result, Err(LinkError::HandshakeRejected { .. })));
}

#[tokio::test]
async fn test_handshake_timeout_on_silent_endpoint() {
    let endpoint = MockVoiceEndpoint::spawn(EndpointOptions {
        silent_handshake: true,
        ..Default::default()
    })
    .await
    .unwrap();

    let config = LinkConfig {
        handshake_timeout: Duration::from_millis(200),
        ..quick_config()
    };
    let result = RemoteVoiceLink::connect(ConnectionParams::new(endpoint.url()), config).await;
    assert!(matches!(result, Err(LinkError::HandshakeTimeout { .. })));
}
