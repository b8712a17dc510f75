// Streaming surface tests
//
// Runs the real server on a loopback port and drives the audio WebSocket
// end to end: ready handshake, binary chunk ingress, echoed playback
// egress, and orderly close.

mod common;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use callbridge_audio_core::{bytes_to_pcm, pcm_to_bytes};
use callbridge_bridge_core::{CallId, SessionState};
use callbridge_link_core::testing::{EndpointOptions, MockVoiceEndpoint};
use callbridge_server::api::AppState;

use common::*;

async fn serve(state: AppState) -> std::net::SocketAddr {
    let app = callbridge_server::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

#[tokio::test]
async fn test_stream_audio_end_to_end() {
    let endpoint = MockVoiceEndpoint::spawn(EndpointOptions {
        echo_audio: true,
        ..Default::default()
    })
    .await
    .unwrap();
    let state = test_state(endpoint.url(), StreamPairProvider::new());
    let addr = serve(state.clone()).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/audio/call-ws"))
        .await
        .unwrap();

    // ready handshake announces the endpoint chat id
    let ready = tokio::time::timeout(Duration::from_secs(3), ws.next())
        .await
        .expect("ready in time")
        .expect("socket open")
        .unwrap();
    let ready_json: serde_json::Value = match ready {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected ready text frame, got {other:?}"),
    };
    assert_eq!(ready_json["type"], "ready");
    assert_eq!(ready_json["chat_id"], "chat-test");

    // three distinct 20ms chunks in
    for value in 1..=3i16 {
        let chunk = pcm_to_bytes(&vec![value; 320]);
        ws.send(Message::binary(chunk)).await.unwrap();
    }

    wait_until(Duration::from_secs(3), "chunks reach the endpoint", || {
        endpoint.received_frames().len() >= 3
    })
    .await;
    let received = endpoint.received_frames();
    for (index, frame) in received.iter().take(3).enumerate() {
        let samples = bytes_to_pcm(frame);
        assert!(samples.iter().all(|&s| s == index as i16 + 1));
    }

    // echoes come back as binary playback chunks
    let mut playback_chunks = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while playback_chunks < 1 && tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(500), ws.next()).await {
            Ok(Some(Ok(Message::Binary(bytes)))) => {
                assert_eq!(bytes.len(), 640);
                playback_chunks += 1;
            }
            Ok(Some(Ok(_))) => {}
            _ => break,
        }
    }
    assert!(playback_chunks >= 1, "no playback audio received");

    // orderly close tears the bridge down
    ws.send(Message::text(r#"{"type":"close"}"#.to_string()))
        .await
        .unwrap();

    let call_id = CallId::new("call-ws");
    wait_until(Duration::from_secs(3), "bridge closed after stream end", || {
        matches!(
            state.controller.session_state(&call_id),
            Some(SessionState::Closed) | None
        )
    })
    .await;
}

#[tokio::test]
async fn test_second_stream_for_same_call_is_refused() {
    let endpoint = MockVoiceEndpoint::spawn(EndpointOptions::default()).await.unwrap();
    let state = test_state(endpoint.url(), StreamPairProvider::new());
    let addr = serve(state.clone()).await;

    let (mut first, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/audio/call-dup"))
        .await
        .unwrap();
    // wait until the first stream is live
    let ready = tokio::time::timeout(Duration::from_secs(3), first.next())
        .await
        .expect("ready in time")
        .expect("socket open")
        .unwrap();
    assert!(matches!(ready, Message::Text(_)));

    let (mut second, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/audio/call-dup"))
        .await
        .unwrap();
    let refused = tokio::time::timeout(Duration::from_secs(3), second.next())
        .await
        .expect("refusal in time")
        .expect("socket open")
        .unwrap();
    match refused {
        Message::Text(text) => {
            let json: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(json["type"], "error");
        }
        other => panic!("expected error frame, got {other:?}"),
    }
}
