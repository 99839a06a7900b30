//! Realtime transport against a mock gateway
//!
//! Covers both authentication encodings: the inline provider key gets a
//! working session, the gateway token alone is closed with 4001.

mod mock_gateway;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::timeout;

use aig_probe::config::{GatewayConfig, Secret};
use aig_probe::core::realtime::{
    CloseDiagnosis, ConnectionState, RealtimeClient, RealtimeEvent, RealtimeEvents,
    SessionOptions,
};
use aig_probe::core::audio::AudioCapture;
use aig_probe::core::{GatewayError, GatewayResult, Message};

use mock_gateway::{MockGateway, UNAUTHORIZED_CLOSE_CODE};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn test_config(host: String, insecure_subprotocol: bool) -> GatewayConfig {
    GatewayConfig {
        account_id: "acct".to_string(),
        gateway_id: "gw".to_string(),
        api_key: Some(Secret::new("sk-test")),
        auth_token: Some(Secret::new("cf-token")),
        host: Some(host),
        tls: false,
        insecure_subprotocol,
        ..Default::default()
    }
}

fn client_for(gateway: &MockGateway, insecure_subprotocol: bool) -> (RealtimeClient, RealtimeEvents) {
    let client = RealtimeClient::new(
        test_config(gateway.host(), insecure_subprotocol),
        SessionOptions::default().text_only(),
    );
    let events = client.events().unwrap();
    (client, events)
}

/// Capture that yields one chunk and records whether it was stopped.
struct SpyCapture {
    stopped: Arc<AtomicBool>,
    chunks: Option<mpsc::Sender<Bytes>>,
}

impl SpyCapture {
    fn new() -> (Box<dyn AudioCapture>, Arc<AtomicBool>) {
        let stopped = Arc::new(AtomicBool::new(false));
        let capture = SpyCapture {
            stopped: stopped.clone(),
            chunks: None,
        };
        (Box::new(capture), stopped)
    }
}

#[async_trait]
impl AudioCapture for SpyCapture {
    async fn start(&mut self) -> GatewayResult<mpsc::Receiver<Bytes>> {
        let (tx, rx) = mpsc::channel(4);
        tx.try_send(Bytes::from_static(&[0u8; 480])).unwrap();
        // Held open so the forwarder keeps waiting for more audio
        self.chunks = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) {
        self.chunks = None;
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Poll the gateway until it has seen an event of `event_type`.
async fn wait_for_received(gateway: &MockGateway, event_type: &str) {
    timeout(EVENT_TIMEOUT, async {
        while !gateway.received().iter().any(|t| t == event_type) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for client event");
}

/// Wait for the first event matching `pred`, failing the test on timeout.
async fn wait_for<F>(events: &mut RealtimeEvents, mut pred: F) -> RealtimeEvent
where
    F: FnMut(&RealtimeEvent) -> bool,
{
    timeout(EVENT_TIMEOUT, async {
        loop {
            let event = events.recv().await.expect("event stream ended");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn test_insecure_subprotocol_session_round_trip() {
    let gateway = MockGateway::start().await;
    let (client, mut events) = client_for(&gateway, true);

    assert_eq!(client.connect().await.unwrap(), ConnectionState::Connected);
    assert!(client.is_connected());
    wait_for(&mut events, |e| matches!(e, RealtimeEvent::SessionUpdated)).await;

    client.send_text("hi").await.unwrap();
    let event = wait_for(&mut events, |e| {
        matches!(e, RealtimeEvent::AssistantMessage { .. })
    })
    .await;
    assert_eq!(
        event,
        RealtimeEvent::AssistantMessage {
            content: "Hello".to_string()
        }
    );

    assert_eq!(
        client.conversation(),
        vec![Message::user("hi"), Message::assistant("Hello")]
    );

    let offer = &gateway.offers()[0];
    assert_eq!(offer[0], "realtime");
    assert!(offer.iter().any(|p| p == "insecure-api-key.sk-test"));

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_gateway_token_only_is_closed_with_4001() {
    let gateway = MockGateway::start().await;
    let (client, mut events) = client_for(&gateway, false);

    // The upgrade itself succeeds; the rejection comes as a close frame
    client.connect().await.unwrap();
    client.send_text("hi").await.unwrap();

    let closed = wait_for(&mut events, |e| matches!(e, RealtimeEvent::Closed { .. })).await;
    match closed {
        RealtimeEvent::Closed {
            code, diagnosis, ..
        } => {
            assert_eq!(code, UNAUTHORIZED_CLOSE_CODE);
            assert_eq!(diagnosis, Some(CloseDiagnosis::AuthenticationFailure));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(client.state(), ConnectionState::Disconnected);
    // The turn never got an answer, so it does not stay in the log
    assert!(client.conversation().is_empty());

    let offer = &gateway.offers()[0];
    assert!(offer.iter().any(|p| p == "cf-aig-authorization.cf-token"));
    assert!(!offer.iter().any(|p| p.contains("insecure-api-key")));

    // Sending on the closed session is a state error, not a transport error
    assert!(matches!(
        client.send_text("hello?").await,
        Err(GatewayError::IllegalState(_))
    ));
    assert!(client.conversation().is_empty());
}

#[tokio::test]
async fn test_session_update_is_first_frame() {
    let gateway = MockGateway::start().await;
    let (client, mut events) = client_for(&gateway, true);

    client.connect().await.unwrap();
    client.send_text("first").await.unwrap();
    wait_for(&mut events, |e| matches!(e, RealtimeEvent::ResponseDone { .. })).await;

    let received = gateway.received();
    assert_eq!(
        received,
        vec![
            "session.update".to_string(),
            "conversation.item.create".to_string(),
            "response.create".to_string(),
        ]
    );

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_recording_streams_then_commits() {
    let gateway = MockGateway::start().await;
    let (client, mut events) = client_for(&gateway, true);
    let (capture, stopped) = SpyCapture::new();

    client.connect().await.unwrap();
    client.start_recording(capture).await.unwrap();
    assert!(matches!(
        client.start_recording(SpyCapture::new().0).await,
        Err(GatewayError::IllegalState(_))
    ));
    wait_for_received(&gateway, "input_audio_buffer.append").await;

    client.stop_recording().await.unwrap();
    assert!(stopped.load(Ordering::SeqCst));
    wait_for(&mut events, |e| matches!(e, RealtimeEvent::ResponseDone { .. })).await;

    assert_eq!(
        gateway.received(),
        vec![
            "session.update".to_string(),
            "input_audio_buffer.append".to_string(),
            "input_audio_buffer.commit".to_string(),
            "response.create".to_string(),
        ]
    );
    assert!(matches!(
        client.stop_recording().await,
        Err(GatewayError::IllegalState(_))
    ));

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_stops_recording() {
    let gateway = MockGateway::start().await;
    let (client, _events) = client_for(&gateway, true);
    let (capture, stopped) = SpyCapture::new();

    client.connect().await.unwrap();
    client.start_recording(capture).await.unwrap();
    client.disconnect().await.unwrap();

    assert!(stopped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_server_close_stops_recording() {
    let gateway = MockGateway::start().await;
    let (client, mut events) = client_for(&gateway, false);
    let (capture, stopped) = SpyCapture::new();

    client.connect().await.unwrap();
    client.start_recording(capture).await.unwrap();
    wait_for(&mut events, |e| matches!(e, RealtimeEvent::Closed { .. })).await;

    assert!(stopped.load(Ordering::SeqCst));
    assert!(matches!(
        client.stop_recording().await,
        Err(GatewayError::IllegalState(_))
    ));
}

#[tokio::test]
async fn test_concurrent_connect_opens_one_socket() {
    let gateway = MockGateway::start().await;
    let (client, mut events) = client_for(&gateway, true);

    let (a, b) = tokio::join!(client.connect(), client.connect());
    let states = [a.unwrap(), b.unwrap()];
    assert!(states.contains(&ConnectionState::Connected));

    wait_for(&mut events, |e| matches!(e, RealtimeEvent::SessionUpdated)).await;
    assert_eq!(client.connect().await.unwrap(), ConnectionState::Connected);
    assert_eq!(gateway.connection_count(), 1);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_twice() {
    let gateway = MockGateway::start().await;
    let (client, mut events) = client_for(&gateway, true);

    client.connect().await.unwrap();
    client.disconnect().await.unwrap();
    client.disconnect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let closed = wait_for(&mut events, |e| matches!(e, RealtimeEvent::Closed { .. })).await;
    assert!(matches!(
        closed,
        RealtimeEvent::Closed {
            code: 1000,
            diagnosis: None,
            ..
        }
    ));
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let gateway = MockGateway::start().await;
    let (client, mut events) = client_for(&gateway, true);

    client.connect().await.unwrap();
    client.disconnect().await.unwrap();
    wait_for(&mut events, |e| matches!(e, RealtimeEvent::Closed { .. })).await;

    assert_eq!(client.connect().await.unwrap(), ConnectionState::Connected);
    wait_for(&mut events, |e| matches!(e, RealtimeEvent::SessionUpdated)).await;
    assert_eq!(gateway.connection_count(), 2);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_gateway_is_abnormal() {
    // Bind then drop to get a port with nothing listening
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = listener.local_addr().unwrap().to_string();
    drop(listener);

    let client = RealtimeClient::new(test_config(host, true), SessionOptions::default());
    let err = client.connect().await.unwrap_err();

    assert!(matches!(err, GatewayError::Connect { .. }));
    assert_eq!(err.diagnosis(), Some(CloseDiagnosis::AbnormalClosure));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
