//! Mock AI Gateway realtime endpoint
//!
//! Mirrors the observed gateway behavior over WebSocket:
//! - the handshake always succeeds and echoes the `realtime` subprotocol
//! - a connection offering `insecure-api-key.<key>` gets a working session
//! - any other connection is closed with 4001 shortly after the upgrade

// Not every test uses every accessor
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Close code the gateway uses when the subprotocol list carries no usable key.
pub const UNAUTHORIZED_CLOSE_CODE: u16 = 4001;

/// Observations shared with the test body.
#[derive(Default)]
pub struct MockGatewayState {
    /// Upgraded connections, counted after the handshake
    pub connection_count: AtomicU64,
    /// Subprotocol offer of every connection, in order
    pub offers: Mutex<Vec<Vec<String>>>,
    /// `type` of every client event received, in order
    pub received: Mutex<Vec<String>>,
}

pub struct MockGateway {
    addr: SocketAddr,
    state: Arc<MockGatewayState>,
    handle: JoinHandle<()>,
}

impl MockGateway {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockGatewayState::default());

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, state).await;
                });
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// `host:port` suitable for `GatewayConfig::host`.
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn connection_count(&self) -> u64 {
        self.state.connection_count.load(Ordering::SeqCst)
    }

    pub fn offers(&self) -> Vec<Vec<String>> {
        self.state.offers.lock().clone()
    }

    pub fn received(&self) -> Vec<String> {
        self.state.received.lock().clone()
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn is_inline_key(protocol: &str) -> bool {
    protocol.starts_with("insecure-api-key.") || protocol.starts_with("openai-insecure-api-key.")
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<MockGatewayState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut offered: Vec<String> = Vec::new();
    let callback = |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        offered = request
            .headers()
            .get_all(SEC_WEBSOCKET_PROTOCOL)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if offered.iter().any(|p| p == "realtime") {
            response
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("realtime"));
        }
        Ok(response)
    };

    let ws = accept_hdr_async(stream, callback).await?;
    state.connection_count.fetch_add(1, Ordering::SeqCst);
    let authorized = offered.iter().any(|p| is_inline_key(p));
    state.offers.lock().push(offered);

    let (mut write, mut read) = ws.split();

    if !authorized {
        tokio::time::sleep(Duration::from_millis(100)).await;
        write
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::from(UNAUTHORIZED_CLOSE_CODE),
                reason: "Unauthorized".into(),
            })))
            .await?;
        while let Some(Ok(_)) = read.next().await {}
        return Ok(());
    }

    send_json(
        &mut write,
        json!({"type": "session.created", "session": {"id": "sess_mock"}}),
    )
    .await?;

    while let Some(msg) = read.next().await {
        let text = match msg? {
            Message::Text(text) => text.as_str().to_owned(),
            Message::Close(_) => break,
            _ => continue,
        };
        let event: Value = serde_json::from_str(&text)?;
        let event_type = event["type"].as_str().unwrap_or_default().to_string();
        state.received.lock().push(event_type.clone());

        match event_type.as_str() {
            "session.update" => {
                send_json(
                    &mut write,
                    json!({"type": "session.updated", "session": {"id": "sess_mock"}}),
                )
                .await?;
            }
            "response.create" => {
                for frame in response_frames() {
                    write.send(Message::Text(frame.into())).await?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

async fn send_json<S>(write: &mut S, value: Value) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    write.send(Message::Text(value.to_string().into())).await?;
    Ok(())
}

/// A text response answering "Hello", with noise the client must skip.
fn response_frames() -> Vec<String> {
    vec![
        json!({"type": "response.created", "response": {"id": "resp_1"}}).to_string(),
        "not json at all".to_string(),
        json!({"type": "rate_limits.updated", "rate_limits": []}).to_string(),
        json!({"type": "response.text.delta", "response_id": "resp_1", "delta": "Hel"}).to_string(),
        json!({"type": "response.text.delta", "response_id": "resp_1", "delta": "lo"}).to_string(),
        json!({"type": "response.done", "response": {"id": "resp_1", "status": "completed"}})
            .to_string(),
    ]
}
