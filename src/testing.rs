//! In-process mock gateway for tests.
//!
//! Binds `127.0.0.1:0`, upgrades every accepted TCP stream to a WebSocket
//! and hands it to a per-connection handler as a [`MockSession`].
//! Dropping a session drops the TCP stream without a close frame, which
//! the client sees as an abnormal close.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async, connect_async};
use tracing::debug;

use crate::client::GatewayClient;
use crate::transport::{ConnectionState, WsStream};

// ============================================================================
// MockGateway
// ============================================================================

/// A WebSocket server driven by a test-supplied handler.
pub(crate) struct MockGateway {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
}

impl MockGateway {
    /// Binds a random port and serves every connection with `handler`.
    pub(crate) async fn start<F, Fut>(handler: F) -> Self
    where
        F: Fn(MockSession) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("local addr");
        let connections = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&connections);
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                let Ok(ws) = accept_async(stream).await else {
                    continue;
                };
                let index = counter.fetch_add(1, Ordering::SeqCst);
                debug!(?peer, index, "Mock gateway accepted connection");
                tokio::spawn(handler(MockSession { ws, index }));
            }
        });

        Self {
            addr,
            connections,
            accept_task,
        }
    }

    /// Returns the `ws://` URL of this gateway.
    pub(crate) fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Returns the number of WebSocket connections accepted so far.
    pub(crate) fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

// ============================================================================
// MockSession
// ============================================================================

/// Server side of one client connection.
pub(crate) struct MockSession {
    ws: WebSocketStream<TcpStream>,
    index: usize,
}

impl MockSession {
    /// Zero-based index of this connection.
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// Reads the next JSON text frame. `None` once the client is gone.
    pub(crate) async fn recv_json(&mut self) -> Option<Value> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(&text).expect("client sent invalid JSON"));
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => {}
            }
        }
    }

    /// Sends a JSON text frame. Send failures are ignored.
    pub(crate) async fn send_json(&mut self, value: Value) {
        let _ = self.ws.send(Message::Text(value.to_string().into())).await;
    }

    /// Sends a raw text frame.
    pub(crate) async fn send_text(&mut self, text: &str) {
        let _ = self.ws.send(Message::Text(text.to_string().into())).await;
    }

    /// Reads the hello frame.
    pub(crate) async fn read_hello(&mut self) -> Value {
        let hello = self.recv_json().await.expect("client closed before hello");
        assert_eq!(hello["type"], "hello", "first frame must be hello");
        hello
    }

    /// Answers with a standard `hello_ok`.
    pub(crate) async fn accept_hello(&mut self) {
        self.accept_hello_with(json!({})).await;
    }

    /// Answers with `hello_ok`, merged with the fields of `extra`.
    pub(crate) async fn accept_hello_with(&mut self, extra: Value) {
        let mut frame = json!({
            "type": "hello_ok",
            "protocol": 3,
            "features": {"methods": ["status", "chat.send"], "events": ["chat", "tool"]},
            "auth": {"role": "operator", "scopes": ["operator.admin"]}
        });
        if let (Some(frame), Value::Object(extra)) = (frame.as_object_mut(), extra) {
            frame.extend(extra);
        }
        self.send_json(frame).await;
    }

    /// Answers with `hello_error`.
    pub(crate) async fn reject_hello(&mut self, reason: &str) {
        self.send_json(json!({"type": "hello_error", "reason": reason}))
            .await;
    }

    /// Keeps the connection open, discarding frames, until the client leaves.
    pub(crate) async fn hold(&mut self) {
        while self.recv_json().await.is_some() {}
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Opens a client socket without any handshake.
pub(crate) async fn connect_raw(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.expect("connect should succeed");
    ws
}

/// Waits until the client's state satisfies `predicate`.
pub(crate) async fn wait_for_state(
    client: &GatewayClient,
    predicate: impl Fn(&ConnectionState) -> bool,
    within: Duration,
) {
    let mut states = client.subscribe_state();
    let reached = tokio::time::timeout(within, states.wait_for(predicate)).await;
    assert!(
        matches!(reached, Ok(Ok(_))),
        "state not reached within {within:?}, last state {}",
        client.state()
    );
}
