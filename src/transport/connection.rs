//! Authenticated WebSocket connection and its event loop.
//!
//! A [`Connection`] is built from a socket whose hello has already been
//! accepted. It owns the socket for the rest of its life and spawns one
//! tokio task that handles:
//!
//! - Outgoing requests from the client facade
//! - Incoming responses, matched to pending requests by id
//! - Incoming events, handed to the event sink in socket order
//!
//! When the task ends, every pending request is failed in one pass and
//! the [`CloseReason`] is reported through the receiver returned by
//! [`Connection::new`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{Generation, RequestId};
use crate::protocol::{EventFrame, InboundFrame, Request};

// ============================================================================
// Constants
// ============================================================================

/// Close code for a clean, caller-initiated close.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code when the peer sent a close frame without a status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Close code when the socket dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Close code for a frame that could not be parsed.
pub const CLOSE_INVALID_PAYLOAD: u16 = 1007;

// ============================================================================
// Types
// ============================================================================

/// Client-side socket type.
pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the socket.
type WsWriter = SplitSink<WsStream, Message>;

/// Pending requests, shared by callers and the event loop.
///
/// Callers insert their own entry, so the pending cap is checked and the
/// slot taken under one lock.
#[derive(Default)]
struct CorrelationMap {
    pending: FxHashMap<RequestId, PendingRequest>,
    /// Set once the event loop has failed everything; `Some(true)` when
    /// the client shut the socket.
    closed: Option<bool>,
}

/// Receives every event frame, in socket order.
pub(crate) type EventSink = Arc<dyn Fn(EventFrame) + Send + Sync>;

/// An in-flight request.
struct PendingRequest {
    /// Method, kept for diagnostics.
    method: String,
    /// When the request was written.
    created_at: Instant,
    /// Settles the caller's future.
    response_tx: oneshot::Sender<Result<Value>>,
}

// ============================================================================
// CloseReason
// ============================================================================

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code (or the closest equivalent).
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
    /// `true` only for [`Connection::shutdown`].
    pub initiated_by_client: bool,
}

impl CloseReason {
    /// Abnormal close: the socket errored or ended without a close frame.
    #[must_use]
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: CLOSE_ABNORMAL,
            reason: reason.into(),
            initiated_by_client: false,
        }
    }

    /// Close caused by an unparseable frame.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self {
            code: CLOSE_INVALID_PAYLOAD,
            reason: reason.into(),
            initiated_by_client: false,
        }
    }

    /// Close frame from the gateway.
    #[must_use]
    pub fn remote(frame: Option<&CloseFrame>) -> Self {
        match frame {
            Some(frame) => Self {
                code: u16::from(frame.code),
                reason: frame.reason.to_string(),
                initiated_by_client: false,
            },
            None => Self {
                code: CLOSE_NO_STATUS,
                reason: "closed by gateway".to_string(),
                initiated_by_client: false,
            },
        }
    }

    /// Caller-initiated close.
    #[must_use]
    pub fn stopped() -> Self {
        Self {
            code: CLOSE_NORMAL,
            reason: "client stopped".to_string(),
            initiated_by_client: true,
        }
    }
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write a request whose correlation entry is already registered.
    Send { request_id: RequestId, json: String },
    /// Close the socket.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// One authenticated socket lifetime.
///
/// Cloning is cheap; clones share the same event loop.
#[derive(Clone)]
pub(crate) struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Generation this connection was established as.
    generation: Generation,
    /// Pending-request cap.
    max_pending: usize,
}

impl Connection {
    /// Takes ownership of an authenticated socket and spawns its event loop.
    ///
    /// The returned receiver yields exactly one [`CloseReason`] once the
    /// loop has ended and all pending requests have been failed.
    pub(crate) fn new(
        ws_stream: WsStream,
        generation: Generation,
        on_event: EventSink,
        max_pending: usize,
    ) -> (Self, oneshot::Receiver<CloseReason>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = oneshot::channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            on_event,
            closed_tx,
            generation,
        ));

        let connection = Self {
            command_tx,
            correlation,
            generation,
            max_pending,
        };

        (connection, closed_rx)
    }

    /// Returns the generation of this connection.
    #[inline]
    pub(crate) fn generation(&self) -> Generation {
        self.generation
    }

    /// Sends a request and waits for its response.
    ///
    /// # Errors
    ///
    /// - [`Error::Server`] if the gateway answered with an error
    /// - [`Error::RequestTimeout`] if no response arrived in time
    /// - [`Error::ConnectionLost`] if the connection dropped first
    /// - [`Error::Stopped`] if the client was stopped first
    /// - [`Error::Protocol`] if too many requests are pending
    pub(crate) async fn request(
        &self,
        request: Request,
        request_timeout: Duration,
    ) -> Result<Value> {
        let json = to_string(&request)?;
        let Request {
            id: request_id,
            method,
            ..
        } = request;
        let (response_tx, response_rx) = oneshot::channel();

        {
            let mut correlation = self.correlation.lock();
            if let Some(stopped) = correlation.closed {
                return Err(closed_error(stopped));
            }
            let pending = correlation.pending.len();
            if pending >= self.max_pending {
                warn!(pending, max = self.max_pending, "Too many pending requests");
                return Err(Error::protocol(format!(
                    "Too many pending requests: {pending}/{}",
                    self.max_pending
                )));
            }
            correlation.pending.insert(
                request_id.clone(),
                PendingRequest {
                    method: method.clone(),
                    created_at: Instant::now(),
                    response_tx,
                },
            );
        }

        let mut guard = CorrelationGuard {
            correlation: &self.correlation,
            request_id: Some(request_id.clone()),
        };

        self.command_tx
            .send(ConnectionCommand::Send {
                request_id: request_id.clone(),
                json,
            })
            .map_err(|_| Error::ConnectionLost)?;

        match timeout(request_timeout, response_rx).await {
            Ok(Ok(result)) => {
                guard.disarm();
                result
            }
            Ok(Err(_)) => {
                guard.disarm();
                Err(Error::ConnectionLost)
            }
            Err(_) => {
                debug!(%request_id, %method, "Request timed out");
                Err(Error::request_timeout(
                    request_id,
                    method,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Returns the number of pending requests.
    #[inline]
    pub(crate) fn pending_count(&self) -> usize {
        self.correlation.lock().pending.len()
    }

    /// Closes the socket. Pending requests fail with [`Error::Stopped`].
    pub(crate) fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        on_event: EventSink,
        closed_tx: oneshot::Sender<CloseReason>,
        generation: Generation,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let close = loop {
            tokio::select! {
                // Incoming frames from the gateway
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(reason) =
                                Self::handle_incoming_message(&text, &correlation, &on_event)
                            {
                                break reason;
                            }
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(%generation, "WebSocket closed by gateway");
                            break CloseReason::remote(frame.as_ref());
                        }

                        Some(Err(e)) => {
                            error!(%generation, error = %e, "WebSocket error");
                            break CloseReason::abnormal(e.to_string());
                        }

                        None => {
                            debug!(%generation, "WebSocket stream ended");
                            break CloseReason::abnormal("stream ended");
                        }

                        Some(Ok(Message::Binary(_))) => {
                            warn!(%generation, "Ignoring binary frame");
                        }

                        // Ping/Pong are answered by tungstenite
                        _ => {}
                    }
                }

                // Commands from the client facade
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { request_id, json }) => {
                            if let Err(reason) = Self::handle_send_command(
                                request_id,
                                json,
                                &mut ws_write,
                                &correlation,
                            ).await {
                                break reason;
                            }
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!(%generation, "Shutdown command received");
                            let _ = ws_write.close().await;
                            break CloseReason::stopped();
                        }

                        None => {
                            debug!(%generation, "Command channel closed");
                            let _ = ws_write.close().await;
                            break CloseReason::stopped();
                        }
                    }
                }
            }
        };

        Self::fail_pending_requests(&correlation, close.initiated_by_client);

        debug!(%generation, code = close.code, reason = %close.reason, "Event loop terminated");
        let _ = closed_tx.send(close);
    }

    /// Routes one text frame. An `Err` ends the connection.
    fn handle_incoming_message(
        text: &str,
        correlation: &Mutex<CorrelationMap>,
        on_event: &EventSink,
    ) -> std::result::Result<(), CloseReason> {
        match InboundFrame::parse(text) {
            Ok(InboundFrame::Response(response)) => {
                let pending = correlation.lock().pending.remove(&response.id);

                match pending {
                    Some(pending) => {
                        trace!(
                            request_id = %response.id,
                            method = %pending.method,
                            elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
                            "Response received"
                        );
                        let _ = pending.response_tx.send(response.into_result());
                    }
                    None => {
                        debug!(request_id = %response.id, "Dropped response for unknown request");
                    }
                }
                Ok(())
            }

            Ok(InboundFrame::Event(event)) => {
                on_event(event);
                Ok(())
            }

            Ok(other) => {
                warn!(frame = other.label(), "Ignoring unexpected frame");
                Ok(())
            }

            Err(e) => {
                warn!(error = %e, "Malformed frame from gateway");
                Err(CloseReason::malformed(e.to_string()))
            }
        }
    }

    /// Writes one request. An `Err` ends the connection.
    async fn handle_send_command(
        id: RequestId,
        json: String,
        ws_write: &mut WsWriter,
        correlation: &Mutex<CorrelationMap>,
    ) -> std::result::Result<(), CloseReason> {
        // Abandoned before it reached the socket
        if !correlation.lock().pending.contains_key(&id) {
            debug!(request_id = %id, "Skipped abandoned request");
            return Ok(());
        }

        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
            error!(request_id = %id, error = %e, "Failed to write request");
            return Err(CloseReason::abnormal(format!("send failed: {e}")));
        }

        trace!(request_id = %id, "Request sent");
        Ok(())
    }

    /// Fails every pending request in one pass.
    fn fail_pending_requests(correlation: &Mutex<CorrelationMap>, stopped: bool) {
        let pending: Vec<_> = {
            let mut correlation = correlation.lock();
            correlation.closed = Some(stopped);
            correlation.pending.drain().collect()
        };
        let count = pending.len();

        for (_, request) in pending {
            let _ = request.response_tx.send(Err(closed_error(stopped)));
        }

        if count > 0 {
            debug!(count, stopped, "Failed pending requests");
        }
    }
}

/// Error for requests caught by a closed connection.
fn closed_error(stopped: bool) -> Error {
    if stopped {
        Error::Stopped
    } else {
        Error::ConnectionLost
    }
}

// ============================================================================
// CorrelationGuard
// ============================================================================

/// Removes the correlation entry if the request future ends without a
/// response (timeout, or the caller dropped it).
struct CorrelationGuard<'a> {
    correlation: &'a Mutex<CorrelationMap>,
    request_id: Option<RequestId>,
}

impl CorrelationGuard<'_> {
    fn disarm(&mut self) {
        self.request_id = None;
    }
}

impl Drop for CorrelationGuard<'_> {
    fn drop(&mut self) {
        if let Some(request_id) = self.request_id.take()
            && self.correlation.lock().pending.remove(&request_id).is_some()
        {
            debug!(%request_id, "Removed abandoned correlation");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    use crate::testing::{MockGateway, connect_raw};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn request(n: u64, method: &str, params: Value) -> Request {
        Request::new(RequestId::from_sequence(n), method, params)
    }

    fn counting_sink() -> (EventSink, Arc<Mutex<Vec<EventFrame>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        let sink: EventSink = Arc::new(move |event| sink_events.lock().push(event));
        (sink, events)
    }

    #[test]
    fn test_close_reason_constructors() {
        assert_eq!(CloseReason::abnormal("x").code, CLOSE_ABNORMAL);
        assert_eq!(CloseReason::malformed("x").code, CLOSE_INVALID_PAYLOAD);
        assert!(CloseReason::stopped().initiated_by_client);
        assert_eq!(CloseReason::remote(None).code, CLOSE_NO_STATUS);

        let frame = CloseFrame {
            code: CloseCode::Away,
            reason: "restarting".into(),
        };
        let reason = CloseReason::remote(Some(&frame));
        assert_eq!(reason.code, 1001);
        assert_eq!(reason.reason, "restarting");
        assert!(!reason.initiated_by_client);
    }

    #[tokio::test]
    async fn test_concurrent_requests_no_cross_talk() {
        // Answers each batch of requests in reverse arrival order.
        let gateway = MockGateway::start(|mut session| async move {
            let mut batch = Vec::new();
            while let Some(frame) = session.recv_json().await {
                batch.push(frame);
                if batch.len() == 8 {
                    for frame in batch.drain(..).rev() {
                        let reply = json!({"id": frame["id"], "result": {"echo": frame["params"]}});
                        session.send_json(reply).await;
                    }
                }
            }
        })
        .await;

        let ws = connect_raw(&gateway.url()).await;
        let (sink, _) = counting_sink();
        let (connection, _closed) = Connection::new(ws, Generation::new(1), sink, 64);

        let calls = (1..=8u64).map(|n| {
            let connection = connection.clone();
            async move {
                let value = connection
                    .request(request(n, "echo", json!({"n": n})), TIMEOUT)
                    .await
                    .unwrap();
                (n, value)
            }
        });

        for (n, value) in futures_util::future::join_all(calls).await {
            assert_eq!(value, json!({"echo": {"n": n}}));
        }
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_response_dropped_and_events_routed() {
        let gateway = MockGateway::start(|mut session| async move {
            while let Some(frame) = session.recv_json().await {
                session.send_json(json!({"id": "stale", "result": 1})).await;
                session
                    .send_json(json!({"stream": "chat", "ts": 5, "data": {"delta": "hi"}}))
                    .await;
                session.send_json(json!({"id": frame["id"], "result": 2})).await;
            }
        })
        .await;

        let ws = connect_raw(&gateway.url()).await;
        let (sink, events) = counting_sink();
        let (connection, _closed) = Connection::new(ws, Generation::new(1), sink, 64);

        let value = connection
            .request(request(1, "status", json!({})), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(value, json!(2));
        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].stream, "chat");
    }

    #[tokio::test]
    async fn test_server_error_only_affects_its_request() {
        let gateway = MockGateway::start(|mut session| async move {
            while let Some(frame) = session.recv_json().await {
                let reply = if frame["method"] == "bad" {
                    json!({"id": frame["id"], "error": {"message": "nope", "code": "E_BAD"}})
                } else {
                    json!({"id": frame["id"], "result": "fine"})
                };
                session.send_json(reply).await;
            }
        })
        .await;

        let ws = connect_raw(&gateway.url()).await;
        let (sink, _) = counting_sink();
        let (connection, _closed) = Connection::new(ws, Generation::new(1), sink, 64);

        let (bad, good) = tokio::join!(
            connection.request(request(1, "bad", json!({})), TIMEOUT),
            connection.request(request(2, "good", json!({})), TIMEOUT),
        );

        assert!(matches!(
            bad,
            Err(Error::Server { ref code, .. }) if code.as_deref() == Some("E_BAD")
        ));
        assert_eq!(good.unwrap(), json!("fine"));
    }

    #[tokio::test]
    async fn test_timeout_removes_entry_and_late_reply_is_dropped() {
        let gateway = MockGateway::start(|mut session| async move {
            while let Some(frame) = session.recv_json().await {
                if frame["method"] == "slow" {
                    tokio::time::sleep(Duration::from_millis(150)).await;
                }
                let reply = json!({"id": frame["id"], "result": frame["method"]});
                session.send_json(reply).await;
            }
        })
        .await;

        let ws = connect_raw(&gateway.url()).await;
        let (sink, _) = counting_sink();
        let (connection, _closed) = Connection::new(ws, Generation::new(1), sink, 64);

        let slow = connection
            .request(request(1, "slow", json!({})), Duration::from_millis(30))
            .await;
        assert!(matches!(slow, Err(Error::RequestTimeout { ref method, .. }) if method == "slow"));

        // The late reply for r1 arrives while r2 is pending and must not settle it.
        let fast = connection
            .request(request(2, "fast", json!({})), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(fast, json!("fast"));
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_fails_all_pending_with_connection_lost() {
        let received = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&received);
        let gateway = MockGateway::start(move |mut session| {
            let seen = Arc::clone(&seen);
            async move {
                while session.recv_json().await.is_some() {
                    if seen.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                        break;
                    }
                }
                // Dropping the session drops the TCP stream without a close frame.
            }
        })
        .await;

        let ws = connect_raw(&gateway.url()).await;
        let (sink, _) = counting_sink();
        let (connection, closed) = Connection::new(ws, Generation::new(1), sink, 64);

        let (a, b, c) = tokio::join!(
            connection.request(request(1, "a", json!({})), TIMEOUT),
            connection.request(request(2, "b", json!({})), TIMEOUT),
            connection.request(request(3, "c", json!({})), TIMEOUT),
        );

        for result in [a, b, c] {
            assert!(matches!(result, Err(Error::ConnectionLost)));
        }
        assert_eq!(connection.pending_count(), 0);

        let reason = closed.await.unwrap();
        assert!(!reason.initiated_by_client);
    }

    #[tokio::test]
    async fn test_shutdown_fails_pending_with_stopped() {
        let gateway = MockGateway::start(|mut session| async move {
            // Never answers.
            while session.recv_json().await.is_some() {}
        })
        .await;

        let ws = connect_raw(&gateway.url()).await;
        let (sink, _) = counting_sink();
        let (connection, closed) = Connection::new(ws, Generation::new(1), sink, 64);

        let pending = {
            let connection = connection.clone();
            tokio::spawn(async move {
                connection
                    .request(request(1, "wait", json!({})), TIMEOUT)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        connection.shutdown();

        assert!(matches!(pending.await.unwrap(), Err(Error::Stopped)));
        assert_eq!(closed.await.unwrap(), CloseReason::stopped());
    }

    #[tokio::test]
    async fn test_malformed_frame_closes_connection() {
        let gateway = MockGateway::start(|mut session| async move {
            session.send_text("{this is not json").await;
            while session.recv_json().await.is_some() {}
        })
        .await;

        let ws = connect_raw(&gateway.url()).await;
        let (sink, _) = counting_sink();
        let (_connection, closed) = Connection::new(ws, Generation::new(1), sink, 64);

        let reason = tokio::time::timeout(TIMEOUT, closed).await.unwrap().unwrap();
        assert_eq!(reason.code, CLOSE_INVALID_PAYLOAD);
    }

    #[tokio::test]
    async fn test_pending_limit() {
        let gateway = MockGateway::start(|mut session| async move {
            while session.recv_json().await.is_some() {}
        })
        .await;

        let ws = connect_raw(&gateway.url()).await;
        let (sink, _) = counting_sink();
        let (connection, _closed) = Connection::new(ws, Generation::new(1), sink, 1);

        let first = {
            let connection = connection.clone();
            tokio::spawn(async move {
                connection
                    .request(request(1, "hold", json!({})), Duration::from_millis(300))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = connection
            .request(request(2, "over", json!({})), TIMEOUT)
            .await;
        assert!(matches!(second, Err(Error::Protocol { .. })));
        assert!(first.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_pending_limit_holds_for_simultaneous_requests() {
        let gateway = MockGateway::start(|mut session| async move {
            while session.recv_json().await.is_some() {}
        })
        .await;

        let ws = connect_raw(&gateway.url()).await;
        let (sink, _) = counting_sink();
        let (connection, _closed) = Connection::new(ws, Generation::new(1), sink, 1);

        let wait = Duration::from_millis(200);
        let (a, b, pending) = tokio::join!(
            connection.request(request(1, "a", json!({})), wait),
            connection.request(request(2, "b", json!({})), wait),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                connection.pending_count()
            },
        );

        assert_eq!(pending, 1);
        let rejected = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Err(Error::Protocol { .. })))
            .count();
        assert_eq!(rejected, 1);
        assert!(matches!(a, Err(Error::RequestTimeout { .. })));
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_request_after_close_fails_fast() {
        let gateway = MockGateway::start(|_session| async move {}).await;

        let ws = connect_raw(&gateway.url()).await;
        let (sink, _) = counting_sink();
        let (connection, closed) = Connection::new(ws, Generation::new(1), sink, 64);
        tokio::time::timeout(TIMEOUT, closed).await.unwrap().unwrap();

        let result = tokio::time::timeout(
            Duration::from_millis(500),
            connection.request(request(1, "late", json!({})), TIMEOUT),
        )
        .await
        .unwrap();
        assert!(matches!(result, Err(Error::ConnectionLost)));
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_request_releases_slot() {
        let gateway = MockGateway::start(|mut session| async move {
            while session.recv_json().await.is_some() {}
        })
        .await;

        let ws = connect_raw(&gateway.url()).await;
        let (sink, _) = counting_sink();
        let (connection, _closed) = Connection::new(ws, Generation::new(1), sink, 64);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            connection.request(request(1, "hold", json!({})), TIMEOUT),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(connection.pending_count(), 0);
    }
}
