//! Reconnect supervisor.
//!
//! One task per started client. Each cycle opens a socket, runs the
//! handshake, serves the connection until it closes, then either waits
//! out the backoff delay or gives up.
//!
//! | Outcome | `on_close` code | Next step |
//! |---------|-----------------|-----------|
//! | socket error or drop | 1006 / frame code | backoff, retry |
//! | malformed frame | 1007 | backoff, retry |
//! | retryable `hello_error` | 4000 | backoff, retry |
//! | credentials rejected | 4001 | suspend until credentials change |
//! | device identity unusable | 4001 | suspend until credentials change |
//! | `stop()` while connected | 1000 | exit |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::Error;
use crate::transport::{
    CLOSE_ABNORMAL, CLOSE_INVALID_PAYLOAD, CLOSE_NORMAL, CloseReason, Connection,
    ConnectionState,
};

use super::core::{ClientInner, Lifecycle};
use super::handshake::{self, Authenticated};
use super::info::{CloseInfo, HelloInfo};

// ============================================================================
// Constants
// ============================================================================

/// `on_close` code for a retryable `hello_error`.
pub const CLOSE_HELLO_REJECTED: u16 = 4000;

/// `on_close` code when the gateway rejected the credentials.
pub const CLOSE_AUTH_REJECTED: u16 = 4001;

// ============================================================================
// Types
// ============================================================================

/// How a connection cycle ended.
struct Interruption {
    code: u16,
    reason: String,
    retryable: bool,
}

impl Interruption {
    fn from_close(close: CloseReason) -> Self {
        Self {
            code: close.code,
            reason: close.reason,
            retryable: true,
        }
    }

    fn from_error(error: &Error) -> Self {
        match error {
            Error::HelloRejected {
                reason,
                retryable: true,
            } => Self {
                code: CLOSE_HELLO_REJECTED,
                reason: reason.clone(),
                retryable: true,
            },
            Error::HelloRejected {
                reason,
                retryable: false,
            } => Self {
                code: CLOSE_AUTH_REJECTED,
                reason: reason.clone(),
                retryable: false,
            },
            // Nothing to authenticate with until credentials change.
            Error::Config { .. } | Error::Identity { .. } => Self {
                code: CLOSE_AUTH_REJECTED,
                reason: error.to_string(),
                retryable: false,
            },
            Error::Json(_) | Error::Protocol { .. } => Self {
                code: CLOSE_INVALID_PAYLOAD,
                reason: error.to_string(),
                retryable: true,
            },
            _ => Self {
                code: CLOSE_ABNORMAL,
                reason: error.to_string(),
                retryable: true,
            },
        }
    }
}

/// How serving a connection ended.
enum Served {
    Stopped,
    Closed(CloseReason),
}

// ============================================================================
// Supervisor
// ============================================================================

/// Runs until `stop_rx` flips to `true` or reconnection is given up.
pub(crate) async fn run(inner: Arc<ClientInner>, mut stop_rx: watch::Receiver<bool>) {
    let reconnect = inner.options.reconnect.clone();
    let mut attempt: u32 = 0;

    loop {
        inner.set_state(ConnectionState::Connecting);
        let epoch = inner.credentials_epoch();

        let outcome = tokio::select! {
            biased;
            () = stop_requested(&mut stop_rx) => break,
            outcome = handshake::connect(&inner) => outcome,
        };

        let interruption = match outcome {
            Ok(authenticated) => {
                attempt = 0;
                match serve(&inner, authenticated, &mut stop_rx).await {
                    Served::Stopped => break,
                    Served::Closed(close) => Interruption::from_close(close),
                }
            }
            Err(error) => {
                warn!(error = %error, attempt, "Connection attempt failed");
                Interruption::from_error(&error)
            }
        };

        let generation = inner.current_generation();

        if !interruption.retryable {
            {
                let mut lifecycle = inner.lifecycle.lock();
                if inner.credentials_epoch() != epoch {
                    // Credentials changed while the attempt was in flight.
                    attempt = 0;
                    continue;
                }
                if matches!(*lifecycle, Lifecycle::Running(_)) {
                    *lifecycle = Lifecycle::Suspended;
                }
                inner.clear_connection();
                inner.set_state(ConnectionState::Idle);
            }

            warn!(
                code = interruption.code,
                reason = %interruption.reason,
                "Credentials rejected, reconnect suspended"
            );
            inner.notify_close(&CloseInfo {
                generation,
                code: interruption.code,
                reason: interruption.reason,
                will_retry: false,
            });
            return;
        }

        attempt = attempt.saturating_add(1);
        let will_retry = reconnect.should_reconnect(attempt);
        let delay = reconnect.delay_for_attempt(attempt);

        if will_retry {
            inner.set_state(ConnectionState::Reconnecting { attempt, delay });
        } else {
            inner.clear_connection();
            inner.set_state(ConnectionState::Idle);
        }
        inner.notify_close(&CloseInfo {
            generation,
            code: interruption.code,
            reason: interruption.reason,
            will_retry,
        });

        if !will_retry {
            info!(attempt, "Reconnect attempts exhausted");
            break;
        }

        info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");

        tokio::select! {
            biased;
            () = stop_requested(&mut stop_rx) => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    inner.clear_connection();
    inner.set_state(ConnectionState::Idle);
}

/// Serves one authenticated connection until it closes or stop is requested.
async fn serve(
    inner: &ClientInner,
    authenticated: Authenticated,
    stop_rx: &mut watch::Receiver<bool>,
) -> Served {
    let generation = inner.next_generation();
    let (connection, mut closed_rx) = Connection::new(
        authenticated.ws,
        generation,
        inner.dispatcher.sink(),
        inner.options.max_pending_requests,
    );

    let hello = HelloInfo::new(generation, authenticated.hello_ok);
    info!(
        %generation,
        protocol = hello.protocol,
        role = %hello.auth.role,
        "Connected to gateway"
    );
    inner.install(connection.clone(), hello.clone());
    inner.notify_hello(&hello);

    let closed = tokio::select! {
        biased;
        () = stop_requested(stop_rx) => None,
        closed = &mut closed_rx => Some(closed),
    };

    match closed {
        Some(closed) => {
            inner.clear_connection();
            let close = closed.unwrap_or_else(|_| CloseReason::abnormal("connection task ended"));
            warn!(%generation, code = close.code, reason = %close.reason, "Connection closed");
            Served::Closed(close)
        }
        None => {
            inner.set_state(ConnectionState::Closing);
            connection.shutdown();
            let close = closed_rx.await.unwrap_or_else(|_| CloseReason::stopped());
            inner.clear_connection();
            inner.notify_close(&CloseInfo {
                generation,
                code: CLOSE_NORMAL,
                reason: close.reason,
                will_retry: false,
            });
            Served::Stopped
        }
    }
}

/// Resolves once stop is requested. A dropped sender counts as a request.
async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stopped| *stopped).await;
}

// ============================================================================
// Tests
// ============================================================================
