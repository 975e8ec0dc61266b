//! Socket open and hello round-trip.
//!
//! Credential precedence: device identity (cached device token first,
//! then a fresh signature), then bearer token, then password.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::to_string;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::device::{DeviceAuthToken, DeviceSigner};
use crate::error::{Error, Result};
use crate::protocol::{Hello, HelloAuth, HelloOk, InboundFrame};
use crate::transport::{ConnectionState, WsStream};

use super::core::ClientInner;

// ============================================================================
// Types
// ============================================================================

/// A socket whose hello was accepted.
pub(crate) struct Authenticated {
    pub ws: WsStream,
    pub hello_ok: HelloOk,
}

// ============================================================================
// Handshake
// ============================================================================

/// Opens the socket and completes the hello round-trip.
///
/// # Errors
///
/// - [`Error::Timeout`] if the socket or hello took too long
/// - [`Error::WebSocket`] / [`Error::Connection`] on socket failure
/// - [`Error::HelloRejected`] if the gateway sent `hello_error`
/// - [`Error::Json`] / [`Error::Protocol`] on a malformed frame
pub(crate) async fn connect(inner: &ClientInner) -> Result<Authenticated> {
    let options = &inner.options;

    debug!(url = %inner.url, "Opening socket");
    let (mut ws, _) = timeout(options.connect_timeout, connect_async(inner.url.as_str()))
        .await
        .map_err(|_| Error::timeout("connect", millis(options.connect_timeout)))??;

    inner.set_state(ConnectionState::Authenticating);

    let signer = inner.device_signer().await?;
    let auth = build_auth(inner, &mut ws, signer.as_deref()).await?;
    let used_device_token = auth.uses_device_token();
    let mode = auth.mode;

    let hello = Hello::new(options.protocol_version, auth);
    ws.send(Message::Text(to_string(&hello)?.into())).await?;
    debug!(?mode, protocol = options.protocol_version, "Hello sent");

    let result = timeout(options.handshake_timeout, read_hello_result(&mut ws))
        .await
        .map_err(|_| Error::timeout("handshake", millis(options.handshake_timeout)))?;

    match result {
        Ok(hello_ok) => {
            if let Some(signer) = &signer {
                persist_device_token(inner, signer.device_id(), &hello_ok).await;
            }
            Ok(Authenticated { ws, hello_ok })
        }

        // A stale device token is not a credential failure: drop it and
        // let the next attempt sign afresh.
        Err(Error::HelloRejected { reason, .. }) if used_device_token => {
            warn!(%reason, "Cached device token rejected");
            if let Err(e) = inner.clear_device_token().await {
                warn!(error = %e, "Failed to discard device token");
            }
            Err(Error::hello_rejected(reason, true))
        }

        Err(e) => Err(e),
    }
}

/// Chooses and builds the hello credentials.
async fn build_auth(
    inner: &ClientInner,
    ws: &mut WsStream,
    signer: Option<&dyn DeviceSigner>,
) -> Result<HelloAuth> {
    if let Some(signer) = signer {
        if let Some(cached) = load_device_token(inner, signer.device_id()).await {
            debug!(device_id = signer.device_id(), "Using cached device token");
            return Ok(HelloAuth::device_token(
                signer,
                cached.token,
                Utc::now().timestamp_millis(),
            ));
        }

        let challenge = match inner.options.challenge_timeout {
            Some(wait) => await_challenge(ws, wait).await?,
            None => None,
        };
        let nonce = challenge.unwrap_or_else(|| Uuid::new_v4().to_string());

        debug!(device_id = signer.device_id(), "Signing hello");
        return Ok(HelloAuth::device_signed(
            signer,
            nonce,
            Utc::now().timestamp_millis(),
        ));
    }

    let credentials = inner.credentials.read().clone();
    match (credentials.token, credentials.password) {
        (Some(token), _) => Ok(HelloAuth::token(token)),
        (None, Some(password)) => Ok(HelloAuth::password(password)),
        (None, None) => Err(Error::config(
            "No credentials configured. Use .token(), .password() or .key_store().",
        )),
    }
}

/// Waits for a server challenge. `Ok(None)` if none arrives in time.
async fn await_challenge(ws: &mut WsStream, wait: Duration) -> Result<Option<String>> {
    let deadline = Instant::now() + wait;

    loop {
        let Ok(message) = timeout_at(deadline, ws.next()).await else {
            debug!("No challenge received, signing local nonce");
            return Ok(None);
        };

        match message {
            Some(Ok(Message::Text(text))) => match InboundFrame::parse(&text)? {
                InboundFrame::Challenge(challenge) => {
                    debug!("Challenge received");
                    return Ok(Some(challenge.nonce));
                }
                other => debug!(frame = other.label(), "Ignoring frame before hello"),
            },
            Some(Ok(Message::Close(_))) | None => {
                return Err(Error::connection("socket closed before hello"));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

/// Reads frames until `hello_ok` or `hello_error`.
async fn read_hello_result(ws: &mut WsStream) -> Result<HelloOk> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => match InboundFrame::parse(&text)? {
                InboundFrame::HelloOk(hello_ok) => return Ok(hello_ok),
                InboundFrame::HelloError(error) => {
                    let retryable = error.is_retryable();
                    warn!(reason = %error.reason, retryable, "Hello rejected");
                    return Err(Error::hello_rejected(error.reason, retryable));
                }
                other => debug!(frame = other.label(), "Ignoring frame before hello_ok"),
            },
            Some(Ok(Message::Close(frame))) => {
                let reason = frame.map_or_else(String::new, |f| f.reason.to_string());
                return Err(Error::connection(format!(
                    "socket closed during handshake: {reason}"
                )));
            }
            None => return Err(Error::connection("socket closed during handshake")),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

// ============================================================================
// Device Token Cache
// ============================================================================

async fn load_device_token(inner: &ClientInner, device_id: &str) -> Option<DeviceAuthToken> {
    let cache = inner.auth_cache.as_ref()?;
    match cache.load_valid(device_id).await {
        Ok(token) => token,
        Err(e) => {
            warn!(error = %e, "Failed to read device token cache");
            None
        }
    }
}

/// Stores the device token from `hello_ok`, replacing any previous one.
async fn persist_device_token(inner: &ClientInner, device_id: &str, hello_ok: &HelloOk) {
    let (Some(cache), Some(issued)) = (&inner.auth_cache, &hello_ok.device_token) else {
        return;
    };

    let token = DeviceAuthToken::from_hello(device_id, issued, &hello_ok.auth, Utc::now());
    match cache.store(&token).await {
        Ok(()) => debug!(device_id, expires_at = ?token.expires_at, "Device token stored"),
        Err(e) => warn!(error = %e, "Failed to store device token"),
    }
}

#[inline]
fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
