//! WebSocket protocol frame types.
//!
//! This module defines the JSON frames exchanged with the gateway.
//!
//! # Protocol Overview
//!
//! | Frame | Direction | Purpose |
//! |-------|-----------|---------|
//! | [`Hello`] | Client → Gateway | Protocol version and credentials |
//! | [`Challenge`] | Gateway → Client | Optional nonce to sign |
//! | [`HelloOk`] / [`HelloError`] | Gateway → Client | Handshake result |
//! | [`Request`] | Client → Gateway | Correlated RPC call |
//! | [`Response`] | Gateway → Client | Reply carrying the request `id` |
//! | [`EventFrame`] | Gateway → Client | Unsolicited push, no `id` |
//!
//! Responses and events share the socket; the presence of a non-null `id`
//! is what separates them. See [`InboundFrame::parse`].

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, from_value};

use crate::error::{Error, Result};

// ============================================================================
// Submodules
// ============================================================================

/// Event frame types.
pub mod event;

/// Handshake frame types.
pub mod hello;

/// Request and Response frame types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{EventFrame, StreamKind};
pub use hello::{
    AuthInfo, AuthMode, Challenge, Features, Hello, HelloAuth, HelloError, HelloOk,
    IssuedDeviceToken, PROTOCOL_VERSION, signature_payload,
};
pub use request::{Request, Response, ResponseError};

// ============================================================================
// InboundFrame
// ============================================================================

/// A classified frame received from the gateway.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    /// Successful handshake.
    HelloOk(HelloOk),
    /// Rejected handshake.
    HelloError(HelloError),
    /// Server-issued nonce for device signing.
    Challenge(Challenge),
    /// Reply to a request.
    Response(Response),
    /// Server push.
    Event(EventFrame),
    /// Well-formed JSON object with no recognised shape.
    Unknown(Value),
}

/// Shape of a frame, decided before deserializing into a concrete type.
enum FrameShape {
    HelloOk,
    HelloError,
    Challenge,
    Response,
    Event,
    Unknown,
}

impl InboundFrame {
    /// Parses and classifies a text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the text is not JSON or a recognised frame
    ///   has the wrong field types
    /// - [`Error::Protocol`] if the JSON is not an object
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;

        let shape = {
            let Value::Object(map) = &value else {
                return Err(Error::protocol("frame is not a JSON object"));
            };

            match map.get("type").and_then(Value::as_str) {
                Some("hello_ok") => FrameShape::HelloOk,
                Some("hello_error") => FrameShape::HelloError,
                Some("challenge") => FrameShape::Challenge,
                _ if map.get("id").is_some_and(|id| !id.is_null()) => FrameShape::Response,
                _ if map.contains_key("stream") => FrameShape::Event,
                _ => FrameShape::Unknown,
            }
        };

        Ok(match shape {
            FrameShape::HelloOk => Self::HelloOk(from_value(value)?),
            FrameShape::HelloError => Self::HelloError(from_value(value)?),
            FrameShape::Challenge => Self::Challenge(from_value(value)?),
            FrameShape::Response => Self::Response(from_value(value)?),
            FrameShape::Event => Self::Event(from_value(value)?),
            FrameShape::Unknown => Self::Unknown(value),
        })
    }

    /// Returns a short label for logging.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::HelloOk(_) => "hello_ok",
            Self::HelloError(_) => "hello_error",
            Self::Challenge(_) => "challenge",
            Self::Response(_) => "response",
            Self::Event(_) => "event",
            Self::Unknown(_) => "unknown",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_has_id() {
        let frame = InboundFrame::parse(r#"{"id":"r1","result":{"ok":true}}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Response(ref r) if r.id.as_str() == "r1"));
    }

    #[test]
    fn test_event_without_id_is_never_a_response() {
        let frame = InboundFrame::parse(
            r#"{"stream":"tool","sessionKey":"s1","runId":"run1","ts":1000,"data":{"phase":"start"}}"#,
        )
        .unwrap();
        assert!(matches!(frame, InboundFrame::Event(_)));
    }

    #[test]
    fn test_null_id_with_stream_is_event() {
        let frame = InboundFrame::parse(r#"{"id":null,"stream":"presence","ts":1,"data":{}}"#)
            .unwrap();
        assert_eq!(frame.label(), "event");
    }

    #[test]
    fn test_hello_frames() {
        let ok = InboundFrame::parse(
            r#"{"type":"hello_ok","protocol":3,"features":{"methods":["status"],"events":[]},"auth":{"role":"operator","scopes":[]}}"#,
        )
        .unwrap();
        assert_eq!(ok.label(), "hello_ok");

        let err = InboundFrame::parse(r#"{"type":"hello_error","reason":"invalid_token"}"#).unwrap();
        assert!(matches!(err, InboundFrame::HelloError(ref e) if e.reason == "invalid_token"));
    }

    #[test]
    fn test_challenge_frame() {
        let frame = InboundFrame::parse(r#"{"type":"challenge","nonce":"abc","ts":5}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Challenge(ref c) if c.nonce == "abc"));
    }

    #[test]
    fn test_unknown_object() {
        let frame = InboundFrame::parse(r#"{"type":"tick"}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Unknown(_)));
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(InboundFrame::parse("not json"), Err(Error::Json(_))));
        assert!(matches!(InboundFrame::parse("[1,2]"), Err(Error::Protocol { .. })));
        assert!(InboundFrame::parse(r#"{"id":"r1","error":42}"#).is_err());
    }
}
