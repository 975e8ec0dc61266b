//! Event frame types.
//!
//! Events are unsolicited pushes from the gateway. They carry no `id`,
//! which is what separates them from responses.
//!
//! # Streams
//!
//! | Stream | Payload |
//! |--------|---------|
//! | `chat` | assistant deltas and final messages |
//! | `tool` | tool-call progress (`phase`, `toolCallId`, `name`) |
//! | `compaction` | context compaction notices |
//! | `presence` | connected clients and devices |

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// EventFrame
// ============================================================================

/// A push from the gateway.
///
/// # Format
///
/// ```json
/// {
///   "stream": "tool",
///   "sessionKey": "s1",
///   "runId": "run1",
///   "ts": 1000,
///   "data": { "phase": "start", "toolCallId": "t1", "name": "search" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFrame {
    /// Stream tag.
    pub stream: String,

    /// Session the event belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,

    /// Agent run the event belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    /// Server timestamp, ms since the Unix epoch.
    #[serde(default)]
    pub ts: i64,

    /// Stream-specific payload.
    #[serde(default)]
    pub data: Value,
}

impl EventFrame {
    /// Returns the stream as a [`StreamKind`].
    #[inline]
    #[must_use]
    pub fn kind(&self) -> StreamKind {
        StreamKind::from(self.stream.as_str())
    }

    /// Returns `true` if the event belongs to `session_key`.
    #[inline]
    #[must_use]
    pub fn is_for_session(&self, session_key: &str) -> bool {
        self.session_key.as_deref() == Some(session_key)
    }

    /// Returns `true` if the event belongs to `run_id`.
    #[inline]
    #[must_use]
    pub fn is_for_run(&self, run_id: &str) -> bool {
        self.run_id.as_deref() == Some(run_id)
    }

    /// Gets a string value from `data`.
    ///
    /// Returns `None` if the key is missing or not a string.
    #[inline]
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Deserializes `data` into a typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if `data` does not match `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.data)?)
    }
}

// ============================================================================
// StreamKind
// ============================================================================

/// Known event streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Chat deltas and messages.
    Chat,
    /// Tool-call progress.
    Tool,
    /// Compaction notices.
    Compaction,
    /// Presence updates.
    Presence,
    /// Any other stream.
    Other(String),
}

impl From<&str> for StreamKind {
    fn from(stream: &str) -> Self {
        match stream {
            "chat" => Self::Chat,
            "tool" => Self::Tool,
            "compaction" => Self::Compaction,
            "presence" => Self::Presence,
            other => Self::Other(other.to_string()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
