//! Request and Response frame types.
//!
//! Every request carries a client-allocated [`RequestId`]; the gateway
//! echoes it on the matching response.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Request
// ============================================================================

/// A request from client to gateway.
///
/// # Format
///
/// ```json
/// { "id": "r1", "method": "sessions.list", "params": {} }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    /// Unique identifier for request/response correlation.
    pub id: RequestId,

    /// Method name, e.g. `chat.send`.
    pub method: String,

    /// Method parameters.
    pub params: Value,
}

impl Request {
    /// Creates a new request.
    #[inline]
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from gateway to client.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": "r1", "result": { "ok": true } }
/// ```
///
/// Error:
/// ```json
/// { "id": "r1", "error": { "message": "unknown method", "code": "E_METHOD" } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    /// Matches the request `id`.
    pub id: RequestId,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error (if failed).
    #[serde(default)]
    pub error: Option<ResponseError>,
}

impl Response {
    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value, returning error if response was error.
    ///
    /// A response with neither `result` nor `error` resolves to `null`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] if the response carried an error.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(Error::server(error.message, error.code)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// ResponseError
// ============================================================================

/// Error payload of a failed response.
///
/// Accepts `"message"`, `{ "message": "..." }` and
/// `{ "message": "...", "code": "E_X" | 42 }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawResponseError")]
pub struct ResponseError {
    /// Human-readable message.
    pub message: String,
    /// Machine-readable code, numbers rendered as strings.
    pub code: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawResponseError {
    Text(String),
    Detailed {
        message: String,
        #[serde(default, deserialize_with = "code_as_string")]
        code: Option<String>,
    },
}

impl From<RawResponseError> for ResponseError {
    fn from(raw: RawResponseError) -> Self {
        match raw {
            RawResponseError::Text(message) => Self {
                message,
                code: None,
            },
            RawResponseError::Detailed { message, code } => Self { message, code },
        }
    }
}

fn code_as_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(code)) => Some(code),
        Some(Value::Number(code)) => Some(code.to_string()),
        _ => None,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = Request::new(RequestId::from_sequence(1), "status", json!({}));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"id": "r1", "method": "status", "params": {}}));
    }

    #[test]
    fn test_success_response() {
        let response: Response =
            serde_json::from_str(r#"{"id":"r1","result":{"ok":true}}"#).unwrap();
        assert!(!response.is_error());
        assert_eq!(response.into_result().unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_empty_response_is_null() {
        let response: Response = serde_json::from_str(r#"{"id":"r9"}"#).unwrap();
        assert_eq!(response.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_error_response() {
        let response: Response = serde_json::from_str(
            r#"{"id":"r2","error":{"message":"unknown method","code":"E_METHOD"}}"#,
        )
        .unwrap();
        assert!(response.is_error());

        match response.into_result() {
            Err(Error::Server { message, code }) => {
                assert_eq!(message, "unknown method");
                assert_eq!(code.as_deref(), Some("E_METHOD"));
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[test]
    fn test_error_code_variants() {
        let numeric: Response =
            serde_json::from_str(r#"{"id":"r3","error":{"message":"x","code":404}}"#).unwrap();
        assert_eq!(numeric.error.unwrap().code.as_deref(), Some("404"));

        let bare: Response = serde_json::from_str(r#"{"id":"r4","error":"denied"}"#).unwrap();
        assert_eq!(
            bare.error,
            Some(ResponseError {
                message: "denied".into(),
                code: None
            })
        );
    }
}
