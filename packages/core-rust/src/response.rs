//! Outcome of one dispatched API call.

use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Value};

/// Content type used when a response does not name one.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Body carried by an [`ApiResponse`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Structured payload, JSON-encoded on the wire.
    Json(Value),
    /// Raw body sent as-is with the response's content type.
    Binary(Bytes),
}

impl Payload {
    /// JSON view of the payload. Binary bodies are reported as `null`,
    /// since failure envelopes can only carry JSON.
    #[must_use]
    pub fn as_json(&self) -> Value {
        match self {
            Self::Json(value) => value.clone(),
            Self::Binary(_) => Value::Null,
        }
    }
}

/// One handler's answer, and after reduction the answer sent to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub success: bool,
    pub payload: Payload,
    /// `0` means no error.
    pub error_code: i64,
    /// Empty means no error.
    pub error_message: String,
    pub content_type: String,
    /// Cache hit: the caller's copy is current, send an empty body.
    pub not_modified: bool,
}

impl ApiResponse {
    /// Successful JSON response.
    #[must_use]
    pub fn ok(payload: Value) -> Self {
        Self {
            success: true,
            payload: Payload::Json(payload),
            error_code: 0,
            error_message: String::new(),
            content_type: JSON_CONTENT_TYPE.to_string(),
            not_modified: false,
        }
    }

    /// Successful response with an empty JSON object.
    #[must_use]
    pub fn empty() -> Self {
        Self::ok(json!({}))
    }

    /// Successful response with a raw body.
    #[must_use]
    pub fn binary(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            payload: Payload::Binary(body.into()),
            content_type: content_type.into(),
            ..Self::ok(Value::Null)
        }
    }

    /// Successful response telling the caller its cached copy is current.
    #[must_use]
    pub fn not_modified() -> Self {
        Self {
            not_modified: true,
            ..Self::empty()
        }
    }

    /// Failed response with an empty data object.
    #[must_use]
    pub fn failure(error_code: i64, error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: Payload::Json(json!({})),
            error_code,
            error_message: error_message.into(),
            content_type: JSON_CONTENT_TYPE.to_string(),
            not_modified: false,
        }
    }

    /// Replaces the payload, keeping every other field.
    #[must_use]
    pub fn with_data(mut self, payload: Value) -> Self {
        self.payload = Payload::Json(payload);
        self
    }

    /// `true` when the body should be JSON-encoded.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.content_type.is_empty() || self.content_type == JSON_CONTENT_TYPE
    }

    /// Envelope sent to the caller on failure.
    #[must_use]
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            code: self.error_code,
            message: self.error_message.clone(),
            data: self.payload.as_json(),
        }
    }
}

/// Wire shape of a failed call: `{code, message, data}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEnvelope {
    pub code: i64,
    pub message: String,
    pub data: Value,
}
