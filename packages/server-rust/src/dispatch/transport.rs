//! Conversion between transport calls and API records.
//!
//! The dispatcher never sees axum types: the HTTP handler flattens an
//! inbound request into a [`TransportCall`] and renders the aggregated
//! [`ApiResponse`] through a [`ReplyHandle`].

use axum::body::Body;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use serde_json::{Map, Value};
use smarthub_core::{ApiMethod, ApiResponse, Payload};
use tracing::warn;

/// `application/json`
pub const HEADER_APPLICATION_JSON: &str = "application/json";
/// `application/x-www-form-urlencoded`
pub const HEADER_APPLICATION_FORM: &str = "application/x-www-form-urlencoded";

/// HTTP status of a failed call.
pub const API_ERROR_STATUS: StatusCode = StatusCode::INTERNAL_SERVER_ERROR;
/// HTTP status of a `not_modified` response.
pub const API_UP_TO_DATE_STATUS: StatusCode = StatusCode::NOT_MODIFIED;

const LOOPBACK_IPV4: &str = "127.0.0.1";

/// Transport-level view of one inbound call.
#[derive(Debug, Clone)]
pub struct TransportCall {
    pub method: Method,
    /// Remote address without the port, e.g. `::ffff:192.168.1.4` or `::1`.
    pub remote_addr: Option<String>,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl TransportCall {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            remote_addr: None,
            path: path.into(),
            query: None,
            content_type: None,
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.content_type = Some(content_type.into());
        self.body = body.into();
        self
    }

    /// `true` when the declared content type is `mime` (parameters ignored).
    #[must_use]
    pub fn has_content_type(&self, mime: &str) -> bool {
        self.content_type.as_deref().is_some_and(|ct| {
            ct.split(';')
                .next()
                .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(mime))
        })
    }
}

/// Maps an HTTP verb onto an API method. Unsupported verbs map to `None`.
#[must_use]
pub fn api_method(method: &Method) -> Option<ApiMethod> {
    match *method {
        Method::GET => Some(ApiMethod::Get),
        Method::POST => Some(ApiMethod::Post),
        Method::DELETE => Some(ApiMethod::Delete),
        _ => None,
    }
}

/// Last colon-delimited segment of the remote address; the IPv6 loopback
/// `::1` becomes `127.0.0.1`.
#[must_use]
pub fn source_ip(remote_addr: &str) -> String {
    let last = remote_addr.rsplit(':').next().unwrap_or(remote_addr);
    if last == "1" {
        LOOPBACK_IPV4.to_string()
    } else {
        last.to_string()
    }
}

/// Decodes an `application/x-www-form-urlencoded` string into a JSON map.
#[must_use]
pub fn form_fields(encoded: &[u8]) -> Map<String, Value> {
    url::form_urlencoded::parse(encoded)
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect()
}

/// Decodes a JSON object body. Non-object bodies yield `None`.
#[must_use]
pub fn json_fields(body: &[u8]) -> Option<Map<String, Value>> {
    if body.is_empty() {
        return None;
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            warn!("JSON body is not an object, ignoring it");
            None
        }
        Err(e) => {
            warn!(error = %e, "malformed JSON body, ignoring it");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// ReplyHandle
// ---------------------------------------------------------------------------

/// Write-once slot for the transport response.
#[derive(Default)]
pub struct ReplyHandle {
    response: Option<Response>,
    sent: bool,
}

impl ReplyHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Writes `response` unless something was already sent. Returns `true`
    /// if this call wrote the response.
    pub fn send(&mut self, response: &ApiResponse) -> bool {
        if self.sent {
            return false;
        }
        self.response = Some(render(response));
        self.sent = true;
        true
    }

    /// Takes the written response, if any.
    pub fn into_response(self) -> Option<Response> {
        self.response
    }
}

/// Renders an aggregated response for the wire.
#[must_use]
pub fn render(response: &ApiResponse) -> Response {
    if !response.success {
        return (API_ERROR_STATUS, Json(response.envelope())).into_response();
    }
    if response.not_modified {
        return API_UP_TO_DATE_STATUS.into_response();
    }

    match (&response.payload, response.is_json()) {
        (Payload::Json(value), true) => Json(value.clone()).into_response(),
        (Payload::Binary(bytes), true) => (
            [(header::CONTENT_TYPE, HEADER_APPLICATION_JSON.to_string())],
            Body::from(bytes.clone()),
        )
            .into_response(),
        (payload, false) => {
            let body = match payload {
                Payload::Binary(bytes) => bytes.clone(),
                Payload::Json(Value::String(s)) => Bytes::from(s.clone()),
                Payload::Json(other) => Bytes::from(other.to_string()),
            };
            (
                [(header::CONTENT_TYPE, response.content_type.clone())],
                Body::from(body),
            )
                .into_response()
        }
    }
}
