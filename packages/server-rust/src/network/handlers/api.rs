//! Catch-all API endpoint: every call under the API prefix goes through
//! the dispatch pipeline.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tower::ServiceExt;
use tracing::warn;

use super::AppState;
use crate::dispatch::{ReplyHandle, TransportCall};
use crate::service::middleware::build_dispatch_pipeline;
use crate::service::registry::{ManagedService, ServiceStatus};

/// Flattens the HTTP request into a transport call, dispatches it and
/// renders the aggregated response.
///
/// Answers 503 while the dispatcher service is stopped.
pub async fn api_handler(State(state): State<AppState>, request: Request) -> Response {
    if state.dispatcher.status() != ServiceStatus::Running {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "message": "Web services are not running" })),
        )
            .into_response();
    }
    let _guard = state.shutdown.in_flight_guard();

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.config.body_limit_bytes).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let mut call = TransportCall::new(parts.method, parts.uri.path());
    call.query = parts.uri.query().map(str::to_string);
    call.remote_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    call.content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    call.body = body;

    let request = state.dispatcher.build_request(call);
    let response = match build_dispatch_pipeline(state.dispatcher.clone())
        .oneshot(request)
        .await
    {
        Ok(response) => response,
        Err(never) => match never {},
    };

    let mut handle = ReplyHandle::new();
    state.dispatcher.send(&response, &mut handle);
    handle
        .into_response()
        .unwrap_or_else(|| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
