//! Health, liveness, and readiness endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::AppState;
use crate::network::HealthState;
use crate::service::registry::{ManagedService, ServiceStatus};

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub state: &'static str,
    pub dispatcher: &'static str,
    pub registrations: usize,
    pub in_flight: u64,
    pub uptime_secs: u64,
}

/// Returns detailed health information as JSON.
///
/// Always returns 200; the `state` field tells whether the listener is
/// serving, starting or draining.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        state: state.shutdown.health_state().as_str(),
        dispatcher: state.dispatcher.status().as_str(),
        registrations: state.dispatcher.registration_count(),
        in_flight: state.shutdown.in_flight_count(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Liveness probe: always 200 while the process answers.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 when the listener is ready and the dispatcher is
/// running, 503 otherwise.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready
        && state.dispatcher.status() == ServiceStatus::Running
    {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
