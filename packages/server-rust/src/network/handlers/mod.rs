//! HTTP handlers and the state they share.

pub mod api;
pub mod health;

pub use api::api_handler;
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::{NetworkConfig, ShutdownController};
use crate::dispatch::Dispatcher;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Dispatcher every API call is handed to.
    pub dispatcher: Arc<Dispatcher>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    pub config: Arc<NetworkConfig>,
    /// Listener start time, used for uptime calculation.
    pub start_time: Instant,
}
