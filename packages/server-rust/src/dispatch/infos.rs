//! Built-in introspection endpoint listing every registration.

use std::sync::Arc;

use parking_lot::RwLock;
use smarthub_core::{ApiRequest, ApiResponse};

use super::registry::HandlerRegistry;
use crate::traits::{ApiHandler, HandlerReply};

/// Route of the introspection endpoint, registered at `AuthLevel::Dev`.
pub const INFOS_ROUTE: &str = ":/infos/";

/// Answers with the registry grouped by handler name, then by method.
pub struct InfosHandler {
    registry: Arc<RwLock<HandlerRegistry>>,
}

impl InfosHandler {
    #[must_use]
    pub fn new(registry: Arc<RwLock<HandlerRegistry>>) -> Self {
        Self { registry }
    }
}

impl ApiHandler for InfosHandler {
    fn name(&self) -> &str {
        "webServices"
    }

    fn process_api(&self, _request: &ApiRequest) -> anyhow::Result<HandlerReply> {
        let described = self.registry.read().describe();
        Ok(HandlerReply::ready(ApiResponse::ok(described)))
    }
}
