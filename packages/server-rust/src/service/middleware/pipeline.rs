//! Pipeline composition: the dispatcher behind its middleware layers.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use smarthub_core::{ApiRequest, ApiResponse};
use tower::{Service, ServiceBuilder};

use super::metrics::MetricsLayer;
use crate::dispatch::Dispatcher;

/// `tower::Service` view of the dispatcher. Dispatch never fails at this
/// level: every error has already become a failure response.
#[derive(Clone)]
pub struct DispatchService {
    dispatcher: Arc<Dispatcher>,
}

impl DispatchService {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl Service<ApiRequest> for DispatchService {
    type Response = ApiResponse;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<ApiResponse, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut request: ApiRequest) -> Self::Future {
        // Fan-out runs synchronously so handlers see the request before the
        // caller gets a future back.
        let pending = self.dispatcher.dispatch(&mut request);
        Box::pin(async move { Ok(Dispatcher::resolve(pending).await) })
    }
}

/// Builds the dispatch pipeline.
///
/// Layer order (outermost to innermost):
/// 1. `MetricsLayer` -- record timing and outcome
///
/// The returned service implements `tower::Service<ApiRequest>`.
#[must_use]
pub fn build_dispatch_pipeline(
    dispatcher: Arc<Dispatcher>,
) -> impl Service<ApiRequest, Response = ApiResponse, Error = Infallible, Future: Send> + Clone + Send
{
    ServiceBuilder::new()
        .layer(MetricsLayer)
        .service(DispatchService::new(dispatcher))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
