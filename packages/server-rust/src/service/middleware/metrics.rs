//! Metrics middleware for API dispatch.
//!
//! Wraps each dispatch in a `tracing` span and records the outcome counter
//! and duration histogram through the `metrics` facade.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use smarthub_core::{ApiRequest, ApiResponse};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

/// Counter of aggregated responses, labelled by `outcome`.
pub const DISPATCH_TOTAL: &str = "smarthub_dispatch_total";
/// Histogram of dispatch durations in seconds.
pub const DISPATCH_DURATION: &str = "smarthub_dispatch_duration_seconds";

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer instrumenting API dispatch with timing and counting.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<ApiRequest> for MetricsService<S>
where
    S: Service<ApiRequest, Response = ApiResponse> + Send,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = ApiResponse;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<ApiResponse, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: ApiRequest) -> Self::Future {
        let span = info_span!(
            "dispatch",
            method = %request.method,
            route = %request.route,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(request);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                let outcome = match &result {
                    Ok(response) if response.success => "ok",
                    Ok(_) => "failure",
                    Err(_) => "error",
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                metrics::counter!(DISPATCH_TOTAL, "outcome" => outcome).increment(1);
                metrics::histogram!(DISPATCH_DURATION).record(elapsed.as_secs_f64());

                tracing::debug!(duration_ms, outcome, "dispatch complete");

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
