//! Metrics middleware for top-up operations.
//!
//! Records each dispatch in a `tracing` span and feeds the `metrics` facade:
//! a `wallet_top_ups_total` counter and a `wallet_top_up_duration_seconds`
//! histogram, both labelled by provider and outcome. Without an installed
//! recorder the macros are no-ops.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::operation::{OperationError, OperationResponse, TopUpOperation};

/// Counter of completed top-up dispatches.
pub const TOP_UPS_TOTAL: &str = "wallet_top_ups_total";

/// Histogram of top-up dispatch latency.
pub const TOP_UP_DURATION_SECONDS: &str = "wallet_top_up_duration_seconds";

/// Outcome label for a dispatch result.
#[must_use]
pub fn outcome_label(result: &Result<OperationResponse, OperationError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(OperationError::UnknownProvider { .. }) => "unknown_provider",
        Err(OperationError::Timeout { .. }) => "timeout",
        Err(OperationError::Overloaded) => "overloaded",
        Err(OperationError::ContextMissing(_)) => "context_missing",
        Err(OperationError::Provider(_)) => "provider_failure",
    }
}

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments top-ups with timing and outcome.
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

/// Service wrapper that records dispatch duration and outcome.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<TopUpOperation> for MetricsService<S>
where
    S: Service<TopUpOperation, Response = OperationResponse, Error = OperationError> + Send,
    S::Future: Send + 'static,
{
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, op: TopUpOperation) -> Self::Future {
        let provider = op.ctx().provider;
        let call_id = op.ctx().call_id;

        let span = info_span!(
            "top_up_dispatch",
            provider = provider.as_str(),
            call_id = call_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(op);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();
                let outcome = outcome_label(&result);

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                metrics::counter!(
                    TOP_UPS_TOTAL,
                    "provider" => provider.as_str(),
                    "outcome" => outcome
                )
                .increment(1);
                metrics::histogram!(
                    TOP_UP_DURATION_SECONDS,
                    "provider" => provider.as_str(),
                    "outcome" => outcome
                )
                .record(elapsed.as_secs_f64());

                tracing::info!(
                    provider = provider.as_str(),
                    call_id = call_id,
                    duration_ms = duration_ms,
                    outcome = outcome,
                    "top-up dispatch complete"
                );

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
