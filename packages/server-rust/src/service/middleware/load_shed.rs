//! Load-shedding middleware for top-up operations.
//!
//! Rejects operations when the number of concurrent top-ups reaches
//! `max_concurrent_operations`, with `OperationError::Overloaded`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Semaphore;
use tower::{Layer, Service};

use crate::service::operation::{OperationError, OperationResponse, TopUpOperation};

// ---------------------------------------------------------------------------
// LoadShedLayer
// ---------------------------------------------------------------------------

/// Tower layer that limits concurrent operations via a semaphore.
///
/// When all permits are taken, incoming operations are rejected immediately
/// rather than queued. Services produced by one layer share its semaphore.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    semaphore: Arc<Semaphore>,
}

impl LoadShedLayer {
    /// Create a new `LoadShedLayer` with the given concurrency limit.
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent as usize)),
        }
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShedService {
            inner,
            semaphore: self.semaphore.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// LoadShedService
// ---------------------------------------------------------------------------

/// Service wrapper that enforces a concurrency limit via semaphore permits.
#[derive(Debug, Clone)]
pub struct LoadShedService<S> {
    inner: S,
    semaphore: Arc<Semaphore>,
}

impl<S> Service<TopUpOperation> for LoadShedService<S>
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
        let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
            tracing::warn!(call_id = op.ctx().call_id, "rejecting top-up: overloaded");
            return Box::pin(async { Err(OperationError::Overloaded) });
        };

        let fut = self.inner.call(op);
        Box::pin(async move {
            let result = fut.await;
            drop(permit);
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tower::ServiceExt;

    use super::*;
    use crate::service::middleware::test_support::{make_op, SlowService};

    #[tokio::test]
    async fn allows_operations_under_limit() {
        let svc = LoadShedLayer::new(10).layer(SlowService { delay_ms: 1 });
        let resp = svc.oneshot(make_op(3, 5000)).await.unwrap();
        assert_eq!(resp.call_id, 3);
    }

    #[tokio::test]
    async fn rejects_when_overloaded() {
        let layer = LoadShedLayer::new(1);
        let mut svc = layer.layer(SlowService { delay_ms: 500 });

        // First operation acquires the single permit.
        let _ = ServiceExt::ready(&mut svc).await.unwrap();
        let in_flight = tokio::spawn(svc.call(make_op(1, 5000)));

        tokio::time::sleep(Duration::from_millis(10)).await;

        // A clone from the same layer shares the exhausted semaphore.
        let mut second = layer.layer(SlowService { delay_ms: 1 });
        let err = second.call(make_op(2, 5000)).await.unwrap_err();
        assert!(matches!(err, OperationError::Overloaded));

        assert!(in_flight.await.unwrap().is_ok());
    }
}
