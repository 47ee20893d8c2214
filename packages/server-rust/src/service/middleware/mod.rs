//! Tower middleware layers for the top-up pipeline.
//!
//! - [`timeout`]: Per-operation timeout enforcement
//! - [`metrics`]: Operation timing and outcome via `tracing` spans and `metrics` counters
//! - [`load_shed`]: Semaphore-based concurrency limiting
//! - [`pipeline`]: Composes all layers around the provider dispatcher

pub mod load_shed;
pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;
pub use pipeline::{build_operation_pipeline, OperationPipeline};
pub use timeout::TimeoutLayer;

#[cfg(test)]
pub(crate) mod test_support {
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use rust_decimal::Decimal;
    use tower::Service;
    use wallet_core::PaymentProvider;

    use crate::service::operation::{
        OperationContext, OperationError, OperationResponse, TopUpOperation,
    };

    /// Service that sleeps for a configurable delay, then echoes the amount.
    #[derive(Clone)]
    pub struct SlowService {
        pub delay_ms: u64,
    }

    impl Service<TopUpOperation> for SlowService {
        type Response = OperationResponse;
        type Error = OperationError;
        type Future =
            Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, op: TopUpOperation) -> Self::Future {
            let delay = self.delay_ms;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(OperationResponse {
                    call_id: op.ctx.call_id,
                    provider: op.ctx.provider,
                    amount: op.amount,
                })
            })
        }
    }

    pub fn make_op(call_id: u64, timeout_ms: u64) -> TopUpOperation {
        TopUpOperation::new(
            OperationContext::new(call_id, PaymentProvider::Stripe, timeout_ms),
            Decimal::from(100),
        )
    }
}
