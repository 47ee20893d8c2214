//! Provider dispatch: routes a `TopUpOperation` to the strategy registered
//! for its provider discriminant.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rust_decimal::Decimal;
use tower::Service;
use wallet_core::{PaymentProvider, TopUpProvider};

use super::operation::{OperationError, OperationResponse, TopUpOperation};
use super::registry::ProviderRegistry;

type DispatchFuture =
    Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

// ---------------------------------------------------------------------------
// ProviderDispatcher
// ---------------------------------------------------------------------------

/// Dispatches top-ups to the strategy registered for their provider.
///
/// Cloning is cheap: clones share the read-only [`ProviderRegistry`].
/// Discriminants with no registered strategy, including
/// [`PaymentProvider::Unknown`], fail with `OperationError::UnknownProvider`
/// without invoking any strategy. Strategy results and failures pass
/// through unchanged.
#[derive(Debug, Clone)]
pub struct ProviderDispatcher {
    registry: Arc<ProviderRegistry>,
}

impl ProviderDispatcher {
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    fn resolve(&self, provider: PaymentProvider) -> Result<Arc<dyn TopUpProvider>, OperationError> {
        self.registry
            .get(provider)
            .ok_or_else(|| OperationError::unknown_provider(provider))
    }

    /// Invokes the strategy for `provider` with `amount` and returns the
    /// amount it applied.
    ///
    /// # Errors
    ///
    /// Returns `OperationError::UnknownProvider` when no strategy is
    /// registered, or the strategy's own failure converted to
    /// `OperationError`.
    pub async fn dispatch(
        &self,
        provider: PaymentProvider,
        amount: Decimal,
    ) -> Result<Decimal, OperationError> {
        let strategy = self.resolve(provider)?;
        Ok(strategy.top_up(amount).await?)
    }
}

impl Service<TopUpOperation> for ProviderDispatcher {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = DispatchFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: TopUpOperation) -> Self::Future {
        let call_id = op.ctx().call_id;
        let provider = op.ctx().provider;
        let strategy = match self.resolve(provider) {
            Ok(strategy) => strategy,
            Err(err) => return Box::pin(async move { Err(err) }),
        };

        Box::pin(async move {
            let amount = strategy.top_up(op.amount).await?;
            Ok(OperationResponse {
                call_id,
                provider,
                amount,
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
