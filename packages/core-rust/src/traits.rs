use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::scope::ContextMissing;
use crate::types::PaymentProvider;

/// Failure raised by a [`TopUpProvider`].
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The strategy ran outside the request or wallet scope it requires.
    #[error(transparent)]
    ContextMissing(#[from] ContextMissing),
    /// The provider integration itself failed. Passed through unchanged.
    #[error("provider failure: {0}")]
    Failed(anyhow::Error),
}

/// Top-up strategy for a single payment provider.
///
/// Implementations read the request and wallet contexts bound to the
/// calling flow, record the outcome on the wallet context and return the
/// amount applied. Exactly one implementation is registered per
/// [`PaymentProvider`] variant, excluding `Unknown`.
#[async_trait]
pub trait TopUpProvider: Send + Sync {
    /// The provider this strategy handles. Fixed per implementation.
    fn provider_type(&self) -> PaymentProvider;

    /// Performs the top-up and returns the amount applied.
    async fn top_up(&self, amount: Decimal) -> Result<Decimal, ProviderError>;
}
