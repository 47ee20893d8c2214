//! Operation types flowing through the top-up pipeline.

use std::sync::atomic::{AtomicU64, Ordering};

use rust_decimal::Decimal;
use wallet_core::{ContextMissing, PaymentProvider, ProviderError, TopUpIntent};

/// Context carried with every top-up through the pipeline.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub call_id: u64,
    pub provider: PaymentProvider,
    pub call_timeout_ms: u64,
}

impl OperationContext {
    #[must_use]
    pub fn new(call_id: u64, provider: PaymentProvider, call_timeout_ms: u64) -> Self {
        Self {
            call_id,
            provider,
            call_timeout_ms,
        }
    }
}

/// A top-up dispatched to the provider strategy named in its context.
#[derive(Debug, Clone)]
pub struct TopUpOperation {
    pub ctx: OperationContext,
    pub amount: Decimal,
}

impl TopUpOperation {
    #[must_use]
    pub fn new(ctx: OperationContext, amount: Decimal) -> Self {
        Self { ctx, amount }
    }

    #[must_use]
    pub fn ctx(&self) -> &OperationContext {
        &self.ctx
    }

    /// The command handed downstream once this operation succeeds.
    #[must_use]
    pub fn intent(&self) -> TopUpIntent {
        TopUpIntent::new(self.amount, self.ctx.provider)
    }
}

/// Successful response from a provider strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResponse {
    pub call_id: u64,
    pub provider: PaymentProvider,
    /// Amount applied by the strategy.
    pub amount: Decimal,
}

/// Errors returned by the dispatcher and its middleware.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("unknown provider: {provider}")]
    UnknownProvider { provider: String },
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("server overloaded, try again later")]
    Overloaded,
    #[error(transparent)]
    ContextMissing(#[from] ContextMissing),
    #[error("provider failure: {0}")]
    Provider(anyhow::Error),
}

impl OperationError {
    /// `UnknownProvider` for a discriminant with no registered strategy.
    #[must_use]
    pub fn unknown_provider(provider: PaymentProvider) -> Self {
        Self::UnknownProvider {
            provider: provider.to_string(),
        }
    }

    /// `UnknownProvider` for a wire code outside the provider enumeration.
    #[must_use]
    pub fn unknown_provider_code(code: i32) -> Self {
        Self::UnknownProvider {
            provider: format!("code {code}"),
        }
    }
}

impl From<ProviderError> for OperationError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::ContextMissing(missing) => Self::ContextMissing(missing),
            ProviderError::Failed(source) => Self::Provider(source),
        }
    }
}

/// Process-wide source of unique call ids.
#[derive(Debug)]
pub struct CallIdGenerator {
    next: AtomicU64,
}

impl CallIdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for CallIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
