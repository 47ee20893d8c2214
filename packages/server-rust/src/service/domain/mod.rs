//! Top-up provider strategies.
//!
//! Every strategy runs the same in-scope bookkeeping: it requires the
//! request and wallet contexts bound to the calling flow, classifies the
//! request as a top-up, records the outcome on the wallet, and raises the
//! `HighValueTopUp` flag when the amount exceeds the configured threshold.
//! The provider SDK call itself is an external integration; strategies pass
//! the amount through unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;
use wallet_core::{
    ContextAccessor, PaymentProvider, ProviderError, RequestContext, TopUpProvider, WalletContext,
};

use crate::service::config::ServerConfig;
use crate::service::registry::{ProviderRegistry, RegistryError};

/// Request classifier set by every top-up strategy.
pub const TOP_UP_REQUEST_TYPE: &str = "TopUp";

/// Feature flag raised on the request for amounts above the threshold.
pub const HIGH_VALUE_FEATURE: &str = "HighValueTopUp";

// ---------------------------------------------------------------------------
// TopUpRecorder
// ---------------------------------------------------------------------------

/// In-scope bookkeeping shared by all provider strategies.
#[derive(Debug, Clone, Copy)]
struct TopUpRecorder {
    request: ContextAccessor<RequestContext>,
    wallet: ContextAccessor<WalletContext>,
    high_value_threshold: Decimal,
}

impl TopUpRecorder {
    fn new(high_value_threshold: Decimal) -> Self {
        Self {
            request: ContextAccessor::new(),
            wallet: ContextAccessor::new(),
            high_value_threshold,
        }
    }

    fn apply(&self, provider: PaymentProvider, amount: Decimal) -> Result<Decimal, ProviderError> {
        let request = self.request.require_current()?;
        let wallet = self.wallet.require_current()?;

        request.with_request_type(TOP_UP_REQUEST_TYPE);
        info!(
            correlation_id = request.correlation_id(),
            tenant_id = %request.tenant_id(),
            user_id = %request.user_id(),
            "top-up request received"
        );

        let record = wallet.set_last_top_up(amount, provider);
        info!(
            correlation_id = request.correlation_id(),
            wallet_id = %wallet.wallet_id(),
            amount = %record.amount,
            provider = %record.provider,
            at = %record.at,
            "top-up recorded"
        );

        if amount > self.high_value_threshold {
            request.enable_feature(HIGH_VALUE_FEATURE, None);
            info!(
                correlation_id = request.correlation_id(),
                amount = %amount,
                threshold = %self.high_value_threshold,
                "high-value top-up"
            );
        }

        Ok(amount)
    }
}

// ---------------------------------------------------------------------------
// Macro for per-provider strategies
// ---------------------------------------------------------------------------

/// Generate a provider strategy bound to a fixed discriminant.
macro_rules! top_up_provider {
    (
        $(#[$meta:meta])*
        $name:ident, $provider:expr
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            recorder: TopUpRecorder,
        }

        impl $name {
            #[must_use]
            pub fn new(config: &ServerConfig) -> Self {
                Self {
                    recorder: TopUpRecorder::new(config.high_value_threshold),
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new(&ServerConfig::default())
            }
        }

        #[async_trait]
        impl TopUpProvider for $name {
            fn provider_type(&self) -> PaymentProvider {
                $provider
            }

            async fn top_up(&self, amount: Decimal) -> Result<Decimal, ProviderError> {
                self.recorder.apply($provider, amount)
            }
        }
    };
}

top_up_provider!(
    /// Top-up strategy for Stripe.
    StripeTopUpProvider, PaymentProvider::Stripe
);

top_up_provider!(
    /// Top-up strategy for `PayPal`.
    PayPalTopUpProvider, PaymentProvider::PayPal
);

/// All built-in strategies configured from `config`.
#[must_use]
pub fn default_strategies(config: &ServerConfig) -> Vec<Arc<dyn TopUpProvider>> {
    vec![
        Arc::new(StripeTopUpProvider::new(config)),
        Arc::new(PayPalTopUpProvider::new(config)),
    ]
}

/// Registry holding every built-in strategy.
///
/// # Errors
///
/// Propagates [`RegistryError`] if the built-in set ever declares a
/// conflicting discriminant.
pub fn default_registry(config: &ServerConfig) -> Result<ProviderRegistry, RegistryError> {
    ProviderRegistry::build(default_strategies(config))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use uuid::Uuid;
    use wallet_core::{ContextManager, ContextMissing};

    use super::*;

    const REQUESTS: ContextManager<RequestContext> = ContextManager::new();
    const WALLETS: ContextManager<WalletContext> = ContextManager::new();

    struct Scoped {
        request: Arc<RequestContext>,
        wallet: Arc<WalletContext>,
    }

    fn scoped() -> Scoped {
        Scoped {
            request: Arc::new(RequestContext::new(Uuid::new_v4(), Uuid::new_v4(), "c-1")),
            wallet: Arc::new(WalletContext::new(Uuid::new_v4(), "k-1")),
        }
    }

    async fn top_up_in_scope(
        strategy: &dyn TopUpProvider,
        scoped: &Scoped,
        amount: Decimal,
    ) -> Result<Decimal, ProviderError> {
        REQUESTS
            .execute_in_scope(Arc::clone(&scoped.request), || async {
                WALLETS
                    .execute_in_scope(Arc::clone(&scoped.wallet), || strategy.top_up(amount))
                    .await
            })
            .await
    }

    #[test]
    fn strategies_declare_their_discriminant() {
        assert_eq!(
            StripeTopUpProvider::default().provider_type(),
            PaymentProvider::Stripe
        );
        assert_eq!(
            PayPalTopUpProvider::default().provider_type(),
            PaymentProvider::PayPal
        );
    }

    #[test]
    fn default_registry_covers_every_real_provider() {
        let registry = default_registry(&ServerConfig::default()).unwrap();
        assert_eq!(
            registry.providers(),
            vec![PaymentProvider::Stripe, PaymentProvider::PayPal]
        );
    }

    #[tokio::test]
    async fn high_value_top_up_records_and_flags() {
        let scoped = scoped();
        let applied = top_up_in_scope(&StripeTopUpProvider::default(), &scoped, Decimal::from(1500))
            .await
            .unwrap();

        assert_eq!(applied, Decimal::from(1500));
        assert_eq!(scoped.wallet.last_top_up_amount(), Some(Decimal::from(1500)));
        assert_eq!(
            scoped.wallet.last_top_up_provider(),
            Some(PaymentProvider::Stripe)
        );
        assert!(scoped.wallet.last_top_up_at().is_some());
        assert_eq!(scoped.request.request_type().as_deref(), Some(TOP_UP_REQUEST_TYPE));
        assert_eq!(scoped.request.feature(HIGH_VALUE_FEATURE).as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn ordinary_top_up_leaves_flag_unset() {
        let scoped = scoped();
        top_up_in_scope(&PayPalTopUpProvider::default(), &scoped, Decimal::from(500))
            .await
            .unwrap();

        assert_eq!(scoped.wallet.last_top_up_amount(), Some(Decimal::from(500)));
        assert_eq!(
            scoped.wallet.last_top_up_provider(),
            Some(PaymentProvider::PayPal)
        );
        assert!(!scoped.request.is_feature_enabled(HIGH_VALUE_FEATURE));
    }

    #[tokio::test]
    async fn threshold_itself_is_not_high_value() {
        let scoped = scoped();
        top_up_in_scope(&StripeTopUpProvider::default(), &scoped, Decimal::from(1000))
            .await
            .unwrap();
        assert!(!scoped.request.is_feature_enabled(HIGH_VALUE_FEATURE));
    }

    #[tokio::test]
    async fn configured_threshold_is_honoured() {
        let config = ServerConfig {
            high_value_threshold: Decimal::from(100),
            ..ServerConfig::default()
        };
        let scoped = scoped();
        top_up_in_scope(&StripeTopUpProvider::new(&config), &scoped, Decimal::from(101))
            .await
            .unwrap();
        assert!(scoped.request.is_feature_enabled(HIGH_VALUE_FEATURE));
    }

    #[tokio::test]
    async fn non_positive_amounts_pass_through() {
        let scoped = scoped();
        let applied = top_up_in_scope(&StripeTopUpProvider::default(), &scoped, Decimal::from(-5))
            .await
            .unwrap();
        assert_eq!(applied, Decimal::from(-5));
        assert_eq!(scoped.wallet.last_top_up_amount(), Some(Decimal::from(-5)));
    }

    #[tokio::test]
    async fn outside_any_scope_fails_with_request_missing() {
        let err = StripeTopUpProvider::default()
            .top_up(Decimal::from(10))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::ContextMissing(ContextMissing { context: "RequestContext" })
        ));
    }

    #[tokio::test]
    async fn request_scope_alone_fails_with_wallet_missing() {
        let request = Arc::new(RequestContext::new(Uuid::new_v4(), Uuid::new_v4(), "c-1"));
        let strategy = PayPalTopUpProvider::default();
        let err = REQUESTS
            .execute_in_scope(Arc::clone(&request), || strategy.top_up(Decimal::from(10)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProviderError::ContextMissing(ContextMissing { context: "WalletContext" })
        ));
        assert!(request.request_type().is_none());
    }

    proptest! {
        #[test]
        fn flag_raised_iff_amount_exceeds_threshold(
            mantissa in -1_000_000i64..10_000_000i64,
            scale in 0u32..4,
        ) {
            let amount = Decimal::new(mantissa, scale);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            let scoped = scoped();
            let applied = runtime
                .block_on(top_up_in_scope(&StripeTopUpProvider::default(), &scoped, amount))
                .unwrap();

            prop_assert_eq!(applied, amount);
            prop_assert_eq!(scoped.wallet.last_top_up_amount(), Some(amount));
            prop_assert_eq!(
                scoped.request.is_feature_enabled(HIGH_VALUE_FEATURE),
                amount > Decimal::from(1000)
            );
        }
    }
}
