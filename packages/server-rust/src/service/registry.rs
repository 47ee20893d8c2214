use std::collections::HashMap;
use std::sync::Arc;

use wallet_core::{PaymentProvider, TopUpProvider};

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

/// Configuration errors detected while building a [`ProviderRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("more than one strategy registered for provider {provider}")]
    DuplicateProvider { provider: PaymentProvider },
    #[error("a strategy cannot be registered for the Unknown provider")]
    ReservedDiscriminant,
}

// ---------------------------------------------------------------------------
// ProviderRegistry
// ---------------------------------------------------------------------------

/// Read-only table from provider discriminant to its top-up strategy.
///
/// Built once at startup and never mutated afterwards, so lookups need no
/// synchronization. Every discriminant resolves to at most one strategy;
/// conflicts are rejected by [`ProviderRegistry::build`] rather than at
/// dispatch time.
pub struct ProviderRegistry {
    by_provider: HashMap<PaymentProvider, Arc<dyn TopUpProvider>>,
}

impl ProviderRegistry {
    /// Starts collecting strategies for a new registry.
    #[must_use]
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Builds the table from every registered strategy. Order is irrelevant.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DuplicateProvider`] if two strategies declare the
    ///   same discriminant.
    /// - [`RegistryError::ReservedDiscriminant`] if a strategy declares
    ///   [`PaymentProvider::Unknown`].
    pub fn build<I>(strategies: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = Arc<dyn TopUpProvider>>,
    {
        let mut by_provider = HashMap::new();
        for strategy in strategies {
            let provider = strategy.provider_type();
            if provider == PaymentProvider::Unknown {
                return Err(RegistryError::ReservedDiscriminant);
            }
            if by_provider.insert(provider, strategy).is_some() {
                return Err(RegistryError::DuplicateProvider { provider });
            }
        }
        Ok(Self { by_provider })
    }

    /// The strategy registered for `provider`, if any.
    #[must_use]
    pub fn get(&self, provider: PaymentProvider) -> Option<Arc<dyn TopUpProvider>> {
        self.by_provider.get(&provider).cloned()
    }

    /// Registered discriminants, in wire-code order.
    #[must_use]
    pub fn providers(&self) -> Vec<PaymentProvider> {
        let mut providers: Vec<_> = self.by_provider.keys().copied().collect();
        providers.sort_by_key(|p| p.code());
        providers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_provider.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_provider.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

/// Collects strategies before a [`ProviderRegistry`] is built.
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    strategies: Vec<Arc<dyn TopUpProvider>>,
}

impl ProviderRegistryBuilder {
    /// Adds a strategy. Conflicts are reported by [`Self::build`].
    #[must_use]
    pub fn register<P: TopUpProvider + 'static>(mut self, strategy: P) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    /// # Errors
    ///
    /// See [`ProviderRegistry::build`].
    pub fn build(self) -> Result<ProviderRegistry, RegistryError> {
        ProviderRegistry::build(self.strategies)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use wallet_core::ProviderError;

    use super::*;

    /// Strategy that echoes the amount without touching any context.
    struct EchoProvider(PaymentProvider);

    #[async_trait]
    impl TopUpProvider for EchoProvider {
        fn provider_type(&self) -> PaymentProvider {
            self.0
        }

        async fn top_up(&self, amount: Decimal) -> Result<Decimal, ProviderError> {
            Ok(amount)
        }
    }

    #[test]
    fn lookup_registered_provider() {
        let registry = ProviderRegistry::builder()
            .register(EchoProvider(PaymentProvider::PayPal))
            .register(EchoProvider(PaymentProvider::Stripe))
            .build()
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.get(PaymentProvider::Stripe).unwrap().provider_type(),
            PaymentProvider::Stripe
        );
        assert_eq!(
            registry.providers(),
            vec![PaymentProvider::Stripe, PaymentProvider::PayPal]
        );
    }

    #[test]
    fn unknown_and_unregistered_resolve_to_none() {
        let registry = ProviderRegistry::builder()
            .register(EchoProvider(PaymentProvider::Stripe))
            .build()
            .unwrap();

        assert!(registry.get(PaymentProvider::Unknown).is_none());
        assert!(registry.get(PaymentProvider::PayPal).is_none());
    }

    #[test]
    fn duplicate_discriminant_is_rejected() {
        let err = ProviderRegistry::builder()
            .register(EchoProvider(PaymentProvider::Stripe))
            .register(EchoProvider(PaymentProvider::Stripe))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateProvider {
                provider: PaymentProvider::Stripe
            }
        );
    }

    #[test]
    fn unknown_discriminant_is_rejected() {
        let err = ProviderRegistry::builder()
            .register(EchoProvider(PaymentProvider::Unknown))
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::ReservedDiscriminant);
    }

    #[test]
    fn empty_registry_is_allowed() {
        let registry = ProviderRegistry::builder().build().unwrap();
        assert!(registry.is_empty());
        assert!(registry.providers().is_empty());
    }
}
