use async_trait::async_trait;
use wallet_core::TopUpIntent;

use crate::service::identity::{IdentityError, RequestIdentity};

/// Outbound command collaborator receiving finalized top-ups.
/// Implementations: the background hand-off worker, recording stubs (tests).
#[async_trait]
pub trait IntentPublisher: Send + Sync {
    /// Hand a finalized intent downstream. Returns once the hand-off is
    /// accepted; processing happens elsewhere.
    async fn publish(&self, intent: TopUpIntent) -> anyhow::Result<()>;
}

/// Boundary source of caller identity for one inbound call.
/// Implementations: HTTP request headers, fixed values (tests).
pub trait IdentitySource: Send + Sync {
    /// Tenant, user and correlation id of the caller.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] naming the first missing or malformed field.
    fn request_identity(&self) -> Result<RequestIdentity, IdentityError>;

    /// Caller-supplied deduplication token.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] if the token is absent or blank.
    fn idempotency_key(&self) -> Result<String, IdentityError>;
}
