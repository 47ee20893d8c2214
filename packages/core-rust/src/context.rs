//! Request and wallet context entities.
//!
//! Both entities pair immutable identity (assigned at creation) with a small
//! amount of mutable metadata written by provider strategies while the
//! entity is bound to a flow. The metadata sits behind a `RwLock` so the
//! entity can be shared as `Arc<Self>` inside its own flow. Entities are not
//! `Clone`: the only way to reach one is through the flow that created it.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scope::ScopedContext;
use crate::types::PaymentProvider;

/// Value stored for a feature flag enabled without an explicit value.
pub const DEFAULT_FEATURE_VALUE: &str = "true";

// ---------------------------------------------------------------------------
// ContextId
// ---------------------------------------------------------------------------

/// Opaque identifier assigned to every context at creation.
///
/// Rendered as a 32-character lowercase hex string (UUID v4, no hyphens).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(String);

impl ContextId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// RequestContext
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RequestState {
    request_type: Option<String>,
    feature_flags: HashMap<String, String>,
}

/// Context of a single inbound call: tenancy, caller identity and tracing.
#[derive(Debug)]
pub struct RequestContext {
    id: ContextId,
    created_at: DateTime<Utc>,
    tenant_id: Uuid,
    user_id: Uuid,
    correlation_id: String,
    state: RwLock<RequestState>,
}

impl RequestContext {
    /// Creates a request context with a fresh id and the current UTC time.
    #[must_use]
    pub fn new(tenant_id: Uuid, user_id: Uuid, correlation_id: impl Into<String>) -> Self {
        Self {
            id: ContextId::generate(),
            created_at: Utc::now(),
            tenant_id,
            user_id,
            correlation_id: correlation_id.into(),
            state: RwLock::new(RequestState::default()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &ContextId {
        &self.id
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    #[must_use]
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Caller-supplied token used to follow the request across services.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Classifier of the request (e.g. `"TopUp"`), if one has been set.
    #[must_use]
    pub fn request_type(&self) -> Option<String> {
        self.state.read().request_type.clone()
    }

    /// Sets the request classifier. Last write wins.
    pub fn with_request_type(&self, request_type: impl Into<String>) -> &Self {
        self.state.write().request_type = Some(request_type.into());
        self
    }

    /// Enables a feature flag. `None` stores [`DEFAULT_FEATURE_VALUE`].
    pub fn enable_feature(&self, key: impl Into<String>, value: Option<&str>) -> &Self {
        let value = value.unwrap_or(DEFAULT_FEATURE_VALUE).to_string();
        self.state.write().feature_flags.insert(key.into(), value);
        self
    }

    /// Value of a feature flag, if enabled.
    #[must_use]
    pub fn feature(&self, key: &str) -> Option<String> {
        self.state.read().feature_flags.get(key).cloned()
    }

    #[must_use]
    pub fn is_feature_enabled(&self, key: &str) -> bool {
        self.state.read().feature_flags.contains_key(key)
    }

    /// Snapshot of all enabled feature flags.
    #[must_use]
    pub fn feature_flags(&self) -> HashMap<String, String> {
        self.state.read().feature_flags.clone()
    }
}

impl ScopedContext for RequestContext {
    const NAME: &'static str = "RequestContext";

    fn context_id(&self) -> &ContextId {
        &self.id
    }
}

// ---------------------------------------------------------------------------
// WalletContext
// ---------------------------------------------------------------------------

/// Outcome of the most recent top-up recorded on a [`WalletContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpRecord {
    pub amount: Decimal,
    pub provider: PaymentProvider,
    pub at: DateTime<Utc>,
}

/// Context of one wallet-affecting operation, always nested inside a
/// [`RequestContext`] scope of the same flow.
#[derive(Debug)]
pub struct WalletContext {
    id: ContextId,
    created_at: DateTime<Utc>,
    wallet_id: Uuid,
    idempotency_key: String,
    last_top_up: RwLock<Option<TopUpRecord>>,
}

impl WalletContext {
    /// Creates a wallet context with a fresh id and the current UTC time.
    ///
    /// No validation happens here; boundary values are checked by the
    /// identity extractor before a context is ever built.
    #[must_use]
    pub fn new(wallet_id: Uuid, idempotency_key: impl Into<String>) -> Self {
        Self {
            id: ContextId::generate(),
            created_at: Utc::now(),
            wallet_id,
            idempotency_key: idempotency_key.into(),
            last_top_up: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn id(&self) -> &ContextId {
        &self.id
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn wallet_id(&self) -> Uuid {
        self.wallet_id
    }

    /// Caller-supplied deduplication token. Stored only; never checked
    /// against earlier operations.
    #[must_use]
    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    /// Records a top-up outcome stamped with the current UTC time and
    /// returns the stored record. Replaces any earlier record.
    pub fn set_last_top_up(&self, amount: Decimal, provider: PaymentProvider) -> TopUpRecord {
        let record = TopUpRecord {
            amount,
            provider,
            at: Utc::now(),
        };
        *self.last_top_up.write() = Some(record);
        record
    }

    #[must_use]
    pub fn last_top_up(&self) -> Option<TopUpRecord> {
        *self.last_top_up.read()
    }

    #[must_use]
    pub fn last_top_up_amount(&self) -> Option<Decimal> {
        self.last_top_up().map(|r| r.amount)
    }

    #[must_use]
    pub fn last_top_up_provider(&self) -> Option<PaymentProvider> {
        self.last_top_up().map(|r| r.provider)
    }

    #[must_use]
    pub fn last_top_up_at(&self) -> Option<DateTime<Utc>> {
        self.last_top_up().map(|r| r.at)
    }
}

impl ScopedContext for WalletContext {
    const NAME: &'static str = "WalletContext";

    fn context_id(&self) -> &ContextId {
        &self.id
    }
}
