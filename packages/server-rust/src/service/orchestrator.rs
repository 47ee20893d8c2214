//! Top-up orchestration: one inbound call, two nested context scopes.
//!
//! The orchestrator reads caller identity at the boundary, builds a fresh
//! [`RequestContext`] and [`WalletContext`], binds them to the current flow
//! (request outermost), drives the operation pipeline inside both scopes and
//! hands the finalized intent downstream before the scopes close.

use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tower::ServiceExt;
use tracing::{info_span, Instrument};
use wallet_core::{ContextManager, PaymentProvider, RequestContext, TopUpIntent, WalletContext};

use super::config::ServerConfig;
use super::identity::{parse_identity_uuid, IdentityError};
use super::middleware::OperationPipeline;
use super::operation::{CallIdGenerator, OperationContext, OperationError, TopUpOperation};
use crate::traits::{IdentitySource, IntentPublisher};

/// Body field carrying the target wallet.
pub const WALLET_ID_FIELD: &str = "walletId";

// ---------------------------------------------------------------------------
// Command / outcome
// ---------------------------------------------------------------------------

/// Payload of one "top up balance" call, as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopUpCommand {
    /// Raw wallet id; parsed and validated by the orchestrator.
    pub wallet_id: String,
    pub amount: Decimal,
    /// Provider wire code.
    pub provider: i32,
}

/// Result of a completed top-up.
///
/// Holds the contexts the flow created so their final metadata can be read
/// after both scopes have closed.
#[derive(Debug)]
pub struct TopUpOutcome {
    pub amount: Decimal,
    pub call_id: u64,
    pub request: Arc<RequestContext>,
    pub wallet: Arc<WalletContext>,
}

/// Failure of a top-up call.
#[derive(Debug, thiserror::Error)]
pub enum TopUpError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error("intent hand-off failed: {0}")]
    IntentHandoff(anyhow::Error),
}

impl TopUpError {
    /// Stable error code reported to callers.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Identity(IdentityError::Missing { .. }) => "MISSING_IDENTITY",
            Self::Identity(IdentityError::Invalid { .. }) => "INVALID_IDENTITY",
            Self::Operation(OperationError::UnknownProvider { .. }) => "UNKNOWN_PROVIDER",
            Self::Operation(OperationError::ContextMissing(_)) => "CONTEXT_MISSING",
            Self::Operation(OperationError::Timeout { .. }) => "TIMEOUT",
            Self::Operation(OperationError::Overloaded) => "OVERLOADED",
            Self::Operation(OperationError::Provider(_)) => "PROVIDER_FAILURE",
            Self::IntentHandoff(_) => "INTENT_HANDOFF_FAILED",
        }
    }
}

// ---------------------------------------------------------------------------
// TopUpOrchestrator
// ---------------------------------------------------------------------------

/// Runs top-ups through nested request and wallet scopes.
pub struct TopUpOrchestrator {
    requests: ContextManager<RequestContext>,
    wallets: ContextManager<WalletContext>,
    pipeline: Mutex<OperationPipeline>,
    publisher: Arc<dyn IntentPublisher>,
    config: Arc<ServerConfig>,
    call_ids: CallIdGenerator,
}

impl TopUpOrchestrator {
    #[must_use]
    pub fn new(
        pipeline: OperationPipeline,
        publisher: Arc<dyn IntentPublisher>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            requests: ContextManager::new(),
            wallets: ContextManager::new(),
            pipeline: Mutex::new(pipeline),
            publisher,
            config,
            call_ids: CallIdGenerator::new(),
        }
    }

    /// Executes one top-up.
    ///
    /// Identity and wallet id are resolved before any scope opens, so
    /// boundary failures never create a context. Provider codes outside the
    /// enumeration are rejected at the same point.
    ///
    /// # Errors
    ///
    /// - [`TopUpError::Identity`] for missing or malformed identity.
    /// - [`TopUpError::Operation`] for dispatch failures, unchanged.
    /// - [`TopUpError::IntentHandoff`] if the publisher refuses the intent.
    ///   The wallet context already holds the recorded top-up in that case.
    pub async fn top_up(
        &self,
        identity: &dyn IdentitySource,
        command: TopUpCommand,
    ) -> Result<TopUpOutcome, TopUpError> {
        let caller = identity.request_identity()?;
        let wallet_id = parse_identity_uuid(WALLET_ID_FIELD, &command.wallet_id)?;
        let idempotency_key = identity.idempotency_key()?;
        let provider = PaymentProvider::from_code(command.provider)
            .ok_or_else(|| OperationError::unknown_provider_code(command.provider))?;

        let call_id = self.call_ids.next_id();
        let op = TopUpOperation::new(
            OperationContext::new(call_id, provider, self.config.default_operation_timeout_ms),
            command.amount,
        );
        let span = info_span!(
            "top_up",
            correlation_id = %caller.correlation_id,
            tenant_id = %caller.tenant_id,
            wallet_id = %wallet_id,
            call_id = call_id,
        );

        let request = Arc::new(RequestContext::new(
            caller.tenant_id,
            caller.user_id,
            caller.correlation_id,
        ));
        let wallet = Arc::new(WalletContext::new(wallet_id, idempotency_key));

        let pipeline = self.pipeline.lock().clone();
        let bound_wallet = Arc::clone(&wallet);
        let amount = self
            .requests
            .execute_in_scope(Arc::clone(&request), move || async move {
                self.wallets
                    .execute_in_scope(bound_wallet, move || self.dispatch(pipeline, op))
                    .await
            })
            .instrument(span)
            .await?;

        Ok(TopUpOutcome {
            amount,
            call_id,
            request,
            wallet,
        })
    }

    /// Runs inside both scopes: pipeline, then hand-off.
    async fn dispatch(
        &self,
        pipeline: OperationPipeline,
        op: TopUpOperation,
    ) -> Result<Decimal, TopUpError> {
        let response = pipeline.oneshot(op).await?;
        let intent = TopUpIntent::new(response.amount, response.provider);
        self.publisher
            .publish(intent)
            .await
            .map_err(TopUpError::IntentHandoff)?;
        tracing::info!(
            provider = response.provider.as_str(),
            amount = %response.amount,
            "top-up completed"
        );
        Ok(response.amount)
    }
}

impl std::fmt::Debug for TopUpOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopUpOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
