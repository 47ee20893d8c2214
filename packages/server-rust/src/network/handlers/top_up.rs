//! `TopUpBalance` RPC endpoint.
//!
//! Accepts a JSON body `{ walletId, amount, provider }` plus the identity
//! headers, runs the top-up through the orchestrator and answers `{}` on
//! success or `{ code, message }` on failure.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use crate::network::headers::HeaderIdentity;
use crate::service::{OperationError, TopUpCommand, TopUpError};

/// Path of the top-up RPC.
pub const TOP_UP_ROUTE: &str = "/wallet.v1.WalletBalances/TopUpBalance";

const RPC_HINT: &str = "Top-up calls must be made through an RPC client: \
POST /wallet.v1.WalletBalances/TopUpBalance";

/// Body of a `TopUpBalance` call. Absent fields take their zero value.
///
/// `amount` is read exactly from either a JSON number or a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TopUpBalanceRequest {
    pub wallet_id: String,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub amount: Decimal,
    pub provider: i32,
}

impl From<TopUpBalanceRequest> for TopUpCommand {
    fn from(req: TopUpBalanceRequest) -> Self {
        Self {
            wallet_id: req.wallet_id,
            amount: req.amount,
            provider: req.provider,
        }
    }
}

/// Empty acknowledgment.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TopUpBalanceResponse {}

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// Failure returned to RPC callers as `{ code, message }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    fn unavailable() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "UNAVAILABLE",
            message: "server is not accepting top-ups".to_string(),
        }
    }
}

impl From<TopUpError> for ApiError {
    fn from(err: TopUpError) -> Self {
        let status = match &err {
            TopUpError::Identity(_)
            | TopUpError::Operation(OperationError::UnknownProvider { .. }) => {
                StatusCode::BAD_REQUEST
            }
            TopUpError::Operation(OperationError::Overloaded) => StatusCode::SERVICE_UNAVAILABLE,
            TopUpError::Operation(OperationError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            TopUpError::Operation(_) | TopUpError::IntentHandoff(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            code: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "INVALID_REQUEST",
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, message = %self.message, "top-up failed");
        } else {
            tracing::warn!(code = self.code, message = %self.message, "top-up rejected");
        }
        let body = Json(json!({
            "code": self.code,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Handles `POST /wallet.v1.WalletBalances/TopUpBalance`.
///
/// Refused with 503 unless the server is ready. Each admitted call holds an
/// in-flight guard so shutdown drains it.
///
/// # Errors
///
/// Returns [`ApiError`] for malformed bodies and every [`TopUpError`].
pub async fn top_up_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TopUpBalanceRequest>, JsonRejection>,
) -> Result<Json<TopUpBalanceResponse>, ApiError> {
    let Some(_guard) = state.shutdown.admit() else {
        return Err(ApiError::unavailable());
    };

    let Json(request) = body?;
    let identity = HeaderIdentity::new(&headers);
    state
        .orchestrator
        .top_up(&identity, request.into())
        .await?;
    Ok(Json(TopUpBalanceResponse {}))
}

/// Plain-text hint for browsers hitting the root path.
pub async fn rpc_hint_handler() -> &'static str {
    RPC_HINT
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
