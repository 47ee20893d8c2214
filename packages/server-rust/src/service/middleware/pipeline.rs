//! Pipeline composition: combines all middleware layers into a single service stack.

use tower::util::BoxCloneService;
use tower::ServiceBuilder;

use super::load_shed::LoadShedLayer;
use super::metrics::MetricsLayer;
use super::timeout::TimeoutLayer;
use crate::service::config::ServerConfig;
use crate::service::dispatcher::ProviderDispatcher;
use crate::service::operation::{OperationError, OperationResponse, TopUpOperation};

/// Type-erased top-up pipeline. Clone it per call and drive it with `oneshot`.
pub type OperationPipeline = BoxCloneService<TopUpOperation, OperationResponse, OperationError>;

/// Build the top-up pipeline by wrapping the `ProviderDispatcher` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject when overloaded (fail fast before doing any work)
/// 2. `TimeoutLayer` -- enforce per-operation timeouts
/// 3. `MetricsLayer` -- record timing and outcome (closest to the strategy)
#[must_use]
pub fn build_operation_pipeline(
    dispatcher: ProviderDispatcher,
    config: &ServerConfig,
) -> OperationPipeline {
    let svc = ServiceBuilder::new()
        .layer(LoadShedLayer::new(config.max_concurrent_operations))
        .layer(TimeoutLayer)
        .layer(MetricsLayer)
        .service(dispatcher);
    BoxCloneService::new(svc)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
