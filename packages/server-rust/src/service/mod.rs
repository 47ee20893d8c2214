//! Top-up execution framework.
//!
//! This module implements the service-oriented top-up pipeline:
//!
//! 1. **Identity** (`identity`): boundary identity types and validation
//! 2. **Orchestration** (`orchestrator`): nested request/wallet scopes per call
//! 3. **Middleware** (`middleware`): Tower layers (load-shedding, timeout, metrics)
//! 4. **Dispatch** (`dispatcher`): route to the strategy for a `PaymentProvider`
//! 5. **Strategies** (`domain`): per-provider top-up implementations
//! 6. **Background workers** (`worker`): intent hand-off off the request path

pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod identity;
pub mod middleware;
pub mod operation;
pub mod orchestrator;
pub mod registry;
pub mod worker;

// Re-export key types for convenient access.
pub use config::ServerConfig;
pub use dispatcher::ProviderDispatcher;
pub use domain::{default_registry, PayPalTopUpProvider, StripeTopUpProvider};
pub use identity::{IdentityError, RequestIdentity};
pub use middleware::{build_operation_pipeline, OperationPipeline};
pub use operation::{OperationContext, OperationError, OperationResponse, TopUpOperation};
pub use orchestrator::{TopUpCommand, TopUpError, TopUpOrchestrator, TopUpOutcome};
pub use registry::{ProviderRegistry, RegistryError};
pub use worker::{BackgroundRunnable, BackgroundWorker, IntentJournal};
