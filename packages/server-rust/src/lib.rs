//! Wallet server: top-up orchestration over flow-scoped request and wallet
//! contexts, provider strategy dispatch, and the axum RPC surface.

pub mod network;
pub mod service;
pub mod traits;

pub use traits::{IdentitySource, IntentPublisher};
