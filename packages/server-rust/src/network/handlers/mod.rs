//! HTTP handler definitions for the wallet server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod health;
pub mod top_up;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use top_up::{rpc_hint_handler, top_up_handler, ApiError, TOP_UP_ROUTE};

use std::sync::Arc;
use std::time::Instant;

use super::{NetworkConfig, ShutdownController};
use crate::service::TopUpOrchestrator;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Runs each top-up inside its request and wallet scopes.
    pub orchestrator: Arc<TopUpOrchestrator>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
