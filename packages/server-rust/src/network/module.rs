//! Network module with deferred startup lifecycle.
//!
//! `new()` allocates shared state, `start()` binds the TCP listener, and
//! `serve()` accepts requests until the shutdown future resolves. The split
//! lets the binary learn the bound port before traffic starts.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    health_handler, liveness_handler, readiness_handler, rpc_hint_handler, top_up_handler,
    AppState, TOP_UP_ROUTE,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::service::TopUpOrchestrator;

/// Manages the HTTP server lifecycle.
///
/// 1. `new()` -- allocates the shutdown controller
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- accepts requests until shutdown is signalled, then drains
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    orchestrator: Arc<TopUpOrchestrator>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, orchestrator: Arc<TopUpOrchestrator>) -> Self {
        Self {
            config,
            listener: None,
            orchestrator,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /` -- plain-text hint for non-RPC clients
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- liveness probe
    /// - `GET /health/ready` -- readiness probe
    /// - `POST /wallet.v1.WalletBalances/TopUpBalance` -- top-up RPC
    pub fn build_router(&self) -> Router {
        let state = AppState {
            orchestrator: Arc::clone(&self.orchestrator),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            start_time: Instant::now(),
        };

        Router::new()
            .route("/", get(rpc_hint_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route(TOP_UP_ROUTE, post(top_up_handler))
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves, then drains in-flight
    /// top-ups for up to `drain_timeout`.
    ///
    /// After the shutdown signal:
    /// 1. Health state transitions to Draining and new top-ups get 503
    /// 2. axum stops accepting connections and finishes open ones
    /// 3. In-flight guards are awaited; the state becomes Stopped
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .expect("start() must be called before serve()");
        let router = self.build_router();
        let shutdown_ctrl = Arc::clone(&self.shutdown);

        // Transition to Ready so readiness probes pass.
        shutdown_ctrl.set_ready();
        info!("Serving top-up RPC on {}", listener.local_addr()?);

        let signal_ctrl = Arc::clone(&shutdown_ctrl);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                signal_ctrl.trigger_shutdown();
            })
            .await?;

        shutdown_ctrl.trigger_shutdown();
        if shutdown_ctrl.wait_for_drain(self.config.drain_timeout).await {
            info!("All in-flight top-ups drained");
        } else {
            warn!(
                in_flight = shutdown_ctrl.in_flight_count(),
                "Drain timeout expired with in-flight top-ups remaining"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::network::handlers::test_support::app_state;
    use crate::network::HealthState;

    fn module(config: NetworkConfig) -> NetworkModule {
        NetworkModule::new(config, app_state().orchestrator)
    }

    #[tokio::test]
    async fn new_creates_module_without_binding() {
        let module = module(NetworkConfig::default());
        assert!(module.listener.is_none());
        assert_eq!(
            module.shutdown_controller().health_state(),
            HealthState::Starting
        );
    }

    #[tokio::test]
    async fn shutdown_controller_returns_shared_arc() {
        let module = module(NetworkConfig::default());
        let s1 = module.shutdown_controller();
        let s2 = module.shutdown_controller();
        assert!(Arc::ptr_eq(&s1, &s2));
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = module(NetworkConfig {
            host: "127.0.0.1".to_string(),
            ..NetworkConfig::default()
        });
        let port = module.start().await.expect("start should succeed");
        assert!(port > 0, "OS-assigned port should be > 0");
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_runs_until_shutdown_then_stops() {
        let mut module = module(NetworkConfig {
            host: "127.0.0.1".to_string(),
            drain_timeout: Duration::from_secs(1),
            ..NetworkConfig::default()
        });
        module.start().await.unwrap();
        let ctrl = module.shutdown_controller();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(module.serve(async move {
            let _ = rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ctrl.health_state(), HealthState::Ready);

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
        assert_eq!(ctrl.health_state(), HealthState::Stopped);
    }

    #[tokio::test]
    #[should_panic(expected = "start() must be called before serve()")]
    async fn serve_panics_without_start() {
        let module = module(NetworkConfig::default());
        let _ = module.serve(std::future::pending::<()>()).await;
    }
}
