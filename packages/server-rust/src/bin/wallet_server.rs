//! Wallet server binary: wires strategies, pipeline, hand-off worker and
//! HTTP module, then serves until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use wallet_server::network::{NetworkConfig, NetworkModule};
use wallet_server::service::{
    build_operation_pipeline, default_registry, BackgroundWorker, IntentJournal,
    ProviderDispatcher, ServerConfig, TopUpOrchestrator,
};

/// Wallet top-up server.
#[derive(Debug, Parser)]
#[command(name = "wallet-server", version, about)]
struct Args {
    /// Bind address.
    #[arg(long, env = "WALLET_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port; 0 picks a free port.
    #[arg(long, env = "WALLET_PORT", default_value_t = 8080)]
    port: u16,

    /// Allowed CORS origins, comma separated.
    #[arg(long, env = "WALLET_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,

    /// HTTP request timeout in seconds.
    #[arg(long, env = "WALLET_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    /// How long shutdown waits for in-flight top-ups, in seconds.
    #[arg(long, env = "WALLET_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    drain_timeout_secs: u64,

    /// Per top-up dispatch timeout in milliseconds.
    #[arg(long, env = "WALLET_OPERATION_TIMEOUT_MS", default_value_t = 30_000)]
    operation_timeout_ms: u64,

    /// Concurrent top-ups admitted before load shedding.
    #[arg(long, env = "WALLET_MAX_CONCURRENT", default_value_t = 1000)]
    max_concurrent: u32,

    /// Amounts strictly above this raise the `HighValueTopUp` flag.
    #[arg(long, env = "WALLET_HIGH_VALUE_THRESHOLD", default_value = "1000")]
    high_value_threshold: Decimal,

    /// Interval between intent summary logs, in milliseconds.
    #[arg(long, env = "WALLET_INTENT_TICK_MS", default_value_t = 60_000)]
    intent_tick_ms: u64,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "WALLET_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Emit logs as JSON.
    #[arg(long, env = "WALLET_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            default_operation_timeout_ms: self.operation_timeout_ms,
            max_concurrent_operations: self.max_concurrent,
            high_value_threshold: self.high_value_threshold,
            intent_tick_interval_ms: self.intent_tick_ms,
        }
    }

    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            cors_origins: self.cors_origins.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    if let Some(addr) = args.metrics_addr {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!(%addr, "prometheus exporter listening");
    }

    let config = Arc::new(args.server_config());
    let registry = Arc::new(default_registry(&config)?);
    info!(providers = ?registry.providers(), "provider registry built");

    let pipeline = build_operation_pipeline(ProviderDispatcher::new(registry), &config);
    let worker = Arc::new(BackgroundWorker::start(
        IntentJournal::new(),
        config.intent_tick_interval_ms,
    ));
    let orchestrator = Arc::new(TopUpOrchestrator::new(
        pipeline,
        worker.clone(),
        Arc::clone(&config),
    ));

    let mut network = NetworkModule::new(args.network_config(), orchestrator);
    let port = network.start().await?;
    info!(port, "wallet server started");

    let served = network.serve(shutdown_signal()).await;
    worker.stop().await;
    info!("wallet server stopped");
    served
}
