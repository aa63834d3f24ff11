//! Tollgate gateway server.
//!
//! # Usage
//!
//! ```bash
//! PAYMENT_RECIPIENT=0x... cargo run -p tollgate-gateway --release
//!
//! # Configure logging level
//! RUST_LOG=debug cargo run -p tollgate-gateway
//! ```
//!
//! # Environment Variables
//!
//! - `HOST` / `PORT` — bind address (default `0.0.0.0:8402`)
//! - `PAYMENT_RECIPIENT` — required; address settled amounts go to
//! - `FACILITATOR_URL` — payment facilitator base URL
//! - `USE_MAINNET` — settle on Base mainnet instead of Base Sepolia
//! - `CONNECTOR_REGISTRY_URL` — connector service for MCP spawn configs
//! - Provider keys — see `tollgate::config`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tollgate::config::GatewayConfig;
use tollgate::facilitator::{Facilitator, FacilitatorClient};
use tollgate::gate::PaymentGate;
use tollgate_connectors::ConnectorService;
use tollgate_gateway::{AppState, app_router};
use tollgate_inference::InferenceRouter;
use tollgate_inference::providers::Providers;
use tollgate_mcp::SessionPool;
use tollgate_mcp::spawn::{ConfigSpawner, SpawnConfigClient};
use tollgate_registry::Registry;
use tracing_subscriber::EnvFilter;

/// Facilitator request timeout.
const FACILITATOR_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser, Debug)]
#[command(name = "tollgate-gateway", about = "Payment-gated AI inference and tool gateway")]
struct Args {
    /// Bind address.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Bind port.
    #[arg(long, env = "PORT", default_value_t = 8402)]
    port: u16,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("gateway failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = GatewayConfig::from_env()?;
    tracing::info!(
        facilitator = %config.facilitator_url,
        network = config.network(),
        pay_to = %config.pay_to,
        "loaded configuration"
    );

    let http = reqwest::Client::new();

    let facilitator = FacilitatorClient::try_from(config.facilitator_url.as_str())?
        .with_timeout(FACILITATOR_TIMEOUT);
    let gate = PaymentGate::new(
        Arc::new(facilitator) as Arc<dyn Facilitator>,
        config.gate_config(),
    );

    let registry = Arc::new(Registry::from_keys(http.clone(), &config.keys));
    let inference = InferenceRouter::new(
        Providers::new(http.clone(), config.keys.clone()),
        Arc::clone(&registry),
    );

    let spawn_configs = SpawnConfigClient::new(
        config
            .connector_registry_url
            .clone()
            .unwrap_or_else(|| "http://localhost:8403".to_owned()),
        http.clone(),
    );
    let pool = Arc::new(SessionPool::new(Arc::new(ConfigSpawner::new(
        spawn_configs,
        http.clone(),
    ))));
    let sweeper = pool.start_sweeper();

    let env: HashMap<String, String> = std::env::vars().collect();
    let connectors = ConnectorService::new(http, env, Arc::clone(&pool));

    let state = Arc::new(AppState {
        gate,
        inference,
        registry,
        connectors,
        pool: Arc::clone(&pool),
        public_base_url: config.public_base_url.clone(),
    });
    let app = app_router(state);

    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("gateway listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain the runtime: every pooled MCP session closes before exit.
    pool.shutdown().await;
    sweeper.abort();
    tracing::info!("gateway shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        tracing::info!("received Ctrl-C, shutting down...");
    }
}
