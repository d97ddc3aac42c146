//! Airlock server binary.

use airlock_core::config::AppConfig;
use airlock_server::{AppState, create_router};
use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Airlock - airgap bundle ingestion server
#[derive(Parser, Debug)]
#[command(name = "airlockd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "AIRLOCK_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Airlock v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override
    // everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}, using defaults", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("AIRLOCK_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    // Register Prometheus metrics
    airlock_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    if config.worker.is_enabled() {
        tracing::info!(command = %config.worker.command[0], "Worker command configured");
    } else {
        tracing::info!("No worker command configured, processing ends at extraction");
    }

    // Initialize staging store and state
    let bind = config.server.bind.clone();
    let state = AppState::new(config)
        .await
        .context("failed to initialize chunk staging store")?;
    tracing::info!(path = %state.config.storage.path.display(), "Chunk staging store initialized");

    let app = create_router(state);

    let addr: SocketAddr = bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
