use anyhow::Context;
use clap::Parser;
use dealflow_service::config::{DealflowConfig, LoggingConfig};
use dealflow_service::{build_router, ServiceState};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "dealflowd", version, about = "Dealflow pipeline and dispatch REST service")]
struct Cli {
    /// Configuration file (toml, yaml or json). Missing files are ignored.
    #[arg(long, short = 'c', env = "DEALFLOW_CONFIG")]
    config: Option<PathBuf>,
    /// REST socket address to bind, e.g. 127.0.0.1:8095
    #[arg(long)]
    listen: Option<SocketAddr>,
    /// Default log filter when RUST_LOG is unset.
    #[arg(long)]
    log_level: Option<String>,
    /// Emit logs as JSON lines.
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.as_deref().and_then(|path| path.to_str());
    let mut config = DealflowConfig::load(config_path).context("failed to load configuration")?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.log_json {
        config.logging.json = true;
    }

    init_tracing(&config.logging);
    info!(
        storage = config.storage.label(),
        transport = config.transport.label(),
        ownership_policy = ?config.pipeline.ownership_policy,
        max_concurrency = config.dispatch.concurrency(),
        "Starting dealflow-service"
    );

    let state = ServiceState::bootstrap(&config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.server.listen_addr).await?;
    info!("dealflow-service REST listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
