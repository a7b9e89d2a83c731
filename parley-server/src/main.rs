// Parley credential mediator
// Forwards avatar-provider requests and injects the provider API key

use clap::Parser;
use parley_core::logging::init_tracing;
use parley_server::{create_router, MediatorConfig};
use tokio::signal;
use tracing::info;

#[derive(Parser)]
#[command(name = "parley-server")]
#[command(about = "Avatar provider credential mediator", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short)]
    config: Option<String>,

    /// Listen address, e.g. 127.0.0.1:8790
    #[arg(long)]
    listen: Option<String>,

    /// Upstream provider base URL
    #[arg(long)]
    upstream: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = MediatorConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(upstream) = args.upstream {
        config.upstream.base_url = upstream;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging)?;

    let app = create_router(&config)?;
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;

    info!(
        listen = %config.listen,
        mount = %config.mount,
        upstream = %config.upstream.base_url,
        "mediator listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("mediator stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
}
