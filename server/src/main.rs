//! lingcastd: the lingcast streaming service.

mod app;
mod config;
mod entitlements;
mod ingress;
mod state;
mod ws;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Realtime translation and TTS streaming core.
#[derive(Parser)]
#[command(name = "lingcastd")]
#[command(about = "lingcast streaming service")]
#[command(version)]
struct Cli {
    /// Config file (TOML); environment variables override it.
    #[arg(short = 'f', long)]
    config: Option<String>,

    /// Bind address, overriding the config.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = config::Settings::load(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(bind) = cli.bind {
        settings.server.bind_addr = bind;
    }

    let bind_addr = settings.server.bind_addr.clone();
    let state = state::AppState::build(settings).context("failed to build application state")?;
    let router = app::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = bind_addr, "lingcastd listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("server error")?;
    Ok(())
}
