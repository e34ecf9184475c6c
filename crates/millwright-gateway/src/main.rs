use std::net::SocketAddr;

use clap::Parser;
use tracing::info;

mod app;
mod auth;
mod bootstrap;
mod http;
mod ws;

#[derive(Parser)]
#[command(name = "millwright", version, about = "AI assistant gateway for industrial maintenance")]
struct Cli {
    /// Path to millwright.toml (default: ./millwright.toml, with
    /// MILLWRIGHT_* env overrides).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = millwright_core::config::MillwrightConfig::load(cli.config.as_deref())
        .unwrap_or_else(|e| {
            eprintln!("config load failed ({e}), using defaults");
            millwright_core::config::MillwrightConfig::default()
        });

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},tower_http=info", config.server.log_level).into()
            }),
        )
        .init();

    let bind = config.server.bind.clone();
    let port = config.server.port;

    let state = bootstrap::build_state(config);

    // connectors connect on startup, disconnect on shutdown
    state.connectors.connect_all().await;
    state.channels.start_all().await;

    let router = app::build_router(state.clone());
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, version = app::VERSION, "millwright gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    state.channels.stop_all().await;
    state.connectors.disconnect_all().await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
