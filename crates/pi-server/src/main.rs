//! pi-server: Raspberry Pi status and Wake-on-LAN service

use anyhow::Context;
use clap::Parser;
use pi_server::{AppState, ServerConfig};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `.env` must be loaded before clap reads the environment.
    let _ = dotenvy::dotenv();
    let config = ServerConfig::parse();

    let filter = EnvFilter::from_default_env()
        .add_directive("pi_server=info".parse()?)
        .add_directive("lab_exec=info".parse()?);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    let state = Arc::new(AppState::from_config(&config));
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    info!(
        addr = %listener.local_addr()?,
        mac_configured = config.proxmox_mac.is_some(),
        webhook_configured = state.notifier.is_some(),
        broadcast = %config.wol_broadcast,
        "pi-server listening"
    );

    pi_server::serve(listener, state, shutdown_signal())
        .await
        .context("pi-server exited unexpectedly")?;

    info!("pi-server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
