//! Pollcast server binary.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pollcast_server::{create_router, AppState, Args, HttpLister};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pollcast_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting pollcast server");

    let config = Args::parse().into_config();
    config.validate()?;

    tracing::info!(
        listen = %config.listen_addr,
        lister = %config.lister_url,
        kinds = ?config.watch.kinds,
        poll_interval_ms = config.watch.poll_interval.as_millis() as u64,
        settling_ms = config.watch.settling_duration.as_millis() as u64,
        "configuration loaded"
    );

    let lister = Arc::new(HttpLister::new(config.lister_url.clone()));
    let state = AppState::with_lister(lister, config.clone());
    let hub = state.hub.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(address = %config.listen_addr, "server ready, accepting connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    hub.shutdown();
    tracing::info!("server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl+c");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
