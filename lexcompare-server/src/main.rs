//! LexCompare server binary.
//!
//! Run with: cargo run -p lexcompare-server

use lexcompare_server::{AppState, ServerConfig, router, telemetry::init_tracing};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;
    init_tracing(config.log_format)?;

    let shutdown = CancellationToken::new();
    let state = AppState::from_config(&config, shutdown.clone())?;
    let app = router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(
        addr = %config.bind_addr,
        max_upload_bytes = config.max_upload_bytes,
        request_timeout_secs = config.request_timeout.as_secs(),
        "lexcompare server listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown)).await?;
    info!("server stopped");
    Ok(())
}

/// Wait for ctrl-c, then cancel every in-flight analysis.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested, cancelling in-flight requests");
    shutdown.cancel();
}
