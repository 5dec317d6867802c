// crates/server/src/main.rs
//! Jobwatch server binary.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use jobwatch_observability::init_logging;
use jobwatch_server::metrics::init_metrics;
use jobwatch_server::{serve, AppState, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();
    init_logging(config.log_format, "warn,jobwatch_server=info,jobwatch_core=info")?;

    let startup_start = Instant::now();
    init_metrics();

    let state = AppState::from_config(&config);
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                return;
            }
        }
        shutdown.cancel();
    });

    tracing::info!(
        %addr,
        history_retention = config.history_retention,
        replay_buffer = config.replay_buffer,
        startup_ms = startup_start.elapsed().as_millis() as u64,
        "jobwatch server listening"
    );
    eprintln!("\n  jobwatch v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("  -> http://{addr}\n");

    serve(listener, state).await?;
    tracing::info!("server stopped");
    Ok(())
}
