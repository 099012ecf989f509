//! sanDB Server - HTTP API for the windowed time-series store

mod api;
mod settings;

use anyhow::Context;
use clap::Parser;
use settings::ServerConfig;
use sandb_core::storage::StorageEngine;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// sanDB time-series server
#[derive(Parser, Debug)]
#[command(name = "sandb", version, about)]
struct Cli {
    /// Path to the YAML config file (default: config/config.yml if present)
    #[arg(long, env = "SANDB_CONFIG")]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,

    /// Emit logs as JSON lines
    #[arg(long, env = "SANDB_LOG_JSON", default_value_t = false)]
    log_json: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let mut config = ServerConfig::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!("Starting sanDB server v{}...", sandb_core::VERSION);
    info!("Data directory: {:?}", config.data_dir);
    info!("HTTP server: http://{}", http_addr);
    if config.auth_token().is_none() {
        warn!("No server.token configured, requests are not authenticated");
    }

    let engine = Arc::new(StorageEngine::new(config.storage()).context("failed to open storage")?);
    let maintenance = engine.start_maintenance();

    let app = api::create_router(
        engine.clone(),
        api::ApiOptions {
            token: config.auth_token().map(String::from),
            request_timeout: config.request_timeout(),
        },
    );

    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("failed to bind {}", http_addr))?;
    info!("sanDB server listening on {}", http_addr);

    let stop = CancellationToken::new();
    let server = {
        let stop = stop.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .into_future()
    };
    let mut server = tokio::spawn(server);

    tokio::select! {
        result = &mut server => {
            result??;
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, draining connections...");
            stop.cancel();
            match tokio::time::timeout(config.shutdown_timeout(), &mut server).await {
                Ok(result) => result??,
                Err(_) => {
                    warn!(
                        "Connections still open after {:?}, forcing shutdown",
                        config.shutdown_timeout()
                    );
                    server.abort();
                }
            }
        }
    }

    if let Some(handle) = maintenance {
        handle.shutdown().await;
    }
    match engine.flush() {
        Ok(written) => info!("Flushed {} segments", written),
        Err(e) => error!("Flush during shutdown failed: {}", e),
    }

    info!("sanDB server stopped");
    Ok(())
}
