//! Directory gateway executable.
//!
//! Loads the configuration, then serves the REST API and the static UI on a plaintext port and,
//! when certificate material is usable, a TLS port.

use anyhow::{Context, Result};
use clap::Parser;
use dirgate_core::GatewayConfig;
use dirgate_server::{api, listener, AppState};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// REST gateway in front of an LDAP directory.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the INI configuration file.
    #[arg(short, long, default_value = "config.ini")]
    config: PathBuf,

    /// Log directory traffic at debug level.
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    info!("Starting directory gateway...");

    let config = GatewayConfig::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let state = AppState::from_config(&config).context("invalid directory configuration")?;
    let app = api::router(Arc::new(state));
    let shutdown = CancellationToken::new();

    let http = TcpListener::bind(config.listen.http_addr())
        .await
        .with_context(|| format!("cannot bind {}", config.listen.http_addr()))?;
    let plain = tokio::spawn(listener::serve_plain(http, app.clone(), shutdown.clone()));

    let tls = match config.listen.tls_material() {
        Some((cert, key)) => match listener::load_tls_acceptor(cert, key) {
            Ok(acceptor) => match TcpListener::bind(config.listen.https_addr()).await {
                Ok(https) => Some(tokio::spawn(listener::serve_tls(
                    https,
                    acceptor,
                    app,
                    shutdown.clone(),
                ))),
                Err(err) => {
                    warn!(
                        "cannot bind {}: {err}; TLS listener disabled",
                        config.listen.https_addr()
                    );
                    None
                }
            },
            Err(err) => {
                warn!("{err}; TLS listener disabled");
                None
            }
        },
        None => {
            warn!("no TLS certificate configured; serving plaintext only");
            None
        }
    };

    shutdown_signal().await;
    info!("Shutting down...");
    shutdown.cancel();

    match plain.await {
        Ok(Err(err)) => error!("HTTP listener failed: {err}"),
        Err(err) => error!("HTTP listener task panicked: {err}"),
        Ok(Ok(())) => {}
    }
    if let Some(tls) = tls {
        if let Err(err) = tls.await {
            error!("HTTPS listener task panicked: {err}");
        }
    }
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .inspect_err(|e| error!("failed to install Ctrl+C handler: {e}"))
            .ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = signal::unix::signal(signal::unix::SignalKind::terminate())
            .inspect_err(|e| error!("failed to install signal handler: {e}"))
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
