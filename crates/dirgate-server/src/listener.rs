//! Plaintext and TLS listeners.
//!
//! Both serve the same [`Router`] and stop when the shared [`CancellationToken`] fires. The TLS
//! listener is optional: missing or unreadable certificate material disables it without stopping
//! the process.

use axum::Router;
use dirgate_core::{Error, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_native_tls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause after a failed `accept`, e.g. while the process is out of file descriptors.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Serves plain HTTP until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns the I/O error that stopped the accept loop.
pub async fn serve_plain(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP listener on {addr}");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// Loads a PEM certificate chain and PKCS#8 key into a TLS acceptor.
///
/// # Errors
///
/// Returns [`Error::ConfigError`] if either file cannot be read or the pair is invalid.
pub fn load_tls_acceptor(cert: &Path, key: &Path) -> Result<TlsAcceptor> {
    let read = |path: &Path| {
        fs::read(path).map_err(|err| {
            Error::ConfigError(format!("cannot read {}: {err}", path.display()))
        })
    };
    let cert_pem = read(cert)?;
    let key_pem = read(key)?;

    let identity = native_tls::Identity::from_pkcs8(&cert_pem, &key_pem)
        .map_err(|err| Error::ConfigError(format!("invalid TLS certificate or key: {err}")))?;
    let acceptor = native_tls::TlsAcceptor::new(identity)
        .map_err(|err| Error::ConfigError(format!("cannot build TLS acceptor: {err}")))?;
    Ok(TlsAcceptor::from(acceptor))
}

/// Serves HTTPS until `shutdown` is cancelled.
///
/// Each connection gets its own task; a failed handshake only drops that connection.
pub async fn serve_tls(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    app: Router,
    shutdown: CancellationToken,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("HTTPS listener on {addr}");
    }

    loop {
        let (stream, peer) = tokio::select! {
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!("TLS accept failed: {err}");
                    if back_off(&shutdown).await {
                        continue;
                    }
                    break;
                }
            },
        };

        let acceptor = acceptor.clone();
        let app = app.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(err) => {
                    debug!(%peer, "TLS handshake failed: {err}");
                    return;
                }
            };

            let builder = Builder::new(TokioExecutor::new());
            let connection = builder.serve_connection_with_upgrades(
                TokioIo::new(stream),
                TowerToHyperService::new(app),
            );
            tokio::pin!(connection);

            let result = tokio::select! {
                result = connection.as_mut() => result,
                () = shutdown.cancelled() => {
                    connection.as_mut().graceful_shutdown();
                    connection.await
                }
            };
            if let Err(err) = result {
                debug!(%peer, "TLS connection closed with error: {err}");
            }
        });
    }

    info!("HTTPS listener stopped");
}

/// Waits out [`ACCEPT_ERROR_BACKOFF`]. Returns false if shutdown fired first.
async fn back_off(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        () = shutdown.cancelled() => false,
        () = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
    }
}
