//! The HTTPS listener.
//!
//! Certificates are resolved per handshake through the shared
//! [`CertStore`], so a `refresh_certs` command rotates the served chain
//! with no listener restart. Shutdown stops the accept loop first, then
//! drains in-flight connections with a bounded timeout.

use std::sync::Arc;
use std::time::Duration;

use axum::{Extension, Router};
use hath_rpc::CertStore;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use rustls::ServerConfig;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::handlers::RemoteAddr;

/// How long to wait for in-flight connections after the listener stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the rustls server configuration around the shared cert store.
fn tls_config(certs: Arc<CertStore>) -> std::io::Result<ServerConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| std::io::Error::other(e.to_string()))?
        .with_no_client_auth()
        .with_cert_resolver(certs);
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

/// Serves the router over TLS until the shutdown signal fires, then drains.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    certs: Arc<CertStore>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let acceptor = TlsAcceptor::from(Arc::new(tls_config(certs)?));
    info!(addr = %listener.local_addr()?, "HTTPS listener up");

    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (tcp, remote) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(%err, "accept failed");
                        continue;
                    }
                };

                let acceptor = acceptor.clone();
                let app = router.clone().layer(Extension(RemoteAddr(remote)));
                connections.spawn(async move {
                    let stream = match acceptor.accept(tcp).await {
                        Ok(stream) => stream,
                        Err(err) => {
                            debug!(%remote, %err, "TLS handshake failed");
                            return;
                        }
                    };

                    let service = TowerToHyperService::new(app);
                    if let Err(err) = auto::Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        debug!(%remote, %err, "connection closed with error");
                    }
                });

                // Reap finished connection tasks as we go.
                while connections.try_join_next().is_some() {}
            }

            _ = shutdown.changed() => break,
        }
    }

    info!(in_flight = connections.len(), "listener stopped, draining");
    let drain = async {
        while connections.join_next().await.is_some() {}
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        warn!("drain timed out, aborting remaining connections");
        connections.abort_all();
    }

    Ok(())
}
