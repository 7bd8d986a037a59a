//! Hath Gateway - The HTTPS-facing half of the node.
//!
//! This crate provides:
//! - The peer downloader (multi-source fetch, throughput probe)
//! - The request handlers for `/h`, `/servercmd`, and `/t`
//! - The TLS listener with per-handshake certificate resolution

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod commands;
pub mod downloader;
pub mod handlers;
pub mod tls;

pub use downloader::{DownloadError, Downloader};
pub use handlers::router;
pub use tls::serve;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hath_rpc::RpcClient;
use hath_store::BlobStore;
use tokio::sync::watch;

/// Everything a request handler needs: the coordinator client, the local
/// store, the downloader, and the shutdown signal.
pub struct Gateway {
    client: Arc<RpcClient>,
    store: Arc<BlobStore>,
    downloader: Downloader,
    cache_writeback: bool,
    shutdown: watch::Receiver<bool>,
}

impl Gateway {
    /// Builds the gateway.
    pub fn new(
        client: Arc<RpcClient>,
        store: Arc<BlobStore>,
        cache_writeback: bool,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, DownloadError> {
        Ok(Self {
            client,
            store,
            downloader: Downloader::new()?,
            cache_writeback,
            shutdown,
        })
    }

    /// Returns the coordinator client.
    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }

    /// Returns the blob store.
    pub fn store(&self) -> &Arc<BlobStore> {
        &self.store
    }

    /// Returns the peer downloader.
    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    /// Returns true when peer fetches should be written back to the store.
    pub fn cache_writeback(&self) -> bool {
        self.cache_writeback
    }

    /// Returns a fresh handle on the shutdown signal.
    pub fn shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }
}

/// A request-level failure carrying the HTTP status to answer with.
#[derive(Debug)]
pub struct GatewayError {
    status: StatusCode,
    body: String,
}

impl GatewayError {
    /// 403 with an empty body.
    pub fn forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            body: String::new(),
        }
    }

    /// 404 with an empty body.
    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        }
    }

    /// 400 with the given body.
    pub fn bad_request(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: body.into(),
        }
    }

    /// 500 with an opaque body; the cause goes to the log, not the wire.
    pub fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "internal error".to_string(),
        }
    }

    /// Returns the HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status, self.body).into_response()
    }
}
