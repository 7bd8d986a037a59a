//! Hath RPC - Coordinator protocol client.
//!
//! This crate provides:
//! - The signed RPC client with clock resync and host failover
//! - The hot-reloadable remote settings snapshot
//! - TLS material decoded from the coordinator's PKCS#12 bundle,
//!   swappable without restarting the listener

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod cert;
pub mod client;
pub mod response;
pub mod settings;

pub use cert::{decode_pkcs12, CertStore};
pub use client::{Action, RpcClient};
pub use response::{Payload, RpcResponse};
pub use settings::{HostSet, RemoteSettings, SettingsHolder};

use thiserror::Error;

/// Errors from coordinator RPC and certificate handling.
#[derive(Debug, Error)]
pub enum RpcError {
    /// HTTP transport failure after retries
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Empty or statusless response body
    #[error("empty response from coordinator")]
    NullResponse,

    /// Coordinator reported a transient condition
    #[error("coordinator temporarily unavailable")]
    TemporarilyUnavailable,

    /// Coordinator could not reach this node from the outside
    #[error("coordinator failed to connect back to this node")]
    ConnectTestFailed,

    /// Another client is already connected from this public address
    #[error("another client is already connected from this address")]
    IpAddressInUse,

    /// This client ident is in use elsewhere
    #[error("client ident is already in use")]
    ClientIdInUse,

    /// Action key rejected; surfaced only after the single resync retry
    #[error("action key expired")]
    KeyExpired,

    /// Unrecognized status token
    #[error("unknown coordinator status: {0}")]
    Unknown(String),

    /// Expected payload field was absent or malformed
    #[error("missing or malformed payload field: {0}")]
    MissingField(&'static str),

    /// PKCS#12 bundle could not be decoded into TLS material
    #[error("certificate decode failed: {0}")]
    CertDecode(String),

    /// No TLS material has been installed yet
    #[error("no certificate installed")]
    NoCertificate,
}
