//! TLS material from the coordinator's PKCS#12 bundle.
//!
//! The coordinator issues a PKCS#12 file containing the workload leaf
//! certificate, the intermediate that signed it, and the private key; the
//! client key is the decryption password. The bundle is decoded into a
//! rustls certified key and held behind [`CertStore`], which doubles as the
//! listener's per-handshake certificate resolver so a `refresh_certs`
//! command takes effect on the next handshake without restarting anything.

use std::sync::Arc;

use parking_lot::RwLock;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use tracing::debug;
use x509_parser::prelude::*;

use crate::RpcError;

/// Decodes a PKCS#12 bundle into a servable certified key.
///
/// Certificates with the CA flag set are intermediates and follow the leaf
/// in the served chain; the private key is re-wrapped as PKCS#8 for rustls.
pub fn decode_pkcs12(der: &[u8], password: &str) -> Result<Arc<CertifiedKey>, RpcError> {
    let pfx = p12::PFX::parse(der)
        .map_err(|e| RpcError::CertDecode(format!("pkcs12 parse: {e:?}")))?;

    let key_der = pfx
        .key_bags(password)
        .map_err(|e| RpcError::CertDecode(format!("pkcs12 key bags: {e:?}")))?
        .into_iter()
        .next()
        .ok_or_else(|| RpcError::CertDecode("no private key in bundle".to_string()))?;

    let cert_ders = pfx
        .cert_x509_bags(password)
        .map_err(|e| RpcError::CertDecode(format!("pkcs12 cert bags: {e:?}")))?;

    let mut leaf: Option<CertificateDer<'static>> = None;
    let mut intermediates: Vec<CertificateDer<'static>> = Vec::new();

    for der in cert_ders {
        let is_ca = {
            let (_, cert) = X509Certificate::from_der(&der)
                .map_err(|e| RpcError::CertDecode(format!("x509 parse: {e}")))?;
            cert_is_ca(&cert)
        };
        let der = CertificateDer::from(der);
        if is_ca {
            intermediates.push(der);
        } else if leaf.is_none() {
            leaf = Some(der);
        } else {
            debug!("ignoring extra leaf certificate in bundle");
        }
    }

    let leaf = leaf.ok_or_else(|| RpcError::CertDecode("no leaf certificate in bundle".to_string()))?;
    let mut chain = vec![leaf];
    chain.extend(intermediates);

    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_der));
    let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
        .map_err(|e| RpcError::CertDecode(format!("unsupported private key: {e}")))?;

    Ok(Arc::new(CertifiedKey::new(chain, signing_key)))
}

/// True when the certificate carries basic constraints with the CA flag.
fn cert_is_ca(cert: &X509Certificate<'_>) -> bool {
    cert.basic_constraints()
        .ok()
        .flatten()
        .map(|bc| bc.value.ca)
        .unwrap_or(false)
}

/// Shared holder for the currently servable TLS material.
///
/// Handshakes in flight keep the material they resolved; a store only
/// affects handshakes that begin afterwards.
#[derive(Debug, Default)]
pub struct CertStore {
    current: RwLock<Option<Arc<CertifiedKey>>>,
}

impl CertStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs new material, replacing whatever was served before.
    pub fn store(&self, key: Arc<CertifiedKey>) {
        *self.current.write() = Some(key);
    }

    /// Returns the current material, or an error when nothing has been
    /// installed yet.
    pub fn get(&self) -> Result<Arc<CertifiedKey>, RpcError> {
        self.current.read().clone().ok_or(RpcError::NoCertificate)
    }

    /// Returns true once material has been installed.
    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }
}

impl ResolvesServerCert for CertStore {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.current.read().clone()
    }
}
