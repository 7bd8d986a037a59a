//! Client identity issued by the coordinator.

use std::fmt;

use thiserror::Error;

use crate::CLIENT_KEY_LENGTH;

/// Error validating a client identity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// Client id missing or not a decimal number
    #[error("client id must be a non-empty decimal number")]
    InvalidClientId,

    /// Client key of wrong length or alphabet
    #[error("client key must be {CLIENT_KEY_LENGTH} alphanumeric characters")]
    InvalidClientKey,
}

/// The `(client_id, client_key)` pair this node authenticates with.
///
/// Immutable after boot; the key doubles as the PKCS#12 password for the
/// workload certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    id: String,
    key: String,
}

impl ClientIdentity {
    /// Validates and builds an identity.
    pub fn new(id: impl Into<String>, key: impl Into<String>) -> Result<Self, IdentityError> {
        let id = id.into();
        let key = key.into();

        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IdentityError::InvalidClientId);
        }
        if key.len() != CLIENT_KEY_LENGTH || !key.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(IdentityError::InvalidClientKey);
        }

        Ok(Self { id, key })
    }

    /// Returns the client id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the client key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("id", &self.id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
