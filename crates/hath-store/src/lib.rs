//! Hath Store - Local blob storage.
//!
//! One on-disk key-value database holds cached blobs keyed by their
//! canonical file-id string. The store is append-with-lookup: nothing in
//! this crate evicts.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod blob;

pub use blob::BlobStore;

use thiserror::Error;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No blob stored under this file id
    #[error("blob not found")]
    NotFound,

    /// Blob length does not match the file id
    #[error("blob length {actual} does not match file id size {expected}")]
    SizeMismatch {
        /// Size declared by the file id
        expected: u64,
        /// Length of the supplied or stored bytes
        actual: u64,
    },

    /// RocksDB error
    #[error("database error: {0}")]
    Database(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
