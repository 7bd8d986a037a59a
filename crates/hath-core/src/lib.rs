//! Hath Core - Types and protocol primitives for the hath edge cache node.
//!
//! This crate provides:
//! - System clock access and the server time delta
//! - SHA-1 MAC forms used by the coordinator protocol
//! - The weighted round-robin host selector
//! - File identifier parsing and MIME mapping
//! - The `k=v;k=v` addendum grammar
//! - Client identity validation

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod fileid;
pub mod identity;
pub mod mac;
pub mod params;
pub mod time;
pub mod wrr;

pub use fileid::{Extension, FileId, FileIdError};
pub use identity::{ClientIdentity, IdentityError};
pub use params::parse_addendum;
pub use time::{unix_now, ServerTimeDelta};
pub use wrr::WeightedSelector;

/// Build number reported to the coordinator. The coordinator uses it to
/// determine the client's capabilities, so forks must track the mainline
/// build rather than an internal counter.
pub const CLIENT_BUILD: u32 = 154;

/// Client version reported in the User-Agent header.
pub const CLIENT_VERSION: &str = "1.6.1";

/// Required length of the client key.
pub const CLIENT_KEY_LENGTH: usize = 20;

/// Maximum forward skew accepted on coordinator command timestamps (seconds).
pub const MAX_KEY_TIME_DRIFT_SECS: i64 = 300;

/// Validity window for user-agent keystamps (seconds).
pub const KEYSTAMP_WINDOW_SECS: i64 = 900;

/// Scheme used for coordinator RPC.
pub const RPC_PROTOCOL: &str = "http";

/// Well-known coordinator host used before any host list has been issued.
pub const RPC_BOOTSTRAP_HOST: &str = "rpc.hentaiathome.net";

/// Path of the coordinator RPC endpoint.
pub const RPC_PATH: &str = "15/rpc";

/// Default weight assigned to coordinator-issued RPC hosts.
pub const RPC_HOST_DEFAULT_WEIGHT: u32 = 10;
