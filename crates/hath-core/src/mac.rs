//! SHA-1 MAC forms of the coordinator protocol.
//!
//! The protocol authenticates three kinds of messages, all with lowercase
//! hex SHA-1 over `-`-joined fields:
//! - action keys on outbound RPC URLs,
//! - command keys on inbound `/servercmd` requests,
//! - keystamps presented by user agents on `/h` requests (first 10
//!   characters only).

use sha1::{Digest, Sha1};

/// Number of hex characters of the keystamp MAC that are compared.
pub const KEYSTAMP_TAG_LEN: usize = 10;

/// Returns the lowercase hex SHA-1 digest of `input`.
pub fn sha1_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Returns the lowercase hex SHA-1 digest of raw bytes.
pub fn sha1_hex_bytes(input: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// Action key for a signed RPC URL.
pub fn action_mac(action: &str, addendum: &str, client_id: &str, acttime: i64, client_key: &str) -> String {
    sha1_hex(&format!(
        "hentai@home-{action}-{addendum}-{client_id}-{acttime}-{client_key}"
    ))
}

/// Expected key for an inbound coordinator command.
pub fn command_mac(cmd: &str, addendum: &str, client_id: &str, server_time: i64, client_key: &str) -> String {
    sha1_hex(&format!(
        "hentai@home-servercmd-{cmd}-{addendum}-{client_id}-{server_time}-{client_key}"
    ))
}

/// Full keystamp MAC for a user-agent content request. Callers compare only
/// the first [`KEYSTAMP_TAG_LEN`] characters.
pub fn keystamp_mac(keystamp_time: i64, file_id: &str, client_key: &str) -> String {
    sha1_hex(&format!("{keystamp_time}-{file_id}-{client_key}-hotlinkthis"))
}
