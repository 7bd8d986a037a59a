//! Coordinator response parsing.
//!
//! A response body is plain text: the first line is a status token, the
//! remaining non-empty lines form the payload. Depending on the action the
//! payload is either a bag of `key=value` lines or a list of URLs.

use std::collections::HashMap;

use crate::RpcError;

/// Payload lines of a successful response.
#[derive(Debug, Clone, Default)]
pub struct Payload(pub Vec<String>);

impl Payload {
    /// Interprets the payload as `key=value` pairs.
    ///
    /// Dashes in keys are normalized to underscores (`rpc-server-ip`
    /// becomes `rpc_server_ip`); values are left untouched. Lines that are
    /// not exactly `key=value` are dropped.
    pub fn key_values(&self) -> HashMap<String, String> {
        self.0
            .iter()
            .filter_map(|line| {
                let parts: Vec<&str> = line.split('=').collect();
                match parts.as_slice() {
                    [key, value] => Some((key.replace('-', "_"), value.to_string())),
                    _ => None,
                }
            })
            .collect()
    }

    /// Interprets the payload as one URL per line, dropping lines that do
    /// not parse as absolute URLs.
    pub fn urls(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|line| reqwest::Url::parse(line).is_ok())
            .cloned()
            .collect()
    }

    /// Returns the raw payload lines.
    pub fn lines(&self) -> &[String] {
        &self.0
    }
}

/// A successful coordinator response.
#[derive(Debug, Clone)]
pub struct RpcResponse {
    /// Payload lines following the status line
    pub payload: Payload,
    /// Host that served the call
    pub host: String,
}

/// Parses a response body, mapping failure statuses onto the error
/// taxonomy.
pub(crate) fn parse_body(body: &str, host: &str) -> Result<RpcResponse, RpcError> {
    if body.trim().is_empty() {
        return Err(RpcError::NullResponse);
    }

    let mut lines = body.split('\n');
    let status = lines.next().unwrap_or("").trim();

    if status == "OK" {
        let payload = lines
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        return Ok(RpcResponse {
            payload: Payload(payload),
            host: host.to_string(),
        });
    }

    if status.starts_with("KEY_EXPIRED") {
        Err(RpcError::KeyExpired)
    } else if status.starts_with("TEMPORARILY_UNAVAILABLE") {
        Err(RpcError::TemporarilyUnavailable)
    } else if status.starts_with("FAIL_CONNECT_TEST") {
        Err(RpcError::ConnectTestFailed)
    } else if status.starts_with("FAIL_OTHER_CLIENT_CONNECTED") {
        Err(RpcError::IpAddressInUse)
    } else if status.starts_with("FAIL_CID_IN_USE") {
        Err(RpcError::ClientIdInUse)
    } else {
        Err(RpcError::Unknown(status.to_string()))
    }
}
