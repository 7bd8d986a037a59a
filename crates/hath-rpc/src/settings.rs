//! Coordinator-issued settings and the RPC host set.
//!
//! Settings arrive as a `key=value` bag from `client_login` /
//! `client_settings`. Readers take whole snapshots; a refresh builds a new
//! snapshot and swaps it in one move so no request ever observes a torn
//! update. Fields absent from a refresh carry forward from the previous
//! snapshot.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use hath_core::fileid::STATIC_RANGE_LEN;
use hath_core::{WeightedSelector, RPC_HOST_DEFAULT_WEIGHT};
use parking_lot::RwLock;
use tracing::info;

/// One snapshot of the coordinator-issued parameters.
#[derive(Debug, Clone, Default)]
pub struct RemoteSettings {
    /// Port the HTTPS listener is expected to bind
    pub server_port: u16,
    /// 4-hex-character prefixes this node is authoritative for
    pub static_ranges: HashSet<String>,
    /// RPC hosts with their selection weights
    pub rpc_hosts: HashMap<String, u32>,
    /// Full bag of received pairs, kept for forward compatibility
    pub raw: HashMap<String, String>,
}

fn is_static_range(s: &str) -> bool {
    s.len() == STATIC_RANGE_LEN
        && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

impl RemoteSettings {
    /// Builds a snapshot from a payload bag, carrying forward fields the
    /// payload does not mention.
    pub fn merged(prev: &RemoteSettings, raw: HashMap<String, String>) -> Self {
        let server_port = raw
            .get("port")
            .and_then(|p| p.parse().ok())
            .unwrap_or(prev.server_port);

        let static_ranges = match raw.get("static_ranges") {
            Some(list) => list
                .split(';')
                .filter(|r| is_static_range(r))
                .map(String::from)
                .collect(),
            None => prev.static_ranges.clone(),
        };

        let rpc_hosts = match raw.get("rpc_server_ip") {
            Some(list) => list
                .split(';')
                .filter_map(|s| s.parse::<IpAddr>().ok())
                .map(|ip| (ip.to_string(), RPC_HOST_DEFAULT_WEIGHT))
                .collect(),
            None => prev.rpc_hosts.clone(),
        };

        Self {
            server_port,
            static_ranges,
            rpc_hosts,
            raw,
        }
    }

    /// Returns true if the given prefix is one of this node's static
    /// ranges.
    pub fn in_static_range(&self, prefix: &str) -> bool {
        self.static_ranges.contains(prefix)
    }
}

/// Shared holder for the current settings snapshot.
#[derive(Debug, Default)]
pub struct SettingsHolder {
    current: RwLock<Arc<RemoteSettings>>,
}

impl SettingsHolder {
    /// Creates a holder with empty defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<RemoteSettings> {
        self.current.read().clone()
    }

    /// Installs a new snapshot.
    pub fn store(&self, settings: Arc<RemoteSettings>) {
        info!(
            port = settings.server_port,
            ranges = settings.static_ranges.len(),
            hosts = settings.rpc_hosts.len(),
            "installed settings snapshot"
        );
        *self.current.write() = settings;
    }
}

/// The RPC host set with its weighted round-robin cursor.
///
/// The cursor is private to the selector and is reset whenever the host set
/// is rebuilt, which happens atomically with the settings swap.
#[derive(Default)]
pub struct HostSet {
    selector: RwLock<WeightedSelector>,
}

impl HostSet {
    /// Creates an empty host set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the host set, resetting the cursor. Hosts are inserted in
    /// sorted order so selection is deterministic.
    pub fn rebuild(&self, hosts: &HashMap<String, u32>) {
        let mut sorted: Vec<(&String, &u32)> = hosts.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let mut selector = WeightedSelector::new();
        for (host, weight) in sorted {
            selector.insert(host.clone(), *weight);
        }
        *self.selector.write() = selector;
    }

    /// Returns the next host, or `None` when no hosts have been issued.
    pub fn next(&self) -> Option<String> {
        self.selector.read().next()
    }

    /// Returns true when no hosts have been issued.
    pub fn is_empty(&self) -> bool {
        self.selector.read().is_empty()
    }
}
