//! System clock access and the coordinator time delta.
//!
//! All protocol timestamps are whole seconds since the Unix epoch. The
//! coordinator's clock is authoritative; the node tracks the signed offset
//! between the two and applies it when building action keys.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current time as seconds since the Unix epoch.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Signed offset between the coordinator clock and the local clock,
/// `server_time - local_time` at the last sync.
///
/// Written only by the time sync procedure and read on every signed call,
/// so it is a plain atomic rather than a lock.
#[derive(Debug, Default)]
pub struct ServerTimeDelta(AtomicI64);

impl ServerTimeDelta {
    /// Creates a delta of zero.
    pub const fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    /// Returns the stored delta in seconds.
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Replaces the stored delta.
    pub fn set(&self, delta: i64) {
        self.0.store(delta, Ordering::Relaxed);
    }

    /// Returns the local clock corrected to the coordinator's frame.
    pub fn corrected_now(&self) -> i64 {
        unix_now() + self.get()
    }
}
