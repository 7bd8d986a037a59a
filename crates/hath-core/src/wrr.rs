//! Smooth weighted round-robin host selection.
//!
//! Picks spread out according to weight without clustering: over any window
//! of `total_weight` consecutive picks, every host appears exactly `weight`
//! times. The cursor state lives behind its own mutex so a selector shared
//! under a read lock can still hand out hosts concurrently; settings swaps
//! build a fresh selector rather than mutating this one.

use parking_lot::Mutex;

struct Entry {
    host: String,
    weight: i64,
}

/// Deterministic weighted round-robin selector over a fixed host set.
pub struct WeightedSelector {
    entries: Vec<Entry>,
    total_weight: i64,
    current: Mutex<Vec<i64>>,
}

impl WeightedSelector {
    /// Creates an empty selector.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            total_weight: 0,
            current: Mutex::new(Vec::new()),
        }
    }

    /// Adds a host with the given weight. Zero and negative weights are
    /// ignored.
    pub fn insert(&mut self, host: impl Into<String>, weight: u32) {
        if weight == 0 {
            return;
        }
        self.entries.push(Entry {
            host: host.into(),
            weight: i64::from(weight),
        });
        self.total_weight += i64::from(weight);
        self.current.get_mut().push(0);
    }

    /// Returns the number of hosts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no hosts have been added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the next host, or `None` when the selector is empty.
    ///
    /// Each call advances every host's running weight by its configured
    /// weight, picks the largest (ties to the earliest inserted), and
    /// charges the winner the total weight.
    pub fn next(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }

        let mut current = self.current.lock();
        let mut best = 0;
        for (i, entry) in self.entries.iter().enumerate() {
            current[i] += entry.weight;
            if current[i] > current[best] {
                best = i;
            }
        }
        current[best] -= self.total_weight;
        Some(self.entries[best].host.clone())
    }
}

impl Default for WeightedSelector {
    fn default() -> Self {
        Self::new()
    }
}
