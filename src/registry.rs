use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Identity of a probe on the wire
///
/// The identifier is constant for a run, the sequence number is unique among the probes that are
/// pending at the same time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProbeKey {
    pub id: u16,
    pub seq: u16,
}

/// Terminal state of a probe
///
/// A probe starts out pending in the `Registry`. Leaving the registry is the transition into one
/// of the terminal states, which can only happen once.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProbeState {
    Answered,
    TimedOut,
}

/// Bookkeeping of a pending echo request
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PendingProbe {
    /// Index of the target in the run's target list
    pub target: usize,
    /// Number of probes sent to the target before this one
    pub round: usize,
    pub sent_at: Instant,
}

impl PendingProbe {
    /// Position of the probe among those sent to its target, counting from 1
    pub fn number(&self) -> usize {
        self.round + 1
    }
}

const DEFAULT_SHARDS: usize = 16;

/// Correlation table of pending echo requests
///
/// The `Registry` maps the identity of every request on the wire to the instant it was sent and
/// the target it was sent to. The map is split into shards by sequence number, each behind its own
/// mutex, so replies and timeouts for unrelated probes do not contend for the same lock.
///
/// A probe is settled by removing it under the shard lock. Whichever of the reply listener and the
/// timeout manager gets there first wins, the other one finds nothing and does nothing. This makes
/// the accounting of every probe happen at most once.
#[derive(Debug)]
pub struct Registry {
    shards: Vec<Mutex<HashMap<ProbeKey, PendingProbe>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub fn with_shards(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1))
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
        }
    }

    fn shard(&self, key: &ProbeKey) -> &Mutex<HashMap<ProbeKey, PendingProbe>> {
        &self.shards[key.seq as usize % self.shards.len()]
    }

    /// Register echo request right before send out
    ///
    /// Returns `false` and leaves the registry untouched if a probe with the same key is still
    /// pending.
    ///
    /// # Panics
    ///
    /// This function panics if the mutex holding the shard has been poisoned.
    pub fn register(&self, key: ProbeKey, probe: PendingProbe) -> bool {
        use std::collections::hash_map::Entry;

        match self.shard(&key).lock().expect("registry mutex poisoned").entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(probe);
                true
            }
        }
    }

    /// Settle a pending probe
    ///
    /// Removes the probe and hands its bookkeeping to the caller, who now exclusively owns the
    /// outcome. Returns `None` if the probe is unknown or has already been settled.
    ///
    /// # Panics
    ///
    /// This function panics if the mutex holding the shard has been poisoned.
    pub fn settle(&self, key: ProbeKey, state: ProbeState) -> Option<PendingProbe> {
        let settled = self
            .shard(&key)
            .lock()
            .expect("registry mutex poisoned")
            .remove(&key);

        if settled.is_some() {
            trace!("Probe {:?} settled as {:?}", key, state);
        }
        settled
    }

    /// Return `true` if the probe is still waiting for its outcome
    pub fn is_pending(&self, key: &ProbeKey) -> bool {
        self.shard(key)
            .lock()
            .expect("registry mutex poisoned")
            .contains_key(key)
    }

    /// Number of pending probes
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().expect("registry mutex poisoned").len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every pending probe
    ///
    /// Returns the number of probes that were still pending.
    pub fn clear(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                let mut shard = shard.lock().expect("registry mutex poisoned");
                let pending = shard.len();
                shard.clear();
                pending
            })
            .sum()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
