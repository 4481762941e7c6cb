use std::sync::Mutex;
use std::time::Duration;

/// Outcome of all probes to a single target
///
/// Lost probes are not counted separately, the loss of a target is always `sent - received`.
/// A target without any probe sent either failed to resolve (`unresolved`) or was never reached
/// because the run was interrupted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetResult {
    pub sent: usize,
    pub received: usize,
    pub rtts: Vec<Duration>,
    pub unresolved: bool,
}

/// Results aggregator of a run
///
/// Holds one row per target, indexed like the run's target list. Every row sits behind its own
/// mutex, so updates for different targets never wait on each other. Counters only ever grow.
#[derive(Debug)]
pub struct Results {
    rows: Vec<Mutex<TargetResult>>,
}

impl Results {
    pub fn new(targets: usize) -> Self {
        Self {
            rows: (0..targets)
                .map(|_| Mutex::new(TargetResult::default()))
                .collect(),
        }
    }

    /// Count a probe as sent to the target at `index`
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or the row's mutex has been poisoned.
    pub fn record_sent(&self, index: usize) {
        self.rows[index].lock().expect("results mutex poisoned").sent += 1;
    }

    /// Mark the target at `index` as unresolvable, it will not receive any probe
    pub fn record_unresolved(&self, index: usize) {
        self.rows[index].lock().expect("results mutex poisoned").unresolved = true;
    }

    /// Record a reply from the target at `index` with its round-trip time
    ///
    /// Only the reply listener calls this, and only for a probe it has settled in the registry, so
    /// `received` never overtakes `sent`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or the row's mutex has been poisoned.
    pub fn record_rtt(&self, index: usize, rtt: Duration) {
        let mut row = self.rows[index].lock().expect("results mutex poisoned");
        debug_assert!(row.received < row.sent, "reply without request");
        row.received += 1;
        row.rtts.push(rtt);
    }

    /// Copy of the row of the target at `index`
    pub fn get(&self, index: usize) -> Option<TargetResult> {
        self.rows
            .get(index)
            .map(|row| row.lock().expect("results mutex poisoned").clone())
    }

    /// Copy of all rows in target order
    pub fn snapshot(&self) -> Vec<TargetResult> {
        self.rows
            .iter()
            .map(|row| row.lock().expect("results mutex poisoned").clone())
            .collect()
    }
}
