use crossbeam::channel::{self, Receiver, Sender};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::registry::{ProbeKey, ProbeState, Registry};
use crate::report::Reporter;
use crate::signal::InterruptSignal;

/// Point in time at which a pending probe is declared lost
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Deadline {
    at: Instant,
    key: ProbeKey,
}

/// Handle for arming probe timers
///
/// Dropping the last `TimerArm` tells the `TimeoutManager` that no more probes will be sent. It
/// then waits for the outstanding deadlines and exits.
#[derive(Debug, Clone)]
pub struct TimerArm {
    timeout: Duration,
    tx: Sender<Deadline>,
}

impl TimerArm {
    /// Start the timer of a probe that was sent at `sent_at`
    pub fn arm(&self, key: ProbeKey, sent_at: Instant) {
        let deadline = Deadline {
            at: sent_at + self.timeout,
            key,
        };

        // Only fails if the manager has already shut down on interrupt
        if self.tx.send(deadline).is_err() {
            trace!("Timeout manager gone, probe {:?} not armed", key);
        }
    }
}

/// Enforces the per-probe timeout
///
/// All deadlines of a run are kept in a single min-heap, served by one thread. When a deadline
/// passes, the manager tries to settle the probe as timed out. If the reply listener has already
/// settled it, the deadline is simply discarded.
pub struct TimeoutManager {
    registry: Arc<Registry>,
    reporter: Arc<Reporter>,
    interrupt: InterruptSignal,
}

impl TimeoutManager {
    pub fn new(registry: Arc<Registry>, reporter: Arc<Reporter>, interrupt: InterruptSignal) -> Self {
        Self {
            registry,
            reporter,
            interrupt,
        }
    }

    /// Spawn the manager thread
    ///
    /// Returns the handle for arming timers and the joinable handle of the thread. The thread
    /// yields the number of probes it declared lost. It exits once every `TimerArm` has been
    /// dropped and all armed deadlines have been served, or as soon as the interrupt fires.
    pub fn start(self, timeout: Duration) -> (TimerArm, JoinHandle<usize>) {
        let (tx, rx) = channel::unbounded();
        let handle = thread::spawn(move || self.run(rx));
        (TimerArm { timeout, tx }, handle)
    }

    fn run(self, arms: Receiver<Deadline>) -> usize {
        trace!("Start timeout manager thread");

        let mut deadlines = BinaryHeap::new();
        let mut expired = 0;
        let mut hung_up = false;
        let never = channel::never();

        while !(hung_up && deadlines.is_empty()) {
            let wake = match deadlines.peek() {
                Some(Reverse(Deadline { at, .. })) => channel::at(*at),
                None => channel::never(),
            };
            let source = if hung_up { &never } else { &arms };

            crossbeam::select! {
                recv(source) -> msg => match msg {
                    Ok(deadline) => deadlines.push(Reverse(deadline)),
                    Err(_) => {
                        trace!("All probes armed, draining {} deadlines", deadlines.len());
                        hung_up = true;
                    }
                },
                recv(self.interrupt.as_receiver()) -> _ => {
                    debug!("Interrupted with {} deadlines pending", deadlines.len());
                    break;
                },
                recv(wake) -> _ => (),
            }

            expired += self.expire(&mut deadlines, Instant::now());
        }

        trace!("Shutting down timeout manager thread");
        expired
    }

    /// Settle every probe whose deadline is not after `now`
    fn expire(&self, deadlines: &mut BinaryHeap<Reverse<Deadline>>, now: Instant) -> usize {
        let mut expired = 0;
        while let Some(Reverse(deadline)) = deadlines.peek() {
            if deadline.at > now {
                break;
            }
            let key = deadline.key;
            deadlines.pop();

            if let Some(probe) = self.registry.settle(key, ProbeState::TimedOut) {
                self.reporter.timeout(probe.target, probe.number());
                expired += 1;
            }
        }
        expired
    }
}
