use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A broadcast cancellation signal for one ping run
///
/// The signal is backed by a [crossbeam](crossbeam) channel that never carries a message. Firing
/// the signal drops the only sender, which disconnects the channel and wakes up every thread
/// currently blocked on it. Threads can therefore include the signal as one arm of a `select!`
/// instead of polling a flag in a loop.
///
/// Cloning the signal is cheap, all clones observe the same state.
///
/// [crossbeam]: https://docs.rs/crossbeam/0.8/crossbeam/channel/index.html
#[derive(Debug, Clone)]
pub struct InterruptSignal {
    fired: Arc<AtomicBool>,
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    watch: Receiver<()>,
}

impl InterruptSignal {
    pub fn new() -> Self {
        let (trigger, watch) = channel::bounded(0);
        Self {
            fired: Arc::new(AtomicBool::new(false)),
            trigger: Arc::new(Mutex::new(Some(trigger))),
            watch,
        }
    }

    /// Fire the signal
    ///
    /// Firing more than once has no further effect.
    pub fn trigger(&self) {
        self.fired.store(true, Ordering::SeqCst);
        let _ = self
            .trigger
            .lock()
            .expect("interrupt mutex poisoned")
            .take();
    }

    /// Return `true` once the signal has been fired
    pub fn is_set(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Channel that disconnects when the signal fires
    ///
    /// Meant to be used as an arm in `crossbeam::select!`. The channel never yields a value, so
    /// any completed receive on it means the signal has fired.
    pub fn as_receiver(&self) -> &Receiver<()> {
        &self.watch
    }

    /// Sleep for `duration` unless the signal fires first
    ///
    /// Returns `true` if the sleep was interrupted.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_set() {
            return true;
        }
        match self.watch.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => false,
            _ => true,
        }
    }
}

impl Default for InterruptSignal {
    fn default() -> Self {
        Self::new()
    }
}
