use std::convert::TryFrom;
use std::net::IpAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::packet::EchoReply;
use crate::registry::{ProbeKey, ProbeState, Registry};
use crate::report::Reporter;
use crate::results::Results;
use crate::signal::InterruptSignal;
use crate::transport::EchoReceiver;

/// How long a single read may block before the interrupt signal is checked again
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Counters of a listening thread, returned when it shuts down
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListenerStats {
    /// Echo replies that settled a pending probe
    pub matched: usize,
    /// Echo replies of this run without a pending probe, i.e. late or duplicate
    pub unmatched: usize,
    /// Datagrams that were no echo reply or carried a foreign identifier
    pub ignored: usize,
}

/// Resolves echo replies against the registry
///
/// The `Receiver` owns the read side of the socket. It timestamps every datagram right after the
/// transport handed it over, identifies it and, on a match, records the round-trip time for the
/// probe's target.
pub struct Receiver {
    id: u16,
    registry: Arc<Registry>,
    results: Arc<Results>,
    reporter: Arc<Reporter>,
}

impl Receiver {
    pub fn new(id: u16, registry: Arc<Registry>, results: Arc<Results>, reporter: Arc<Reporter>) -> Self {
        Self {
            id,
            registry,
            results,
            reporter,
        }
    }

    /// Set up the listening thread for incoming packets
    ///
    /// Returns the handle to the listener thread for joining. The thread unblocks in regular
    /// intervals to check whether the interrupt has fired and returns once it has. The transport
    /// is dropped by the thread on exit.
    pub fn start_listening<R>(self, rx: R, interrupt: InterruptSignal) -> JoinHandle<ListenerStats>
    where
        R: EchoReceiver + 'static,
    {
        thread::spawn(move || self.listen(rx, interrupt))
    }

    fn listen<R: EchoReceiver>(&self, mut rx: R, interrupt: InterruptSignal) -> ListenerStats {
        trace!("Start listening thread for incoming ICMP packets");

        let mut stats = ListenerStats::default();
        while !interrupt.is_set() {
            match rx.next_with_timeout(POLL_INTERVAL) {
                // Timestamp first, identify later
                Ok(Some((packet, addr))) => {
                    let arrival = Instant::now();
                    self.process(&packet, addr, arrival, &mut stats);
                }

                // Unblock and check, whether we are still listening
                Ok(None) => (),

                // Errors come from the operating system and only affect this read. Back off, a
                // broken socket fails again right away.
                Err(e) => {
                    error!("Error occurred while reading incoming: {}", e);
                    interrupt.sleep(POLL_INTERVAL);
                }
            }
        }

        debug!(
            "Listener saw {} matched, {} unmatched and {} ignored packets",
            stats.matched, stats.unmatched, stats.ignored
        );
        trace!("Shutting down listening thread");
        stats
    }

    /// Identify a single datagram and settle its probe
    fn process(&self, packet: &[u8], addr: IpAddr, arrival: Instant, stats: &mut ListenerStats) {
        let reply = match EchoReply::try_from(packet) {
            Ok(reply) => reply,
            Err(e) => {
                trace!("Skipping packet from {}: {}", addr, e);
                stats.ignored += 1;
                return;
            }
        };

        // Make sure this packet belongs to this run
        if reply.get_id() != self.id {
            trace!("Skipping echo reply from {} with foreign id {}", addr, reply.get_id());
            stats.ignored += 1;
            return;
        }

        let key = ProbeKey {
            id: reply.get_id(),
            seq: reply.get_sequence(),
        };
        match self.registry.settle(key, ProbeState::Answered) {
            Some(probe) => {
                let lapsed = arrival.saturating_duration_since(probe.sent_at);
                self.results.record_rtt(probe.target, lapsed);
                self.reporter.reply(probe.target, probe.number(), lapsed);
                stats.matched += 1;
            }
            None => {
                trace!("Discarding late or duplicate reply from {} icmp_seq={}", addr, key.seq);
                stats.unmatched += 1;
            }
        }
    }
}
