use crossbeam::channel;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::error::Error;
use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::packet;
use crate::receiver::Receiver;
use crate::registry::{PendingProbe, ProbeKey, ProbeState, Registry};
use crate::report::Reporter;
use crate::resolver::{self, Resolution, Resolver};
use crate::results::Results;
use crate::signal::InterruptSignal;
use crate::summary::Summary;
use crate::timer::{TimeoutManager, TimerArm};
use crate::transport::{self, EchoReceiver, EchoSender};
use crate::Config;

/// Next probe to issue for a target
///
/// Ordered by due time first. Ties go to the earlier round, then to the target that comes first
/// in the input list.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Due {
    at: Instant,
    round: usize,
    target: usize,
}

/// Shared state of a single run
struct Run {
    registry: Arc<Registry>,
    results: Arc<Results>,
    reporter: Arc<Reporter>,
}

/// Probe engine
///
/// The `Engine` owns everything that lives for the duration of one run: the configuration, the
/// address cache and the interrupt signal. Nothing is shared between two engines, so several runs
/// can happen in the same process without interfering.
pub struct Engine {
    config: Config,
    resolver: Arc<Resolver>,
    interrupt: InterruptSignal,
    sequence: u16,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self::with_resolver(config, Resolver::new())
    }

    /// Create an engine that resolves targets through the given resolver
    pub fn with_resolver(config: Config, resolver: Resolver) -> Self {
        Self {
            config,
            resolver: Arc::new(resolver),
            interrupt: InterruptSignal::new(),
            sequence: 0,
        }
    }

    /// Signal that stops the run early when fired
    pub fn interrupt_signal(&self) -> InterruptSignal {
        self.interrupt.clone()
    }

    /// Ping all targets over a raw ICMP socket
    ///
    /// Returns a summary of the statistics collected during this run.
    ///
    /// # Errors
    ///
    /// Fails without sending anything if there are no targets or the socket cannot be opened.
    /// Everything that goes wrong later affects single probes only and ends up as loss in the
    /// summary.
    pub fn ping(self) -> Result<Summary, Box<dyn Error>> {
        if self.config.targets.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "no targets specified").into());
        }

        let (tx, rx) = transport::open_icmp_channel()?;
        self.ping_over(tx, rx)
    }

    /// Ping all targets over the given transport
    ///
    /// Main loop of the run. The listener, the timeout manager and the resolver threads are
    /// started first, then the scheduler issues all probes from the calling thread. Shut down
    /// happens in strict order:
    /// 1. the scheduler is done and hangs up on the timeout manager
    /// 2. the timeout manager has served every deadline, so every probe is answered or lost
    /// 3. the interrupt fires and the listener returns, dropping the read side of the socket
    /// 4. the write side is dropped, closing the socket
    ///
    /// If the interrupt fires early, the scheduler stops issuing, the timeout manager stops
    /// waiting and the probes still pending are counted as lost. Lookups still running are left
    /// behind.
    ///
    /// # Errors
    ///
    /// Fails if one of the child threads panicked.
    pub fn ping_over<S, R>(mut self, tx: S, rx: R) -> Result<Summary, Box<dyn Error>>
    where
        S: EchoSender,
        R: EchoReceiver + 'static,
    {
        let run = Run {
            registry: Arc::new(Registry::new()),
            results: Arc::new(Results::new(self.config.targets.len())),
            reporter: Arc::new(Reporter::new(&self.config)),
        };

        trace!("Start up new receiver");

        let listener = Receiver::new(
            self.config.ident,
            run.registry.clone(),
            run.results.clone(),
            run.reporter.clone(),
        )
        .start_listening(rx, self.interrupt.clone());

        let (arm, timer) =
            TimeoutManager::new(run.registry.clone(), run.reporter.clone(), self.interrupt.clone())
                .start(self.config.timeout);

        let (resolutions, lookups) =
            resolver::resolve_all(self.resolver.clone(), &self.config.targets, &self.interrupt);

        let issued = self.schedule(&tx, &run, &arm, resolutions);
        debug!("Issued {} probes to {} targets", issued, self.config.targets.len());

        // Cleaning up
        drop(arm);
        self.join_lookups(lookups);
        let timer_shut = match timer.join() {
            Ok(expired) => {
                trace!("Successfully shut down timeout manager, {} probes lost", expired);
                Ok(())
            }
            Err(_) => {
                warn!("Error occurred during shut down of timeout manager - signalling shut down");
                Err(io::Error::new(io::ErrorKind::Other, "Timeout manager panicked"))
            }
        };

        if self.interrupt.is_set() {
            let dropped = run.registry.clear();
            info!("Run interrupted, {} pending probes counted as lost", dropped);
        }

        // No probe is pending anymore, the listener can go
        self.interrupt.trigger();
        let listener_shut = match listener.join() {
            Ok(stats) => {
                trace!("Successfully shut down listening thread: {:?}", stats);
                Ok(())
            }
            Err(_) => {
                warn!("Error occurred during shut down of listener thread");
                Err(io::Error::new(io::ErrorKind::Other, "Listening thread panicked"))
            }
        };
        drop(tx);
        timer_shut.and(listener_shut)?;

        trace!("Successfully shut down all child threads");

        Ok(Summary::new(
            self.config.targets.clone(),
            run.results.snapshot(),
            self.config.display,
        ))
    }

    /// Issue `count` probes to every target that resolves
    ///
    /// Targets start `period` apart in input order. A target whose address is not known yet when
    /// its slot comes up joins as soon as its lookup is done, without holding up anyone else.
    /// After that, each target is paced on its own: the next probe to a target is due `interval`
    /// after the previous one went out. All due probes sit in one min-heap, so a target that
    /// never answers does not hold up any other either.
    ///
    /// Returns the number of probes issued.
    fn schedule(
        &mut self,
        tx: &dyn EchoSender,
        run: &Run,
        arm: &TimerArm,
        resolutions: channel::Receiver<Resolution>,
    ) -> usize {
        let start = Instant::now();
        let interrupt = self.interrupt.as_receiver().clone();
        let never = channel::never();

        let mut queue: BinaryHeap<Reverse<Due>> = BinaryHeap::new();
        let mut addrs: Vec<Option<Ipv4Addr>> = vec![None; self.config.targets.len()];
        let mut unresolved = self.config.targets.len();
        let mut issued = 0;

        while !self.interrupt.is_set() && (unresolved > 0 || !queue.is_empty()) {
            let wake = match queue.peek() {
                Some(Reverse(due)) => channel::at(due.at),
                None => channel::never(),
            };
            let source = if unresolved > 0 { &resolutions } else { &never };

            crossbeam::select! {
                recv(source) -> msg => match msg {
                    Ok((target, resolved)) => {
                        unresolved -= 1;
                        match resolved {
                            Ok(addr) => {
                                addrs[target] = Some(addr);
                                if self.config.count > 0 {
                                    queue.push(Reverse(Due {
                                        at: start + self.config.period * target as u32,
                                        round: 0,
                                        target,
                                    }));
                                }
                            }
                            Err(e) => {
                                run.results.record_unresolved(target);
                                run.reporter.unresolved(target, &e);
                            }
                        }
                    }
                    Err(_) => {
                        warn!("Resolver threads gone with {} targets unresolved", unresolved);
                        unresolved = 0;
                    }
                },
                recv(interrupt) -> _ => {
                    debug!("Scheduler interrupted with {} targets still due", queue.len());
                },
                recv(wake) -> _ => {
                    // Only resolved targets are ever queued
                    if let Some(Reverse(due)) = queue.pop() {
                        if let Some(addr) = addrs[due.target] {
                            let sent_at = self.send_probe(tx, run, arm, &due, addr);
                            issued += 1;

                            if due.round + 1 < self.config.count {
                                queue.push(Reverse(Due {
                                    at: sent_at + self.config.interval,
                                    round: due.round + 1,
                                    target: due.target,
                                }));
                            }
                        }
                    }
                },
            }
        }

        issued
    }

    /// Wait for the resolver threads, unless the run was interrupted
    ///
    /// On a completed run every target has been passed on, so the threads are about to exit. An
    /// interrupted run does not wait for lookups that may still hang.
    fn join_lookups(&self, lookups: Vec<JoinHandle<()>>) {
        if self.interrupt.is_set() {
            trace!("Leaving {} resolver threads behind", lookups.len());
            return;
        }
        for lookup in lookups {
            if lookup.join().is_err() {
                warn!("Error occurred during shut down of resolver thread");
            }
        }
    }

    /// Send a single echo request and arm its timer
    ///
    /// The probe counts as sent even if the transport fails, in which case it is settled as lost
    /// right away. Returns the instant the probe went out.
    fn send_probe(
        &mut self,
        tx: &dyn EchoSender,
        run: &Run,
        arm: &TimerArm,
        due: &Due,
        addr: Ipv4Addr,
    ) -> Instant {
        run.results.record_sent(due.target);

        // Stop time and claim a sequence number, the packet goes out right after
        let sent_at = Instant::now();
        let probe = PendingProbe {
            target: due.target,
            round: due.round,
            sent_at,
        };
        let key = match self.claim_key(&run.registry, probe) {
            Some(key) => key,
            None => {
                warn!("No free sequence number left, probe to {} lost", addr);
                return sent_at;
            }
        };

        let packet = match packet::echo_request(key.id, key.seq, self.config.payload_size) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Could not build echo request for {}: {}", addr, e);
                run.registry.settle(key, ProbeState::TimedOut);
                return sent_at;
            }
        };

        match tx.send_to(&packet, addr) {
            Ok(()) => arm.arm(key, sent_at),
            Err(e) => {
                warn!("Error occurred during send of echo request to {}: {}", addr, e);
                run.registry.settle(key, ProbeState::TimedOut);
            }
        }
        sent_at
    }

    /// Register `probe` under the next sequence number that is not pending
    ///
    /// Sequence numbers wrap around. One that is still pending from a previous lap is skipped.
    /// Returns `None` if every sequence number is taken.
    fn claim_key(&mut self, registry: &Registry, probe: PendingProbe) -> Option<ProbeKey> {
        for _ in 0..=u16::MAX {
            let key = ProbeKey {
                id: self.config.ident,
                seq: self.sequence,
            };
            self.sequence = self.sequence.wrapping_add(1);
            if registry.register(key, probe) {
                return Some(key);
            }
            trace!("Sequence number {} still pending, skipping", key.seq);
        }
        None
    }
}
