//! # FANPING multi-host ping application
//!
//! This crate provides the components of a ping application that probes many hosts at once. One
//! run of the `Engine` consists of the following parts:
//! - The scheduler, which paces echo requests per target (`interval`) and across targets
//!   (`period`) and registers every request in the `Registry` right before it goes out
//! - The `Receiver`, a single listening thread which owns the read side of the socket and
//!   correlates echo replies to pending requests
//! - The `TimeoutManager`, a single thread holding the deadlines of all pending requests
//! - The `Results` aggregator and the `Summary` computed from it once every probe has concluded
//!
//! Each packet is timestamped right before it is passed down to the transport and again right
//! after it has been handed over by the transport. Both timestamps come from the monotonic clock.

#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

use std::time::Duration;

pub mod cli;
pub mod engine;
pub mod logger;
pub mod packet;
pub mod receiver;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod results;
pub mod signal;
pub mod summary;
pub mod target;
pub mod timer;
pub mod transport;

/// Which targets are shown in per-probe output and in the summary
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Display {
    All,
    AliveOnly,
    UnreachableOnly,
}

impl Display {
    /// Return `true` if a target with this many replies passes the filter
    pub fn shows(self, received: usize) -> bool {
        match self {
            Self::All => true,
            Self::AliveOnly => received > 0,
            Self::UnreachableOnly => received == 0,
        }
    }
}

/// Application configuration
///
/// The `Config` will be consumed by the `Engine`. It is scoped to a single run, nothing in it is
/// shared with other runs in the same process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub targets: Vec<String>,
    pub count: usize,
    pub timeout: Duration,
    pub interval: Duration,
    pub period: Duration,
    pub display: Display,
    pub quiet: bool,
    pub show_stats: bool,
    pub ident: u16,
    pub payload_size: usize,
}

impl Config {
    /// Configuration with default timing for the given targets
    pub fn with_targets(targets: Vec<String>) -> Self {
        Self {
            targets,
            ..Self::default()
        }
    }

    /// Return `true` if the summary should be printed after the run
    pub fn wants_summary(&self) -> bool {
        self.quiet || self.show_stats
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            count: 1,
            timeout: Duration::from_millis(500),
            interval: Duration::from_millis(1000),
            period: Duration::from_millis(25),
            display: Display::All,
            quiet: false,
            show_stats: false,
            // Identifier for the packets of this run is the pid
            ident: std::process::id() as u16,
            payload_size: 56,
        }
    }
}
