use std::time::Duration;

use crate::resolver::ResolveError;
use crate::{Config, Display};

/// Per-probe output of a run
///
/// Lines for replies and timeouts are printed as they happen, from whichever thread observed
/// them. Lines of different targets may therefore interleave in any order. Probes are numbered
/// per target starting at 1, independent of the sequence number on the wire.
#[derive(Debug)]
pub struct Reporter {
    names: Vec<String>,
    display: Display,
    quiet: bool,
}

impl Reporter {
    pub fn new(config: &Config) -> Self {
        Self {
            names: config.targets.clone(),
            display: config.display,
            quiet: config.quiet,
        }
    }

    /// Name of the target at `index` as given by the user
    pub fn name(&self, index: usize) -> &str {
        self.names.get(index).map(String::as_str).unwrap_or("?")
    }

    pub fn reply_line(&self, index: usize, probe: usize, rtt: Duration) -> Option<String> {
        if self.quiet || self.display == Display::UnreachableOnly {
            return None;
        }
        Some(format!(
            "{} : [{}], {:.3} ms",
            self.name(index),
            probe,
            rtt.as_secs_f64() * 1000f64
        ))
    }

    pub fn timeout_line(&self, index: usize, probe: usize) -> Option<String> {
        if self.quiet || self.display == Display::AliveOnly {
            return None;
        }
        Some(format!("{} : [{}], timed out", self.name(index), probe))
    }

    /// Print the success line of a probe
    pub fn reply(&self, index: usize, probe: usize, rtt: Duration) {
        if let Some(line) = self.reply_line(index, probe, rtt) {
            println!("{}", line);
        }
    }

    /// Print the loss line of a probe
    pub fn timeout(&self, index: usize, probe: usize) {
        if let Some(line) = self.timeout_line(index, probe) {
            println!("{}", line);
        }
    }

    /// Report a target that could not be resolved
    ///
    /// Called once per target, regardless of the number of probes it would have received.
    pub fn unresolved(&self, index: usize, e: &ResolveError) {
        warn!("{} : cannot resolve: {}", self.name(index), e);
    }
}
