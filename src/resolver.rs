use crossbeam::channel::{self, Receiver};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::signal::InterruptSignal;

/// Upper bound of concurrent lookups in a run
const MAX_WORKERS: usize = 8;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("{0}")]
    Lookup(String),

    #[error("no IPv4 address found")]
    NoIpv4Address,
}

impl From<io::Error> for ResolveError {
    fn from(e: io::Error) -> Self {
        Self::Lookup(e.to_string())
    }
}

/// Address of the target at an index of the run's target list, or the reason there is none
pub type Resolution = (usize, Result<Ipv4Addr, ResolveError>);

type Lookup = Box<dyn Fn(&str) -> io::Result<Vec<IpAddr>> + Send + Sync>;

/// Address resolution with a cache that lives as long as the run
///
/// Literal IPv4 addresses are taken as they are, everything else goes through the system resolver
/// via [`dns_lookup`](dns). Each identifier is resolved at most once, failures are cached as well
/// so that an unresolvable host is reported only once.
///
/// [dns]: https://docs.rs/dns-lookup/2.0/dns_lookup/
pub struct Resolver {
    lookup: Lookup,
    cache: Mutex<HashMap<String, Result<Ipv4Addr, ResolveError>>>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::with_lookup(|host| {
            dns_lookup::lookup_host(host).map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
        })
    }

    /// Create a resolver backed by a custom lookup function instead of the system resolver
    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> io::Result<Vec<IpAddr>> + Send + Sync + 'static,
    {
        Self {
            lookup: Box::new(lookup),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `host` to an IPv4 address
    ///
    /// # Errors
    ///
    /// Fails if the lookup fails or the host only has IPv6 addresses.
    pub fn resolve(&self, host: &str) -> Result<Ipv4Addr, ResolveError> {
        if let Some(cached) = self.cache.lock().expect("resolver mutex poisoned").get(host) {
            return cached.clone();
        }

        let resolved = self.resolve_uncached(host);
        match &resolved {
            Ok(addr) => info!("Resolved host {} to IP {}", host, addr),
            Err(e) => debug!("Failed resolving host {}: {}", host, e),
        }

        self.cache
            .lock()
            .expect("resolver mutex poisoned")
            .insert(host.to_string(), resolved.clone());
        resolved
    }

    fn resolve_uncached(&self, host: &str) -> Result<Ipv4Addr, ResolveError> {
        if let Ok(addr) = host.parse::<Ipv4Addr>() {
            return Ok(addr);
        }

        (self.lookup)(host)?
            .into_iter()
            .find_map(|addr| match addr {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .ok_or(ResolveError::NoIpv4Address)
    }
}

/// Resolve all `targets` in the background
///
/// Literal addresses are passed on right away and in input order. Host names are looked up on a
/// pool of worker threads and passed on as soon as each lookup is done, so a slow lookup only
/// delays its own target. The returned channel disconnects once every target has been passed on.
///
/// Workers stop picking up names once `interrupt` fires. A lookup that is already running cannot
/// be cancelled, so the worker handles are returned for the caller to join or leave behind.
pub fn resolve_all(
    resolver: Arc<Resolver>,
    targets: &[String],
    interrupt: &InterruptSignal,
) -> (Receiver<Resolution>, Vec<JoinHandle<()>>) {
    let (done, resolutions) = channel::unbounded();
    let (queue, jobs) = channel::unbounded();

    for (index, target) in targets.iter().enumerate() {
        match target.parse::<Ipv4Addr>() {
            Ok(addr) => {
                let _ = done.send((index, Ok(addr)));
            }
            Err(_) => {
                let _ = queue.send((index, target.clone()));
            }
        }
    }
    drop(queue);

    let workers = jobs.len().min(MAX_WORKERS);
    trace!("Resolving {} host names on {} threads", jobs.len(), workers);

    let handles = (0..workers)
        .map(|_| {
            let resolver = resolver.clone();
            let jobs = jobs.clone();
            let done = done.clone();
            let interrupt = interrupt.clone();
            thread::spawn(move || {
                for (index, host) in jobs.iter() {
                    if interrupt.is_set() {
                        break;
                    }
                    if done.send((index, resolver.resolve(&host))).is_err() {
                        break;
                    }
                }
            })
        })
        .collect();

    (resolutions, handles)
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn counting_resolver(calls: Arc<AtomicUsize>) -> Resolver {
        Resolver::with_lookup(move |host| {
            calls.fetch_add(1, Ordering::SeqCst);
            match host {
                "gateway.test" => Ok(vec![
                    IpAddr::V6(Ipv6Addr::LOCALHOST),
                    IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                ]),
                "v6only.test" => Ok(vec![IpAddr::V6(Ipv6Addr::LOCALHOST)]),
                _ => Err(io::Error::new(io::ErrorKind::NotFound, "unknown host")),
            }
        })
    }

    #[test]
    fn literal_address_skips_lookup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = counting_resolver(calls.clone());

        assert_eq!(
            resolver.resolve("127.0.0.1").unwrap(),
            Ipv4Addr::new(127, 0, 0, 1)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn host_resolves_once_to_first_ipv4() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = counting_resolver(calls.clone());

        for _ in 0..3 {
            assert_eq!(
                resolver.resolve("gateway.test").unwrap(),
                Ipv4Addr::new(10, 0, 0, 1)
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failures_are_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = counting_resolver(calls.clone());

        assert!(matches!(resolver.resolve("nope.test"), Err(ResolveError::Lookup(_))));
        assert!(matches!(resolver.resolve("nope.test"), Err(ResolveError::Lookup(_))));
        assert!(matches!(
            resolver.resolve("v6only.test"),
            Err(ResolveError::NoIpv4Address)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn resolve_all_passes_literals_on_first() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = Arc::new(counting_resolver(calls.clone()));
        let targets: Vec<String> = vec!["gateway.test", "10.0.0.2", "nope.test", "10.0.0.3"]
            .into_iter()
            .map(String::from)
            .collect();

        let (resolutions, workers) = resolve_all(resolver, &targets, &InterruptSignal::new());
        let all: Vec<Resolution> = resolutions.iter().collect();
        for worker in workers {
            worker.join().expect("Resolver thread panicked");
        }

        assert_eq!(all.len(), 4);
        assert_eq!(all[0].0, 1);
        assert_eq!(all[1].0, 3);

        let mut names: Vec<&Resolution> = all[2..].iter().collect();
        names.sort_by_key(|(index, _)| *index);
        assert_eq!(names[0].1.as_ref().ok(), Some(&Ipv4Addr::new(10, 0, 0, 1)));
        assert!(names[1].1.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn slow_lookup_does_not_hold_up_others() {
        let resolver = Arc::new(Resolver::with_lookup(|host| {
            if host == "slow.test" {
                thread::sleep(Duration::from_millis(500));
            }
            Ok(vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9))])
        }));
        let targets = vec!["slow.test".to_string(), "fast.test".to_string()];

        let start = Instant::now();
        let (resolutions, _workers) = resolve_all(resolver, &targets, &InterruptSignal::new());

        let (index, addr) = resolutions.recv().expect("No resolution");
        assert_eq!(index, 1);
        assert!(addr.is_ok());
        assert!(start.elapsed() < Duration::from_millis(300));
    }
}
