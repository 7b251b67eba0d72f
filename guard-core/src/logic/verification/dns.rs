//! DNS resolution behind a trait
//!
//! `SystemResolver` runs each lookup on a helper thread and gives up after
//! the configured timeout. The helper thread is left to finish on its own
//! and keeps its in-flight slot until it does, so a stalled resolver can
//! hold at most `max_in_flight` threads.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use crate::constants::{get_dns_timeout_ms, DNS_MAX_IN_FLIGHT};
use crate::error::DnsError;

pub trait DnsResolver: Send + Sync {
    /// Address -> hostname (PTR)
    fn reverse(&self, addr: IpAddr) -> Result<String, DnsError>;

    /// Hostname -> addresses (A / AAAA)
    fn forward(&self, hostname: &str) -> Result<Vec<IpAddr>, DnsError>;
}

// ============================================================================
// SYSTEM RESOLVER
// ============================================================================

/// Held by a helper thread for the lifetime of its lookup
struct InFlightSlot(Arc<AtomicUsize>);

impl InFlightSlot {
    fn acquire(counter: &Arc<AtomicUsize>, max: usize) -> Result<Self, DnsError> {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .map_err(DnsError::Saturated)?;
        Ok(Self(counter.clone()))
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct SystemResolver {
    timeout: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: usize,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: DNS_MAX_IN_FLIGHT,
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Lookup threads currently alive
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn from_env() -> Self {
        Self::new(Duration::from_millis(get_dns_timeout_ms()))
    }

    fn with_timeout<T, F>(&self, lookup: F) -> Result<T, DnsError>
    where
        T: Send + 'static,
        F: FnOnce() -> std::io::Result<T> + Send + 'static,
    {
        let slot = InFlightSlot::acquire(&self.in_flight, self.max_in_flight)?;
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("dns-lookup".to_string())
            .spawn(move || {
                let _slot = slot;
                // Receiver may be gone after a timeout
                let _ = tx.send(lookup());
            })
            .map_err(|e| DnsError::Lookup(format!("spawn failed: {}", e)))?;

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(DnsError::Lookup(e.to_string())),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(DnsError::Timeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(DnsError::Lookup("resolver thread exited".to_string())),
        }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DnsResolver for SystemResolver {
    fn reverse(&self, addr: IpAddr) -> Result<String, DnsError> {
        let hostname = self.with_timeout(move || dns_lookup::lookup_addr(&addr))?;
        // getnameinfo echoes the numeric address when there is no PTR record
        if hostname.parse::<IpAddr>().is_ok() {
            return Err(DnsError::Lookup(format!("no PTR record for {}", addr)));
        }
        Ok(hostname)
    }

    fn forward(&self, hostname: &str) -> Result<Vec<IpAddr>, DnsError> {
        let host = hostname.to_string();
        self.with_timeout(move || dns_lookup::lookup_host(&host))
    }
}

// ============================================================================
// STATIC RESOLVER
// ============================================================================

/// Fixed answers, for tests and air-gapped deployments
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    ptr: HashMap<IpAddr, String>,
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ptr(mut self, addr: IpAddr, hostname: &str) -> Self {
        self.ptr.insert(addr, hostname.to_string());
        self
    }

    pub fn with_host(mut self, hostname: &str, addrs: Vec<IpAddr>) -> Self {
        self.hosts.insert(hostname.trim_end_matches('.').to_ascii_lowercase(), addrs);
        self
    }
}

impl DnsResolver for StaticResolver {
    fn reverse(&self, addr: IpAddr) -> Result<String, DnsError> {
        self.ptr
            .get(&addr)
            .cloned()
            .ok_or_else(|| DnsError::Lookup(format!("no PTR record for {}", addr)))
    }

    fn forward(&self, hostname: &str) -> Result<Vec<IpAddr>, DnsError> {
        self.hosts
            .get(&hostname.trim_end_matches('.').to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| DnsError::Lookup(format!("no address for {}", hostname)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_resolver() {
        let addr: IpAddr = "66.249.66.1".parse().unwrap();
        let resolver = StaticResolver::new()
            .with_ptr(addr, "crawl-66-249-66-1.googlebot.com.")
            .with_host("crawl-66-249-66-1.googlebot.com", vec![addr]);

        assert_eq!(resolver.reverse(addr).unwrap(), "crawl-66-249-66-1.googlebot.com.");
        assert_eq!(resolver.forward("CRAWL-66-249-66-1.googlebot.com.").unwrap(), vec![addr]);
        assert!(resolver.reverse("10.0.0.1".parse().unwrap()).is_err());
    }

    #[test]
    fn test_timeout_is_reported() {
        let resolver = SystemResolver::new(Duration::from_millis(20));
        let result: Result<(), DnsError> = resolver.with_timeout(|| {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        });
        assert_eq!(result, Err(DnsError::Timeout));
    }

    #[test]
    fn test_stalled_lookups_are_capped() {
        let resolver = SystemResolver::new(Duration::from_millis(10)).with_max_in_flight(2);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Arc::new(parking_lot::Mutex::new(release_rx));

        for _ in 0..2 {
            let gate = release_rx.clone();
            let result: Result<(), DnsError> = resolver.with_timeout(move || {
                let _ = gate.lock().recv_timeout(Duration::from_secs(5));
                Ok(())
            });
            assert_eq!(result, Err(DnsError::Timeout));
        }
        assert_eq!(resolver.in_flight(), 2);

        // Both timed-out threads are still blocked; no third is started
        let refused: Result<(), DnsError> = resolver.with_timeout(|| Ok(()));
        assert_eq!(refused, Err(DnsError::Saturated(2)));

        drop(release_tx);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while resolver.in_flight() > 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(resolver.in_flight(), 0);
        assert_eq!(resolver.with_timeout(|| Ok(7)), Ok(7));
    }

    #[test]
    fn test_lookup_error_is_reported() {
        let resolver = SystemResolver::new(Duration::from_secs(1));
        let result: Result<(), DnsError> =
            resolver.with_timeout(|| Err(std::io::Error::new(std::io::ErrorKind::Other, "NXDOMAIN")));
        assert!(matches!(result, Err(DnsError::Lookup(msg)) if msg.contains("NXDOMAIN")));
    }
}
