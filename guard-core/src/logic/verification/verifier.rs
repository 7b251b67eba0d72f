//! Identity Verifier
//!
//! Confirms a claimed crawler identity against its origin address:
//! 1. IP-range check (built-in + admin ranges, no network)
//! 2. Reverse DNS -> hostname suffix -> forward DNS confirmation
//!
//! Verdicts are cached per (identity, address): successes for 24h,
//! failures for 6h. A saturated resolver gives an undetermined verdict,
//! which is not cached.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use super::dns::DnsResolver;
use super::ranges::{builtin_hostname_suffixes, builtin_ranges, hostname_has_suffix, parse_address, Cidr};
use crate::constants::{VERIFY_CACHE_MAX_SIZE, VERIFY_FAILURE_TTL_SECS, VERIFY_SUCCESS_TTL_SECS};
use crate::error::DnsError;
use crate::logic::events::{EventSink, GuardEvent};
use crate::logic::{field_digest, unix_now};
use crate::settings::{GuardSettings, SettingsSource};

// ============================================================================
// RESULT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    IpRange,
    ReverseDns,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::IpRange => "ip_range",
            VerificationMethod::ReverseDns => "reverse_dns",
        }
    }
}

/// `verified` is `None` when no verdict could be formed (disabled, bad address)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    verified: Option<bool>,
    method: Option<VerificationMethod>,
}

impl VerificationResult {
    pub fn verified(method: VerificationMethod) -> Self {
        Self { verified: Some(true), method: Some(method) }
    }

    pub fn failed() -> Self {
        Self { verified: Some(false), method: None }
    }

    pub fn undetermined() -> Self {
        Self { verified: None, method: None }
    }

    pub fn is_verified(&self) -> Option<bool> {
        self.verified
    }

    pub fn method(&self) -> Option<VerificationMethod> {
        self.method
    }
}

// ============================================================================
// CACHE
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct CachedVerdict {
    result: VerificationResult,
    stored_at: i64,
    expires_at: i64,
}

enum DnsVerdict {
    Confirmed,
    Rejected,
    Unavailable,
}

fn lookup_failed(what: &str, target: &str, err: DnsError) -> DnsVerdict {
    match err {
        DnsError::Saturated(n) => {
            log::warn!("{} of {} skipped: {} lookups in flight", what, target, n);
            DnsVerdict::Unavailable
        }
        other => {
            log::debug!("{} of {} failed: {}", what, target, other);
            DnsVerdict::Rejected
        }
    }
}

fn cache_key(identity: &str, addr: &IpAddr) -> String {
    field_digest(&[&identity.to_ascii_lowercase(), &addr.to_string()])
}

// ============================================================================
// VERIFIER
// ============================================================================

pub struct IdentityVerifier {
    settings: Arc<dyn SettingsSource>,
    resolver: Arc<dyn DnsResolver>,
    events: Arc<dyn EventSink>,
    cache: Mutex<HashMap<String, CachedVerdict>>,
    max_cache: usize,
}

impl IdentityVerifier {
    pub fn new(settings: Arc<dyn SettingsSource>, resolver: Arc<dyn DnsResolver>, events: Arc<dyn EventSink>) -> Self {
        Self {
            settings,
            resolver,
            events,
            cache: Mutex::new(HashMap::new()),
            max_cache: VERIFY_CACHE_MAX_SIZE,
        }
    }

    pub fn with_cache_capacity(mut self, max_cache: usize) -> Self {
        self.max_cache = max_cache.max(1);
        self
    }

    pub fn verify(&self, identity: &str, origin_address: &str) -> VerificationResult {
        self.verify_at(identity, origin_address, unix_now())
    }

    pub fn verify_at(&self, identity: &str, origin_address: &str, now: i64) -> VerificationResult {
        let settings = self.settings.snapshot();
        if !settings.verification_enabled {
            return VerificationResult::undetermined();
        }

        let addr = match parse_address(origin_address) {
            Ok(addr) => addr,
            Err(e) => {
                log::warn!("Verification skipped for {}: {}", identity, e);
                return VerificationResult::undetermined();
            }
        };

        let key = cache_key(identity, &addr);
        if let Some(hit) = self.cached(&key, now) {
            return hit;
        }

        let result = if self.in_known_range(&settings, identity, addr) {
            VerificationResult::verified(VerificationMethod::IpRange)
        } else {
            match self.confirm_by_dns(&settings, identity, addr) {
                DnsVerdict::Confirmed => {
                    log::debug!("{} at {} verified via reverse DNS", identity, addr);
                    VerificationResult::verified(VerificationMethod::ReverseDns)
                }
                DnsVerdict::Rejected => {
                    log::warn!("Identity verification failed: {} from {}", identity, addr);
                    self.events.emit(GuardEvent::VerificationFailed {
                        identity: identity.to_string(),
                        origin_address: addr.to_string(),
                    });
                    VerificationResult::failed()
                }
                // Local capacity says nothing about the claim; ask again next time
                DnsVerdict::Unavailable => return VerificationResult::undetermined(),
            }
        };

        let ttl = if result.verified == Some(true) { VERIFY_SUCCESS_TTL_SECS } else { VERIFY_FAILURE_TTL_SECS };
        self.store(key, result, now, ttl);
        result
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }

    /// Forget every verdict (after admin range changes)
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    fn in_known_range(&self, settings: &GuardSettings, identity: &str, addr: IpAddr) -> bool {
        if builtin_ranges(identity).iter().any(|c| c.contains(addr)) {
            return true;
        }
        settings.ranges_for(identity).into_iter().any(|raw| match Cidr::parse(raw) {
            Ok(cidr) => cidr.contains(addr),
            Err(e) => {
                log::warn!("Ignoring custom range for {}: {}", identity, e);
                false
            }
        })
    }

    fn confirm_by_dns(&self, settings: &GuardSettings, identity: &str, addr: IpAddr) -> DnsVerdict {
        let mut suffixes: Vec<&str> = builtin_hostname_suffixes(identity);
        suffixes.extend(settings.hostname_suffixes_for(identity));
        if suffixes.is_empty() {
            return DnsVerdict::Rejected;
        }

        let hostname = match self.resolver.reverse(addr) {
            Ok(h) => h,
            Err(e) => return lookup_failed("Reverse lookup", &addr.to_string(), e),
        };

        if !suffixes.iter().any(|s| hostname_has_suffix(&hostname, s)) {
            log::debug!("Hostname {} does not belong to {}", hostname, identity);
            return DnsVerdict::Rejected;
        }

        match self.resolver.forward(hostname.trim_end_matches('.')) {
            Ok(addrs) if addrs.iter().copied().map(super::ranges::canonical_ip).any(|a| a == addr) => {
                DnsVerdict::Confirmed
            }
            Ok(_) => DnsVerdict::Rejected,
            Err(e) => lookup_failed("Forward lookup", &hostname, e),
        }
    }

    fn cached(&self, key: &str, now: i64) -> Option<VerificationResult> {
        let mut cache = self.cache.lock();
        match cache.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.result),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: String, result: VerificationResult, now: i64, ttl: i64) {
        let mut cache = self.cache.lock();
        if cache.len() >= self.max_cache && !cache.contains_key(&key) {
            cache.retain(|_, v| now < v.expires_at);
            if cache.len() >= self.max_cache {
                // Evict the older half
                let mut ages: Vec<(String, i64)> = cache.iter().map(|(k, v)| (k.clone(), v.stored_at)).collect();
                ages.sort_by_key(|(_, stored_at)| *stored_at);
                for (k, _) in ages.into_iter().take(cache.len() / 2) {
                    cache.remove(&k);
                }
            }
        }
        cache.insert(key, CachedVerdict { result, stored_at: now, expires_at: now + ttl });
    }
}
