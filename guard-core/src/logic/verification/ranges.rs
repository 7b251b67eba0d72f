//! Network ranges and hostname suffixes per crawler identity
//!
//! CIDR membership is a plain integer-mask comparison (u32 for IPv4,
//! u128 for IPv6). No network access happens here.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use once_cell::sync::Lazy;

use crate::error::ValidationError;

// ============================================================================
// CIDR
// ============================================================================

/// A parsed, canonical CIDR block (host bits cleared)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cidr {
    V4 { network: u32, prefix: u8 },
    V6 { network: u128, prefix: u8 },
}

fn mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn mask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl Cidr {
    /// Parse `addr/prefix`; a bare address is a single-host block
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidCidr(input.to_string());
        let trimmed = input.trim();
        let (addr_part, prefix_part) = match trimmed.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (trimmed, None),
        };

        let addr: IpAddr = addr_part.parse().map_err(|_| invalid())?;
        match addr {
            IpAddr::V4(v4) => {
                let prefix = match prefix_part {
                    Some(p) => p.parse::<u8>().map_err(|_| invalid())?,
                    None => 32,
                };
                if prefix > 32 {
                    return Err(invalid());
                }
                Ok(Cidr::V4 { network: u32::from(v4) & mask_v4(prefix), prefix })
            }
            IpAddr::V6(v6) => {
                let prefix = match prefix_part {
                    Some(p) => p.parse::<u8>().map_err(|_| invalid())?,
                    None => 128,
                };
                if prefix > 128 {
                    return Err(invalid());
                }
                Ok(Cidr::V6 { network: u128::from(v6) & mask_v6(prefix), prefix })
            }
        }
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self, canonical_ip(addr)) {
            (Cidr::V4 { network, prefix }, IpAddr::V4(v4)) => u32::from(v4) & mask_v4(*prefix) == *network,
            (Cidr::V6 { network, prefix }, IpAddr::V6(v6)) => u128::from(v6) & mask_v6(*prefix) == *network,
            _ => false,
        }
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cidr::V4 { network, prefix } => write!(f, "{}/{}", Ipv4Addr::from(*network), prefix),
            Cidr::V6 { network, prefix } => write!(f, "{}/{}", Ipv6Addr::from(*network), prefix),
        }
    }
}

// ============================================================================
// ADDRESSES
// ============================================================================

/// IPv4-mapped IPv6 (`::ffff:a.b.c.d`) becomes plain IPv4
pub fn canonical_ip(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

/// Validate and canonicalise an origin address
pub fn parse_address(input: &str) -> Result<IpAddr, ValidationError> {
    input
        .trim()
        .parse::<IpAddr>()
        .map(canonical_ip)
        .map_err(|_| ValidationError::InvalidAddress(input.to_string()))
}

/// True when `hostname` equals `suffix` or ends with it at a label boundary
pub fn hostname_has_suffix(hostname: &str, suffix: &str) -> bool {
    let host = hostname.trim().trim_end_matches('.').to_ascii_lowercase();
    let suffix = suffix.trim().trim_start_matches('.').trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() || suffix.is_empty() {
        return false;
    }
    host == suffix || host.ends_with(&format!(".{}", suffix))
}

// ============================================================================
// BUILT-IN TABLES
// ============================================================================

const BUILTIN_RANGES: &[(&str, &[&str])] = &[
    ("GPTBot", &["23.98.142.0/24", "40.84.180.0/22", "13.66.11.96/28"]),
    ("ChatGPT-User", &["23.98.142.0/24", "40.84.180.0/22"]),
    ("ClaudeBot", &["3.128.0.0/9", "52.15.0.0/16", "18.216.0.0/14"]),
    ("PerplexityBot", &["44.214.0.0/16", "52.20.0.0/14"]),
    ("GoogleBot", &["66.249.64.0/19", "66.102.0.0/20"]),
    ("Google-Extended", &["66.249.64.0/19", "66.102.0.0/20"]),
    ("Bytespider", &["110.249.0.0/16", "111.225.0.0/16"]),
    ("FacebookBot", &["69.63.176.0/20", "31.13.24.0/21", "66.220.144.0/20"]),
    ("Applebot-Extended", &["17.0.0.0/8"]),
];

const BUILTIN_SUFFIXES: &[(&str, &str)] = &[
    ("GPTBot", "openai.com"),
    ("ChatGPT-User", "openai.com"),
    ("ClaudeBot", "anthropic.com"),
    ("anthropic-ai", "anthropic.com"),
    ("PerplexityBot", "perplexity.ai"),
    ("GoogleBot", "googlebot.com"),
    ("Google-Extended", "google.com"),
    ("Bytespider", "bytedance.com"),
    ("FacebookBot", "facebook.com"),
    ("Applebot-Extended", "apple.com"),
    ("cohere-ai", "cohere.ai"),
    ("Bingbot", "search.msn.com"),
];

static PARSED_BUILTIN_RANGES: Lazy<Vec<(&'static str, Vec<Cidr>)>> = Lazy::new(|| {
    BUILTIN_RANGES
        .iter()
        .map(|(identity, blocks)| (*identity, blocks.iter().filter_map(|b| Cidr::parse(b).ok()).collect()))
        .collect()
});

/// Built-in blocks for `identity` (case-insensitive)
pub fn builtin_ranges(identity: &str) -> Vec<Cidr> {
    PARSED_BUILTIN_RANGES
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case(identity))
        .flat_map(|(_, blocks)| blocks.iter().copied())
        .collect()
}

pub fn builtin_hostname_suffixes(identity: &str) -> Vec<&'static str> {
    BUILTIN_SUFFIXES
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case(identity))
        .map(|(_, suffix)| *suffix)
        .collect()
}

/// Identities with at least one built-in range or suffix
pub fn known_identities() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = BUILTIN_RANGES
        .iter()
        .map(|(n, _)| *n)
        .chain(BUILTIN_SUFFIXES.iter().map(|(n, _)| *n))
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_canonicalises_host_bits() {
        let cidr = Cidr::parse("66.249.70.1/19").unwrap();
        assert_eq!(cidr.to_string(), "66.249.64.0/19");
        assert_eq!(cidr, Cidr::parse(" 66.249.64.0/19 ").unwrap());
        assert_eq!(Cidr::parse("10.1.2.3").unwrap().to_string(), "10.1.2.3/32");
        assert_eq!(Cidr::parse("2001:db8::1/32").unwrap().to_string(), "2001:db8::/32");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "not-an-ip/8", "10.0.0.0/33", "10.0.0.0/x", "2001:db8::/129", "10.0.0/8"] {
            assert!(matches!(Cidr::parse(bad), Err(ValidationError::InvalidCidr(_))), "{}", bad);
        }
    }

    #[test]
    fn test_contains_v4() {
        let google = Cidr::parse("66.249.64.0/19").unwrap();
        assert!(google.contains(ip("66.249.64.5")));
        assert!(google.contains(ip("66.249.95.255")));
        assert!(!google.contains(ip("66.249.96.0")));
        assert!(!google.contains(ip("8.8.8.8")));

        let everything = Cidr::parse("0.0.0.0/0").unwrap();
        assert!(everything.contains(ip("203.0.113.9")));
        assert!(!everything.contains(ip("2001:db8::1")));
    }

    #[test]
    fn test_contains_v6_and_mapped() {
        let block = Cidr::parse("2001:db8::/32").unwrap();
        assert!(block.contains(ip("2001:db8:ffff::1")));
        assert!(!block.contains(ip("2001:db9::1")));

        let apple = Cidr::parse("17.0.0.0/8").unwrap();
        assert!(apple.contains(ip("::ffff:17.1.2.3")));
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("::ffff:66.249.64.5").unwrap(), ip("66.249.64.5"));
        assert_eq!(parse_address(" 2001:db8::1 ").unwrap(), ip("2001:db8::1"));
        assert!(matches!(parse_address("999.1.1.1"), Err(ValidationError::InvalidAddress(_))));
        assert!(parse_address("").is_err());
    }

    #[test]
    fn test_hostname_suffix_matches_whole_labels() {
        assert!(hostname_has_suffix("crawl-66-249-64-5.googlebot.com.", "googlebot.com"));
        assert!(hostname_has_suffix("CRAWL.GoogleBot.COM", "googlebot.com"));
        assert!(hostname_has_suffix("googlebot.com", ".googlebot.com"));
        assert!(!hostname_has_suffix("evil-googlebot.com", "googlebot.com"));
        assert!(!hostname_has_suffix("googlebot.com.attacker.net", "googlebot.com"));
        assert!(!hostname_has_suffix("", "googlebot.com"));
    }

    #[test]
    fn test_builtin_tables() {
        let ranges = builtin_ranges("googlebot");
        assert_eq!(ranges.len(), 2);
        assert!(ranges.iter().any(|c| c.contains(ip("66.249.64.5"))));
        assert!(builtin_ranges("UnknownBot").is_empty());
        assert_eq!(builtin_hostname_suffixes("claudebot"), vec!["anthropic.com"]);
        assert!(known_identities().contains(&"cohere-ai"));
    }
}
