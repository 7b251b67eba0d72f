//! Verification Module - claimed identity vs. origin address
//!
//! # Components
//! - `ranges.rs`: CIDR parsing/matching, built-in ranges and hostname suffixes
//! - `dns.rs`: resolver trait, timeout-bounded system resolver
//! - `verifier.rs`: two-stage verification with verdict cache

pub mod dns;
pub mod ranges;
pub mod verifier;

pub use dns::{DnsResolver, StaticResolver, SystemResolver};
pub use ranges::{parse_address, Cidr};
pub use verifier::{IdentityVerifier, VerificationMethod, VerificationResult};
