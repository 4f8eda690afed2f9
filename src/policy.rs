//! Caller-supplied overrides on top of the built-in classification.
//!
//! ## Precedence
//!
//! 1. An address matching an allow rule is allowed.
//! 2. An address matching a block rule is denied.
//! 3. Otherwise the built-in classification decides.
//!
//! Hostname rules can only add denials. "localhost" and hostnames with
//! whitespace are rejected before any rule is consulted.
//!
//! ## Security Considerations
//!
//! **Be careful with `allow_cidr`.** It overrides every built-in denial:
//!
//! ```rust
//! use dial_jail::PolicyBuilder;
//!
//! // DANGEROUS: the loopback range becomes reachable.
//! let bad_policy = PolicyBuilder::new()
//!     .allow_cidr("127.0.0.0/8")
//!     .build()
//!     .unwrap();
//! ```

use std::net::IpAddr;

use ipnet::IpNet;

use crate::classify::{classify, Classification};
use crate::error::Error;

/// Immutable set of allow and block rules.
///
/// The default policy has no rules and defers entirely to [`classify`].
#[derive(Debug, Clone, Default)]
pub struct Policy {
    blocked_cidrs: Vec<IpNet>,
    allowed_cidrs: Vec<IpNet>,
    blocked_hosts: Vec<String>,
}

impl Policy {
    /// Start building a policy.
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::new()
    }

    /// Classify `ip` under this policy.
    pub fn check_ip(&self, ip: IpAddr) -> Classification {
        let canonical = canonical(ip);

        if self.allowed_cidrs.iter().any(|net| net.contains(&canonical)) {
            return Classification::Allowed(canonical);
        }

        if self.blocked_cidrs.iter().any(|net| net.contains(&canonical)) {
            return Classification::Denied("blocked by custom policy CIDR rule");
        }

        classify(ip)
    }

    /// Return the pattern that blocks `host`, if any.
    ///
    /// `host` is expected to be normalized (lowercase, no trailing dot).
    pub fn blocked_host(&self, host: &str) -> Option<&str> {
        self.blocked_hosts
            .iter()
            .find(|pattern| matches_hostname_pattern(host, pattern))
            .map(String::as_str)
    }

    /// True when the policy carries no rules.
    pub fn is_default(&self) -> bool {
        self.blocked_cidrs.is_empty() && self.allowed_cidrs.is_empty() && self.blocked_hosts.is_empty()
    }
}

/// Builder for [`Policy`].
///
/// Each method consumes the builder. Malformed CIDR strings are kept and
/// reported by [`build`](Self::build), so a typo can never silently weaken
/// or drop a rule.
#[derive(Debug, Clone, Default)]
pub struct PolicyBuilder {
    blocked_cidrs: Vec<String>,
    allowed_cidrs: Vec<String>,
    blocked_hosts: Vec<String>,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny an IP range (CIDR notation) the built-in rules would allow.
    ///
    /// A bare address is treated as a single-host range.
    pub fn block_cidr(mut self, cidr: &str) -> Self {
        self.blocked_cidrs.push(cidr.to_string());
        self
    }

    /// Allow an IP range (CIDR notation), overriding every denial.
    pub fn allow_cidr(mut self, cidr: &str) -> Self {
        self.allowed_cidrs.push(cidr.to_string());
        self
    }

    /// Deny a hostname. `*.example.com` matches `example.com` and all of its
    /// subdomains.
    pub fn block_host(mut self, pattern: &str) -> Self {
        self.blocked_hosts
            .push(pattern.trim_end_matches('.').to_lowercase());
        self
    }

    /// Build the policy.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPolicy`] naming the first rule that does not parse.
    pub fn build(self) -> Result<Policy, Error> {
        Ok(Policy {
            blocked_cidrs: parse_cidrs(&self.blocked_cidrs)?,
            allowed_cidrs: parse_cidrs(&self.allowed_cidrs)?,
            blocked_hosts: self.blocked_hosts,
        })
    }
}

fn parse_cidrs(rules: &[String]) -> Result<Vec<IpNet>, Error> {
    rules
        .iter()
        .map(|rule| {
            rule.parse::<IpNet>()
                .or_else(|_| rule.parse::<IpAddr>().map(IpNet::from))
                .map_err(|e| Error::invalid_policy(rule, e.to_string()))
        })
        .collect()
}

fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}

/// Match a hostname against a pattern (supports * wildcard).
fn matches_hostname_pattern(host: &str, pattern: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => host == base || host.ends_with(&pattern[1..]),
        None => host == pattern,
    }
}
