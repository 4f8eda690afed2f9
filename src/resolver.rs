//! Hostname validation: syntax checks, DNS resolution and classification of
//! every resolved address.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::classify::Classification;
use crate::error::Error;
use crate::lookup::Lookup;
use crate::policy::Policy;

/// Resolves hostnames and decides whether they may be dialed.
///
/// Holds no per-call state; every call to [`validate_host`](Self::validate_host)
/// performs a fresh lookup.
#[derive(Clone)]
pub struct HostResolver {
    lookup: Arc<dyn Lookup>,
    policy: Policy,
}

impl HostResolver {
    /// Create a resolver over `lookup` with the default policy.
    pub fn new(lookup: Arc<dyn Lookup>) -> Self {
        Self {
            lookup,
            policy: Policy::default(),
        }
    }

    /// Replace the policy.
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Validate `host` and return the address to connect to.
    ///
    /// - "localhost" (any case) and hosts containing whitespace are rejected
    ///   without touching DNS.
    /// - A literal IP is classified directly.
    /// - A name is resolved once; every returned address must pass, and the
    ///   first one is chosen. The returned address is canonical
    ///   (IPv4-mapped IPv6 is folded to IPv4).
    ///
    /// # Errors
    ///
    /// - [`Error::BadHost`] for syntactic rejections and for names with any
    ///   disallowed address
    /// - [`Error::BadIpAddress`] for disallowed literal IPs
    /// - [`Error::ResolutionFailed`] when the lookup fails or is empty
    pub async fn validate_host(&self, host: &str) -> Result<IpAddr, Error> {
        check_host_syntax(host)?;
        let normalized = normalize_host(host);

        if let Ok(ip) = normalized.parse::<IpAddr>() {
            return self.validate_ip(ip);
        }

        if let Some(pattern) = self.policy.blocked_host(&normalized) {
            warn!(host = %normalized, pattern, "host blocked by policy");
            return Err(Error::bad_host(
                host,
                format!("blocked by custom policy hostname rule: {}", pattern),
            ));
        }

        let addrs = self.lookup.lookup(&normalized).await?;
        if addrs.is_empty() {
            return Err(Error::resolution_failed(host, "no IP addresses found"));
        }

        let mut chosen = None;
        for &ip in &addrs {
            match self.policy.check_ip(ip) {
                Classification::Denied(reason) => {
                    warn!(host = %normalized, %ip, reason, "host resolves to a disallowed address");
                    return Err(Error::bad_host(host, format!("resolves to {}: {}", ip, reason)));
                }
                Classification::Allowed(canonical) => {
                    chosen.get_or_insert(canonical);
                }
            }
        }

        let ip = chosen.ok_or_else(|| Error::resolution_failed(host, "no IP addresses found"))?;
        debug!(host = %normalized, %ip, candidates = addrs.len(), "host validated");
        Ok(ip)
    }

    /// Classify a literal address under this resolver's policy.
    pub fn validate_ip(&self, ip: IpAddr) -> Result<IpAddr, Error> {
        match self.policy.check_ip(ip) {
            Classification::Allowed(canonical) => Ok(canonical),
            Classification::Denied(reason) => {
                warn!(%ip, reason, "literal address rejected");
                Err(Error::bad_ip(ip, reason))
            }
        }
    }
}

impl std::fmt::Debug for HostResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostResolver")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Reject hosts that must never reach DNS.
pub fn check_host_syntax(host: &str) -> Result<(), Error> {
    if host.is_empty() {
        return Err(Error::bad_host(host, "empty hostname"));
    }
    if host.chars().any(char::is_whitespace) {
        warn!(host, "hostname contains whitespace");
        return Err(Error::bad_host(host, "hostname contains whitespace"));
    }
    if normalize_host(host) == "localhost" {
        warn!(host, "localhost rejected");
        return Err(Error::bad_host(host, "localhost is never allowed"));
    }
    Ok(())
}

/// Lowercase, drop one trailing dot and IPv6 brackets.
fn normalize_host(host: &str) -> String {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    let host = host.strip_suffix('.').unwrap_or(host);
    host.to_ascii_lowercase()
}

/// Split `host:port` (or `[v6]:port`) into its parts.
///
/// # Errors
///
/// [`Error::MalformedAddress`] when the port is missing or not a number,
/// when brackets are unbalanced, or when an IPv6 host is not bracketed.
pub fn split_host_port(addr: &str) -> Result<(&str, u16), Error> {
    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| Error::malformed_address(addr, "missing ']' in address"))?;
        let port = rest[end + 1..]
            .strip_prefix(':')
            .ok_or_else(|| Error::malformed_address(addr, "missing port in address"))?;
        (&rest[..end], port)
    } else {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| Error::malformed_address(addr, "missing port in address"))?;
        if host.contains(':') {
            return Err(Error::malformed_address(addr, "too many colons in address"));
        }
        if host.contains(['[', ']']) {
            return Err(Error::malformed_address(addr, "unexpected bracket in address"));
        }
        (host, port)
    };

    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::malformed_address(addr, format!("invalid port {:?}", port)));
    }
    let port = port
        .parse::<u16>()
        .map_err(|e| Error::malformed_address(addr, format!("invalid port: {}", e)))?;

    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::StaticLookup;
    use crate::policy::PolicyBuilder;
    use crate::ErrorKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn resolver(lookup: StaticLookup) -> HostResolver {
        HostResolver::new(Arc::new(lookup))
    }

    /// Counts lookups so tests can prove DNS was never consulted.
    struct CountingLookup {
        inner: StaticLookup,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Lookup for CountingLookup {
        async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.lookup(host).await
        }
    }

    #[tokio::test]
    async fn test_public_host_validates() {
        let r = resolver(StaticLookup::new().with("public.test", [ip("93.184.216.34")]));
        assert_eq!(r.validate_host("public.test").await.unwrap(), ip("93.184.216.34"));
    }

    #[tokio::test]
    async fn test_localhost_rejected_without_lookup() {
        let counting = Arc::new(CountingLookup {
            inner: StaticLookup::new().with("localhost", [ip("8.8.8.8")]),
            calls: AtomicUsize::new(0),
        });
        let r = HostResolver::new(counting.clone());

        for host in ["localhost", "LOCALHOST", "LocalHost", "localhost."] {
            let err = r.validate_host(host).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::BadHost, "{}", host);
        }
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_whitespace_rejected() {
        let r = resolver(StaticLookup::new());
        for host in ["host has space", "tab\there", "trailing\n", " leading"] {
            let err = r.validate_host(host).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::BadHost, "{:?}", host);
        }
    }

    #[tokio::test]
    async fn test_literal_ip_skips_lookup() {
        let r = resolver(StaticLookup::new());
        let err = r.validate_host("127.0.0.1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadIpAddress);

        let err = r.validate_host("[::1]").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadIpAddress);

        assert_eq!(r.validate_host("8.8.8.8").await.unwrap(), ip("8.8.8.8"));
    }

    #[tokio::test]
    async fn test_any_bad_address_rejects_host() {
        let r = resolver(
            StaticLookup::new()
                .with("mixed.test", [ip("8.8.8.8"), ip("10.0.0.1")])
                .with("mixed-first.test", [ip("127.0.0.1"), ip("8.8.8.8")]),
        );

        let err = r.validate_host("mixed.test").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadHost);
        assert!(err.to_string().contains("10.0.0.1"));

        let err = r.validate_host("mixed-first.test").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadHost);
    }

    #[tokio::test]
    async fn test_first_address_chosen() {
        let r = resolver(StaticLookup::new().with("multi.test", [ip("1.1.1.1"), ip("8.8.8.8")]));
        assert_eq!(r.validate_host("multi.test").await.unwrap(), ip("1.1.1.1"));
    }

    #[tokio::test]
    async fn test_mapped_answer_is_canonicalized() {
        let r = resolver(StaticLookup::new().with("mapped.test", [ip("::ffff:8.8.8.8")]));
        assert_eq!(r.validate_host("mapped.test").await.unwrap(), ip("8.8.8.8"));

        let r = resolver(StaticLookup::new().with("mapped-bad.test", [ip("::ffff:0.0.0.0")]));
        let err = r.validate_host("mapped-bad.test").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadHost);
    }

    #[tokio::test]
    async fn test_rebinding_is_caught_on_every_call() {
        // The same name answered differently on consecutive lookups.
        struct Rebinding(AtomicUsize);

        #[async_trait]
        impl Lookup for Rebinding {
            async fn lookup(&self, _host: &str) -> Result<Vec<IpAddr>, Error> {
                if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(vec!["8.8.8.8".parse().unwrap()])
                } else {
                    Ok(vec!["169.254.169.254".parse().unwrap()])
                }
            }
        }

        let r = HostResolver::new(Arc::new(Rebinding(AtomicUsize::new(0))));
        assert!(r.validate_host("rebind.test").await.is_ok());
        let err = r.validate_host("rebind.test").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadHost);
    }

    #[tokio::test]
    async fn test_resolution_failures() {
        let r = resolver(StaticLookup::new().with("empty.test", Vec::new()));

        let err = r.validate_host("empty.test").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResolutionFailed);

        let err = r.validate_host("missing.test").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResolutionFailed);
    }

    #[tokio::test]
    async fn test_policy_host_rule() {
        let policy = PolicyBuilder::new()
            .block_host("*.corp.test")
            .build()
            .unwrap();
        let r = resolver(StaticLookup::new().with("api.corp.test", [ip("8.8.8.8")])).with_policy(policy);

        let err = r.validate_host("API.corp.test").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadHost);
        assert!(err.to_string().contains("*.corp.test"));
    }

    #[tokio::test]
    async fn test_policy_allow_does_not_override_localhost() {
        let policy = PolicyBuilder::new()
            .allow_cidr("127.0.0.0/8")
            .build()
            .unwrap();
        let r = resolver(StaticLookup::new().with("app.test", [ip("127.0.0.1")])).with_policy(policy);

        assert_eq!(r.validate_host("app.test").await.unwrap(), ip("127.0.0.1"));
        assert_eq!(
            r.validate_host("localhost").await.unwrap_err().kind(),
            ErrorKind::BadHost
        );
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("example.com:80").unwrap(), ("example.com", 80));
        assert_eq!(split_host_port("1.2.3.4:443").unwrap(), ("1.2.3.4", 443));
        assert_eq!(split_host_port("[::1]:8080").unwrap(), ("::1", 8080));
        assert_eq!(split_host_port(":80").unwrap(), ("", 80));
    }

    #[test]
    fn test_split_host_port_malformed() {
        for addr in [
            "example.com",
            "example.com:",
            "example.com:http",
            "example.com:65536",
            "::1:80",
            "[::1]80",
            "[::1:80",
            "exa]mple.com:80",
            "example.com:+80",
        ] {
            let err = split_host_port(addr).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedAddress, "{}", addr);
        }
    }
}
