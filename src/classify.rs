//! Classification of single IP addresses.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::denylist::find_denial_range;
use crate::error::Error;

/// Outcome of classifying one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The address may be dialed. Carries the canonical form: IPv4-mapped
    /// IPv6 addresses are folded to plain IPv4.
    Allowed(IpAddr),
    /// The address must never be dialed.
    Denied(&'static str),
}

impl Classification {
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }

    /// The canonical address, if allowed.
    pub fn allowed(&self) -> Option<IpAddr> {
        match self {
            Self::Allowed(ip) => Some(*ip),
            Self::Denied(_) => None,
        }
    }
}

/// Classify an IP address.
///
/// Pure and total: the same input always yields the same result, and
/// nothing is cached between calls.
pub fn classify(ip: IpAddr) -> Classification {
    match ip {
        IpAddr::V4(ipv4) => classify_v4(ipv4),
        IpAddr::V6(ipv6) => classify_v6(ipv6),
    }
}

/// Shorthand for `classify(ip).is_denied()`.
pub fn is_disallowed(ip: IpAddr) -> bool {
    classify(ip).is_denied()
}

/// Parse and classify a textual IP address.
///
/// Unparsable input is an [`Error::InvalidIpAddress`], never a verdict.
/// Surrounding brackets on IPv6 literals are accepted.
pub fn classify_str(input: &str) -> Result<Classification, Error> {
    let trimmed = input
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(input);
    let ip = trimmed
        .parse::<IpAddr>()
        .map_err(|e| Error::InvalidIpAddress {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
    Ok(classify(ip))
}

fn classify_v4(ip: Ipv4Addr) -> Classification {
    if ip.is_broadcast() {
        return Classification::Denied("limited broadcast address 255.255.255.255");
    }
    if let Some(reason) = ipv4_non_global_unicast(ip) {
        return Classification::Denied(reason);
    }
    if let Some(range) = find_denial_range(ip) {
        return Classification::Denied(range.label());
    }
    Classification::Allowed(IpAddr::V4(ip))
}

fn classify_v6(ip: Ipv6Addr) -> Classification {
    if let Some(ipv4) = ip.to_ipv4_mapped() {
        return classify_v4(ipv4);
    }

    if let Some(reason) = ipv6_non_global_unicast(ip) {
        return Classification::Denied(reason);
    }

    // Deprecated IPv4-compatible form (::a.b.c.d). :: and ::1 were handled above.
    let segments = ip.segments();
    if segments[0..6] == [0, 0, 0, 0, 0, 0] {
        let [a, b] = segments[6].to_be_bytes();
        let [c, d] = segments[7].to_be_bytes();
        if let Classification::Denied(reason) = classify_v4(Ipv4Addr::new(a, b, c, d)) {
            return Classification::Denied(reason);
        }
    }

    Classification::Allowed(IpAddr::V6(ip))
}

/// Reason `ip` is not IPv4 global unicast, if it is not.
fn ipv4_non_global_unicast(ip: Ipv4Addr) -> Option<&'static str> {
    if ip.is_unspecified() {
        Some("unspecified address 0.0.0.0")
    } else if ip.is_loopback() {
        Some("loopback range 127.0.0.0/8")
    } else if ip.is_link_local() {
        Some("link-local range 169.254.0.0/16")
    } else if ip.is_multicast() {
        Some("multicast range 224.0.0.0/4")
    } else {
        None
    }
}

fn ipv6_non_global_unicast(ip: Ipv6Addr) -> Option<&'static str> {
    if ip.is_unspecified() {
        Some("unspecified address ::")
    } else if ip.is_loopback() {
        Some("loopback address ::1")
    } else if ip.is_multicast() {
        Some("multicast range ff00::/8")
    } else if (ip.segments()[0] & 0xffc0) == 0xfe80 {
        Some("link-local range fe80::/10")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denied(s: &str) -> bool {
        classify_str(s).unwrap().is_denied()
    }

    #[test]
    fn test_loopback_denied() {
        assert!(denied("127.0.0.1"));
        assert!(denied("127.255.255.255"));
        assert!(denied("::1"));
    }

    #[test]
    fn test_public_allowed() {
        assert!(!denied("8.8.8.8"));
        assert!(!denied("93.184.216.34"));
        assert!(!denied("2001:4860:4860::8888"));
    }

    #[test]
    fn test_global_unicast_edges() {
        // Only the exact unspecified and broadcast addresses are special.
        assert!(denied("0.0.0.0"));
        assert!(!denied("0.0.0.1"));
        assert!(denied("255.255.255.255"));
        assert!(!denied("255.255.255.254"));
        assert!(!denied("240.0.0.0"));
    }

    #[test]
    fn test_ipv4_mapped_uses_ipv4_rules() {
        assert!(denied("::ffff:0.0.0.0"));
        assert!(denied("::ffff:127.0.0.1"));
        assert!(denied("::ffff:7f00:1"));
        assert!(denied("::ffff:10.0.0.1"));
        assert!(denied("::ffff:100.64.0.1"));

        let mapped_public = classify_str("::ffff:8.8.8.8").unwrap();
        assert_eq!(
            mapped_public,
            Classification::Allowed("8.8.8.8".parse().unwrap())
        );
    }

    #[test]
    fn test_ipv4_compatible_embedding() {
        assert!(denied("::127.0.0.1"));
        assert!(denied("::169.254.169.254"));
        assert!(denied("::192.168.0.1"));
    }

    #[test]
    fn test_ipv6_non_global() {
        assert!(denied("::"));
        assert!(denied("fe80::"));
        assert!(denied("fe80::1"));
        assert!(denied("febf:ffff::1"));
        assert!(denied("ff02::1"));
        assert!(!denied("fec0::1"));
    }

    #[test]
    fn test_denied_reason_names_range() {
        match classify_str("192.168.1.1").unwrap() {
            Classification::Denied(reason) => assert!(reason.contains("192.168.0.0/16")),
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn test_bracketed_literal() {
        assert!(denied("[::1]"));
    }

    #[test]
    fn test_unparsable_is_error() {
        let err = classify_str("not-an-ip").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidIpAddress);

        let err = classify_str("256.0.0.1").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidIpAddress);
    }

    #[test]
    fn test_idempotent() {
        for s in ["10.1.2.3", "8.8.8.8", "::1", "2001:db8::1"] {
            let ip: IpAddr = s.parse().unwrap();
            assert_eq!(classify(ip), classify(ip));
        }
    }
}
