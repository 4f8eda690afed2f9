//! Reserved and special-use IPv4 ranges that are never dialed.

use std::net::Ipv4Addr;
use std::sync::LazyLock;

use ipnet::Ipv4Net;

/// Ranges denied on top of the global-unicast check.
///
/// Loopback, link-local, multicast and the unspecified address are not
/// listed here; they fail the global-unicast check first.
const DENIED_CIDRS: &[(&str, &str)] = &[
    ("10.0.0.0/8", "private-use range 10.0.0.0/8"),
    ("172.16.0.0/12", "private-use range 172.16.0.0/12"),
    ("192.168.0.0/16", "private-use range 192.168.0.0/16"),
    ("100.64.0.0/10", "shared address space 100.64.0.0/10"),
    ("198.18.0.0/15", "benchmarking range 198.18.0.0/15"),
    ("192.0.2.0/24", "documentation range TEST-NET-1 192.0.2.0/24"),
    ("198.51.100.0/24", "documentation range TEST-NET-2 198.51.100.0/24"),
    ("203.0.113.0/24", "documentation range TEST-NET-3 203.0.113.0/24"),
    ("192.88.99.0/24", "6to4 relay anycast 192.88.99.0/24"),
];

/// One entry of the denial table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenialRange {
    net: Ipv4Net,
    label: &'static str,
}

impl DenialRange {
    /// The CIDR block.
    pub fn net(&self) -> Ipv4Net {
        self.net
    }

    /// Human readable description, used as the rejection reason.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Whether `ip` falls inside this range.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.net.contains(&ip)
    }
}

static DENIAL_RANGES: LazyLock<Vec<DenialRange>> = LazyLock::new(|| {
    DENIED_CIDRS
        .iter()
        .map(|&(cidr, label)| {
            let net = cidr
                .parse::<Ipv4Net>()
                .unwrap_or_else(|e| panic!("denial range {} must be parsed: {}", cidr, e));
            DenialRange { net, label }
        })
        .collect()
});

/// The process-wide denial table.
///
/// Built on first access and read-only afterwards. A malformed constant
/// panics here, so a broken table can never be used partially.
pub fn denial_ranges() -> &'static [DenialRange] {
    &DENIAL_RANGES
}

/// Build the denial table now instead of on first lookup.
pub fn force() {
    LazyLock::force(&DENIAL_RANGES);
}

/// Return the first denial range containing `ip`, if any.
pub fn find_denial_range(ip: Ipv4Addr) -> Option<&'static DenialRange> {
    denial_ranges().iter().find(|range| range.contains(ip))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_complete() {
        assert_eq!(denial_ranges().len(), DENIED_CIDRS.len());
    }

    #[test]
    fn test_force_builds_table() {
        force();
        force();
        assert_eq!(DENIAL_RANGES.len(), DENIED_CIDRS.len());
    }

    #[test]
    fn test_ranges_are_network_addresses() {
        // A host bit set in a constant would silently widen or shift the range.
        for range in denial_ranges() {
            assert_eq!(range.net(), range.net().trunc(), "{}", range.label());
        }
    }

    #[test]
    fn test_find_denial_range() {
        let hit = find_denial_range(Ipv4Addr::new(172, 20, 1, 1)).unwrap();
        assert!(hit.label().contains("172.16.0.0/12"));

        assert!(find_denial_range(Ipv4Addr::new(8, 8, 8, 8)).is_none());
        // Loopback is handled by the global-unicast check, not the table.
        assert!(find_denial_range(Ipv4Addr::LOCALHOST).is_none());
    }

    #[test]
    fn test_range_edges() {
        let benchmark = find_denial_range(Ipv4Addr::new(198, 19, 255, 255)).unwrap();
        assert!(benchmark.contains(Ipv4Addr::new(198, 18, 0, 0)));
        assert!(!benchmark.contains(Ipv4Addr::new(198, 20, 0, 0)));
        assert!(!benchmark.contains(Ipv4Addr::new(198, 17, 255, 255)));
    }
}
