//! Parsing of request URLs into a dialable target.

use std::net::IpAddr;

use url::{Host, Url};

use crate::Error;

/// Host part of a [`Target`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetHost {
    /// A name that still has to be resolved. Normalized: lowercase, no
    /// trailing dot.
    Domain(String),
    /// A literal address. The HTTP transport connects to these without
    /// resolving, so they are classified before the request is sent.
    Ip(IpAddr),
}

/// A parsed http(s) URL.
///
/// The `url` crate already folds decimal, octal, hexadecimal and short-form
/// IPv4 spellings (`http://2130706433/`, `http://0177.1/`) into a literal
/// IPv4 host, so they surface here as [`TargetHost::Ip`] and are classified
/// like any other literal.
#[derive(Debug, Clone)]
pub struct Target {
    url: Url,
    host: TargetHost,
}

impl Target {
    /// Parse a URL string.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidUrl`] if the URL is malformed, uses a scheme other
    /// than http/https, or has no host.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let url = Url::parse(input).map_err(|e| Error::invalid_url(input, e.to_string()))?;
        Self::from_url(url)
    }

    /// Wrap an already parsed URL, with the same checks as [`parse`](Self::parse).
    pub fn from_url(url: Url) -> Result<Self, Error> {
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(Error::invalid_url(
                    url.as_str(),
                    format!("scheme '{}' not allowed, only http/https", scheme),
                ));
            }
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) => {
                let normalized = domain.trim_end_matches('.').to_lowercase();
                if normalized.is_empty() {
                    return Err(Error::invalid_url(url.as_str(), "empty hostname"));
                }
                TargetHost::Domain(normalized)
            }
            Some(Host::Ipv4(ip)) => TargetHost::Ip(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => TargetHost::Ip(IpAddr::V6(ip)),
            None => return Err(Error::invalid_url(url.as_str(), "URL must have a host")),
        };

        Ok(Self { url, host })
    }

    pub fn host(&self) -> &TargetHost {
        &self.host
    }

    /// The host as it appears in the URL (IPv6 in brackets).
    pub fn host_str(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Port, defaulting to 80 for http and 443 for https.
    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(80)
    }

    pub fn is_https(&self) -> bool {
        self.url.scheme() == "https"
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn into_url(self) -> Url {
        self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_parse_domain() {
        let t = Target::parse("https://Example.COM./path?q=1").unwrap();
        assert_eq!(t.host(), &TargetHost::Domain("example.com".to_string()));
        assert_eq!(t.port(), 443);
        assert!(t.is_https());
    }

    #[test]
    fn test_parse_with_port() {
        let t = Target::parse("http://example.com:8080/").unwrap();
        assert_eq!(t.port(), 8080);
        assert!(!t.is_https());
    }

    #[test]
    fn test_parse_ip_literals() {
        let t = Target::parse("http://127.0.0.1/").unwrap();
        assert_eq!(t.host(), &TargetHost::Ip("127.0.0.1".parse().unwrap()));

        let t = Target::parse("http://[::1]:8080/").unwrap();
        assert_eq!(t.host(), &TargetHost::Ip("::1".parse().unwrap()));
        assert_eq!(t.host_str(), "[::1]");
    }

    #[test]
    fn test_alternate_ipv4_spellings_become_literals() {
        for input in ["http://2130706433/", "http://0x7f.0.0.1/", "http://0177.0.0.1/", "http://127.1/"] {
            let t = Target::parse(input).unwrap();
            assert_eq!(t.host(), &TargetHost::Ip("127.0.0.1".parse().unwrap()), "{}", input);
        }
    }

    #[test]
    fn test_reject_non_http_schemes() {
        for input in ["ftp://example.com/", "file:///etc/passwd", "gopher://example.com/"] {
            let err = Target::parse(input).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidUrl, "{}", input);
        }
    }

    #[test]
    fn test_reject_garbage() {
        let err = Target::parse("not a url").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidUrl);
    }
}
