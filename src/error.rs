//! Error types for dial_jail.

use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors produced while validating or connecting to a destination.
///
/// Every variant carries owned data only, so an `Error` raised deep inside
/// the HTTP transport can be cloned back out of the transport's error chain
/// and handed to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// `host:port` could not be split into a host and a numeric port.
    #[error("malformed address {addr}: {reason}")]
    MalformedAddress { addr: String, reason: String },

    /// Hostname rejected, either syntactically or because it resolves to a
    /// disallowed address.
    #[error("bad host is detected: {host} - {reason}")]
    BadHost { host: String, reason: String },

    /// Literal IP address rejected by classification.
    #[error("bad ip is detected: {ip} - {reason}")]
    BadIpAddress { ip: IpAddr, reason: String },

    /// Connection requested over anything other than IPv4 TCP.
    #[error("unsupported network {network}: only tcp4 connections are allowed")]
    UnsupportedNetwork { network: String },

    /// DNS lookup failed or returned no addresses.
    #[error("DNS resolution failed for {host}: {message}")]
    ResolutionFailed { host: String, message: String },

    /// Input could not be parsed as an IP address.
    #[error("invalid IP address {input}: {reason}")]
    InvalidIpAddress { input: String, reason: String },

    /// Invalid URL syntax or forbidden scheme.
    #[error("Invalid URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A policy rule could not be parsed.
    #[error("invalid policy rule {rule}: {reason}")]
    InvalidPolicy { rule: String, reason: String },

    /// The TCP connect to a validated address failed.
    #[error("connection to {addr} failed: {message}")]
    Connect { addr: String, message: String },

    /// Resolution, connect or the whole request exceeded its deadline.
    #[error("{addr} timed out after {timeout:?}")]
    Timeout { addr: String, timeout: Duration },

    /// The server answered with a redirect and the client refused it.
    #[cfg(feature = "client")]
    #[error("redirect attempted: {url} -> {location}")]
    RedirectRefused { url: String, location: String },

    /// HTTP request failed for a reason unrelated to destination policy.
    #[cfg(feature = "client")]
    #[error("HTTP error for {url}: {message}")]
    Http { url: String, message: String },
}

/// Field-less discriminant of [`Error`], for matching on why a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedAddress,
    BadHost,
    BadIpAddress,
    UnsupportedNetwork,
    ResolutionFailed,
    InvalidIpAddress,
    InvalidUrl,
    InvalidPolicy,
    Connect,
    Timeout,
    RedirectRefused,
    Http,
}

impl Error {
    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedAddress { .. } => ErrorKind::MalformedAddress,
            Self::BadHost { .. } => ErrorKind::BadHost,
            Self::BadIpAddress { .. } => ErrorKind::BadIpAddress,
            Self::UnsupportedNetwork { .. } => ErrorKind::UnsupportedNetwork,
            Self::ResolutionFailed { .. } => ErrorKind::ResolutionFailed,
            Self::InvalidIpAddress { .. } => ErrorKind::InvalidIpAddress,
            Self::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Self::InvalidPolicy { .. } => ErrorKind::InvalidPolicy,
            Self::Connect { .. } => ErrorKind::Connect,
            Self::Timeout { .. } => ErrorKind::Timeout,
            #[cfg(feature = "client")]
            Self::RedirectRefused { .. } => ErrorKind::RedirectRefused,
            #[cfg(feature = "client")]
            Self::Http { .. } => ErrorKind::Http,
        }
    }

    /// True when the destination was refused by policy rather than failing
    /// on the network.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MalformedAddress
                | ErrorKind::BadHost
                | ErrorKind::BadIpAddress
                | ErrorKind::UnsupportedNetwork
                | ErrorKind::ResolutionFailed
                | ErrorKind::RedirectRefused
        )
    }

    /// Find a dial_jail error anywhere in the source chain of `err`.
    ///
    /// Errors raised by the dialer or the redirect policy reach the caller
    /// wrapped by the HTTP stack; this digs them back out.
    pub fn find_in<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a Error> {
        let mut current = Some(err);
        while let Some(e) = current {
            if let Some(found) = e.downcast_ref::<Error>() {
                return Some(found);
            }
            current = e.source();
        }
        None
    }

    pub(crate) fn malformed_address(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedAddress {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn bad_host(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadHost {
            host: host.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn bad_ip(ip: IpAddr, reason: impl Into<String>) -> Self {
        Self::BadIpAddress {
            ip,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported_network(network: impl Into<String>) -> Self {
        Self::UnsupportedNetwork {
            network: network.into(),
        }
    }

    pub(crate) fn resolution_failed(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResolutionFailed {
            host: host.into(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_policy(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}
