//! # dial_jail
//!
//! SSRF-safe outbound HTTP for Rust.
//!
//! `dial_jail` refuses to open a connection to any private, loopback,
//! link-local, multicast or reserved address. The check runs at the moment
//! a connection is opened, not only when a URL is first accepted, so a
//! hostname that rebinds to an internal address between validation and
//! connect is still refused. Redirects are never followed and only IPv4 is
//! dialed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dial_jail::{ErrorKind, GuardedClient};
//!
//! # async fn example() -> Result<(), dial_jail::Error> {
//! let client = GuardedClient::new()?;
//!
//! let response = client.get("https://example.com/").await?;
//! println!("{}", response.status());
//!
//! let err = client.get("http://169.254.169.254/latest/meta-data").await.unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::BadIpAddress);
//! # Ok(())
//! # }
//! ```
//!
//! The building blocks are public too: [`classify`] for single addresses,
//! [`HostResolver`] for hostnames and [`GuardedDialer`] for raw TCP.

mod classify;
mod denylist;
mod dialer;
mod error;
mod lookup;
mod policy;
mod resolver;
mod target;

#[cfg(feature = "client")]
mod client;
#[cfg(feature = "client")]
mod get;

pub use async_trait::async_trait;
pub use classify::{classify, classify_str, is_disallowed, Classification};
pub use denylist::{denial_ranges, find_denial_range, DenialRange};
pub use dialer::{GuardedDialer, Network, DIAL_TIMEOUT, KEEP_ALIVE};
pub use error::{Error, ErrorKind};
pub use lookup::{Lookup, StaticLookup, SystemLookup};
pub use policy::{Policy, PolicyBuilder};
pub use resolver::{check_host_syntax, split_host_port, HostResolver};
pub use target::{Target, TargetHost};

#[cfg(feature = "client")]
pub use client::{
    ClientConfig, GuardedClient, GuardedClientBuilder, REQUEST_TIMEOUT, TLS_HANDSHAKE_TIMEOUT,
};
#[cfg(feature = "client")]
pub use get::{get, get_sync};
