//! DNS lookup backends.

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::TokioResolver;

use crate::error::Error;

/// Resolve a hostname to the full list of its addresses.
///
/// Implementations return every address the answer contains, in answer
/// order; validation decides what to do with them. An empty list is
/// allowed here and rejected by the caller.
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, Error>;
}

/// Lookup through the system resolver configuration (`/etc/resolv.conf` or
/// the platform equivalent), via hickory.
pub struct SystemLookup {
    resolver: TokioResolver,
}

impl SystemLookup {
    /// Read the system DNS configuration and build a resolver.
    pub fn new() -> Result<Self, Error> {
        let resolver = TokioResolver::builder_tokio()
            .map_err(|e| Error::resolution_failed("system resolver", e.to_string()))?
            .build();
        Ok(Self { resolver })
    }
}

impl std::fmt::Debug for SystemLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemLookup").finish_non_exhaustive()
    }
}

#[async_trait]
impl Lookup for SystemLookup {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, Error> {
        let response = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| Error::resolution_failed(host, e.to_string()))?;

        Ok(response.iter().collect())
    }
}

/// Fixed name-to-address table. Unknown names fail to resolve.
///
/// Useful for tests and for hosts whose addresses are known ahead of time.
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    entries: HashMap<String, Vec<IpAddr>>,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `host` to `addrs`, replacing any previous entry. Order is kept.
    pub fn with(mut self, host: &str, addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        self.entries
            .insert(host.to_lowercase(), addrs.into_iter().collect());
        self
    }
}

#[async_trait]
impl Lookup for StaticLookup {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, Error> {
        self.entries
            .get(&host.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::resolution_failed(host, "no such host"))
    }
}
