//! Connection establishment with dial-time re-validation.
//!
//! Every dial resolves and classifies the destination again. Nothing
//! validated earlier in a request's life is trusted at connect time, which
//! closes the window a DNS-rebinding attacker would use between "the URL was
//! checked" and "the socket was opened".

use std::net::{IpAddr, SocketAddr, SocketAddrV4};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpSocket, TcpStream};
use tracing::{debug, warn};

use crate::error::Error;
use crate::lookup::{Lookup, SystemLookup};
use crate::policy::Policy;
use crate::resolver::{split_host_port, HostResolver};

/// Upper bound on resolution plus TCP connect for one dial.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle time before TCP keep-alive probes start on a dialed connection.
pub const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Network identifiers accepted by [`GuardedDialer::dial`].
///
/// Only IPv4 TCP is supported. `tcp` is accepted as an alias and is still
/// dialed over IPv4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Tcp4,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Tcp4 => "tcp4",
        }
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "tcp4" => Ok(Self::Tcp4),
            other => Err(Error::unsupported_network(other)),
        }
    }
}

/// Dialer that refuses disallowed destinations.
///
/// Cheap to clone; clones share the resolver.
#[derive(Debug, Clone)]
pub struct GuardedDialer {
    resolver: Arc<HostResolver>,
    timeout: Duration,
}

impl GuardedDialer {
    /// Create a dialer over an explicit resolver.
    pub fn new(resolver: HostResolver) -> Self {
        Self {
            resolver: Arc::new(resolver),
            timeout: DIAL_TIMEOUT,
        }
    }

    /// Create a dialer using the system DNS configuration and the default
    /// policy.
    pub fn system() -> Result<Self, Error> {
        let lookup: Arc<dyn Lookup> = Arc::new(SystemLookup::new()?);
        Ok(Self::new(HostResolver::new(lookup)))
    }

    #[cfg(test)]
    pub(crate) fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn resolver(&self) -> &HostResolver {
        &self.resolver
    }

    pub fn policy(&self) -> &Policy {
        self.resolver.policy()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Open a TCP connection to `host_port` over `network`.
    ///
    /// Steps, in order, all within one [`DIAL_TIMEOUT`]:
    /// 1. reject any network but `tcp`/`tcp4`
    /// 2. split `host_port`
    /// 3. validate the host (fresh lookup, every address classified)
    /// 4. connect an IPv4 socket to the chosen address
    ///
    /// The connect never starts before validation finishes. Dropping the
    /// returned future cancels an in-flight lookup or connect.
    pub async fn dial(&self, network: &str, host_port: &str) -> Result<TcpStream, Error> {
        let network = network.parse::<Network>().inspect_err(|_| {
            warn!(network, addr = host_port, "refusing non-tcp4 network");
        })?;

        tokio::time::timeout(self.timeout, self.dial_validated(network, host_port))
            .await
            .map_err(|_| Error::Timeout {
                addr: host_port.to_string(),
                timeout: self.timeout,
            })?
    }

    async fn dial_validated(&self, network: Network, host_port: &str) -> Result<TcpStream, Error> {
        let (host, port) = split_host_port(host_port)?;
        let addr = self.resolve_target(host, port).await?;
        debug!(network = network.as_str(), addr = host_port, target = %addr, "dialing validated address");
        self.connect(addr).await
    }

    /// Validate `host` and pair the chosen IPv4 address with `port`.
    ///
    /// Used by [`dial`](Self::dial) and by the HTTP transport hook, which
    /// calls it once per new connection.
    ///
    /// # Errors
    ///
    /// Validation errors as returned by [`HostResolver::validate_host`],
    /// [`Error::UnsupportedNetwork`] when the chosen address is IPv6, and
    /// [`Error::Timeout`] when resolution exceeds the dial timeout.
    pub async fn resolve_target(&self, host: &str, port: u16) -> Result<SocketAddrV4, Error> {
        let ip = tokio::time::timeout(self.timeout, self.resolver.validate_host(host))
            .await
            .map_err(|_| Error::Timeout {
                addr: host.to_string(),
                timeout: self.timeout,
            })??;

        match ip {
            IpAddr::V4(v4) => Ok(SocketAddrV4::new(v4, port)),
            IpAddr::V6(v6) => {
                warn!(host, ip = %v6, "refusing IPv6 destination");
                Err(Error::unsupported_network("tcp6"))
            }
        }
    }

    async fn connect(&self, addr: SocketAddrV4) -> Result<TcpStream, Error> {
        let connect_err = |e: std::io::Error| Error::Connect {
            addr: addr.to_string(),
            message: e.to_string(),
        };

        let socket = TcpSocket::new_v4().map_err(connect_err)?;
        SockRef::from(&socket)
            .set_tcp_keepalive(&TcpKeepalive::new().with_time(KEEP_ALIVE))
            .map_err(connect_err)?;
        let stream = socket
            .connect(SocketAddr::V4(addr))
            .await
            .map_err(connect_err)?;
        debug!(%addr, "connected");
        Ok(stream)
    }
}

#[cfg(feature = "client")]
impl reqwest::dns::Resolve for GuardedDialer {
    /// Transport hook: reqwest calls this for every connection it opens,
    /// including pool refills and retries. It yields exactly one address,
    /// the validated IPv4 one; the transport supplies the port.
    fn resolve(&self, name: reqwest::dns::Name) -> reqwest::dns::Resolving {
        let dialer = self.clone();
        Box::pin(async move {
            match dialer.resolve_target(name.as_str(), 0).await {
                Ok(addr) => Ok(Box::new(std::iter::once(SocketAddr::V4(addr))) as reqwest::dns::Addrs),
                Err(e) => Err(Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
            }
        })
    }
}
