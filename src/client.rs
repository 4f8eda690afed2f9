//! HTTP client whose every connection goes through [`GuardedDialer`].

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use reqwest::redirect::{Action, Attempt, Policy as RedirectPolicy};
use reqwest::{Client, Request, Response, Url};
use tracing::{debug, warn};

use crate::denylist;
use crate::dialer::{GuardedDialer, DIAL_TIMEOUT, KEEP_ALIVE};
use crate::error::Error;
use crate::lookup::{Lookup, SystemLookup};
use crate::policy::Policy;
use crate::resolver::HostResolver;
use crate::target::{Target, TargetHost};

/// Upper bound on a whole request, including reading the response headers.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on the TLS handshake of a new connection.
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// The fixed timeouts of a [`GuardedClient`].
///
/// These are part of the security posture and cannot be changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    request_timeout: Duration,
    dial_timeout: Duration,
    keep_alive: Duration,
    tls_handshake_timeout: Duration,
}

impl ClientConfig {
    const FIXED: Self = Self {
        request_timeout: REQUEST_TIMEOUT,
        dial_timeout: DIAL_TIMEOUT,
        keep_alive: KEEP_ALIVE,
        tls_handshake_timeout: TLS_HANDSHAKE_TIMEOUT,
    };

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn dial_timeout(&self) -> Duration {
        self.dial_timeout
    }

    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    pub fn tls_handshake_timeout(&self) -> Duration {
        self.tls_handshake_timeout
    }

    /// Budget for the whole connect phase (resolve, TCP connect, TLS).
    ///
    /// The transport exposes a single deadline for that phase.
    pub fn connect_timeout(&self) -> Duration {
        self.dial_timeout + self.tls_handshake_timeout
    }
}

/// An HTTP client that never connects to a disallowed address.
///
/// - Hostnames are resolved and validated by [`GuardedDialer`] each time the
///   transport opens a connection.
/// - Literal IP hosts, which the transport dials without resolving, are
///   classified before the request is sent.
/// - Redirects are never followed; a redirect response fails the request
///   with [`Error::RedirectRefused`].
/// - Only IPv4 destinations are dialed. An IPv4-mapped IPv6 literal such as
///   `[::ffff:8.8.8.8]` is sent to its IPv4 address.
///
/// There is no shared default instance. Build one where it is needed;
/// clones share the connection pool.
///
/// # Example
///
/// ```rust,no_run
/// use dial_jail::GuardedClient;
///
/// # async fn example() -> Result<(), dial_jail::Error> {
/// let client = GuardedClient::new()?;
/// let response = client.get("https://example.com/").await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct GuardedClient {
    inner: Client,
    dialer: Arc<GuardedDialer>,
    user_agent: Option<String>,
}

impl GuardedClient {
    /// Build a client over the system resolver with the default policy.
    pub fn new() -> Result<Self, Error> {
        Self::builder().build()
    }

    pub fn builder() -> GuardedClientBuilder {
        GuardedClientBuilder::default()
    }

    /// The dialer used for every connection.
    pub fn dialer(&self) -> &GuardedDialer {
        &self.dialer
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::FIXED
    }

    /// Send a GET request.
    pub async fn get(&self, url: &str) -> Result<Response, Error> {
        let target = Target::parse(url)?;
        let request = Request::new(reqwest::Method::GET, target.into_url());
        self.execute(request).await
    }

    /// Send an arbitrary request.
    ///
    /// # Errors
    ///
    /// Rejections keep their own variant ([`Error::BadHost`],
    /// [`Error::BadIpAddress`], [`Error::RedirectRefused`], ...) even when
    /// they were raised inside the transport. Other failures are
    /// [`Error::Timeout`] or [`Error::Http`].
    pub async fn execute(&self, mut request: Request) -> Result<Response, Error> {
        let target = Target::from_url(request.url().clone())?;
        self.check_literal(&target, request.url_mut())?;

        let url = request.url().to_string();
        self.inner
            .execute(request)
            .await
            .map_err(|e| from_transport_error(&url, e))
    }

    /// Validate the URL's host once, then send a GET that connects only to
    /// the validated address.
    ///
    /// The URL is sent unchanged, so the Host header and the TLS server name
    /// stay those of the original hostname while the socket goes to the
    /// literal address chosen during validation.
    ///
    /// Each call builds a separate transport with its own connection pool
    /// and TLS setup, so nothing is reused between calls. Prefer
    /// [`get`](Self::get) for repeated requests to the same hosts.
    pub async fn get_pinned(&self, url: &str) -> Result<Response, Error> {
        let target = Target::parse(url)?;
        let mut request_url = target.url().clone();

        let client = match target.host() {
            TargetHost::Ip(_) => {
                self.check_literal(&target, &mut request_url)?;
                self.inner.clone()
            }
            TargetHost::Domain(host) => {
                let addr = self.dialer.resolve_target(host, target.port()).await?;
                debug!(host = %host, %addr, "pinning host to validated address");
                build_transport(
                    &self.dialer,
                    self.user_agent.as_deref(),
                    Some((host.as_str(), SocketAddr::V4(addr))),
                )?
            }
        };

        let url = request_url.to_string();
        client
            .get(request_url)
            .send()
            .await
            .map_err(|e| from_transport_error(&url, e))
    }

    /// Classify a literal IP host. A mapped IPv6 host is rewritten in `url`
    /// to the IPv4 address it carries.
    fn check_literal(&self, target: &Target, url: &mut Url) -> Result<(), Error> {
        let TargetHost::Ip(ip) = target.host() else {
            return Ok(());
        };

        match self.dialer.resolver().validate_ip(*ip)? {
            IpAddr::V4(v4) => {
                if ip.is_ipv6() {
                    debug!(%ip, %v4, "sending mapped literal to its IPv4 address");
                    url.set_ip_host(IpAddr::V4(v4))
                        .map_err(|()| Error::invalid_url(url.as_str(), "cannot rewrite host"))?;
                }
                Ok(())
            }
            IpAddr::V6(_) => {
                warn!(%ip, "refusing IPv6 literal destination");
                Err(Error::unsupported_network("tcp6"))
            }
        }
    }
}

/// Builder for [`GuardedClient`].
///
/// Only non-security settings are exposed; timeouts and the redirect
/// policy are fixed.
#[derive(Default)]
pub struct GuardedClientBuilder {
    lookup: Option<Arc<dyn Lookup>>,
    policy: Policy,
    user_agent: Option<String>,
}

impl GuardedClientBuilder {
    /// Use `lookup` instead of the system resolver.
    pub fn lookup(mut self, lookup: impl Lookup + 'static) -> Self {
        self.lookup = Some(Arc::new(lookup));
        self
    }

    /// Apply a custom [`Policy`].
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.to_string());
        self
    }

    /// Build the client.
    ///
    /// Forces the denial table, so a malformed range constant aborts here
    /// rather than on the first request.
    pub fn build(self) -> Result<GuardedClient, Error> {
        denylist::force();

        let lookup = match self.lookup {
            Some(lookup) => lookup,
            None => Arc::new(SystemLookup::new()?),
        };
        if !self.policy.is_default() {
            warn!(policy = ?self.policy, "guarded client built with a custom policy");
        }

        let dialer = Arc::new(GuardedDialer::new(
            HostResolver::new(lookup).with_policy(self.policy),
        ));
        let inner = build_transport(&dialer, self.user_agent.as_deref(), None)?;

        Ok(GuardedClient {
            inner,
            dialer,
            user_agent: self.user_agent,
        })
    }
}

impl std::fmt::Debug for GuardedClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedClientBuilder")
            .field("policy", &self.policy)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

fn build_transport(
    dialer: &Arc<GuardedDialer>,
    user_agent: Option<&str>,
    pin: Option<(&str, SocketAddr)>,
) -> Result<Client, Error> {
    let config = ClientConfig::FIXED;

    let mut builder = Client::builder()
        .dns_resolver(Arc::clone(dialer))
        .redirect(RedirectPolicy::custom(refuse_redirect))
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout())
        .tcp_keepalive(config.keep_alive())
        .no_proxy();

    if let Some(user_agent) = user_agent {
        builder = builder.user_agent(user_agent);
    }
    if let Some((host, addr)) = pin {
        builder = builder.resolve(host, addr);
    }

    builder.build().map_err(|e| Error::Http {
        url: String::new(),
        message: format!("failed to build HTTP client: {}", e),
    })
}

fn refuse_redirect(attempt: Attempt) -> Action {
    let location = attempt.url().to_string();
    let url = attempt
        .previous()
        .last()
        .map(|u| u.to_string())
        .unwrap_or_default();
    warn!(%url, %location, "refusing redirect");
    attempt.error(Error::RedirectRefused { url, location })
}

fn from_transport_error(url: &str, err: reqwest::Error) -> Error {
    if let Some(found) = Error::find_in(&err) {
        return found.clone();
    }
    if err.is_timeout() {
        return Error::Timeout {
            addr: url.to_string(),
            timeout: REQUEST_TIMEOUT,
        };
    }
    Error::Http {
        url: url.to_string(),
        message: err.to_string(),
    }
}
