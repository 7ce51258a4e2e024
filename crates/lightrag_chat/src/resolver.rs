//! Endpoint resolution: which scheme, host and port to address for the backend.
//!
//! Resolution runs on every request and never fails. The page host wins over a
//! configured base URL when the two disagree about reachability class
//! (loopback vs. routable); when no host can be found at all the configured
//! fallback host is used and an error event is logged.

use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::config::{Config, DEFAULT_FALLBACK_HOST, DEFAULT_SERVICE_PORT};
use crate::context::{NetworkContext, PageLocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// A resolved backend location. `as_str()` is the base every request path is
/// appended to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    scheme: Scheme,
    host: String,
    port: u16,
    base: String,
}

impl Authority {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let base = format!("{}://{}:{}", scheme.as_str(), host, port);
        Self {
            scheme,
            host,
            port,
            base,
        }
    }

    /// The local development authority, `http://localhost:{port}`.
    pub fn local(port: u16) -> Self {
        Self::new(Scheme::Http, "localhost", port)
    }

    /// Parse a configured base URL. The text is kept verbatim (minus trailing
    /// slashes) so a path prefix survives.
    pub fn from_base_url(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let url = url::Url::parse(trimmed).ok()?;
        let scheme = Scheme::parse(url.scheme())?;
        let host = url.host_str().filter(|h| !h.is_empty())?.to_string();
        let port = url.port_or_known_default()?;
        Some(Self {
            scheme,
            host,
            port,
            base: trimmed.trim_end_matches('/').to_string(),
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn as_str(&self) -> &str {
        &self.base
    }

    pub fn is_loopback(&self) -> bool {
        is_loopback_host(&self.host)
    }

    /// Append a path (`/query/stream`) to the base.
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

/// `localhost`, the IPv6 loopback literal (bracketed or not) and any `127.*` address.
pub fn is_loopback_host(host: &str) -> bool {
    let host = host.trim().to_ascii_lowercase();
    host == "localhost" || host == "::1" || host == "[::1]" || host.starts_with("127.")
}

/// One way of finding the page host. Strategies are pure and return `None`
/// when they cannot produce a non-blank host.
pub type HostStrategy = fn(&PageLocation) -> Option<String>;

/// Extraction order: direct hostname, parsed href, parsed origin, raw pattern over href.
pub const HOST_STRATEGIES: [(&str, HostStrategy); 4] = [
    ("hostname", host_from_hostname),
    ("href", host_from_href),
    ("origin", host_from_origin),
    ("pattern", host_from_pattern),
];

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

pub fn host_from_hostname(location: &PageLocation) -> Option<String> {
    non_blank(&location.hostname)
}

pub fn host_from_href(location: &PageLocation) -> Option<String> {
    let url = url::Url::parse(location.href.trim()).ok()?;
    non_blank(url.host_str()?)
}

pub fn host_from_origin(location: &PageLocation) -> Option<String> {
    let url = url::Url::parse(location.origin.trim()).ok()?;
    non_blank(url.host_str()?)
}

pub fn host_from_pattern(location: &PageLocation) -> Option<String> {
    static HOST_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = HOST_PATTERN
        .get_or_init(|| Regex::new(r"https?://([^:/]+)").expect("host pattern is valid"));
    let captures = pattern.captures(&location.href)?;
    non_blank(captures.get(1)?.as_str())
}

/// Run the strategies in order; returns the name of the one that matched.
pub fn extract_host(location: &PageLocation) -> Option<(&'static str, String)> {
    HOST_STRATEGIES
        .iter()
        .find_map(|(name, strategy)| strategy(location).map(|host| (*name, host)))
}

/// Computes the backend authority from the live network context.
#[derive(Clone)]
pub struct Resolver {
    context: Arc<dyn NetworkContext>,
    configured: Option<Authority>,
    service_port: u16,
    fallback_host: String,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("configured", &self.configured)
            .field("service_port", &self.service_port)
            .field("fallback_host", &self.fallback_host)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn new(context: Arc<dyn NetworkContext>) -> Self {
        Self {
            context,
            configured: None,
            service_port: DEFAULT_SERVICE_PORT,
            fallback_host: DEFAULT_FALLBACK_HOST.to_string(),
        }
    }

    pub fn from_config(config: &Config, context: Arc<dyn NetworkContext>) -> Self {
        Self::new(context)
            .base_url(config.backend.base_url.as_deref())
            .service_port(config.service_port())
            .fallback_host(config.fallback_host())
    }

    /// Set the configured base URL override. Blank or unusable values are dropped.
    pub fn base_url(mut self, base_url: Option<&str>) -> Self {
        self.configured = base_url
            .filter(|raw| !raw.trim().is_empty())
            .and_then(|raw| {
                let parsed = Authority::from_base_url(raw);
                if parsed.is_none() {
                    tracing::warn!(base_url = raw, "ignoring unusable configured base URL");
                }
                parsed
            });
        self
    }

    pub fn service_port(mut self, port: u16) -> Self {
        self.service_port = port;
        self
    }

    pub fn fallback_host(mut self, host: impl Into<String>) -> Self {
        self.fallback_host = host.into();
        self
    }

    pub fn configured(&self) -> Option<&Authority> {
        self.configured.as_ref()
    }

    pub fn resolve(&self) -> Authority {
        let location = self.context.location();

        if let Some(configured) = &self.configured {
            let page_host = location.hostname.trim();
            let page_routable = !page_host.is_empty() && !is_loopback_host(page_host);
            if configured.is_loopback() && page_routable {
                tracing::warn!(
                    configured = %configured,
                    page_host,
                    "configured backend is loopback but page host is routable; deriving from page"
                );
            } else {
                tracing::debug!(authority = %configured, "using configured backend");
                return configured.clone();
            }
        }

        let host = match extract_host(&location) {
            Some((source, host)) => {
                tracing::debug!(source, host = %host, "page host extracted");
                host
            }
            None => {
                tracing::error!(
                    href = %location.href,
                    origin = %location.origin,
                    fallback = %self.fallback_host,
                    "could not determine page host; using fallback host"
                );
                self.fallback_host.clone()
            }
        };

        if is_loopback_host(&host) {
            return Authority::local(self.service_port);
        }
        self.routable(&location.protocol, host)
    }

    fn routable(&self, protocol: &str, host: String) -> Authority {
        if let Some(authority) = self.authority_for(protocol, &host) {
            return authority;
        }
        tracing::error!(
            host = %host,
            fallback = %self.fallback_host,
            "page host does not form a valid URL; using fallback host"
        );
        self.authority_for(protocol, &self.fallback_host)
            .unwrap_or_else(|| {
                Authority::new(Scheme::Http, DEFAULT_FALLBACK_HOST, self.service_port)
            })
    }

    /// `{protocol}//{host}:{port}`, degrading to `http` when that does not
    /// parse. `None` when the host cannot form a valid URL under either scheme.
    fn authority_for(&self, protocol: &str, host: &str) -> Option<Authority> {
        let host = bracket_ipv6(host.trim());
        let port = self.service_port;
        let candidate = format!("{}//{}:{}", protocol.trim(), host, port);
        if let Some(scheme) = parse_authority(&candidate, port) {
            return Some(Authority {
                scheme,
                host,
                port,
                base: candidate,
            });
        }
        let degraded = Authority::new(Scheme::Http, host, port);
        parse_authority(degraded.as_str(), port)?;
        tracing::warn!(candidate = %candidate, "malformed backend URL; falling back to http");
        Some(degraded)
    }
}

fn bracket_ipv6(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

/// The scheme of `candidate` when it is exactly `scheme://host:port` with an
/// http(s) scheme: no credentials, path, query or fragment smuggled in via the host.
fn parse_authority(candidate: &str, port: u16) -> Option<Scheme> {
    let url = url::Url::parse(candidate).ok()?;
    let scheme = Scheme::parse(url.scheme())?;
    let clean = url.host_str().is_some_and(|h| !h.is_empty())
        && url.port_or_known_default() == Some(port)
        && url.username().is_empty()
        && url.password().is_none()
        && url.path() == "/"
        && url.query().is_none()
        && url.fragment().is_none();
    clean.then_some(scheme)
}
