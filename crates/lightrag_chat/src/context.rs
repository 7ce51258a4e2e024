//! Current network context: where the client is being viewed from.
//!
//! The resolver never captures a location up front. It asks a
//! [`NetworkContext`] for a fresh [`PageLocation`] on every call, because the
//! viewing device's network path can change between requests.

use std::sync::{Arc, RwLock};

/// Snapshot of the viewing location, shaped like a browser `Location`.
///
/// `protocol` carries the trailing colon (`"http:"`), `port` is empty when the
/// scheme default is in use. Any field may be empty when the host environment
/// cannot report it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLocation {
    pub hostname: String,
    pub protocol: String,
    pub port: String,
    pub href: String,
    pub origin: String,
}

impl PageLocation {
    /// Build a location from a full page URL. Unparsable input keeps the raw
    /// text in `href` and leaves the other fields empty.
    pub fn from_href(href: &str) -> Self {
        match url::Url::parse(href) {
            Ok(url) => {
                let origin = url.origin();
                Self {
                    hostname: url.host_str().unwrap_or_default().to_string(),
                    protocol: format!("{}:", url.scheme()),
                    port: url.port().map(|p| p.to_string()).unwrap_or_default(),
                    href: url.to_string(),
                    origin: if origin.is_tuple() {
                        origin.ascii_serialization()
                    } else {
                        String::new()
                    },
                }
            }
            Err(_) => Self {
                href: href.to_string(),
                ..Self::default()
            },
        }
    }
}

/// Provider of the live viewing location.
pub trait NetworkContext: Send + Sync {
    fn location(&self) -> PageLocation;
}

/// A fixed location.
#[derive(Debug, Clone, Default)]
pub struct StaticContext(PageLocation);

impl StaticContext {
    pub fn new(location: PageLocation) -> Self {
        Self(location)
    }

    pub fn from_href(href: &str) -> Self {
        Self(PageLocation::from_href(href))
    }
}

impl NetworkContext for StaticContext {
    fn location(&self) -> PageLocation {
        self.0.clone()
    }
}

/// A location that can be navigated while the client is running.
/// Clones share the same location.
#[derive(Debug, Clone, Default)]
pub struct SharedContext {
    inner: Arc<RwLock<PageLocation>>,
}

impl SharedContext {
    pub fn new(location: PageLocation) -> Self {
        Self {
            inner: Arc::new(RwLock::new(location)),
        }
    }

    pub fn navigate(&self, location: PageLocation) {
        match self.inner.write() {
            Ok(mut guard) => *guard = location,
            Err(poisoned) => *poisoned.into_inner() = location,
        }
    }

    pub fn navigate_to(&self, href: &str) {
        self.navigate(PageLocation::from_href(href));
    }
}

impl NetworkContext for SharedContext {
    fn location(&self) -> PageLocation {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
