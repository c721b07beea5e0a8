//! Route table: inbound path patterns mapped to backends or local handlers
//!
//! The table is immutable once built. Reloads build a new table and swap
//! the `Arc` held by [`SharedRouteTable`]; a request that already took a
//! snapshot keeps using it until it completes.

use std::sync::{Arc, RwLock};

/// Prefix marking a route that is served in-process instead of proxied
pub const FORWARD_MARKER: &str = "forward:";

/// Where a matched request goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// External backend base URL
    Url(String),
    /// Local path dispatched to the gateway's own router
    Forward(String),
}

impl RouteTarget {
    pub fn parse(url: &str) -> Result<Self, String> {
        if let Some(local) = url.strip_prefix(FORWARD_MARKER) {
            if !local.starts_with('/') {
                return Err(format!("forward target must be an absolute path, got: {url}"));
            }
            return Ok(RouteTarget::Forward(local.to_string()));
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(RouteTarget::Url(url.trim_end_matches('/').to_string()));
        }
        Err(format!(
            "url must start with http://, https:// or {FORWARD_MARKER}, got: {url}"
        ))
    }

    pub fn is_local(&self) -> bool {
        matches!(self, RouteTarget::Forward(_))
    }
}

impl std::fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteTarget::Url(url) => f.write_str(url),
            RouteTarget::Forward(path) => write!(f, "{FORWARD_MARKER}{path}"),
        }
    }
}

/// A configured route.
///
/// Patterns: `/prefix/**` matches the prefix and anything below it,
/// `/prefix/*` matches exactly one further segment, anything else must
/// match exactly.
#[derive(Debug, Clone)]
pub struct Route {
    pub id: String,
    pub pattern: String,
    pub target: RouteTarget,
    pub strip_prefix: bool,
}

impl Route {
    /// Literal part of the pattern, without the trailing wildcard
    fn prefix(&self) -> &str {
        self.pattern
            .strip_suffix("/**")
            .or_else(|| self.pattern.strip_suffix("/*"))
            .unwrap_or(&self.pattern)
    }

    pub fn matches(&self, path: &str) -> bool {
        if let Some(prefix) = self.pattern.strip_suffix("/**") {
            return match path.strip_prefix(prefix) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            };
        }
        if let Some(prefix) = self.pattern.strip_suffix("/*") {
            return match path.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
                Some(segment) => !segment.is_empty() && !segment.contains('/'),
                None => false,
            };
        }
        path == self.pattern
    }

    /// Path to send to the target: the request path, minus the route
    /// prefix when `strip_prefix` is set. Only meaningful for matching paths.
    pub fn downstream_path<'a>(&self, path: &'a str) -> &'a str {
        if self.strip_prefix {
            path.strip_prefix(self.prefix()).unwrap_or(path)
        } else {
            path
        }
    }
}

/// Immutable, ordered set of routes; first match wins.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn match_route(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.matches(path))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// The table a request was classified against, carried in its extensions
/// so routing dispatches on the same snapshot.
#[derive(Debug, Clone)]
pub struct RouteSnapshot(pub Arc<RouteTable>);

/// Shared handle to the current route table snapshot.
#[derive(Debug, Clone, Default)]
pub struct SharedRouteTable(Arc<RwLock<Arc<RouteTable>>>);

impl SharedRouteTable {
    pub fn new(table: RouteTable) -> Self {
        Self(Arc::new(RwLock::new(Arc::new(table))))
    }

    /// Current table; holds no lock after returning.
    pub fn snapshot(&self) -> Arc<RouteTable> {
        let guard = self.0.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Swap in a new table. Snapshots taken earlier are unaffected.
    pub fn replace(&self, table: RouteTable) {
        let mut guard = self.0.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(table);
    }
}
