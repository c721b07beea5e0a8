//! Decides whether a request needs credential translation

use token_client::is_basic;

use crate::routes::RouteTable;

/// Exempts requests that carry nothing to translate, that target the
/// token-issuance endpoint itself, or that are served locally.
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    issuance_path: String,
}

impl RouteClassifier {
    /// `issuance_path` is matched as a prefix, with or without a leading slash.
    pub fn new(issuance_path: impl Into<String>) -> Self {
        let issuance_path = issuance_path.into();
        Self {
            issuance_path: issuance_path.trim_start_matches('/').to_string(),
        }
    }

    /// Pure: no I/O, no state. `routes` is the caller's snapshot for this
    /// request; an empty table only disables the local-route exemption.
    pub fn should_intercept(
        &self,
        path: &str,
        authorization: Option<&str>,
        routes: &RouteTable,
    ) -> bool {
        let Some(header) = authorization else {
            return false;
        };
        if !is_basic(header) {
            return false;
        }
        if self.is_issuance_path(path) {
            return false;
        }
        !self.is_local_route(path, routes)
    }

    pub fn is_issuance_path(&self, path: &str) -> bool {
        let path = path.strip_prefix('/').unwrap_or(path);
        !self.issuance_path.is_empty() && path.starts_with(&self.issuance_path)
    }

    fn is_local_route(&self, path: &str, routes: &RouteTable) -> bool {
        routes
            .match_route(path)
            .is_some_and(|route| route.target.is_local())
    }
}
