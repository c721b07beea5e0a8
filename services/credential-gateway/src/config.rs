//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The authorization-server service password is loaded from the
//! AUTH_SERVER_PASSWORD env var or password_file, never stored in the
//! TOML directly to avoid leaking secrets.

use common::Secret;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use token_client::ClientConfig;

use crate::routes::{Route, RouteTable, RouteTarget};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth_server: AuthServerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// Listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Authorization server connection settings
#[derive(Debug, Deserialize)]
pub struct AuthServerConfig {
    pub location_uri: String,
    /// Service credential name the gateway presents to the authorization server
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    /// Path to a file containing the service password (alternative to AUTH_SERVER_PASSWORD)
    #[serde(default)]
    pub password_file: Option<PathBuf>,
    /// Token-issuance path prefix; requests below it are never translated
    #[serde(default = "default_token_path")]
    pub token_path: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

/// Backend forwarding settings
#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

/// One `[[routes]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub id: String,
    pub path: String,
    /// Backend base URL or `forward:/local/path`
    pub url: String,
    #[serde(default = "default_strip_prefix")]
    pub strip_prefix: bool,
}

fn default_max_connections() -> usize {
    1000
}

fn default_service_name() -> String {
    "gateway".to_string()
}

fn default_token_path() -> String {
    "oauth".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_read_timeout_ms() -> u64 {
    5000
}

fn default_timeout() -> u64 {
    60
}

fn default_strip_prefix() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Service password resolution order:
    /// 1. AUTH_SERVER_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.auth_server.location_uri.starts_with("http://")
            && !config.auth_server.location_uri.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "location_uri must start with http:// or https://, got: {}",
                config.auth_server.location_uri
            )));
        }

        if config.auth_server.connect_timeout_ms == 0 {
            return Err(common::Error::Config(
                "connect_timeout_ms must be greater than 0".into(),
            ));
        }

        if config.auth_server.read_timeout_ms == 0 {
            return Err(common::Error::Config(
                "read_timeout_ms must be greater than 0".into(),
            ));
        }

        if config.proxy.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        // Surface route errors at load time rather than on first request
        config.route_table()?;

        // Resolve service password: env var takes precedence over file
        if let Ok(password) = std::env::var("AUTH_SERVER_PASSWORD") {
            config.auth_server.password = Some(Secret::new(password));
        } else if let Some(ref password_file) = config.auth_server.password_file {
            let password = std::fs::read_to_string(password_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read password_file {}: {e}",
                    password_file.display()
                ))
            })?;
            let password = password.trim().to_owned();
            if !password.is_empty() {
                config.auth_server.password = Some(Secret::new(password));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("credential-gateway.toml")
    }

    /// Build the route table snapshot described by `[[routes]]`.
    ///
    /// Fails on a path not starting with `/`, an unusable target, or a
    /// duplicated route id.
    pub fn route_table(&self) -> common::Result<RouteTable> {
        let mut ids = HashSet::new();
        let mut routes = Vec::with_capacity(self.routes.len());
        for route in &self.routes {
            if !ids.insert(route.id.as_str()) {
                return Err(common::Error::Config(format!(
                    "duplicate route id: {}",
                    route.id
                )));
            }
            if !route.path.starts_with('/') {
                return Err(common::Error::Config(format!(
                    "route {} path must start with '/', got: {}",
                    route.id, route.path
                )));
            }
            let target = RouteTarget::parse(&route.url).map_err(|e| {
                common::Error::Config(format!("route {}: {e}", route.id))
            })?;
            routes.push(Route {
                id: route.id.clone(),
                pattern: route.path.clone(),
                target,
                strip_prefix: route.strip_prefix,
            });
        }
        Ok(RouteTable::new(routes))
    }

    /// Connection settings for the authorization-server client.
    ///
    /// A missing service password is sent as an empty string.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            location_uri: self.auth_server.location_uri.clone(),
            service_name: self.auth_server.name.clone(),
            service_password: self
                .auth_server
                .password
                .clone()
                .unwrap_or_else(|| Secret::new(String::new())),
            connect_timeout: Duration::from_millis(self.auth_server.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.auth_server.read_timeout_ms),
        }
    }
}
