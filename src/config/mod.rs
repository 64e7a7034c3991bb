//! Gateway configuration.
//!
//! Route cache policies are configuration data, not code: each rule maps a
//! route pattern to a policy shape (`"static"`, `"always-fresh"`, or
//! `{"swr": <seconds>}`). A config file looks like:
//!
//! ```json
//! {
//!     "bindAddr": "127.0.0.1:4000",
//!     "requestDeadlineMs": 2000,
//!     "upstream": { "users": "localhost:50051", "orders": "localhost:50052" },
//!     "routes": {
//!         "/": "static",
//!         "/api/users": { "swr": 60 },
//!         "/api/orders": { "swr": 60 },
//!         "/api/users/:id": "always-fresh",
//!         "/api/dashboard": "always-fresh"
//!     }
//! }
//! ```
//!
//! When `upstream` is absent the gateway serves its built-in fixture
//! datasets, which is the demo and test mode.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::cache::{CachePolicy, PolicyTable};

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Addresses of the real backend services, `host:port` each.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub users: String,
    pub orders: String,
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayConfig {
    /// TCP address the gateway listens on.
    pub bind_addr: String,
    /// Overall per-request deadline across all upstream calls.
    pub request_deadline_ms: u64,
    /// Backend addresses; fixtures are served when absent.
    pub upstream: Option<UpstreamConfig>,
    /// Route pattern → cache policy rules.
    pub routes: BTreeMap<String, CachePolicy>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let mut routes = BTreeMap::new();
        routes.insert("/".to_owned(), CachePolicy::Static);
        routes.insert(
            "/api/users".to_owned(),
            CachePolicy::StaleWhileRevalidate(Duration::from_secs(60)),
        );
        routes.insert(
            "/api/orders".to_owned(),
            CachePolicy::StaleWhileRevalidate(Duration::from_secs(60)),
        );
        routes.insert("/api/users/:id".to_owned(), CachePolicy::AlwaysFresh);
        routes.insert("/api/dashboard".to_owned(), CachePolicy::AlwaysFresh);
        Self {
            bind_addr: "127.0.0.1:4000".to_owned(),
            request_deadline_ms: 2000,
            upstream: None,
            routes,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// The per-request deadline as a [`Duration`].
    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }

    /// Builds the policy table the cache resolver consults.
    pub fn policy_table(&self) -> PolicyTable {
        let mut table = PolicyTable::new();
        for (pattern, policy) in &self.routes {
            table.insert(pattern, *policy);
        }
        table
    }
}
