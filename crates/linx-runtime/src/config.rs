//! Peer configuration
//!
//! Every field has a default except `scope`, which must be set. Values can
//! come from TOML, from code via the `with_*` setters, and from `LINX_*`
//! environment variables, which win over the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use linx_core::{LinxError, LinxResult, Scope};
use linx_topology::TopologyConfig;

/// Environment override for `scope`
pub const SCOPE_ENV: &str = "LINX_SCOPE";

/// Environment override for the first relay endpoint
pub const RELAY_ENV: &str = "LINX_RELAY";

/// Configuration for one swarm peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PeerConfig {
    /// Swarm namespace to join
    pub scope: String,
    /// Relay addresses (`host:port`); only the first is used
    pub relay_endpoints: Vec<String>,
    pub max_incoming: usize,
    pub max_outgoing: usize,
    pub pending_timeout_ms: u64,
    pub sweep_interval_ms: u64,
    /// Re-announce period while incoming slots are free; off when absent
    pub reannounce_interval_ms: Option<u64>,
    /// Capacity of the signaling event channel
    pub event_buffer: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            scope: String::new(),
            relay_endpoints: vec!["127.0.0.1:9988".to_string()],
            max_incoming: 3,
            max_outgoing: 6,
            pending_timeout_ms: 30_000,
            sweep_interval_ms: 1_000,
            reannounce_interval_ms: None,
            event_buffer: 256,
        }
    }
}

impl PeerConfig {
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Put `endpoint` first in the endpoint list
    pub fn with_relay_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.relay_endpoints.insert(0, endpoint.into());
        self
    }

    pub fn with_slots(mut self, max_incoming: usize, max_outgoing: usize) -> Self {
        self.max_incoming = max_incoming;
        self.max_outgoing = max_outgoing;
        self
    }

    pub fn with_pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_reannounce_interval(mut self, interval: Duration) -> Self {
        self.reannounce_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> LinxResult<Self> {
        let config: PeerConfig =
            toml::from_str(raw).map_err(|e| LinxError::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, apply environment overrides, and validate
    pub fn load(path: &Path) -> LinxResult<Self> {
        info!(path = %path.display(), "loading peer configuration");
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LinxError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: PeerConfig = toml::from_str(&raw).map_err(|e| {
            LinxError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        let config = config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `LINX_*` overrides looked up through `lookup`
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(scope) = lookup(SCOPE_ENV) {
            self.scope = scope;
        }
        if let Some(endpoint) = lookup(RELAY_ENV) {
            self = self.with_relay_endpoint(endpoint);
        }
        self
    }

    pub fn validate(&self) -> LinxResult<()> {
        Scope::new(self.scope.as_str())?;
        self.relay_endpoint()?;
        if self.event_buffer == 0 {
            return Err(LinxError::Config("event_buffer must be at least 1".into()));
        }
        self.topology().validate()
    }

    pub fn scope(&self) -> LinxResult<Scope> {
        Scope::new(self.scope.as_str())
    }

    /// The endpoint the peer connects to
    pub fn relay_endpoint(&self) -> LinxResult<&str> {
        self.relay_endpoints
            .first()
            .map(String::as_str)
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| LinxError::Config("relay_endpoints must not be empty".into()))
    }

    pub fn topology(&self) -> TopologyConfig {
        TopologyConfig {
            max_incoming: self.max_incoming,
            max_outgoing: self.max_outgoing,
            pending_timeout: Duration::from_millis(self.pending_timeout_ms),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
            reannounce_interval: self.reannounce_interval_ms.map(Duration::from_millis),
        }
    }
}
