//! Finds camera array resources by node name.

use crate::config::Config;
use crate::error::ResolveError;
use crate::runner::CliRunner;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Static registry mapping node names to hosts and ports.
///
/// Built once at process startup from configuration and read-only
/// afterwards. Probing, when enabled, happens exactly once at construction
/// time; it replaces configured hosts with externally looked-up addresses
/// and drops any name whose lookup fails, so discovery is best effort
/// rather than a hard requirement that every configured node be reachable.
#[derive(Debug)]
pub struct Resolver {
    name_to_host: BTreeMap<String, String>,
    name_to_port: BTreeMap<String, u16>,
}

impl Resolver {
    pub fn new(name_to_host: BTreeMap<String, String>, name_to_port: BTreeMap<String, u16>) -> Self {
        Self {
            name_to_host,
            name_to_port,
        }
    }

    /// Builds the registry from the `[nodes]` configuration tables.
    pub fn from_config(config: &Config) -> Self {
        let mut name_to_host = BTreeMap::new();
        let mut name_to_port = BTreeMap::new();
        for (name, endpoint) in &config.nodes {
            name_to_host.insert(name.clone(), endpoint.host.clone());
            name_to_port.insert(name.clone(), endpoint.port);
        }
        Self::new(name_to_host, name_to_port)
    }

    /// All node names currently in the registry. The order is incidental
    /// and nothing should rely on it.
    pub fn all_nodes(&self) -> Vec<String> {
        self.name_to_host.keys().cloned().collect()
    }

    /// Gives the address string for the given node name.
    ///
    /// With `listen` the result binds all interfaces on the node's port;
    /// without it the result is `host:port` for connecting. A name absent
    /// from either mapping fails, whatever the state of the other one.
    pub fn address_for_name(&self, name: &str, listen: bool) -> Result<String, ResolveError> {
        let port = self
            .name_to_port
            .get(name)
            .ok_or_else(|| ResolveError::UnknownNode(name.to_string()))?;
        let host = self
            .name_to_host
            .get(name)
            .ok_or_else(|| ResolveError::UnknownNode(name.to_string()))?;

        if listen {
            Ok(format!("[::]:{port}"))
        } else {
            Ok(format!("{host}:{port}"))
        }
    }

    /// Refines the registry by running the external name lookup for every
    /// node. Names that resolve get their configured host replaced; names
    /// that fail are dropped entirely.
    pub async fn probe(mut self, runner: &CliRunner) -> Self {
        let mut probed = BTreeMap::new();
        for name in self.name_to_host.keys() {
            match runner.lookup_host(name).await {
                Ok(host) => {
                    info!(node = %name, %host, "probe resolved node");
                    probed.insert(name.clone(), host);
                }
                Err(err) => {
                    warn!(node = %name, %err, "probe failed; dropping node from registry");
                }
            }
        }
        self.name_to_host = probed;
        self
    }
}
