//! Configuration for the camline array.
//!
//! Configuration lives in TOML files inside a config directory. The server
//! and client binaries select one or more files plus optional `key=value`
//! override bindings; the files are deep-merged in order, the bindings are
//! applied last, and the result is deserialized into a read-only [`Config`]
//! that is passed by reference into every component. Nothing else in the
//! workspace parses configuration syntax.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Fully resolved configuration for one camline process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Friendly identifier for this node. Must match one of the configured
    /// node names; it also determines the port this node listens on.
    pub node_id: Option<String>,

    /// Name of the node that coordinates the array.
    pub coordinator_node_id: Option<String>,

    /// Node that should answer a direct request (e.g. a live sample).
    pub target_node_id: Option<String>,

    /// Replace configured hosts with externally looked-up addresses at
    /// startup, dropping any node whose lookup fails.
    #[serde(default)]
    pub probe_nodes: bool,

    /// External command lines, stored as argv vectors so no shell is ever
    /// involved when they run.
    #[serde(default)]
    pub commands: Commands,

    /// Environment variables applied on top of the inherited environment
    /// for every spawned command.
    #[serde(default = "default_env")]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub collection: Collection,

    /// The universe of node names and where to reach them.
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeEndpoint>,
}

/// Argument-list templates for the external tools a node drives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Commands {
    /// Starts continuous image recording; runs until killed.
    #[serde(default)]
    pub camera_video: Vec<String>,

    /// Captures a single still image into the working directory.
    #[serde(default)]
    pub camera_live_sample: Vec<String>,

    /// Name service query. Exactly one argument may carry the `{hostname}`
    /// substitution point.
    #[serde(default)]
    pub name_lookup: Vec<String>,

    /// Powers off the host machine.
    #[serde(default)]
    pub host_shutdown: Vec<String>,
}

/// Where recorded data lands on each node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collection {
    /// Root directory for all data saved during operation. One
    /// subdirectory per recording id, plus the reserved `nocollection`
    /// directory used between sessions.
    pub base_path: Option<PathBuf>,
}

/// Configured address of one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEndpoint {
    pub host: String,
    pub port: u16,
}

fn default_env() -> BTreeMap<String, String> {
    // Enough to reach the local display session from a service context.
    BTreeMap::from([("DISPLAY".to_string(), ":0.0".to_string())])
}

impl Config {
    /// Loads configuration from `config_dir` (default `./config`), merging
    /// the named files in order and applying `key=value` bindings last.
    pub fn load(
        config_dir: Option<&Path>,
        files: &[String],
        bindings: &[String],
    ) -> Result<Config, ConfigError> {
        let base = config_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("config"));

        let mut merged = toml::Table::new();
        for file in files {
            let path = base.join(file);
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let table: toml::Table = text
                .parse()
                .map_err(|source| ConfigError::Parse { path, source })?;
            merge_tables(&mut merged, table);
        }

        for binding in bindings {
            apply_binding(&mut merged, binding)?;
        }

        Ok(merged.try_into()?)
    }
}

/// Recursively merges `overlay` into `base`; tables merge key by key,
/// everything else is replaced.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Applies one `dotted.key=value` binding onto the merged table, creating
/// intermediate tables as needed.
fn apply_binding(table: &mut toml::Table, binding: &str) -> Result<(), ConfigError> {
    let (key, raw_value) = binding
        .split_once('=')
        .ok_or_else(|| ConfigError::BadBinding(binding.to_string()))?;

    let mut segments: Vec<&str> = key.trim().split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ConfigError::BadBinding(binding.to_string()));
    }
    let Some(leaf) = segments.pop() else {
        return Err(ConfigError::BadBinding(binding.to_string()));
    };

    let mut current = table;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        current = entry
            .as_table_mut()
            .ok_or_else(|| ConfigError::BadBinding(binding.to_string()))?;
    }

    current.insert(leaf.to_string(), parse_binding_value(raw_value.trim()));
    Ok(())
}

/// Interprets a binding value as a TOML literal when possible, otherwise as
/// a bare string (so `--set node_id=cam-a` needs no quoting).
fn parse_binding_value(raw: &str) -> toml::Value {
    let wrapped = format!("v = {raw}");
    match wrapped.parse::<toml::Table>().ok().and_then(|mut t| t.remove("v")) {
        Some(value) => value,
        None => toml::Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_config(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_load_single_file() {
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            "array.toml",
            r#"
            coordinator_node_id = "cam-a"

            [commands]
            camera_video = ["libcamera-vid", "-t", "0"]

            [collection]
            base_path = "/home/pi/data"

            [nodes.cam-a]
            host = "10.0.0.1"
            port = 9001
            "#,
        );

        let config = Config::load(Some(dir.path()), &["array.toml".to_string()], &[]).unwrap();

        assert_eq!(config.coordinator_node_id.as_deref(), Some("cam-a"));
        assert_eq!(config.commands.camera_video[0], "libcamera-vid");
        assert_eq!(
            config.collection.base_path,
            Some(PathBuf::from("/home/pi/data"))
        );
        assert_eq!(config.nodes["cam-a"].port, 9001);
        // Default environment overlay reaches the local display session.
        assert_eq!(config.env["DISPLAY"], ":0.0");
    }

    #[test]
    fn test_later_files_deep_merge_over_earlier() {
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            "base.toml",
            r#"
            coordinator_node_id = "cam-a"

            [nodes.cam-a]
            host = "10.0.0.1"
            port = 9001

            [nodes.cam-b]
            host = "10.0.0.2"
            port = 9002
            "#,
        );
        write_config(
            dir.path(),
            "site.toml",
            r#"
            [nodes.cam-b]
            host = "10.1.0.2"
            port = 9002
            "#,
        );

        let config = Config::load(
            Some(dir.path()),
            &["base.toml".to_string(), "site.toml".to_string()],
            &[],
        )
        .unwrap();

        // cam-a survives the merge, cam-b picks up the site override.
        assert_eq!(config.nodes["cam-a"].host, "10.0.0.1");
        assert_eq!(config.nodes["cam-b"].host, "10.1.0.2");
        assert_eq!(config.coordinator_node_id.as_deref(), Some("cam-a"));
    }

    #[test]
    fn test_bindings_apply_last() {
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            "array.toml",
            r#"
            node_id = "cam-a"

            [nodes.cam-a]
            host = "10.0.0.1"
            port = 9001
            "#,
        );

        let config = Config::load(
            Some(dir.path()),
            &["array.toml".to_string()],
            &[
                "node_id=cam-b".to_string(),
                "nodes.cam-a.port=9100".to_string(),
                "probe_nodes=true".to_string(),
            ],
        )
        .unwrap();

        assert_eq!(config.node_id.as_deref(), Some("cam-b"));
        assert_eq!(config.nodes["cam-a"].port, 9100);
        assert!(config.probe_nodes);
    }

    #[test]
    fn test_bad_binding_is_rejected() {
        let dir = tempdir().unwrap();
        let err = Config::load(Some(dir.path()), &[], &["no-equals-sign".to_string()]);
        assert!(matches!(err, Err(ConfigError::BadBinding(_))));
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempdir().unwrap();
        let err = Config::load(Some(dir.path()), &["absent.toml".to_string()], &[]);
        assert!(matches!(err, Err(ConfigError::Read { .. })));
    }
}
