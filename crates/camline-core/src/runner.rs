//! Wrapper around the external commands a node drives.
//!
//! The recording tools, the name service query, and host shutdown are all
//! easiest to reach as external programs, and keeping them behind one
//! wrapper isolates the rest of the workspace from spawning details and
//! environment setup. Every command is an argv vector straight from
//! configuration; nothing here ever goes through a shell, and the one
//! substitution point that accepts outside input (`{hostname}`) is
//! validated before use.

use crate::config::Config;
use crate::error::{ConfigError, RunnerError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Session subpath used while no collection is active, and the landing
/// spot for single-sample captures.
pub const NO_COLLECTION: &str = "nocollection";

/// Fixed filename the live-sample command is expected to produce.
pub const LIVE_SAMPLE_FILE: &str = "live_sample.jpg";

/// Spawns and stops the external processes behind recording control.
///
/// The only mutable state is the current collection subpath; the handle of
/// a running collection process is owned by the node service, not by the
/// runner.
#[derive(Debug)]
pub struct CliRunner {
    camera_video_cmd: Vec<String>,
    camera_live_sample_cmd: Vec<String>,
    name_lookup_cmd: Vec<String>,
    host_shutdown_cmd: Vec<String>,
    default_env: BTreeMap<String, String>,
    base_collection_path: PathBuf,
    collection_path: String,
}

impl CliRunner {
    /// Builds a runner from resolved configuration. Every command template
    /// and the base collection path are required.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let commands = &config.commands;
        if commands.camera_video.is_empty() {
            return Err(ConfigError::MissingField("commands.camera_video"));
        }
        if commands.camera_live_sample.is_empty() {
            return Err(ConfigError::MissingField("commands.camera_live_sample"));
        }
        if commands.name_lookup.is_empty() {
            return Err(ConfigError::MissingField("commands.name_lookup"));
        }
        if commands.host_shutdown.is_empty() {
            return Err(ConfigError::MissingField("commands.host_shutdown"));
        }
        let base_collection_path = config
            .collection
            .base_path
            .clone()
            .ok_or(ConfigError::MissingField("collection.base_path"))?;

        Ok(Self {
            camera_video_cmd: commands.camera_video.clone(),
            camera_live_sample_cmd: commands.camera_live_sample.clone(),
            name_lookup_cmd: commands.name_lookup.clone(),
            host_shutdown_cmd: commands.host_shutdown.clone(),
            default_env: config.env.clone(),
            base_collection_path,
            collection_path: NO_COLLECTION.to_string(),
        })
    }

    /// Updates the subpath used by subsequent collection spawns. Does not
    /// affect an already-running process.
    pub fn set_collection_path(&mut self, path: &str) {
        self.collection_path = path.to_string();
    }

    pub fn collection_path(&self) -> &str {
        &self.collection_path
    }

    /// Absolute path of the reserved `nocollection` directory.
    pub fn nocollection_dir(&self) -> PathBuf {
        self.base_collection_path.join(NO_COLLECTION)
    }

    /// Absolute path of the current collection directory.
    pub fn collection_dir(&self) -> PathBuf {
        self.base_collection_path.join(&self.collection_path)
    }

    /// Where the live-sample command leaves its image.
    pub fn live_sample_file(&self) -> PathBuf {
        self.nocollection_dir().join(LIVE_SAMPLE_FILE)
    }

    /// Spawns the one-shot capture command inside the `nocollection`
    /// directory. The caller must wait on the child before reading the
    /// produced file.
    pub async fn spawn_live_sample(&self) -> Result<Child, RunnerError> {
        let dir = self.nocollection_dir();
        self.spawn_in(&self.camera_live_sample_cmd, &dir).await
    }

    /// Spawns the continuous recording command inside the current
    /// collection directory. The child stays alive until passed to
    /// [`CliRunner::stop_collection`].
    pub async fn spawn_collection(&self) -> Result<Child, RunnerError> {
        let dir = self.collection_dir();
        self.spawn_in(&self.camera_video_cmd, &dir).await
    }

    /// Kills the given collection process and resets the session path to
    /// the sentinel. Kill failures are logged and swallowed; the reset
    /// happens either way.
    pub async fn stop_collection(&mut self, child: Option<Child>) {
        if let Some(mut child) = child {
            if let Err(err) = child.kill().await {
                warn!(%err, "failed to kill collection process");
            }
        }
        self.collection_path = NO_COLLECTION.to_string();
    }

    /// Spawns the host shutdown command and hands the child back without
    /// waiting. If that process is later observed still running, shutdown
    /// has most likely failed.
    pub fn spawn_shutdown(&self) -> Result<Child, RunnerError> {
        debug!(cmd = ?self.host_shutdown_cmd, "spawning shutdown command");
        self.command(&self.host_shutdown_cmd)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: self.host_shutdown_cmd[0].clone(),
                source,
            })
    }

    /// Runs the name service query for `hostname` and returns the trimmed
    /// output. Fails if the command exits non-zero.
    pub async fn lookup_host(&self, hostname: &str) -> Result<String, RunnerError> {
        validate_hostname(hostname)?;
        let argv: Vec<String> = self
            .name_lookup_cmd
            .iter()
            .map(|arg| arg.replace("{hostname}", hostname))
            .collect();

        debug!(cmd = ?argv, "running name lookup");
        let output = self
            .command(&argv)
            .output()
            .await
            .map_err(|source| RunnerError::Spawn {
                program: argv[0].clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RunnerError::Lookup {
                hostname: hostname.to_string(),
                status: output.status,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn command(&self, argv: &[String]) -> Command {
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]).envs(&self.default_env);
        cmd
    }

    async fn spawn_in(&self, argv: &[String], dir: &Path) -> Result<Child, RunnerError> {
        // Idempotent: an existing directory is fine.
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| RunnerError::CreateDir {
                dir: dir.to_path_buf(),
                source,
            })?;

        debug!(cmd = ?argv, dir = %dir.display(), "spawning command");
        self.command(argv)
            .current_dir(dir)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: argv[0].clone(),
                source,
            })
    }
}

/// The hostname is the one substitution point fed by outside input, so it
/// is restricted to characters that can never change the meaning of an
/// argument.
fn validate_hostname(hostname: &str) -> Result<(), RunnerError> {
    let ok = !hostname.is_empty()
        && hostname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if !ok {
        return Err(RunnerError::InvalidHostname(hostname.to_string()));
    }
    Ok(())
}
