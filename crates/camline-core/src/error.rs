//! Error types for the camline-core crate

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Configuration problems. All of these are fatal at construction; a
/// process with a broken configuration never starts serving.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid override binding {0:?} (expected key=value)")]
    BadBinding(String),

    #[error("invalid configuration: {0}")]
    Deserialize(#[from] toml::de::Error),

    #[error("missing required config field: {0}")]
    MissingField(&'static str),
}

/// Lookup failures against the resolver registry.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("unknown node name: {0}")]
    UnknownNode(String),
}

/// Failures from the external commands wrapped by [`crate::CliRunner`].
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to create directory {dir}: {source}")]
    CreateDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("name lookup for {hostname} exited with {status}")]
    Lookup { hostname: String, status: ExitStatus },

    #[error("hostname {0:?} contains characters outside [A-Za-z0-9._-]")]
    InvalidHostname(String),
}
