//! Shared plumbing for the camline camera array.
//!
//! This crate holds everything the node server and the operator client have
//! in common: the resolved configuration object, the name-to-address
//! resolver for the array, and the [`CliRunner`] wrapper that turns control
//! requests into external command execution.

pub mod config;
pub mod error;
pub mod resolver;
pub mod runner;

pub use config::Config;
pub use error::{ConfigError, ResolveError, RunnerError};
pub use resolver::Resolver;
pub use runner::CliRunner;
