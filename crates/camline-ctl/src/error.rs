//! Error types for the camline-ctl crate

use camline_core::ResolveError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CtlError {
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("gRPC status error: {0}")]
    Status(#[from] tonic::Status),

    #[error(transparent)]
    UnknownNode(#[from] ResolveError),

    #[error("could not find a coordinator among the configured nodes")]
    CoordinatorNotFound,

    #[error("failed to write sample image {path}: {source}")]
    WriteSample {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
