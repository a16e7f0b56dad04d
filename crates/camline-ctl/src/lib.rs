//! Client-side command orchestration for the camline array.
//!
//! The orchestrator locates the coordinator by probing every configured
//! node and then issues the operator's command to it; sample requests go
//! straight to the target node instead.

pub mod error;
pub mod orchestrator;

pub use error::CtlError;
