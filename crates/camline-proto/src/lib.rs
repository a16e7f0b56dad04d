//! Generated gRPC protocol definitions for the camline camera array.
//!
//! This crate provides the protocol buffer definitions and generated code
//! for communication between the operator client, the coordinator, and the
//! per-node services.

pub mod camline {
    pub mod v1 {
        tonic::include_proto!("camline.v1");
    }
}

// Re-export commonly used types for convenience
pub use camline::v1::*;
