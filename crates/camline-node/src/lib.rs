//! Server-side services for a camline node.
//!
//! Every node runs the [`node::NodeService`]; the statically configured
//! coordinator additionally runs the [`coordinator::CoordinatorService`]
//! that fans operator commands out to the whole array.

pub mod coordinator;
pub mod node;
pub mod server;
