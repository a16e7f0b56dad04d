//! Assembles the gRPC server for one node.

use crate::coordinator::CoordinatorService;
use crate::node::NodeService;
use camline_core::{CliRunner, Resolver};
use camline_proto::coordinator_server::CoordinatorServer;
use camline_proto::node_server::NodeServer;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::server::Router;
use tonic::transport::Server;
use tracing::info;

/// How long in-flight RPCs get to finish after a termination signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Builds the router for this node: the Node service always, plus the
/// Coordinator service when this node is the configured coordinator.
pub fn build_router(
    node_id: &str,
    coordinator_id: &str,
    resolver: Arc<Resolver>,
    runner: CliRunner,
) -> Router {
    let node = NodeService::new(node_id, coordinator_id, runner);

    let coordinator = if node.is_coordinator() {
        info!(node = %node_id, "registering coordinator service");
        Some(CoordinatorServer::new(CoordinatorService::new(resolver)))
    } else {
        None
    };

    Server::builder()
        .add_service(NodeServer::new(node))
        .add_optional_service(coordinator)
}
