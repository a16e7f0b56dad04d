//! The coordinator (goose) handles commands aimed at the whole array.
//!
//! External operators find the coordinator through the role probe and talk
//! to it directly; the coordinator relays each command to every node in the
//! registry, itself included. Fan-out is strictly sequential: one channel
//! is opened, used, and closed before the next node is contacted, so a
//! single unreachable node aborts the remainder of the operation. Nothing
//! is retried and nothing already done is rolled back.

use camline_core::Resolver;
use camline_proto::node_client::NodeClient;
use camline_proto::{
    coordinator_server::Coordinator, RecordRequest, SensorId, ShutdownClusterReply,
    ShutdownClusterRequest, ShutdownRequest, StartCollectingReply, StartCollectingRequest,
    StartCollectingResult, StopAllCollectsReply, StopAllCollectsRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Response, Status};
use tracing::{debug, info};

/// Bound on each per-node RPC during fan-out.
pub const FAN_OUT_TIMEOUT: Duration = Duration::from_secs(10);

const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// The camera the coordinator starts on every node. Choosing sensors per
/// node is not wired up yet.
const DEFAULT_START_SENSOR: SensorId = SensorId::Camera1;

/// Every sensor kind the array knows about; stopping is always total.
const ALL_SENSORS: [SensorId; 8] = [
    SensorId::Camera1,
    SensorId::Camera2,
    SensorId::Camera3,
    SensorId::Camera4,
    SensorId::Imu1,
    SensorId::Imu2,
    SensorId::Imu3,
    SensorId::Imu4,
];

/// Fan-out RPC handler, present only on the coordinator node.
pub struct CoordinatorService {
    resolver: Arc<Resolver>,
}

impl CoordinatorService {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }

    /// Opens a fresh channel to one node. Resolution and connection
    /// failures surface as statuses so they abort the calling fan-out.
    async fn node_client(&self, node: &str) -> Result<NodeClient<Channel>, Status> {
        let addr = self
            .resolver
            .address_for_name(node, false)
            .map_err(|err| Status::failed_precondition(err.to_string()))?;
        let channel = endpoint(&addr)
            .map_err(|err| Status::internal(format!("bad endpoint for {node}: {err}")))?
            .connect()
            .await
            .map_err(|err| Status::unavailable(format!("node {node} unreachable: {err}")))?;
        Ok(NodeClient::new(channel))
    }
}

fn endpoint(addr: &str) -> Result<Endpoint, tonic::transport::Error> {
    Ok(Endpoint::from_shared(format!("http://{addr}"))?
        .timeout(FAN_OUT_TIMEOUT)
        .connect_timeout(FAN_OUT_TIMEOUT)
        .keep_alive_timeout(KEEP_ALIVE_TIMEOUT))
}

#[tonic::async_trait]
impl Coordinator for CoordinatorService {
    async fn start_collecting(
        &self,
        request: Request<StartCollectingRequest>,
    ) -> Result<Response<StartCollectingReply>, Status> {
        let req = request.into_inner();
        info!(recording_id = %req.recording_id, tags = ?req.recording_tag, "start collecting");

        for node in self.resolver.all_nodes() {
            let mut client = self.node_client(&node).await?;
            let record = RecordRequest {
                start_sensor_ids: vec![DEFAULT_START_SENSOR as i32],
                stop_sensor_ids: vec![],
                data_path: req.recording_id.clone(),
            };
            debug!(%node, "sending record");
            client.record(record).await?;
            debug!(%node, "record acknowledged");
        }

        Ok(Response::new(StartCollectingReply {
            result: StartCollectingResult::Ok as i32,
            message: "All sensors started.".to_string(),
        }))
    }

    async fn stop_all_collects(
        &self,
        _request: Request<StopAllCollectsRequest>,
    ) -> Result<Response<StopAllCollectsReply>, Status> {
        info!("stop all collects");

        for node in self.resolver.all_nodes() {
            let mut client = self.node_client(&node).await?;
            let record = RecordRequest {
                start_sensor_ids: vec![],
                stop_sensor_ids: ALL_SENSORS.iter().map(|s| *s as i32).collect(),
                data_path: String::new(),
            };
            debug!(%node, "sending stop record");
            client.record(record).await?;
        }

        Ok(Response::new(StopAllCollectsReply {}))
    }

    async fn shutdown_cluster(
        &self,
        _request: Request<ShutdownClusterRequest>,
    ) -> Result<Response<ShutdownClusterReply>, Status> {
        info!("shutting down all nodes");

        // Registry iteration order, whatever that happens to be. Some node
        // may matter for connectivity back to the operator and would be
        // better shut down last; no such ordering is implemented.
        for node in self.resolver.all_nodes() {
            let mut client = self.node_client(&node).await?;
            debug!(%node, "sending shutdown");
            client.shutdown(ShutdownRequest {}).await?;
        }

        Ok(Response::new(ShutdownClusterReply {}))
    }
}
