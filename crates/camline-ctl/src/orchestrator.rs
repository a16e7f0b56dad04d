//! Locates the coordinator and issues operator commands.
//!
//! Every call opens one short-lived channel, uses it, and drops it; there
//! is no connection pooling and no retry anywhere. Discovery tolerates
//! unreachable nodes (they are simply not the coordinator), but once a
//! command is in flight any failure surfaces straight to the caller.

use crate::error::CtlError;
use camline_core::Resolver;
use camline_proto::coordinator_client::CoordinatorClient;
use camline_proto::node_client::NodeClient;
use camline_proto::{
    GooseReply, GooseRequest, LiveSampleRequest, ShutdownClusterRequest, StartCollectingRequest,
    StopAllCollectsRequest,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info, warn};

/// Timeout for the role probe; keeps discovery brisk when a node is down.
pub const GOOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Timeout for commands forwarded to the coordinator or a target node.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// One channel per call: plaintext, first resolved address, no retries,
/// bounded keep-alive.
fn endpoint(addr: &str, timeout: Duration) -> Result<Endpoint, CtlError> {
    Ok(Endpoint::from_shared(format!("http://{addr}"))?
        .timeout(timeout)
        .connect_timeout(timeout)
        .keep_alive_timeout(KEEP_ALIVE_TIMEOUT))
}

async fn connect(resolver: &Resolver, name: &str, timeout: Duration) -> Result<Channel, CtlError> {
    let addr = resolver.address_for_name(name, false)?;
    debug!(node = %name, %addr, "connecting");
    Ok(endpoint(&addr, timeout)?.connect().await?)
}

/// Probes every configured node and returns the one that answers as
/// coordinator, or `None` if nobody does. Nodes that fail to answer are
/// logged and skipped. If several nodes claim the role - a
/// misconfiguration - the last one probed wins.
pub async fn find_coordinator(resolver: &Resolver) -> Option<String> {
    let mut coordinator = None;
    for candidate in resolver.all_nodes() {
        let reply = match probe(resolver, &candidate).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(node = %candidate, %err, "role probe failed");
                continue;
            }
        };
        debug!(node = %candidate, message = %reply.message, "role probe answered");
        if reply.message == "Goose!" {
            coordinator = Some(candidate);
        }
    }
    coordinator
}

async fn probe(resolver: &Resolver, candidate: &str) -> Result<GooseReply, CtlError> {
    let channel = connect(resolver, candidate, GOOSE_TIMEOUT).await?;
    let mut node = NodeClient::new(channel);
    Ok(node.goose(GooseRequest {}).await?.into_inner())
}

/// Asks `target` directly (bypassing the coordinator) for a live sample
/// and writes the image to `out_dir/sample-<target>.jpg`.
pub async fn request_sample(
    target: &str,
    resolver: &Resolver,
    out_dir: &Path,
) -> Result<PathBuf, CtlError> {
    info!(node = %target, "requesting live sample");
    let channel = connect(resolver, target, COMMAND_TIMEOUT).await?;
    let mut node = NodeClient::new(channel);
    let reply = node
        .live_sample(LiveSampleRequest { sensor_ids: vec![] })
        .await?
        .into_inner();

    let path = out_dir.join(format!("sample-{target}.jpg"));
    tokio::fs::write(&path, &reply.image)
        .await
        .map_err(|source| CtlError::WriteSample {
            path: path.clone(),
            source,
        })?;
    info!(path = %path.display(), bytes = reply.image.len(), "wrote sample image");
    Ok(path)
}

/// Tells the coordinator to start a collection on every node. Returns the
/// coordinator's status message.
pub async fn start_collecting(
    coordinator: &str,
    resolver: &Resolver,
    recording_id: &str,
    recording_tag: Option<&str>,
) -> Result<String, CtlError> {
    info!(node = %coordinator, recording_id, "start collecting");
    let channel = connect(resolver, coordinator, COMMAND_TIMEOUT).await?;
    let mut goose = CoordinatorClient::new(channel);
    let request = StartCollectingRequest {
        recording_id: recording_id.to_string(),
        recording_tag: recording_tag.map(|t| vec![t.to_string()]).unwrap_or_default(),
    };
    let reply = goose.start_collecting(request).await?.into_inner();
    Ok(reply.message)
}

/// Tells the coordinator to stop collecting on every node.
pub async fn stop_collecting(coordinator: &str, resolver: &Resolver) -> Result<(), CtlError> {
    info!(node = %coordinator, "stop collecting");
    let channel = connect(resolver, coordinator, COMMAND_TIMEOUT).await?;
    let mut goose = CoordinatorClient::new(channel);
    goose.stop_all_collects(StopAllCollectsRequest {}).await?;
    Ok(())
}

/// Tells the coordinator to shut down every node in the array.
pub async fn shutdown_cluster(coordinator: &str, resolver: &Resolver) -> Result<(), CtlError> {
    info!(node = %coordinator, "shutdown cluster");
    let channel = connect(resolver, coordinator, COMMAND_TIMEOUT).await?;
    let mut goose = CoordinatorClient::new(channel);
    goose.shutdown_cluster(ShutdownClusterRequest {}).await?;
    Ok(())
}
