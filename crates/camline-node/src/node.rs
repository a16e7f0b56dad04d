//! The Node service runs on every participant in the camera array.
//!
//! External users send most requests to the coordinator, but specific
//! requests (the role probe, a live sample) may target a node directly.

use camline_core::CliRunner;
use camline_proto::node_server::Node;
use camline_proto::{
    GooseReply, GooseRequest, LiveSampleReply, LiveSampleRequest, RecordReply, RecordRequest,
    ShutdownReply, ShutdownRequest,
};
use tokio::process::Child;
use tokio::sync::Mutex;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

/// Per-node RPC handler. The role is fixed at construction by comparing
/// this node's identity against the configured coordinator identity and
/// never changes afterwards.
pub struct NodeService {
    node_id: String,
    coordinator_id: String,
    is_coordinator: bool,
    inner: Mutex<NodeInner>,
}

/// Mutable per-node state: the runner's session path and the handle of the
/// continuous recording process, if one is live. The handle is owned here
/// exclusively; the runner never keeps one.
struct NodeInner {
    runner: CliRunner,
    collection: Option<Child>,
}

impl NodeService {
    pub fn new(node_id: &str, coordinator_id: &str, runner: CliRunner) -> Self {
        let is_coordinator = node_id == coordinator_id;
        info!(node = %node_id, coordinator = %coordinator_id, is_coordinator, "starting node");
        Self {
            node_id: node_id.to_string(),
            coordinator_id: coordinator_id.to_string(),
            is_coordinator,
            inner: Mutex::new(NodeInner {
                runner,
                collection: None,
            }),
        }
    }

    pub fn is_coordinator(&self) -> bool {
        self.is_coordinator
    }

    #[cfg(test)]
    async fn collection_active(&self) -> bool {
        self.inner.lock().await.collection.is_some()
    }
}

#[tonic::async_trait]
impl Node for NodeService {
    async fn goose(
        &self,
        _request: Request<GooseRequest>,
    ) -> Result<Response<GooseReply>, Status> {
        let message = if self.is_coordinator { "Goose!" } else { "Duck!" };
        debug!(node = %self.node_id, message, "role probe");
        Ok(Response::new(GooseReply {
            id: self.coordinator_id.clone(),
            message: message.to_string(),
        }))
    }

    async fn record(
        &self,
        request: Request<RecordRequest>,
    ) -> Result<Response<RecordReply>, Status> {
        let req = request.into_inner();
        info!(
            node = %self.node_id,
            start = ?req.start_sensor_ids,
            stop = ?req.stop_sensor_ids,
            data_path = %req.data_path,
            "record request"
        );

        let mut inner = self.inner.lock().await;
        if !req.data_path.is_empty() {
            inner.runner.set_collection_path(&req.data_path);
        }

        // Any sensors to start means one recording command; no sensors to
        // start means stop everything. Per-sensor command selection is not
        // wired up yet.
        if !req.start_sensor_ids.is_empty() {
            match inner.runner.spawn_collection().await {
                // A prior live handle, if any, is replaced without being
                // stopped. Known gap: the replaced process keeps running
                // until the host goes down.
                Ok(child) => inner.collection = Some(child),
                Err(err) => warn!(node = %self.node_id, %err, "failed to start collection"),
            }
        } else {
            let child = inner.collection.take();
            inner.runner.stop_collection(child).await;
        }

        // Command execution failures stay node-local; the reply does not
        // report whether the spawn succeeded.
        Ok(Response::new(RecordReply {}))
    }

    async fn live_sample(
        &self,
        request: Request<LiveSampleRequest>,
    ) -> Result<Response<LiveSampleReply>, Status> {
        let req = request.into_inner();
        info!(node = %self.node_id, sensors = ?req.sensor_ids, "live sample request");

        let (mut child, sample_file) = {
            let inner = self.inner.lock().await;
            let child = inner
                .runner
                .spawn_live_sample()
                .await
                .map_err(|err| Status::internal(format!("failed to start capture: {err}")))?;
            (child, inner.runner.live_sample_file())
        };

        let status = child
            .wait()
            .await
            .map_err(|err| Status::internal(format!("capture did not finish: {err}")))?;
        if !status.success() {
            warn!(node = %self.node_id, %status, "capture command exited non-zero");
        }

        let image = tokio::fs::read(&sample_file).await.map_err(|err| {
            Status::internal(format!(
                "no capture at {}: {err}",
                sample_file.display()
            ))
        })?;

        Ok(Response::new(LiveSampleReply { image }))
    }

    async fn shutdown(
        &self,
        _request: Request<ShutdownRequest>,
    ) -> Result<Response<ShutdownReply>, Status> {
        info!(node = %self.node_id, "shutdown request");

        let inner = self.inner.lock().await;
        match inner.runner.spawn_shutdown() {
            // Nobody waits on this child; if it is later seen still
            // running, shutdown is presumed to have failed.
            Ok(child) => drop(child),
            Err(err) => warn!(node = %self.node_id, %err, "failed to spawn shutdown command"),
        }

        Ok(Response::new(ShutdownReply {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camline_core::config::{Collection, Commands, Config};
    use camline_proto::SensorId;
    use std::path::Path;
    use tempfile::tempdir;

    fn runner(base: &Path, live_sample_cmd: Vec<String>) -> CliRunner {
        let config = Config {
            commands: Commands {
                camera_video: vec!["true".to_string()],
                camera_live_sample: live_sample_cmd,
                name_lookup: vec!["echo".to_string(), "{hostname}".to_string()],
                host_shutdown: vec!["true".to_string()],
            },
            collection: Collection {
                base_path: Some(base.to_path_buf()),
            },
            ..Config::default()
        };
        CliRunner::new(&config).unwrap()
    }

    fn service(base: &Path, node_id: &str, coordinator_id: &str) -> NodeService {
        NodeService::new(node_id, coordinator_id, runner(base, vec!["true".to_string()]))
    }

    #[tokio::test]
    async fn test_goose_answers_by_role() {
        let dir = tempdir().unwrap();

        let coordinator = service(dir.path(), "cam-a", "cam-a");
        let reply = coordinator
            .goose(Request::new(GooseRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(reply.message, "Goose!");
        assert_eq!(reply.id, "cam-a");

        let follower = service(dir.path(), "cam-b", "cam-a");
        let reply = follower
            .goose(Request::new(GooseRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(reply.message, "Duck!");
    }

    #[tokio::test]
    async fn test_record_start_creates_session_directory() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path(), "cam-a", "cam-a");

        svc.record(Request::new(RecordRequest {
            start_sensor_ids: vec![SensorId::Camera1 as i32],
            stop_sensor_ids: vec![],
            data_path: "r1".to_string(),
        }))
        .await
        .unwrap();

        assert!(dir.path().join("r1").is_dir());
        assert!(svc.collection_active().await);
    }

    #[tokio::test]
    async fn test_record_stop_clears_handle() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path(), "cam-a", "cam-a");

        svc.record(Request::new(RecordRequest {
            start_sensor_ids: vec![SensorId::Camera1 as i32],
            stop_sensor_ids: vec![],
            data_path: "r1".to_string(),
        }))
        .await
        .unwrap();
        assert!(svc.collection_active().await);

        svc.record(Request::new(RecordRequest {
            start_sensor_ids: vec![],
            stop_sensor_ids: vec![SensorId::Camera1 as i32],
            data_path: String::new(),
        }))
        .await
        .unwrap();
        assert!(!svc.collection_active().await);
    }

    #[tokio::test]
    async fn test_record_start_replaces_prior_handle() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path(), "cam-a", "cam-a");

        for path in ["first", "second"] {
            svc.record(Request::new(RecordRequest {
                start_sensor_ids: vec![SensorId::Camera1 as i32],
                stop_sensor_ids: vec![],
                data_path: path.to_string(),
            }))
            .await
            .unwrap();
        }

        // The second start overwrote the first handle; both session
        // directories exist and the slot still holds a child.
        assert!(dir.path().join("first").is_dir());
        assert!(dir.path().join("second").is_dir());
        assert!(svc.collection_active().await);
    }

    #[tokio::test]
    async fn test_record_swallows_spawn_failure() {
        let dir = tempdir().unwrap();
        let config = Config {
            commands: Commands {
                camera_video: vec!["/nonexistent/recorder".to_string()],
                camera_live_sample: vec!["true".to_string()],
                name_lookup: vec!["echo".to_string()],
                host_shutdown: vec!["true".to_string()],
            },
            collection: Collection {
                base_path: Some(dir.path().to_path_buf()),
            },
            ..Config::default()
        };
        let svc = NodeService::new("cam-a", "cam-a", CliRunner::new(&config).unwrap());

        // The spawn fails but the reply is still success.
        let reply = svc
            .record(Request::new(RecordRequest {
                start_sensor_ids: vec![SensorId::Camera1 as i32],
                stop_sensor_ids: vec![],
                data_path: "r1".to_string(),
            }))
            .await;
        assert!(reply.is_ok());
        assert!(!svc.collection_active().await);
    }

    #[tokio::test]
    async fn test_live_sample_returns_captured_bytes() {
        let dir = tempdir().unwrap();
        let fixture = dir.path().join("fixture.jpg");
        tokio::fs::write(&fixture, b"not really a jpeg").await.unwrap();

        let runner = runner(
            dir.path(),
            vec![
                "cp".to_string(),
                fixture.to_string_lossy().to_string(),
                "live_sample.jpg".to_string(),
            ],
        );
        let svc = NodeService::new("cam-a", "cam-a", runner);

        let reply = svc
            .live_sample(Request::new(LiveSampleRequest { sensor_ids: vec![] }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(reply.image, b"not really a jpeg");
        // The reply bytes are exactly what landed in the nocollection
        // directory.
        let on_disk = tokio::fs::read(dir.path().join("nocollection/live_sample.jpg"))
            .await
            .unwrap();
        assert_eq!(reply.image, on_disk);
    }

    #[tokio::test]
    async fn test_live_sample_fails_when_no_file_produced() {
        let dir = tempdir().unwrap();
        // "true" exits cleanly but writes nothing.
        let svc = service(dir.path(), "cam-a", "cam-a");

        let err = svc
            .live_sample(Request::new(LiveSampleRequest { sensor_ids: vec![] }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Internal);
    }

    #[tokio::test]
    async fn test_shutdown_replies_immediately() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path(), "cam-a", "cam-a");

        let reply = svc.shutdown(Request::new(ShutdownRequest {})).await;
        assert!(reply.is_ok());
    }
}
