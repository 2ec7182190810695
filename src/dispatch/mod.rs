//! Post-ACK dispatch to per-workspace engine workers.
//!
//! The webhook handler acknowledges the upstream before any engine runs.
//! Dispatch routes each acknowledged push to a per-workspace worker task,
//! created lazily on the first push for that workspace. Distinct workspaces
//! process concurrently; pushes within one workspace are serialized by the
//! worker's queue, which keeps a workspace's engine chain ordered without a
//! database lock.
//!
//! Engine failures never travel back to the webhook path: the worker logs
//! and moves on, and the next delivery reprocesses the same state.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use crate::engine::{ConflictEngine, FeatureEngine};
use crate::types::WorkspaceId;

/// Buffered pushes per workspace worker.
const WORKER_CHANNEL_BUFFER: usize = 100;

/// Errors that can occur during dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The worker's queue is gone (shutdown raced the dispatch).
    #[error("failed to enqueue push for worker: channel closed")]
    ChannelClosed,
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// One acknowledged push, ready for the engine chain.
#[derive(Debug, Clone)]
pub struct EngineJob {
    pub workspace: WorkspaceId,
    /// Changed files of the push, deduped.
    pub modified_files: Vec<String>,
    /// Branch the push landed on.
    pub trigger_branch: String,
    /// New head commit of the push.
    pub commit_sha: String,
}

/// Per-workspace worker handle.
struct WorkerHandle {
    tx: mpsc::Sender<EngineJob>,
    #[allow(dead_code)]
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Routes acknowledged pushes to per-workspace workers.
///
/// Thread-safe and shared across HTTP handler tasks. Workers are spawned on
/// demand and torn down collectively at shutdown.
pub struct Dispatcher {
    conflict: ConflictEngine,
    feature: FeatureEngine,
    workers: RwLock<HashMap<WorkspaceId, WorkerHandle>>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(conflict: ConflictEngine, feature: FeatureEngine) -> Self {
        Dispatcher {
            conflict,
            feature,
            workers: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Enqueues a push for its workspace's worker, spawning the worker if
    /// this is the workspace's first push.
    #[instrument(skip(self, job), fields(workspace = %job.workspace, branch = %job.trigger_branch))]
    pub async fn dispatch(&self, job: EngineJob) -> Result<()> {
        let tx = self.get_or_spawn_worker(&job.workspace).await;
        tx.send(job).await.map_err(|_| DispatchError::ChannelClosed)
    }

    async fn get_or_spawn_worker(&self, workspace: &WorkspaceId) -> mpsc::Sender<EngineJob> {
        // Fast path under the read lock.
        {
            let workers = self.workers.read().await;
            if let Some(handle) = workers.get(workspace) {
                return handle.tx.clone();
            }
        }

        let mut workers = self.workers.write().await;
        // Double-check after acquiring the write lock.
        if let Some(handle) = workers.get(workspace) {
            return handle.tx.clone();
        }

        debug!(workspace = %workspace, "Spawning engine worker");
        let (tx, rx) = mpsc::channel(WORKER_CHANNEL_BUFFER);
        let cancel = self.shutdown.child_token();
        let task = tokio::spawn(run_worker(
            workspace.clone(),
            self.conflict.clone(),
            self.feature.clone(),
            rx,
            cancel.clone(),
        ));

        workers.insert(
            workspace.clone(),
            WorkerHandle {
                tx: tx.clone(),
                task,
                cancel,
            },
        );
        tx
    }

    /// Number of live workers.
    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.len()
    }

    /// Whether a worker exists for the workspace.
    pub async fn has_worker(&self, workspace: &WorkspaceId) -> bool {
        self.workers.read().await.contains_key(workspace)
    }

    /// Cancels every worker. In-flight engine runs complete; queued pushes
    /// are dropped (the pipeline is event-driven, not durable).
    pub async fn shutdown_all(&self) {
        info!("Shutting down engine workers");
        self.shutdown.cancel();
        let mut workers = self.workers.write().await;
        for (workspace, handle) in workers.drain() {
            trace!(workspace = %workspace, "Worker cancelled");
            handle.cancel.cancel();
        }
    }
}

/// Worker event loop: drain the queue serially until cancellation.
async fn run_worker(
    workspace: WorkspaceId,
    conflict: ConflictEngine,
    feature: FeatureEngine,
    mut rx: mpsc::Receiver<EngineJob>,
    cancel: CancellationToken,
) {
    debug!(workspace = %workspace, "Engine worker started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            job = rx.recv() => {
                let Some(job) = job else { break };
                trace!(
                    workspace = %workspace,
                    files = job.modified_files.len(),
                    "Running engine chain"
                );
                conflict
                    .run(&job.workspace, &job.modified_files, &job.trigger_branch)
                    .await;
                // The feature engine invokes the health engine itself.
                feature
                    .run(&job.workspace, &job.modified_files, &job.commit_sha)
                    .await;
            }
        }
    }
    debug!(workspace = %workspace, "Engine worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::store::workspaces::{self, NewWorkspace};
    use crate::store::{Database, activity};
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    fn make_dispatcher() -> (Arc<Dispatcher>, Database, Arc<EventBus>) {
        let db = Database::open_in_memory().unwrap();
        let bus = Arc::new(EventBus::new());
        let conflict = ConflictEngine::new(db.clone(), Arc::clone(&bus));
        let feature = FeatureEngine::new(db.clone(), Arc::clone(&bus));
        (
            Arc::new(Dispatcher::new(conflict, feature)),
            db,
            bus,
        )
    }

    fn job(workspace: &str, files: &[&str]) -> EngineJob {
        EngineJob {
            workspace: WorkspaceId::new(workspace),
            modified_files: files.iter().map(|f| f.to_string()).collect(),
            trigger_branch: "feat".to_string(),
            commit_sha: "a".repeat(40),
        }
    }

    #[tokio::test]
    async fn first_dispatch_creates_a_worker() {
        let (dispatcher, _db, _bus) = make_dispatcher();
        let ws = WorkspaceId::new("ws");

        assert_eq!(dispatcher.worker_count().await, 0);
        dispatcher.dispatch(job("ws", &["a.js"])).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(dispatcher.worker_count().await, 1);
        assert!(dispatcher.has_worker(&ws).await);
    }

    #[tokio::test]
    async fn same_workspace_reuses_the_worker() {
        let (dispatcher, _db, _bus) = make_dispatcher();

        dispatcher.dispatch(job("ws", &["a.js"])).await.unwrap();
        dispatcher.dispatch(job("ws", &["b.js"])).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(dispatcher.worker_count().await, 1);
    }

    #[tokio::test]
    async fn distinct_workspaces_get_distinct_workers() {
        let (dispatcher, _db, _bus) = make_dispatcher();

        dispatcher.dispatch(job("ws-a", &["a.js"])).await.unwrap();
        dispatcher.dispatch(job("ws-b", &["b.js"])).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(dispatcher.worker_count().await, 2);
    }

    #[tokio::test]
    async fn dispatched_job_drives_the_engine_chain() {
        let (dispatcher, db, bus) = make_dispatcher();
        let ws = WorkspaceId::new("ws");
        {
            let conn = db.conn().unwrap();
            workspaces::create(&conn, &NewWorkspace::new("ws", 1, "o/r", "k"), Utc::now()).unwrap();
            let now = Utc::now();
            activity::upsert_files(&conn, &ws, "feat-1", &["a.js".into()], "s1", now).unwrap();
            activity::upsert_files(&conn, &ws, "feat-2", &["a.js".into()], "s2", now).unwrap();
        }
        let mut sub = bus.register().await;
        bus.bind(sub.id, &ws).await;

        dispatcher.dispatch(job("ws", &["a.js"])).await.unwrap();

        // The chain emits a conflict warning and, via the feature engine's
        // tail call, a health update.
        let first = tokio::time::timeout(Duration::from_secs(1), sub.receiver.recv())
            .await
            .expect("conflict warning within deadline")
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(json["type"], "CONFLICT_WARNING");

        let second = tokio::time::timeout(Duration::from_secs(1), sub.receiver.recv())
            .await
            .expect("health update within deadline")
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&second).unwrap();
        assert_eq!(json["type"], "HEALTH_UPDATE");
    }

    #[tokio::test]
    async fn concurrent_dispatch_spawns_one_worker() {
        let (dispatcher, _db, _bus) = make_dispatcher();

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    dispatcher
                        .dispatch(job("ws", &[&format!("f{i}.js")]))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(dispatcher.worker_count().await, 1);
    }

    #[tokio::test]
    async fn shutdown_stops_workers() {
        let (dispatcher, _db, _bus) = make_dispatcher();

        dispatcher.dispatch(job("ws", &["a.js"])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(dispatcher.worker_count().await, 1);

        dispatcher.shutdown_all().await;
        assert_eq!(dispatcher.worker_count().await, 0);
    }
}
