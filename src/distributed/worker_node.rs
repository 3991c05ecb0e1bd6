//! `WorkerNode`: the worker side of a distributed test. Runs whatever share
//! of a `TestPlan` it was assigned as an ordinary local `TestRunner`, and
//! periodically pushes `WorkerMetrics` back to the coordinator.

use super::types::{Assignment, WorkerHealth, WorkerId, WorkerInfo, WorkerMetrics};
use crate::error::WorkerUnreachable;
use crate::runner::{RunnerPhase, TestRunner};
use crate::task::TaskFactory;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// How often a worker node pushes a `WorkerMetrics` sample for each of its
/// active runners.
const METRICS_PUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Resolves a task kind name to the `TaskFactory` that produces it. Workers
/// are configured with one of these at construction; concrete task kinds
/// (HTTP calls, gRPC calls, ...) are an external concern per spec §6, so
/// this crate only defines the seam.
pub trait TaskKindRegistry: Send + Sync {
    fn factory_for(&self, task_kind: &str) -> Option<Arc<dyn TaskFactory>>;
}

/// A worker node able to accept assignments, run them locally, and report
/// back health and metrics.
pub struct WorkerNode {
    pub id: WorkerId,
    info: RwLock<WorkerInfo>,
    runners: DashMap<String, Arc<TestRunner>>,
    registry: Arc<dyn TaskKindRegistry>,
    metrics_tx: mpsc::Sender<WorkerMetrics>,
}

impl WorkerNode {
    pub fn new(
        worker: super::types::Worker,
        registry: Arc<dyn TaskKindRegistry>,
        metrics_tx: mpsc::Sender<WorkerMetrics>,
    ) -> Arc<Self> {
        let id = worker.id;
        Arc::new(WorkerNode {
            id,
            info: RwLock::new(WorkerInfo {
                worker,
                health: WorkerHealth::Healthy,
                current_load: 0,
                last_heartbeat_ms: now_ms(),
            }),
            runners: DashMap::new(),
            registry,
            metrics_tx,
        })
    }

    pub fn info(&self) -> WorkerInfo {
        self.info.read().clone()
    }

    /// Recompute health from load alone, matching the controller's own
    /// thresholds (spec §4.5: `Unhealthy` above 1.1x capacity, `AtCapacity`
    /// at or above capacity). `Overloaded` is never derived here — it is a
    /// worker-self-reported state (spec §4.5), set via `report_overloaded`.
    fn recompute_health(&self) {
        let mut info = self.info.write();
        if matches!(info.health, WorkerHealth::Overloaded) {
            info.last_heartbeat_ms = now_ms();
            return;
        }
        let load_fraction = info.current_load as f64 / info.worker.max_concurrency.max(1) as f64;
        info.health = if load_fraction > 1.1 {
            WorkerHealth::Unhealthy
        } else if load_fraction >= 1.0 {
            WorkerHealth::AtCapacity
        } else {
            WorkerHealth::Healthy
        };
        info.last_heartbeat_ms = now_ms();
    }

    /// A worker's own self-assessment that it is overloaded (e.g. by some
    /// internal resource signal this crate does not model), distinct from
    /// the load-ratio-derived states above (spec §4.5: "Overloaded is
    /// worker-self-reported"). Cleared on the next `recompute_health` call
    /// that follows a load change, same as any other health transition.
    pub fn report_overloaded(&self) {
        let mut info = self.info.write();
        info.health = WorkerHealth::Overloaded;
        info.last_heartbeat_ms = now_ms();
    }

    /// Accept a share of a distributed test and begin running it locally.
    pub fn assign(self: &Arc<Self>, assignment: Assignment) -> Result<(), WorkerUnreachable> {
        let factory = self.registry.factory_for(&assignment.task_kind).ok_or_else(|| {
            WorkerUnreachable::Rpc {
                worker_id: self.id.to_string(),
                operation: "AssignTask",
                reason: format!("no task factory registered for kind '{}'", assignment.task_kind),
            }
        })?;

        let mut plan = assignment.plan.clone();
        plan.mode = assignment.share_mode;

        let runner = TestRunner::new(plan, factory).map_err(|e| WorkerUnreachable::Rpc {
            worker_id: self.id.to_string(),
            operation: "AssignTask",
            reason: e.to_string(),
        })?;

        self.runners.insert(assignment.test_id.clone(), Arc::clone(&runner));
        {
            let mut info = self.info.write();
            info.current_load += match assignment.share_mode {
                crate::plan::ExecutionMode::Concurrency { max_concurrency } => max_concurrency,
                crate::plan::ExecutionMode::Rate { target_rate } => target_rate.ceil() as u32,
                crate::plan::ExecutionMode::Hybrid { max_concurrency, .. } => max_concurrency,
            };
        }
        self.recompute_health();

        let node = Arc::clone(self);
        let test_id = assignment.test_id.clone();
        tokio::spawn(async move {
            Arc::clone(&runner).run().await;
            node.runners.remove(&test_id);
        });

        let node = Arc::clone(self);
        let test_id = assignment.test_id.clone();
        tokio::spawn(async move { node.push_metrics_loop(test_id).await });

        Ok(())
    }

    async fn push_metrics_loop(self: Arc<Self>, test_id: String) {
        loop {
            tokio::time::sleep(METRICS_PUSH_INTERVAL).await;
            let runner = match self.runners.get(&test_id) {
                Some(r) => Arc::clone(r.value()),
                None => return,
            };
            let snapshot = runner.snapshot();
            let metrics = WorkerMetrics {
                worker_id: self.id,
                test_id: test_id.clone(),
                snapshot,
                reported_at_ms: now_ms(),
            };
            if self.metrics_tx.send(metrics).await.is_err() {
                return;
            }
            if runner.status().phase.is_terminal() {
                return;
            }
        }
    }

    pub fn stop_test(&self, test_id: &str) -> Result<(), WorkerUnreachable> {
        if let Some(runner) = self.runners.get(test_id) {
            runner.request_stop();
            Ok(())
        } else {
            Err(WorkerUnreachable::Rpc {
                worker_id: self.id.to_string(),
                operation: "StopTest",
                reason: format!("no active test with id {test_id}"),
            })
        }
    }

    pub fn active_test_ids(&self) -> Vec<String> {
        self.runners.iter().map(|e| e.key().clone()).collect()
    }

    pub fn phase_of(&self, test_id: &str) -> Option<RunnerPhase> {
        self.runners.get(test_id).map(|r| r.status().phase)
    }
}
