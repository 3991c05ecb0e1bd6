//! Wire-level data types shared between the distributed coordinator and its
//! workers (spec §4.5). These are the payloads a production `WorkerRpc`
//! implementation would serialize over gRPC/HTTP; this crate only defines
//! their shape and an in-process transport for tests.

use crate::metrics::Snapshot;
use crate::plan::TestPlan;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        WorkerId(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A worker's self-reported health, included with every heartbeat. The
/// coordinator's distribution algorithm only considers `Healthy` and
/// `AtCapacity` workers (spec §4.5: "capable, healthy workers").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerHealth {
    Healthy,
    AtCapacity,
    Overloaded,
    Unhealthy,
    Disconnected,
}

impl WorkerHealth {
    pub fn is_assignable(&self) -> bool {
        matches!(self, WorkerHealth::Healthy | WorkerHealth::AtCapacity)
    }
}

/// A worker node as known to the coordinator: its identity, declared
/// capability, and current capacity ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub name: String,
    pub capable_task_kinds: Vec<String>,
    pub max_concurrency: u32,
}

impl Worker {
    pub fn supports(&self, task_kind: &str) -> bool {
        self.capable_task_kinds.iter().any(|k| k == task_kind)
    }
}

/// The coordinator's live view of a registered worker: its static
/// description plus the latest health/heartbeat it reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker: Worker,
    pub health: WorkerHealth,
    pub current_load: u32,
    pub last_heartbeat_ms: u64,
}

impl WorkerInfo {
    pub fn available_capacity(&self) -> u32 {
        self.worker.max_concurrency.saturating_sub(self.current_load)
    }
}

/// One worker's share of a distributed test, computed by the coordinator's
/// distribution algorithm and sent via `WorkerRpc::assign_task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub test_id: String,
    pub worker_id: WorkerId,
    pub task_kind: String,
    pub plan: TestPlan,
    /// This worker's share of the test's total target, already scaled down
    /// from the global plan (e.g. a fraction of `target_rate` or
    /// `max_concurrency`).
    pub share_mode: crate::plan::ExecutionMode,
}

/// A worker's periodic metrics push to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub worker_id: WorkerId,
    pub test_id: String,
    pub snapshot: Snapshot,
    pub reported_at_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_supports_checks_task_kind_membership() {
        let worker = Worker {
            id: WorkerId::new(),
            name: "w1".into(),
            capable_task_kinds: vec!["http".into()],
            max_concurrency: 100,
        };
        assert!(worker.supports("http"));
        assert!(!worker.supports("grpc"));
    }

    #[test]
    fn available_capacity_subtracts_current_load() {
        let info = WorkerInfo {
            worker: Worker {
                id: WorkerId::new(),
                name: "w1".into(),
                capable_task_kinds: vec![],
                max_concurrency: 100,
            },
            health: WorkerHealth::Healthy,
            current_load: 40,
            last_heartbeat_ms: 0,
        };
        assert_eq!(info.available_capacity(), 60);
    }

    #[test]
    fn only_healthy_and_at_capacity_are_assignable() {
        assert!(WorkerHealth::Healthy.is_assignable());
        assert!(WorkerHealth::AtCapacity.is_assignable());
        assert!(!WorkerHealth::Overloaded.is_assignable());
        assert!(!WorkerHealth::Unhealthy.is_assignable());
        assert!(!WorkerHealth::Disconnected.is_assignable());
    }
}
