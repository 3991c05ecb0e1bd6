//! `LoadController`: the external Control API (spec §6) — `start`, `stop`,
//! `status`, `get_snapshot` — over a process-wide registry of active tests.
//! Spec §9's design note calls for that registry to sit "behind a mutex,
//! not ambient global"; here it's a `DashMap`, since the registry is read
//! (status polling) far more often than it is structurally mutated
//! (start/stop).

use crate::error::{LoadError, SchedulerError};
use crate::logging::RunLogger;
use crate::metrics::Snapshot;
use crate::plan::TestPlan;
use crate::runner::{RunnerState, TestRunner};
use crate::task::TaskFactory;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque handle identifying one test run across the control API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TestId(pub Uuid);

impl TestId {
    fn new() -> Self {
        TestId(Uuid::new_v4())
    }
}

impl std::fmt::Display for TestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A test's registry entry: its runner, and the `tokio` task driving it to
/// completion (so the registry can be dropped without leaking the task, and
/// so `stop` has something to await if it ever needs to).
struct RunHandle {
    runner: Arc<TestRunner>,
    _handle: tokio::task::JoinHandle<()>,
}

/// Facade over the single-node execution stack: builds a `TestRunner` from
/// a `TestPlan`, spawns its control loop, and tracks it in an internal
/// registry keyed by `TestId`.
pub struct LoadController {
    registry: DashMap<TestId, RunHandle>,
    logger: RunLogger,
}

impl LoadController {
    pub fn new() -> Arc<Self> {
        Arc::new(LoadController {
            registry: DashMap::new(),
            logger: RunLogger::new(None),
        })
    }

    pub fn with_logger(logger: RunLogger) -> Arc<Self> {
        Arc::new(LoadController {
            registry: DashMap::new(),
            logger,
        })
    }

    /// Validate `plan`, build a runner for it, and spawn its control loop.
    /// Returns the `TestId` the caller uses for every subsequent operation.
    pub fn start(self: &Arc<Self>, plan: TestPlan, factory: Arc<dyn TaskFactory>) -> Result<TestId, LoadError> {
        let test_id = TestId::new();
        let runner = TestRunner::new(plan, factory)?;

        self.logger.info(&test_id.to_string(), "test starting");

        let handle_runner = Arc::clone(&runner);
        let handle = tokio::spawn(async move { handle_runner.run().await });

        self.registry.insert(test_id, RunHandle { runner, _handle: handle });
        Ok(test_id)
    }

    /// Request an early, graceful stop of a running test.
    pub fn stop(&self, test_id: TestId) -> Result<(), LoadError> {
        let entry = self.registry.get(&test_id).ok_or_else(|| LoadError::UnknownTest(test_id.to_string()))?;
        entry.runner.request_stop();
        self.logger.info(&test_id.to_string(), "stop requested");
        Ok(())
    }

    /// Current lifecycle state of a test.
    pub fn status(&self, test_id: TestId) -> Result<RunnerState, LoadError> {
        let entry = self.registry.get(&test_id).ok_or_else(|| LoadError::UnknownTest(test_id.to_string()))?;
        Ok(entry.runner.status())
    }

    /// A point-in-time metrics snapshot for a test.
    pub fn get_snapshot(&self, test_id: TestId) -> Result<Snapshot, LoadError> {
        let entry = self.registry.get(&test_id).ok_or_else(|| LoadError::UnknownTest(test_id.to_string()))?;
        Ok(entry.runner.snapshot())
    }

    /// Drop the registry entry for a test that has reached a terminal
    /// phase. Errors if the test is still running, to avoid orphaning its
    /// control loop.
    pub fn forget(&self, test_id: TestId) -> Result<(), LoadError> {
        let terminal = {
            let entry = self.registry.get(&test_id).ok_or_else(|| LoadError::UnknownTest(test_id.to_string()))?;
            entry.runner.status().phase.is_terminal()
        };
        if !terminal {
            return Err(SchedulerError::ControlLoopFailed("cannot forget a test still in progress".into()).into());
        }
        self.registry.remove(&test_id);
        Ok(())
    }

    pub fn active_test_ids(&self) -> Vec<TestId> {
        self.registry.iter().map(|e| *e.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ExecutionMode, TestPlanBuilder};
    use crate::task::{FnTaskFactory, Task, TaskOutcome};
    use async_trait::async_trait;
    use std::time::Duration;

    struct InstantTask;

    #[async_trait]
    impl Task for InstantTask {
        async fn execute(&self) -> std::result::Result<TaskOutcome, String> {
            Ok(TaskOutcome::new())
        }
    }

    fn factory() -> Arc<dyn TaskFactory> {
        Arc::new(FnTaskFactory(|_id| Box::new(InstantTask) as Box<dyn Task>))
    }

    #[tokio::test(start_paused = true)]
    async fn start_status_and_snapshot_round_trip() {
        let controller = LoadController::new();
        let plan = TestPlanBuilder::new("t", ExecutionMode::Concurrency { max_concurrency: 4 })
            .sustain(Duration::from_millis(100))
            .build()
            .unwrap();

        let test_id = controller.start(plan, factory()).unwrap();
        let status = controller.status(test_id).unwrap();
        assert!(!status.phase.is_terminal());

        tokio::time::advance(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;

        let snapshot = controller.get_snapshot(test_id).unwrap();
        assert!(snapshot.total_count >= 0);
    }

    #[tokio::test]
    async fn unknown_test_id_is_an_error() {
        let controller = LoadController::new();
        let result = controller.status(TestId::new());
        assert!(matches!(result, Err(LoadError::UnknownTest(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn forget_refuses_to_drop_a_running_test() {
        let controller = LoadController::new();
        let plan = TestPlanBuilder::new("t", ExecutionMode::Concurrency { max_concurrency: 4 })
            .sustain(Duration::from_secs(60))
            .build()
            .unwrap();
        let test_id = controller.start(plan, factory()).unwrap();
        assert!(controller.forget(test_id).is_err());
    }
}
