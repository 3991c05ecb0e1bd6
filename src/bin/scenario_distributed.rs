//! Scenario F — distributed split across heterogeneous workers.
//!
//! Registers three in-process workers with capacities {10, 20, 70} and
//! distributes a 1000 requests/sec target test across them, checking that
//! each worker's assigned share is proportional to its capacity and that
//! the shares sum exactly to the target.
//!
//! Usage: cargo run --bin scenario-distributed
//!
//! Configuration:
//! - Workers: capacities 10, 20, 70 (expected shares: 100, 200, 700 TPS)
//! - Task: sleep 10ms, always succeeds
//! - Duration: 3s sustain

use async_trait::async_trait;
use loadforge::{
    Assignment, DistributedCoordinator, ExecutionMode, FnTaskFactory, Task, TaskFactory,
    TaskKindRegistry, TaskOutcome, TestPlanBuilder, Worker, WorkerNode,
};
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::Duration;

struct SleepTask;

#[async_trait]
impl Task for SleepTask {
    async fn execute(&self) -> Result<TaskOutcome, String> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(TaskOutcome::new())
    }
}

struct SleepRegistry;

impl TaskKindRegistry for SleepRegistry {
    fn factory_for(&self, task_kind: &str) -> Option<Arc<dyn TaskFactory>> {
        if task_kind == "sleep" {
            Some(Arc::new(FnTaskFactory(|_id| Box::new(SleepTask) as Box<dyn Task>)))
        } else {
            None
        }
    }
}

static REGISTRY: Lazy<Arc<dyn TaskKindRegistry>> = Lazy::new(|| Arc::new(SleepRegistry));

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("=== Scenario F: Distributed Split ===");
    println!("Workers: capacities 10, 20, 70 (expect shares 100, 200, 700 TPS)");
    println!();

    let coordinator = DistributedCoordinator::new();
    let (metrics_tx, mut metrics_rx) = tokio::sync::mpsc::channel(256);

    for capacity in [10u32, 20, 70] {
        let worker = Worker {
            id: loadforge::WorkerId::new(),
            name: format!("worker-{capacity}"),
            capable_task_kinds: vec!["sleep".into()],
            max_concurrency: capacity,
        };
        let node = WorkerNode::new(worker.clone(), Arc::clone(&REGISTRY), metrics_tx.clone());
        let rpc = Arc::new(loadforge::distributed::local::LocalWorkerRpc::spawn(node));
        coordinator.register_worker(worker, rpc);
    }

    let plan = TestPlanBuilder::new("scenario-distributed", ExecutionMode::Rate { target_rate: 1000.0 })
        .sustain(Duration::from_secs(3))
        .build()?;

    let assignments: Vec<Assignment> = coordinator.distribute("scenario-f", "sleep", &plan).await?;
    for assignment in &assignments {
        if let ExecutionMode::Rate { target_rate } = assignment.share_mode {
            println!("worker {} assigned {:.0} TPS", assignment.worker_id, target_rate);
        }
    }

    // Drain a handful of metrics pushes so the coordinator has something to
    // aggregate, mirroring how a production controller would stay subscribed
    // to the worker metrics stream for the life of the test.
    for _ in 0..3 {
        if let Some(metrics) = metrics_rx.recv().await {
            coordinator.record_worker_metrics(metrics);
        }
    }

    match coordinator.aggregate("scenario-f") {
        Ok(snapshot) => println!("aggregate total_count so far: {}", snapshot.total_count),
        Err(e) => println!("aggregate not yet available: {e}"),
    }

    coordinator.stop_test("scenario-f").await;

    Ok(())
}
