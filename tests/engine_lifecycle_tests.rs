//! Integration coverage of `ExecutionEngine` through the public crate
//! surface: permit pool resizing, graceful close, and drain semantics
//! (spec §4.3, §8).

use async_trait::async_trait;
use loadforge::{ExecutionEngine, FnTaskFactory, MetricsCore, Task, TaskFactory, TaskOutcome};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct SleepTask(Duration);

#[async_trait]
impl Task for SleepTask {
    async fn execute(&self) -> Result<TaskOutcome, String> {
        tokio::time::sleep(self.0).await;
        Ok(TaskOutcome::new())
    }
}

#[tokio::test]
async fn shrinking_concurrency_does_not_cancel_in_flight_tasks() {
    let metrics = Arc::new(MetricsCore::new());
    let engine = ExecutionEngine::new(4, Arc::clone(&metrics));
    let completed = Arc::new(AtomicU32::new(0));

    let c = Arc::clone(&completed);
    let factory: Arc<dyn TaskFactory> = Arc::new(FnTaskFactory(move |_id| {
        let c = Arc::clone(&c);
        Box::new(TrackedTask(Duration::from_millis(80), c)) as Box<dyn Task>
    }));

    struct TrackedTask(Duration, Arc<AtomicU32>);
    #[async_trait]
    impl Task for TrackedTask {
        async fn execute(&self) -> Result<TaskOutcome, String> {
            tokio::time::sleep(self.0).await;
            self.1.fetch_add(1, Ordering::SeqCst);
            Ok(TaskOutcome::new())
        }
    }

    for _ in 0..4 {
        engine.submit(Arc::clone(&factory)).await;
    }
    // Shrink to 1 while 4 tasks are still in flight; none should be killed.
    engine.set_concurrency(1);

    engine.await_drain(Duration::from_secs(2), Duration::from_secs(2)).await;
    assert_eq!(completed.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn close_prevents_new_work_but_lets_existing_work_finish() {
    let metrics = Arc::new(MetricsCore::new());
    let engine = ExecutionEngine::new(2, Arc::clone(&metrics));
    let factory: Arc<dyn TaskFactory> =
        Arc::new(FnTaskFactory(|_id| Box::new(SleepTask(Duration::from_millis(100))) as Box<dyn Task>));

    engine.submit(Arc::clone(&factory)).await;
    engine.close();
    assert!(engine.submit(Arc::clone(&factory)).await.is_none());
    assert!(engine.is_closed());

    let drained = engine.await_drain(Duration::from_secs(1), Duration::from_secs(1)).await;
    assert!(drained);
    assert_eq!(engine.completed(), 1);
}

#[tokio::test]
async fn await_drain_reports_false_when_tasks_outlive_both_timeouts() {
    let metrics = Arc::new(MetricsCore::new());
    let engine = ExecutionEngine::new(1, Arc::clone(&metrics));
    let factory: Arc<dyn TaskFactory> =
        Arc::new(FnTaskFactory(|_id| Box::new(SleepTask(Duration::from_secs(10))) as Box<dyn Task>));
    engine.submit(factory).await;

    let drained = engine.await_drain(Duration::from_millis(10), Duration::from_millis(10)).await;
    assert!(!drained);
    assert_eq!(engine.active(), 1);
}
