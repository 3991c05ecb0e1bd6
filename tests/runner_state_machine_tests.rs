//! End-to-end coverage of `TestRunner`'s lifecycle (spec §4.4, §8): phase
//! transitions, graceful stop, warmup discard, and rate-mode driving, all
//! through paused tokio time so the test suite runs instantly.

use async_trait::async_trait;
use loadforge::{ExecutionMode, FnTaskFactory, RampShape, RunnerPhase, Task, TaskFactory, TaskOutcome, TestPlanBuilder, TestRunner};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct InstantTask;

#[async_trait]
impl Task for InstantTask {
    async fn execute(&self) -> Result<TaskOutcome, String> {
        Ok(TaskOutcome::new())
    }
}

fn instant_factory() -> Arc<dyn TaskFactory> {
    Arc::new(FnTaskFactory(|_id| Box::new(InstantTask) as Box<dyn Task>))
}

#[tokio::test(start_paused = true)]
async fn scenario_a_sustain_completes_with_zero_ramp_and_zero_warmup() {
    let plan = TestPlanBuilder::new("scenario-a", ExecutionMode::Concurrency { max_concurrency: 32 })
        .sustain(Duration::from_secs(2))
        .build()
        .unwrap();
    let runner = TestRunner::new(plan, instant_factory()).unwrap();

    let handle = tokio::spawn(Arc::clone(&runner).run());
    tokio::time::advance(Duration::from_secs(3)).await;
    handle.await.unwrap();

    assert_eq!(runner.status().phase, RunnerPhase::Completed);
    assert!(runner.snapshot().total_count > 0);
}

#[tokio::test(start_paused = true)]
async fn warmup_samples_are_discarded_from_the_reported_snapshot() {
    let calls = Arc::new(AtomicU64::new(0));
    let c = Arc::clone(&calls);
    let factory: Arc<dyn TaskFactory> =
        Arc::new(FnTaskFactory(move |_id| {
            c.fetch_add(1, Ordering::SeqCst);
            Box::new(InstantTask) as Box<dyn Task>
        }));

    let plan = TestPlanBuilder::new("t", ExecutionMode::Concurrency { max_concurrency: 8 })
        .warmup(Duration::from_millis(500))
        .sustain(Duration::from_millis(500))
        .build()
        .unwrap();
    let runner = TestRunner::new(plan, factory).unwrap();

    let handle = tokio::spawn(Arc::clone(&runner).run());
    tokio::time::advance(Duration::from_secs(2)).await;
    handle.await.unwrap();

    // Warmup ran real tasks (calls > 0) but the reported snapshot only
    // reflects what happened after the post-warmup reset.
    assert!(calls.load(Ordering::SeqCst) > 0);
    assert_eq!(runner.status().phase, RunnerPhase::Completed);
}

#[tokio::test(start_paused = true)]
async fn request_stop_during_sustain_lands_in_stopped_not_completed() {
    let plan = TestPlanBuilder::new("t", ExecutionMode::Concurrency { max_concurrency: 4 })
        .sustain(Duration::from_secs(120))
        .build()
        .unwrap();
    let runner = TestRunner::new(plan, instant_factory()).unwrap();

    let handle = tokio::spawn(Arc::clone(&runner).run());
    tokio::time::advance(Duration::from_millis(200)).await;
    runner.request_stop();
    tokio::time::advance(Duration::from_secs(30)).await;
    handle.await.unwrap();

    assert_eq!(runner.status().phase, RunnerPhase::Stopped);
}

#[tokio::test(start_paused = true)]
async fn scenario_b_ramp_then_completes_with_growing_total_count() {
    let plan = TestPlanBuilder::new("scenario-b", ExecutionMode::Concurrency { max_concurrency: 50 })
        .ramp(Duration::from_secs(5), RampShape::Linear)
        .sustain(Duration::ZERO)
        .build()
        .unwrap();
    let runner = TestRunner::new(plan, instant_factory()).unwrap();

    let handle = tokio::spawn(Arc::clone(&runner).run());
    tokio::time::advance(Duration::from_millis(500)).await;
    let mid_count = runner.snapshot().total_count;

    tokio::time::advance(Duration::from_secs(10)).await;
    handle.await.unwrap();

    assert_eq!(runner.status().phase, RunnerPhase::Completed);
    assert!(runner.snapshot().total_count >= mid_count);
}

#[tokio::test(start_paused = true)]
async fn rate_mode_drives_submissions_through_to_completion() {
    let plan = TestPlanBuilder::new("t", ExecutionMode::Rate { target_rate: 200.0 })
        .sustain(Duration::from_secs(1))
        .build()
        .unwrap();
    let runner = TestRunner::new(plan, instant_factory()).unwrap();

    let handle = tokio::spawn(Arc::clone(&runner).run());
    tokio::time::advance(Duration::from_secs(2)).await;
    handle.await.unwrap();

    assert_eq!(runner.status().phase, RunnerPhase::Completed);
    assert!(runner.snapshot().total_count > 0);
}
