//! Scenario D — rate-paced emission under a concurrency ceiling.
//!
//! Hybrid mode at a target of 500 tasks/sec, capped at 1000 concurrent
//! tasks, against a task that sleeps a fixed 10ms. Useful as a smoke test
//! for `RateSchedule`'s pacing combined with the engine's concurrency
//! ceiling — active tasks should stay near `target_rate * latency` (~5
//! here), never anywhere close to the 1000 concurrency cap.
//!
//! Usage: cargo run --bin scenario-hybrid
//!
//! Configuration:
//! - Mode: Hybrid { max_concurrency: 1000, target_rate: 500.0 }
//! - Duration: 10s sustain, no ramp
//! - Task: sleep 10ms, always succeeds

use async_trait::async_trait;
use loadforge::{ExecutionMode, FnTaskFactory, Task, TaskOutcome, TestPlanBuilder, TestRunner};
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("=== Scenario D: Rate-Paced Emission (Hybrid) ===");
    println!("Target: 500 tasks/sec, capped at 1000 concurrent");
    println!("Task: sleep 10ms");
    println!();

    let plan = TestPlanBuilder::new(
        "scenario-hybrid",
        ExecutionMode::Hybrid {
            max_concurrency: 1000,
            target_rate: 500.0,
        },
    )
    .sustain(Duration::from_secs(10))
    .build()?;

    let factory: Arc<dyn loadforge::TaskFactory> =
        Arc::new(FnTaskFactory(|_id| Box::new(SleepTask(Duration::from_millis(10))) as Box<dyn Task>));

    let runner = TestRunner::new(plan, factory)?;
    let handle = tokio::spawn(Arc::clone(&runner).run());

    for second in 1..=11u32 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let snapshot = runner.snapshot();
        println!(
            "t+{second}s: phase={:?} total={} current_tps={:.1} avg_latency_ms={:.1}",
            runner.status().phase,
            snapshot.total_count,
            snapshot.current_tps,
            snapshot.avg_latency_ms()
        );
        if runner.status().phase.is_terminal() {
            break;
        }
    }

    handle.await?;

    let snapshot = runner.snapshot();
    println!();
    println!("=== Final ===");
    println!("Total tasks: {}", snapshot.total_count);
    println!("Observed TPS: {:.1}", snapshot.overall_tps);
    println!("Success rate: {:.2}%", snapshot.success_rate() * 100.0);

    Ok(())
}
