//! Scenario B — linear ramp, fixed-latency task.
//!
//! Ramps concurrency from 1 to 100 over 10 seconds against a task that
//! sleeps a fixed 50ms, then prints the resulting snapshot. Useful as a
//! smoke test for `RampSchedule`'s linear interpolation and the engine's
//! resizable permit pool.
//!
//! Usage: cargo run --bin scenario-ramp
//!
//! Configuration:
//! - Ramp: 1 -> 100 concurrency, linear, over 10s
//! - Sustain: 0s (the ramp window is the whole test)
//! - Task: sleep 50ms, always succeeds

use async_trait::async_trait;
use loadforge::{ExecutionMode, FnTaskFactory, RampShape, Task, TaskOutcome, TestPlanBuilder, TestRunner};
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
    println!("=== Scenario B: Linear Ramp ===");
    println!("Ramp: 1 -> 100 concurrency over 10s");
    println!("Task: sleep 50ms");
    println!();

    let plan = TestPlanBuilder::new("scenario-ramp", ExecutionMode::Concurrency { max_concurrency: 100 })
        .ramp(Duration::from_secs(10), RampShape::Linear)
        .sustain(Duration::ZERO)
        .build()?;

    let factory: Arc<dyn loadforge::TaskFactory> =
        Arc::new(FnTaskFactory(|_id| Box::new(SleepTask(Duration::from_millis(50))) as Box<dyn Task>));

    let runner = TestRunner::new(plan, factory)?;
    let handle = tokio::spawn(Arc::clone(&runner).run());

    // Poll the live snapshot every second so the ramp's progress is visible,
    // mirroring the teacher's periodic-println style in latency_test.rs.
    for second in 1..=11u32 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let snapshot = runner.snapshot();
        println!(
            "t+{second}s: phase={:?} total={} avg_latency_ms={:.1}",
            runner.status().phase,
            snapshot.total_count,
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
    println!("Success rate: {:.2}%", snapshot.success_rate() * 100.0);
    println!("Avg latency: {:.1}ms", snapshot.avg_latency_ms());

    Ok(())
}
