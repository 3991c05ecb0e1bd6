//! Scenario A — pure sustain, zero-latency task.
//!
//! Drives a fixed-concurrency run with no ramp window against a task that
//! returns immediately, and prints the resulting snapshot. Exercises the
//! execution engine and metrics core end-to-end without any ramp/rate
//! scheduling involved.
//!
//! Usage: cargo run --bin scenario-sustain
//!
//! Configuration:
//! - Concurrency: number of CPUs detected on this machine (see `num_cpus`)
//! - Duration: 2 seconds sustain, no ramp, no warmup
//! - Task: no-op, always succeeds, latency ~0

use async_trait::async_trait;
use loadforge::{
    ExecutionMode, FnTaskFactory, Task, TaskOutcome, TestPlanBuilder, TestRunner,
};
use std::sync::Arc;
use std::time::Duration;

struct NoopTask;

#[async_trait]
impl Task for NoopTask {
    async fn execute(&self) -> Result<TaskOutcome, String> {
        Ok(TaskOutcome::new())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let concurrency = num_cpus::get().max(4) as u32 * 4;

    println!("=== Scenario A: Sustain ===");
    println!("Concurrency: {concurrency}");
    println!("Duration: 2s sustain, no ramp, no warmup");
    println!();

    let plan = TestPlanBuilder::new("scenario-sustain", ExecutionMode::Concurrency { max_concurrency: concurrency })
        .sustain(Duration::from_secs(2))
        .build()?;

    let factory: Arc<dyn loadforge::TaskFactory> =
        Arc::new(FnTaskFactory(|_id| Box::new(NoopTask) as Box<dyn Task>));

    let runner = TestRunner::new(plan, factory)?;
    Arc::clone(&runner).run().await;

    let snapshot = runner.snapshot();
    println!("Phase: {:?}", runner.status().phase);
    println!("Total tasks: {}", snapshot.total_count);
    println!("Success rate: {:.2}%", snapshot.success_rate() * 100.0);
    println!("P50/P99 latency: {:.1}ns / {:.1}ns", snapshot.p50_ns, snapshot.p99_ns);
    println!("Overall TPS: {:.1}", snapshot.overall_tps);

    Ok(())
}
