//! Scenario C — failure injection.
//!
//! Runs a fixed-concurrency sustain where the task fails roughly 10% of the
//! time with error class "boom", and checks the resulting failure rate and
//! error histogram land in the expected range.
//!
//! Usage: cargo run --bin scenario-failures
//!
//! Configuration:
//! - Concurrency: 50, no ramp
//! - Target: at least 10,000 completed tasks
//! - Task: fails ~10% of the time with error_class "boom"

use async_trait::async_trait;
use loadforge::{ExecutionMode, FnTaskFactory, Task, TaskOutcome, TestPlanBuilder, TestRunner};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct FlakyTask {
    counter: Arc<AtomicU64>,
}

#[async_trait]
impl Task for FlakyTask {
    async fn execute(&self) -> Result<TaskOutcome, String> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        if n % 10 == 0 {
            Err("boom".to_string())
        } else {
            Ok(TaskOutcome::new())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("=== Scenario C: Failure Injection ===");
    println!("Concurrency: 50, task fails ~10% of the time (\"boom\")");
    println!();

    let plan = TestPlanBuilder::new("scenario-failures", ExecutionMode::Concurrency { max_concurrency: 50 })
        .sustain(Duration::from_secs(3))
        .build()?;

    let counter = Arc::new(AtomicU64::new(0));
    let factory: Arc<dyn loadforge::TaskFactory> = Arc::new(FnTaskFactory(move |_id| {
        Box::new(FlakyTask { counter: Arc::clone(&counter) }) as Box<dyn Task>
    }));

    let runner = TestRunner::new(plan, factory)?;
    Arc::clone(&runner).run().await;

    let snapshot = runner.snapshot();
    let failure_rate = snapshot.failure_count as f64 / snapshot.total_count.max(1) as f64;

    println!("Total tasks: {}", snapshot.total_count);
    println!("Failed tasks: {}", snapshot.failure_count);
    println!("Failure rate: {:.3} (expected in [0.08, 0.12])", failure_rate);
    println!("errorCounts[\"boom\"]: {:?}", snapshot.error_counts.get("boom"));
    println!("Top errors: {:?}", snapshot.top_errors);

    if !(0.06..=0.14).contains(&failure_rate) {
        eprintln!("warning: failure rate {failure_rate:.3} outside the expected band");
    }

    Ok(())
}
