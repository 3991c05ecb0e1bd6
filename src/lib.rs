//! loadforge: a workload-agnostic load generation engine.
//!
//! Drives a configurable, time-varying workload against a target system,
//! measures per-task latency and outcome, aggregates live statistics, and
//! optionally fans a test out across a pool of worker nodes coordinated by
//! a controller.
//!
//! The crate is organized around four tightly coupled subsystems:
//! - **task**: the unit-of-work abstraction (`Task`, `TaskFactory`, `TaskResult`)
//! - **metrics**: lock-free outcome recording, percentile snapshots, windowed counters
//! - **schedule**: ramp/rate schedules mapping elapsed time to target concurrency or rate
//! - **engine**: the permit-bounded execution engine dispatching tasks onto `tokio`
//! - **runner**: the single-node lifecycle state machine (warmup/ramp/sustain/drain)
//! - **controller**: the external control API (`start`/`stop`/`status`/`get_snapshot`)
//! - **distributed**: multi-node coordination (`DistributedCoordinator`, `WorkerNode`, `WorkerRpc`)
//!
//! Transport, CLI/config parsing surfaces beyond plain JSON/TOML plan files,
//! report formatting, and concrete task kinds (HTTP, gRPC, database) are
//! external collaborators; this crate only defines the seams they plug into.

#![allow(dead_code)]

pub mod config;
pub mod controller;
pub mod distributed;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod plan;
pub mod runner;
pub mod schedule;
pub mod task;

// Re-export the log crate for macro usage by embedding applications.
pub use log;

pub use config::{load_plan_from_file, save_plan_to_file, EngineSettings};
pub use controller::{LoadController, TestId};
pub use distributed::{
    Assignment, DistributedCoordinator, TaskKindRegistry, Worker, WorkerHealth, WorkerId,
    WorkerInfo, WorkerMetrics, WorkerNode, WorkerRpc,
};
pub use engine::ExecutionEngine;
pub use error::{
    ConfigError, DistributionError, LoadError, Result, SchedulerError, TaskError,
    WorkerUnreachable,
};
pub use logging::{LifecycleEvent, RunLogger};
pub use metrics::{percentile, MetricsCore, Snapshot};
pub use plan::{Bounds, ExecutionMode, TestPlan, TestPlanBuilder};
pub use runner::{RunnerPhase, RunnerState, TestRunner};
pub use schedule::{RampSchedule, RampShape, RateSchedule};
pub use task::{FnTaskFactory, Task, TaskFactory, TaskId, TaskOutcome, TaskResult};

/// Library version, as reported by Cargo.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_constant_matches_cargo_toml() {
        assert_eq!(VERSION, "0.1.0");
    }

    #[test]
    fn error_reexport_is_usable_at_the_crate_root() {
        let _: Result<i32> = Ok(42);
    }

    #[test]
    fn plan_builder_is_reexported() {
        let plan = TestPlanBuilder::new("smoke", ExecutionMode::Concurrency { max_concurrency: 1 })
            .build()
            .unwrap();
        assert_eq!(plan.name, "smoke");
    }

    #[test]
    fn task_id_is_reexported() {
        let id = TaskId(5);
        assert_eq!(id.to_string(), "5");
    }
}
