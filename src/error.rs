//! Unified error type hierarchy for the load generation engine.
//!
//! Mirrors the taxonomy of spec §7: one `thiserror` enum per concern
//! (`ConfigError`, `TaskError`, `SchedulerError`, `DistributionError`,
//! `WorkerUnreachable`), unified by `LoadError` for callers that just want
//! "did this fail, and why". Follows the teacher's `error.rs` shape: a
//! per-domain enum for each concern, plus one enum that unifies them all.

use thiserror::Error;

/// Invalid `TestPlan` configuration, surfaced before a test starts; never
/// during a run.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("ramp duration ({ramp_ms} ms) exceeds total test duration ({total_ms} ms)")]
    RampExceedsTotal { ramp_ms: u64, total_ms: u64 },

    #[error("max concurrency must be positive, got {0}")]
    NonPositiveConcurrency(i64),

    #[error("target rate {rate} exceeds safety cap {cap}")]
    RateExceedsSafetyCap { rate: f64, cap: f64 },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("invalid configuration document: {0}")]
    InvalidDocument(String),

    #[error("I/O error while loading configuration: {0}")]
    Io(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e.to_string())
    }
}

/// A task's own outcome. Recorded into metrics, never propagated to the
/// caller of `submit`/`try_submit`.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(String),

    #[error("task cancelled during shutdown")]
    Cancelled,
}

/// Unexpected failure inside the test runner's control loop. Transitions the
/// runner to `Failed` and triggers a drain.
#[derive(Error, Debug, Clone)]
pub enum SchedulerError {
    #[error("runner control loop failed: {0}")]
    ControlLoopFailed(String),

    #[error("engine shutdown did not complete within the configured timeouts")]
    DrainTimedOut,
}

/// No workers could be assigned a share of a distributed test.
#[derive(Error, Debug, Clone)]
pub enum DistributionError {
    #[error("no workers support task kind '{0}' in a healthy state")]
    NoCapableWorkers(String),

    #[error("all {0} candidate workers rejected the assignment")]
    AllWorkersRejected(usize),

    #[error("fewer than {min} workers reported a sample with at least {min_count} requests; refusing to aggregate")]
    InsufficientSampleSize { min: usize, min_count: u64 },
}

/// RPC failure talking to a worker node (assign / stop / heartbeat / push).
#[derive(Error, Debug, Clone)]
pub enum WorkerUnreachable {
    #[error("worker {worker_id} unreachable during {operation}: {reason}")]
    Rpc {
        worker_id: String,
        operation: &'static str,
        reason: String,
    },

    #[error("worker {0} timed out")]
    Timeout(String),
}

/// Top-level error type unifying every component's error enum. Used as the
/// `Err` arm of the external control API (`LoadController::start`, etc).
#[derive(Error, Debug, Clone)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error(transparent)]
    Worker(#[from] WorkerUnreachable),

    #[error("test id not found: {0}")]
    UnknownTest(String),
}

pub type Result<T> = std::result::Result<T, LoadError>;
