//! `TestPlan`: the validated configuration a `TestRunner` executes (spec §3,
//! §6). Built programmatically or loaded from disk via `config.rs`.

use crate::error::ConfigError;
use crate::schedule::RampShape;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which control surface drives admission for a run (spec §3's
/// `ConcurrencyBounded | RateLimited | Hybrid` execution-mode enum).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Bounded concurrency: at most `max_concurrency` tasks in flight, no
    /// rate pacing.
    Concurrency { max_concurrency: u32 },
    /// Paced throughput: tasks dispatched at a target rate in requests/sec,
    /// with no concurrency ceiling beyond the safety cap.
    Rate { target_rate: f64 },
    /// Rate-paced emission bounded by a concurrency ceiling (spec §4.4): the
    /// rate schedule decides *when* the next task should start, the
    /// concurrency semaphore decides whether it may start yet. A permit
    /// that fires while the pool is saturated is deferred (the emitting
    /// call blocks on `ExecutionEngine::submit`), never dropped, and the
    /// rate schedule's cursor is not rewound to compensate.
    Hybrid { max_concurrency: u32, target_rate: f64 },
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Concurrency { max_concurrency: 10 }
    }
}

/// Safety ceiling applied regardless of `ExecutionMode`, so a misconfigured
/// rate target cannot run away (spec §7 `ConfigError::RateExceedsSafetyCap`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bounds {
    pub max_concurrency_cap: u32,
    pub max_rate_cap: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Bounds {
            max_concurrency_cap: 100_000,
            max_rate_cap: 1_000_000.0,
        }
    }
}

/// Complete, immutable description of a test run. Construct with
/// `TestPlanBuilder`, which validates invariants spec §3/§7 require before a
/// runner may start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestPlan {
    pub name: String,
    pub mode: ExecutionMode,
    /// Concurrency (or, under `Hybrid`, the concurrency ceiling) the ramp
    /// starts from at `elapsed == 0` (spec §4.2 `LINEAR { startC, .. }` /
    /// `STEP { startC, .. }`). Must be at least 1.
    pub start_concurrency: u32,
    pub ramp_duration_ms: u64,
    pub ramp_shape: RampShape,
    pub sustain_duration_ms: u64,
    pub warmup_duration_ms: u64,
    pub bounds: Bounds,
    pub ring_capacity: usize,
}

impl TestPlan {
    pub fn total_duration(&self) -> Duration {
        Duration::from_millis(self.warmup_duration_ms + self.ramp_duration_ms + self.sustain_duration_ms)
    }

    pub fn ramp_duration(&self) -> Duration {
        Duration::from_millis(self.ramp_duration_ms)
    }

    pub fn sustain_duration(&self) -> Duration {
        Duration::from_millis(self.sustain_duration_ms)
    }

    pub fn warmup_duration(&self) -> Duration {
        Duration::from_millis(self.warmup_duration_ms)
    }

    /// Validate invariants spec §7 requires before a runner accepts this
    /// plan: ramp never exceeds total duration, concurrency/rate are
    /// positive, and the rate mode (if used) stays under the safety cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let total_ms = self.warmup_duration_ms + self.ramp_duration_ms + self.sustain_duration_ms;
        if self.ramp_duration_ms > total_ms {
            return Err(ConfigError::RampExceedsTotal {
                ramp_ms: self.ramp_duration_ms,
                total_ms,
            });
        }
        if self.start_concurrency == 0 {
            return Err(ConfigError::NonPositiveConcurrency(0));
        }

        match self.mode {
            ExecutionMode::Concurrency { max_concurrency } => {
                if max_concurrency == 0 {
                    return Err(ConfigError::NonPositiveConcurrency(0));
                }
                if max_concurrency > self.bounds.max_concurrency_cap {
                    return Err(ConfigError::Invalid(format!(
                        "max_concurrency {} exceeds cap {}",
                        max_concurrency, self.bounds.max_concurrency_cap
                    )));
                }
            }
            ExecutionMode::Rate { target_rate } => {
                if target_rate <= 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "target_rate must be positive, got {target_rate}"
                    )));
                }
                if target_rate > self.bounds.max_rate_cap {
                    return Err(ConfigError::RateExceedsSafetyCap {
                        rate: target_rate,
                        cap: self.bounds.max_rate_cap,
                    });
                }
            }
            ExecutionMode::Hybrid { max_concurrency, target_rate } => {
                if max_concurrency == 0 {
                    return Err(ConfigError::NonPositiveConcurrency(0));
                }
                if max_concurrency > self.bounds.max_concurrency_cap {
                    return Err(ConfigError::Invalid(format!(
                        "max_concurrency {} exceeds cap {}",
                        max_concurrency, self.bounds.max_concurrency_cap
                    )));
                }
                if target_rate <= 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "target_rate must be positive, got {target_rate}"
                    )));
                }
                if target_rate > self.bounds.max_rate_cap {
                    return Err(ConfigError::RateExceedsSafetyCap {
                        rate: target_rate,
                        cap: self.bounds.max_rate_cap,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Builder that mirrors the teacher's settings-builder ergonomics
/// (`config/mod.rs`'s `AppState` defaults-then-override pattern), producing
/// a validated `TestPlan` or a `ConfigError`.
pub struct TestPlanBuilder {
    name: String,
    mode: ExecutionMode,
    start_concurrency: u32,
    ramp_duration_ms: u64,
    ramp_shape: RampShape,
    sustain_duration_ms: u64,
    warmup_duration_ms: u64,
    bounds: Bounds,
    ring_capacity: usize,
}

impl TestPlanBuilder {
    pub fn new(name: impl Into<String>, mode: ExecutionMode) -> Self {
        TestPlanBuilder {
            name: name.into(),
            mode,
            start_concurrency: 1,
            ramp_duration_ms: 0,
            ramp_shape: RampShape::Linear,
            sustain_duration_ms: 60_000,
            warmup_duration_ms: 0,
            bounds: Bounds::default(),
            ring_capacity: 8192,
        }
    }

    pub fn start_concurrency(mut self, start_concurrency: u32) -> Self {
        self.start_concurrency = start_concurrency;
        self
    }

    pub fn ramp(mut self, duration: Duration, shape: RampShape) -> Self {
        self.ramp_duration_ms = duration.as_millis() as u64;
        self.ramp_shape = shape;
        self
    }

    pub fn sustain(mut self, duration: Duration) -> Self {
        self.sustain_duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn warmup(mut self, duration: Duration) -> Self {
        self.warmup_duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<TestPlan, ConfigError> {
        let plan = TestPlan {
            name: self.name,
            mode: self.mode,
            start_concurrency: self.start_concurrency,
            ramp_duration_ms: self.ramp_duration_ms,
            ramp_shape: self.ramp_shape,
            sustain_duration_ms: self.sustain_duration_ms,
            warmup_duration_ms: self.warmup_duration_ms,
            bounds: self.bounds,
            ring_capacity: self.ring_capacity,
        };
        plan.validate()?;
        Ok(plan)
    }
}
