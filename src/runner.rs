//! `TestRunner`: drives one `TestPlan` through its lifecycle phases (spec
//! §4.4), ticking the ramp/rate schedule against the execution engine and
//! exposing lifecycle state for the control API.
//!
//! The phase state machine is modeled directly on the teacher's
//! `orchestrator/state.rs` `BuildPhaseState`/`OrchestrationState` pair: a
//! plain enum with `valid_next_phases()`/`can_transition_to()`, wrapped in a
//! struct carrying timestamps and an optional error message.

use crate::engine::ExecutionEngine;
use crate::error::{LoadError, SchedulerError};
use crate::metrics::MetricsCore;
use crate::plan::{ExecutionMode, TestPlan};
use crate::schedule::{RampSchedule, RateSchedule};
use crate::task::TaskFactory;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// One phase of a test run's lifecycle (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RunnerPhase {
    Init,
    Warmup,
    Ramping,
    Sustaining,
    Draining,
    Completed,
    Stopped,
    Failed,
}

impl RunnerPhase {
    /// Phases this phase may legally transition into. Terminal phases
    /// (`Completed`/`Stopped`/`Failed`) have none.
    pub fn valid_next_phases(&self) -> &'static [RunnerPhase] {
        use RunnerPhase::*;
        match self {
            Init => &[Warmup, Ramping, Stopped, Failed],
            Warmup => &[Ramping, Stopped, Failed],
            Ramping => &[Sustaining, Draining, Stopped, Failed],
            Sustaining => &[Draining, Stopped, Failed],
            Draining => &[Completed, Failed],
            Completed | Stopped | Failed => &[],
        }
    }

    pub fn can_transition_to(&self, next: RunnerPhase) -> bool {
        self.valid_next_phases().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunnerPhase::Completed | RunnerPhase::Stopped | RunnerPhase::Failed)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Current lifecycle state of a `TestRunner`: phase, when it started,
/// when it last transitioned, and the error that caused a `Failed`
/// transition, if any.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunnerState {
    pub phase: RunnerPhase,
    pub started_at_ms: u64,
    pub phase_entered_at_ms: u64,
    pub error_message: Option<String>,
}

impl RunnerState {
    fn new() -> Self {
        let ts = now_ms();
        RunnerState {
            phase: RunnerPhase::Init,
            started_at_ms: ts,
            phase_entered_at_ms: ts,
            error_message: None,
        }
    }

    fn transition_to(&mut self, next: RunnerPhase) -> Result<(), SchedulerError> {
        if !self.phase.can_transition_to(next) {
            return Err(SchedulerError::ControlLoopFailed(format!(
                "illegal transition {:?} -> {:?}",
                self.phase, next
            )));
        }
        self.phase = next;
        self.phase_entered_at_ms = now_ms();
        Ok(())
    }

    fn record_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    pub fn elapsed_since_start(&self) -> Duration {
        Duration::from_millis(now_ms().saturating_sub(self.started_at_ms))
    }
}

/// Drives a single `TestPlan` from `Init` through to a terminal phase,
/// ticking concurrency (or pacing submissions, in `Rate` mode) against an
/// `ExecutionEngine` as the ramp/rate schedule dictates.
pub struct TestRunner {
    plan: TestPlan,
    engine: Arc<ExecutionEngine>,
    metrics: Arc<MetricsCore>,
    state: Arc<RwLock<RunnerState>>,
    stop_requested: Arc<AtomicBool>,
    factory: Arc<dyn TaskFactory>,
}

/// How often the control loop re-evaluates the ramp/rate schedule and GCs
/// windowed metrics, independent of how fast individual tasks complete.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

impl TestRunner {
    pub fn new(plan: TestPlan, factory: Arc<dyn TaskFactory>) -> Result<Arc<Self>, LoadError> {
        plan.validate()?;
        let metrics = Arc::new(MetricsCore::with_ring_capacity(plan.ring_capacity));
        let initial_concurrency = match plan.mode {
            ExecutionMode::Concurrency { .. } => 0,
            ExecutionMode::Rate { .. } => plan.bounds.max_concurrency_cap.min(1024),
            ExecutionMode::Hybrid { max_concurrency, .. } => max_concurrency,
        };
        let engine = ExecutionEngine::new(initial_concurrency, Arc::clone(&metrics));

        Ok(Arc::new(TestRunner {
            plan,
            engine,
            metrics,
            state: Arc::new(RwLock::new(RunnerState::new())),
            stop_requested: Arc::new(AtomicBool::new(false)),
            factory,
        }))
    }

    pub fn status(&self) -> RunnerState {
        self.state.read().clone()
    }

    pub fn snapshot(&self) -> crate::metrics::Snapshot {
        self.metrics.snapshot()
    }

    pub fn metrics(&self) -> Arc<MetricsCore> {
        Arc::clone(&self.metrics)
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    fn transition(&self, next: RunnerPhase) -> Result<(), SchedulerError> {
        self.state.write().transition_to(next)
    }

    fn fail(&self, message: impl Into<String>) {
        let mut state = self.state.write();
        state.record_error(message);
        let _ = state.transition_to(RunnerPhase::Failed);
    }

    /// Run the full lifecycle to completion. Intended to be spawned onto
    /// the runtime by the caller (`LoadController::start`); resolves once
    /// the runner reaches a terminal phase.
    pub async fn run(self: Arc<Self>) {
        if let Err(e) = self.run_inner().await {
            self.fail(e.to_string());
        }
    }

    async fn run_inner(self: &Arc<Self>) -> Result<(), SchedulerError> {
        if self.plan.warmup_duration_ms > 0 {
            self.transition(RunnerPhase::Warmup)?;
            self.run_phase(self.plan.warmup_duration(), Instant::now()).await;
            if self.check_stop() {
                return self.wind_down(RunnerPhase::Stopped).await;
            }
            self.metrics.reset();
        }

        // One clock anchors the ramp/rate schedule across both Ramping and
        // Sustaining, so the schedule keeps advancing past ramp_duration
        // instead of restarting at 0 when Sustaining begins (spec §4.4:
        // Sustaining holds concurrency at max, it does not re-ramp).
        let schedule_clock = Instant::now();

        self.transition(RunnerPhase::Ramping)?;
        self.run_phase(self.plan.ramp_duration(), schedule_clock).await;
        if self.check_stop() {
            return self.wind_down(RunnerPhase::Stopped).await;
        }

        self.transition(RunnerPhase::Sustaining)?;
        self.run_phase(self.plan.sustain_duration(), schedule_clock).await;
        if self.check_stop() {
            return self.wind_down(RunnerPhase::Stopped).await;
        }

        self.wind_down(RunnerPhase::Completed).await
    }

    async fn wind_down(self: &Arc<Self>, terminal: RunnerPhase) -> Result<(), SchedulerError> {
        self.transition(RunnerPhase::Draining)?;
        self.engine.close();
        let drained = self
            .engine
            .await_drain(Duration::from_secs(10), Duration::from_secs(5))
            .await;
        self.metrics.close();
        if !drained {
            self.fail(SchedulerError::DrainTimedOut.to_string());
            return Err(SchedulerError::DrainTimedOut);
        }
        self.transition(terminal)?;
        Ok(())
    }

    fn check_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Run one phase (warmup/ramp/sustain) for `duration`, re-evaluating the
    /// concurrency/rate schedule every `TICK_INTERVAL` and GCing windowed
    /// metrics alongside it.
    ///
    /// `schedule_clock` and the phase's own loop-termination timer are
    /// deliberately different clocks: `schedule_clock` is shared, unbroken,
    /// across Ramping and Sustaining so the ramp doesn't restart when
    /// Sustaining begins, while the phase timer always starts fresh so each
    /// phase still runs for its own configured duration.
    async fn run_phase(self: &Arc<Self>, duration: Duration, schedule_clock: Instant) {
        let phase_start = Instant::now();

        match self.plan.mode {
            ExecutionMode::Concurrency { max_concurrency } => {
                let ramp = RampSchedule::new(
                    self.plan.start_concurrency,
                    max_concurrency,
                    self.plan.ramp_duration(),
                    self.plan.ramp_shape,
                );
                while phase_start.elapsed() < duration {
                    if self.check_stop() {
                        return;
                    }
                    let target = ramp.concurrency_at(schedule_clock.elapsed());
                    self.engine.set_concurrency(target);
                    self.fill_concurrency_slots();
                    self.metrics.gc();
                    tokio::time::sleep(TICK_INTERVAL).await;
                }
            }
            ExecutionMode::Rate { target_rate } => {
                let rate = RateSchedule::starting_at(target_rate, self.plan.ramp_duration(), schedule_clock);
                while phase_start.elapsed() < duration {
                    if self.check_stop() {
                        return;
                    }
                    let deadline = rate.next_permit_instant();
                    tokio::time::sleep_until(deadline.into()).await;
                    if self.engine.try_submit(Arc::clone(&self.factory)).is_none() {
                        // Pool momentarily saturated; the permit slot is
                        // still considered consumed for pacing purposes.
                    }
                    self.metrics.gc();
                }
            }
            ExecutionMode::Hybrid { max_concurrency, target_rate } => {
                let ramp = RampSchedule::new(
                    self.plan.start_concurrency,
                    max_concurrency,
                    self.plan.ramp_duration(),
                    self.plan.ramp_shape,
                );
                let rate = RateSchedule::starting_at(target_rate, self.plan.ramp_duration(), schedule_clock);
                while phase_start.elapsed() < duration {
                    if self.check_stop() {
                        return;
                    }
                    let target = ramp.concurrency_at(schedule_clock.elapsed());
                    self.engine.set_concurrency(target);

                    let deadline = rate.next_permit_instant();
                    tokio::time::sleep_until(deadline.into()).await;
                    // Deferred, not dropped (spec §4.4): spawn the blocking
                    // `submit` rather than calling `try_submit`, so a permit
                    // that fires while the concurrency pool is saturated
                    // waits on the semaphore instead of being skipped, while
                    // the pacing loop itself keeps emitting on schedule. The
                    // rate cursor already advanced in `next_permit_instant`
                    // and is not rewound to compensate.
                    let engine = Arc::clone(&self.engine);
                    let factory = Arc::clone(&self.factory);
                    tokio::spawn(async move {
                        engine.submit(factory).await;
                    });
                    self.metrics.gc();
                }
            }
        }
    }

    /// In concurrency mode, keep the permit pool full by submitting new
    /// work whenever a permit is free (spec §4.3: the engine is the thing
    /// that blocks on concurrency, not the caller).
    fn fill_concurrency_slots(self: &Arc<Self>) {
        while self.engine.try_submit(Arc::clone(&self.factory)).is_some() {}
    }
}
