//! Ramp and rate scheduling (spec §4.2): time-varying concurrency/rate
//! targets, evaluated against an `Instant` schedule start rather than wall
//! clock so tests can drive them with `tokio::time::pause`/`advance`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Shape of the concurrency ramp between a starting and target level.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RampShape {
    /// Evenly-spaced linear increase from `start` to `target` over the ramp
    /// duration.
    Linear,
    /// `steps` discrete jumps, each holding for `ramp_duration / steps`.
    Step { steps: u32 },
}

/// Describes how target concurrency varies from test start through the ramp
/// window, then holds steady for the sustain window (spec §4.2).
#[derive(Debug, Clone, Copy)]
pub struct RampSchedule {
    pub start_concurrency: u32,
    pub target_concurrency: u32,
    pub ramp_duration: Duration,
    pub shape: RampShape,
}

impl RampSchedule {
    pub fn new(
        start_concurrency: u32,
        target_concurrency: u32,
        ramp_duration: Duration,
        shape: RampShape,
    ) -> Self {
        RampSchedule {
            start_concurrency,
            target_concurrency,
            ramp_duration,
            shape,
        }
    }

    /// Immediate jump to target concurrency; no ramp window.
    pub fn immediate(target_concurrency: u32) -> Self {
        RampSchedule {
            start_concurrency: target_concurrency,
            target_concurrency,
            ramp_duration: Duration::ZERO,
            shape: RampShape::Linear,
        }
    }

    /// The concurrency target at `elapsed` time since the schedule began.
    /// Saturates at `target_concurrency` once `elapsed >= ramp_duration`.
    /// Always returns at least 1 (spec §4.2: "returns an integer ≥ 1").
    pub fn concurrency_at(&self, elapsed: Duration) -> u32 {
        if self.ramp_duration.is_zero() || elapsed >= self.ramp_duration {
            return self.target_concurrency.max(1);
        }
        let frac = elapsed.as_secs_f64() / self.ramp_duration.as_secs_f64();
        let span = self.target_concurrency as f64 - self.start_concurrency as f64;

        let level = match self.shape {
            RampShape::Linear => self.start_concurrency as f64 + span * frac,
            RampShape::Step { steps } => {
                let steps = steps.max(1);
                // Held at start_concurrency for the first interval, then
                // bumped at each subsequent stepInterval boundary.
                let step_index = (frac * steps as f64).floor().min((steps - 1) as f64);
                let step_frac = step_index / steps as f64;
                self.start_concurrency as f64 + span * step_frac
            }
        };
        (level.round() as i64).max(1) as u32
    }
}

/// Paces permit emission toward a target requests-per-second rate, ramping
/// linearly from 1 to the target over `ramp_duration` (spec §9's resolved
/// Open Question: linear, not a step function, and recomputed on a coarse
/// cache granularity rather than every call).
///
/// Single producer: only the scheduler's own control loop calls
/// `next_permit_instant`/`rollback`, so the "CAS the next-instant cursor"
/// description in spec §4.2 reduces to a plain `fetch_add`/`fetch_sub` pair
/// — a CAS loop with exactly one writer never contends.
pub struct RateSchedule {
    start: Instant,
    target_rate: f64,
    ramp_duration: Duration,
    /// Nanoseconds since `start` at which the next permit should be
    /// released. `u64` rather than `Instant` because atomics don't hold
    /// non-`Copy`-into-int types.
    next_instant_ns: AtomicU64,
    /// Cached `currentTps` recomputation granularity (spec §4.2: 100ms).
    cache_granularity: Duration,
}

const RATE_CACHE_GRANULARITY_MS: u64 = 100;

impl RateSchedule {
    pub fn new(target_rate: f64, ramp_duration: Duration) -> Self {
        Self::starting_at(target_rate, ramp_duration, Instant::now())
    }

    /// Construct anchored at an explicit clock start, so a rate ramp can
    /// share one test-wide clock across phases (runner.rs holds concurrency
    /// and rate ramps at the same anchor from Ramping through Sustaining)
    /// instead of restarting its own ramp on every phase transition.
    pub fn starting_at(target_rate: f64, ramp_duration: Duration, start: Instant) -> Self {
        RateSchedule {
            start,
            target_rate,
            ramp_duration,
            next_instant_ns: AtomicU64::new(0),
            cache_granularity: Duration::from_millis(RATE_CACHE_GRANULARITY_MS),
        }
    }

    /// The instantaneous target rate at elapsed time `elapsed`, ramping
    /// linearly from 1.0 up to `target_rate`.
    pub fn current_rate_at(&self, elapsed: Duration) -> f64 {
        if self.ramp_duration.is_zero() || elapsed >= self.ramp_duration {
            return self.target_rate;
        }
        let frac = elapsed.as_secs_f64() / self.ramp_duration.as_secs_f64();
        1.0 + (self.target_rate - 1.0) * frac
    }

    /// Rounds `elapsed` down to the cache granularity, so `current_rate_at`
    /// is only recomputed a handful of times per second rather than on
    /// every permit.
    fn cached_elapsed(&self, elapsed: Duration) -> Duration {
        let granularity_ms = self.cache_granularity.as_millis() as u64;
        let elapsed_ms = elapsed.as_millis() as u64;
        Duration::from_millis(elapsed_ms - (elapsed_ms % granularity_ms.max(1)))
    }

    /// Claims the next permit's scheduled instant (nanoseconds since
    /// `start`) and advances the internal cursor by `1 / current_rate`
    /// seconds. Returns the absolute `Instant` the caller should wait until.
    pub fn next_permit_instant(&self) -> Instant {
        let elapsed = self.start.elapsed();
        let rate = self.current_rate_at(self.cached_elapsed(elapsed)).max(0.001);
        let interval_ns = (1_000_000_000.0 / rate) as u64;

        let prev = self.next_instant_ns.fetch_add(interval_ns, Ordering::Relaxed);
        let scheduled = prev.max(elapsed.as_nanos() as u64);
        self.start + Duration::from_nanos(scheduled)
    }

    /// Undo the last `next_permit_instant` claim — used when a task is
    /// rejected before dispatch (e.g. the semaphore is closed) and its
    /// reserved slot should not count against pacing. Single producer, so a
    /// plain `fetch_sub` is sound; no other caller can have advanced the
    /// cursor in between.
    pub fn rollback(&self, interval_ns: u64) {
        self.next_instant_ns.fetch_sub(interval_ns, Ordering::Relaxed);
    }

    pub fn target_rate(&self) -> f64 {
        self.target_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_ramp_hits_endpoints() {
        let ramp = RampSchedule::new(1, 100, Duration::from_secs(10), RampShape::Linear);
        assert_eq!(ramp.concurrency_at(Duration::ZERO), 1);
        assert_eq!(ramp.concurrency_at(Duration::from_secs(10)), 100);
        assert_eq!(ramp.concurrency_at(Duration::from_secs(20)), 100);
    }

    #[test]
    fn linear_ramp_midpoint_is_interpolated() {
        let ramp = RampSchedule::new(0, 100, Duration::from_secs(10), RampShape::Linear);
        assert_eq!(ramp.concurrency_at(Duration::from_secs(5)), 50);
    }

    #[test]
    fn step_ramp_holds_within_a_step() {
        let ramp = RampSchedule::new(0, 100, Duration::from_secs(10), RampShape::Step { steps: 5 });
        let at_start_of_step = ramp.concurrency_at(Duration::from_millis(2100));
        let at_end_of_step = ramp.concurrency_at(Duration::from_millis(3900));
        assert_eq!(at_start_of_step, at_end_of_step);
    }

    #[test]
    fn step_ramp_holds_start_concurrency_for_the_first_interval() {
        let ramp = RampSchedule::new(10, 60, Duration::from_secs(10), RampShape::Step { steps: 5 });
        assert_eq!(ramp.concurrency_at(Duration::ZERO), 10);
        assert_eq!(ramp.concurrency_at(Duration::from_millis(1900)), 10);
        assert_eq!(ramp.concurrency_at(Duration::from_millis(2100)), 20);
    }

    #[test]
    fn concurrency_at_never_drops_below_one() {
        let ramp = RampSchedule::new(0, 0, Duration::from_secs(10), RampShape::Linear);
        assert_eq!(ramp.concurrency_at(Duration::ZERO), 1);
        assert_eq!(ramp.concurrency_at(Duration::from_secs(5)), 1);
    }

    #[test]
    fn immediate_schedule_has_no_ramp() {
        let ramp = RampSchedule::immediate(50);
        assert_eq!(ramp.concurrency_at(Duration::ZERO), 50);
    }

    #[test]
    fn rate_schedule_ramps_linearly_to_target() {
        let schedule = RateSchedule::starting_at(100.0, Duration::from_secs(10), Instant::now());
        assert_eq!(schedule.current_rate_at(Duration::ZERO), 1.0);
        assert!((schedule.current_rate_at(Duration::from_secs(10)) - 100.0).abs() < 1e-9);
        let mid = schedule.current_rate_at(Duration::from_secs(5));
        assert!(mid > 1.0 && mid < 100.0);
    }

    #[test]
    fn rate_schedule_without_ramp_is_constant() {
        let schedule = RateSchedule::starting_at(50.0, Duration::ZERO, Instant::now());
        assert_eq!(schedule.current_rate_at(Duration::from_secs(1)), 50.0);
    }

    #[test]
    fn next_permit_instant_advances_monotonically() {
        let schedule = RateSchedule::starting_at(1000.0, Duration::ZERO, Instant::now());
        let first = schedule.next_permit_instant();
        let second = schedule.next_permit_instant();
        assert!(second >= first);
    }

    #[test]
    fn rollback_reclaims_the_last_interval() {
        let schedule = RateSchedule::starting_at(10.0, Duration::ZERO, Instant::now());
        let before = schedule.next_instant_ns.load(Ordering::Relaxed);
        let interval_ns = (1_000_000_000.0 / 10.0) as u64;
        schedule.next_permit_instant();
        schedule.rollback(interval_ns);
        let after = schedule.next_instant_ns.load(Ordering::Relaxed);
        assert_eq!(before, after);
    }
}
