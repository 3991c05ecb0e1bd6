//! Property-based tests for the quantified invariants spec §8 calls out:
//! percentiles stay monotonic and within [min, max] for any sample set, and
//! a ramp schedule never reports a concurrency outside its configured
//! bounds regardless of how far past or before the ramp window it is
//! queried.

use loadforge::metrics::percentile_sorted;
use loadforge::{MetricsCore, RampSchedule, RampShape, TaskId, TaskResult};
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    /// Any non-empty set of latency samples produces a percentile ladder
    /// that is monotonically non-decreasing from p10 through p99, and every
    /// percentile falls within [min, max] of the underlying samples.
    #[test]
    fn prop_percentiles_are_monotonic_and_bounded(
        mut samples in prop::collection::vec(1u64..1_000_000, 1..500),
    ) {
        samples.sort_unstable();
        let min = *samples.first().unwrap();
        let max = *samples.last().unwrap();

        let p10 = percentile_sorted(&samples, 10.0);
        let p50 = percentile_sorted(&samples, 50.0);
        let p90 = percentile_sorted(&samples, 90.0);
        let p99 = percentile_sorted(&samples, 99.0);

        prop_assert!(p10 <= p50);
        prop_assert!(p50 <= p90);
        prop_assert!(p90 <= p99);
        prop_assert!(p10 >= min as f64 - 1e-6);
        prop_assert!(p99 <= max as f64 + 1e-6);
    }

    /// A linear ramp's concurrency is always within [start, target] (or
    /// [target, start] if descending) for any elapsed time, and always
    /// exactly `target` once the ramp window has passed.
    #[test]
    fn prop_linear_ramp_stays_within_its_endpoints(
        start in 1u32..200,
        target in 1u32..200,
        ramp_secs in 1u64..60,
        elapsed_ms in 0u64..120_000,
    ) {
        let ramp = RampSchedule::new(start, target, Duration::from_secs(ramp_secs), RampShape::Linear);
        let c = ramp.concurrency_at(Duration::from_millis(elapsed_ms));
        let (lo, hi) = if start <= target { (start, target) } else { (target, start) };
        prop_assert!(c >= lo && c <= hi);

        if elapsed_ms >= ramp_secs * 1000 {
            prop_assert_eq!(c, target);
        }
    }

    /// Recording N successes and M failures always yields a snapshot whose
    /// counts add up exactly, regardless of how the two are interleaved.
    #[test]
    fn prop_recorded_counts_always_add_up(
        outcomes in prop::collection::vec(any::<bool>(), 0..2000),
    ) {
        let metrics = MetricsCore::new();
        for (i, success) in outcomes.iter().enumerate() {
            let id = TaskId(i as u64);
            if *success {
                metrics.record(&TaskResult::success(id, 0, 1));
            } else {
                metrics.record(&TaskResult::failure(id, 0, 1, "x"));
            }
        }
        let snap = metrics.snapshot();
        prop_assert_eq!(snap.total_count, outcomes.len() as u64);
        prop_assert_eq!(snap.success_count + snap.failure_count, snap.total_count);
    }
}
