//! Cross-module coverage of `MetricsCore` and `Snapshot` beyond the unit
//! tests colocated with `src/metrics/`: end-to-end recording through the
//! public crate surface, and the specific numeric contracts spec §3/§4.1
//! and §8 call out.

use loadforge::{MetricsCore, TaskId, TaskResult};

#[test]
fn snapshot_of_fresh_metrics_has_perfect_success_rate_and_zero_percentiles() {
    let metrics = MetricsCore::new();
    let snapshot = metrics.snapshot();

    assert_eq!(snapshot.total_count, 0);
    assert_eq!(snapshot.success_rate(), 1.0);
    assert_eq!(snapshot.p50_ns, 0.0);
    assert_eq!(snapshot.p99_ns, 0.0);
}

#[test]
fn percentiles_are_monotonically_non_decreasing() {
    let metrics = MetricsCore::new();
    for i in 1..=1000u64 {
        metrics.record(&TaskResult::success(TaskId(i), 0, (i * 1000) as u128));
    }
    let snap = metrics.snapshot();

    assert!(snap.min_ns <= snap.p10_ns);
    assert!(snap.p10_ns <= snap.p25_ns);
    assert!(snap.p25_ns <= snap.p50_ns);
    assert!(snap.p50_ns <= snap.p75_ns);
    assert!(snap.p75_ns <= snap.p90_ns);
    assert!(snap.p90_ns <= snap.p95_ns);
    assert!(snap.p95_ns <= snap.p99_ns);
    assert!(snap.p99_ns <= snap.max_ns);
}

#[test]
fn scenario_c_failure_rate_lands_in_the_expected_band() {
    // Spec §8 Scenario C: task fails ~10% of the time; failedTasks/totalTasks
    // should land in [0.08, 0.12] over a large enough sample.
    let metrics = MetricsCore::new();
    for i in 0..10_000u64 {
        if i % 10 == 0 {
            metrics.record(&TaskResult::failure(TaskId(i), 0, 1, "boom"));
        } else {
            metrics.record(&TaskResult::success(TaskId(i), 0, 1));
        }
    }
    let snap = metrics.snapshot();
    let failure_rate = snap.failure_count as f64 / snap.total_count as f64;

    assert!((0.08..=0.12).contains(&failure_rate), "failure rate {failure_rate} out of band");
    assert_eq!(snap.error_counts.get("boom"), Some(&1000));
    assert!(snap.top_errors.iter().any(|(class, _)| class == "boom"));
}

#[test]
fn reset_discards_warmup_samples_but_keeps_the_core_usable() {
    let metrics = MetricsCore::new();
    for i in 0..50u64 {
        metrics.record(&TaskResult::success(TaskId(i), 0, 1));
    }
    metrics.reset();
    assert_eq!(metrics.snapshot().total_count, 0);

    metrics.record(&TaskResult::success(TaskId(999), 0, 1));
    assert_eq!(metrics.snapshot().total_count, 1);
}

#[test]
fn response_size_average_reflects_only_results_that_report_one() {
    let metrics = MetricsCore::new();
    metrics.record(&TaskResult::success(TaskId(1), 0, 1).with_response_size(100));
    metrics.record(&TaskResult::success(TaskId(2), 0, 1).with_response_size(300));
    metrics.record(&TaskResult::success(TaskId(3), 0, 1)); // no size reported

    let snap = metrics.snapshot();
    assert_eq!(snap.avg_response_size, 200.0);
}
