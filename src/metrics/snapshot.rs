//! Point-in-time metrics snapshot and percentile computation (spec §4.1).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An immutable view of a test's aggregate metrics at the moment it was
/// taken. Cheap to clone; this is what crosses the controller/worker and
/// controller/caller boundaries.
///
/// Fields mirror spec §3's `Snapshot` data model directly: total/success/
/// failure counts, elapsed duration, current and overall TPS, average
/// latency and response size, the default percentile map (P10/P25/P50/P75/
/// P90/P95/P99), a status-code histogram, and the top-10 error-class
/// frequencies (alongside the full `error_counts` table, for consumers that
/// want more than the top 10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at_ms: u64,
    pub elapsed_ms: u64,
    pub total_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Throughput over the last few seconds (spec §4.1 `recent`), in
    /// tasks/sec. Zero on a fresh instance.
    pub current_tps: f64,
    /// Throughput over the whole run so far (`total_count / elapsed`).
    pub overall_tps: f64,
    pub min_ns: f64,
    pub p10_ns: f64,
    pub p25_ns: f64,
    pub p50_ns: f64,
    pub p75_ns: f64,
    pub p90_ns: f64,
    pub p95_ns: f64,
    pub p99_ns: f64,
    pub max_ns: f64,
    pub mean_ns: f64,
    pub avg_response_size: f64,
    pub status_counts: HashMap<i32, u64>,
    pub error_counts: HashMap<String, u64>,
    /// The `error_counts` table's 10 most frequent entries, pre-sorted
    /// descending by count (spec §3: "top-10 error-class frequencies").
    pub top_errors: Vec<(String, u64)>,
}

impl Snapshot {
    pub fn success_rate(&self) -> f64 {
        if self.total_count == 0 {
            return 1.0;
        }
        self.success_count as f64 / self.total_count as f64
    }

    pub fn avg_latency_ms(&self) -> f64 {
        self.mean_ns / 1_000_000.0
    }

    pub fn empty(taken_at_ms: u64) -> Self {
        Snapshot {
            taken_at_ms,
            elapsed_ms: 0,
            total_count: 0,
            success_count: 0,
            failure_count: 0,
            current_tps: 0.0,
            overall_tps: 0.0,
            min_ns: 0.0,
            p10_ns: 0.0,
            p25_ns: 0.0,
            p50_ns: 0.0,
            p75_ns: 0.0,
            p90_ns: 0.0,
            p95_ns: 0.0,
            p99_ns: 0.0,
            max_ns: 0.0,
            mean_ns: 0.0,
            avg_response_size: 0.0,
            status_counts: HashMap::new(),
            error_counts: HashMap::new(),
            top_errors: Vec::new(),
        }
    }
}

/// The `n` most frequent entries of `counts`, descending by count, ties
/// broken by key for determinism.
pub fn top_n(counts: &HashMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(n);
    entries
}

/// Nearest-rank percentile with linear interpolation between the two
/// neighboring order statistics, at fractional rank `p/100 * (n-1)`, as
/// spec §4.1 prescribes. `samples` need not be sorted; this sorts a clone.
pub fn percentile(samples: &[u64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<u64> = samples.to_vec();
    sorted.sort_unstable();
    percentile_sorted(&sorted, p)
}

/// Same as `percentile`, but assumes `sorted` is already sorted ascending —
/// avoids re-sorting when computing several percentiles off one snapshot.
pub fn percentile_sorted(sorted: &[u64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0] as f64;
    }
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower] as f64;
    }
    let frac = rank - lower as f64;
    let lo = sorted[lower] as f64;
    let hi = sorted[upper] as f64;
    lo + (hi - lo) * frac
}

pub fn mean(samples: &[u64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<u64>() as f64 / samples.len() as f64
}
