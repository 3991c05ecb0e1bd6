//! `MetricsCore`: the thread-safe outcome recorder and snapshot source at the
//! heart of spec §4.1. One instance per test run.

use super::ring::LatencyRing;
use super::snapshot::{mean, percentile_sorted, top_n, Snapshot};
use super::window::WindowedCounters;
use crate::task::{truncate_utf8, TaskResult};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const DEFAULT_RING_CAPACITY: usize = 8192;
const MAX_ERROR_KEYS: usize = 1024;
/// Window `recent()`/`current_tps` looks back over, for the "last N
/// seconds" view spec §4.1 describes.
const RECENT_WINDOW_MS: u64 = 5_000;
const TOP_ERRORS_DEPTH: usize = 10;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Records task outcomes and produces point-in-time `Snapshot`s and recent
/// windowed views. All recording paths are lock-free or sharded
/// (`DashMap`); the only exclusive lock in the whole component is the
/// windowed-counters GC gate (see `window.rs`).
pub struct MetricsCore {
    ring: LatencyRing,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    response_size_sum: AtomicU64,
    response_size_count: AtomicU64,
    status_counts: DashMap<i32, AtomicU64>,
    error_counts: DashMap<String, AtomicU64>,
    error_last_write: DashMap<String, u64>,
    windows: WindowedCounters,
    /// When this run (or the last `reset()`) began, for `elapsed_ms` and
    /// `overall_tps`.
    started_at: RwLock<Instant>,
    closed: std::sync::atomic::AtomicBool,
}

impl MetricsCore {
    pub fn new() -> Self {
        Self::with_ring_capacity(DEFAULT_RING_CAPACITY)
    }

    pub fn with_ring_capacity(capacity: usize) -> Self {
        MetricsCore {
            ring: LatencyRing::new(capacity),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            response_size_sum: AtomicU64::new(0),
            response_size_count: AtomicU64::new(0),
            status_counts: DashMap::new(),
            error_counts: DashMap::new(),
            error_last_write: DashMap::new(),
            windows: WindowedCounters::new(),
            started_at: RwLock::new(Instant::now()),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Record one completed task's outcome. Safe to call from many
    /// concurrent task-completion callbacks.
    pub fn record(&self, result: &TaskResult) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }
        let latency_ns = result.latency().as_nanos() as u64;
        self.ring.record(latency_ns);

        if result.success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
            if let Some(class) = &result.error_class {
                self.record_error(class);
            }
        }

        if let Some(code) = result.status_code {
            self.status_counts
                .entry(code)
                .or_insert_with(|| AtomicU64::new(0))
                .fetch_add(1, Ordering::Relaxed);
        }

        if let Some(size) = result.response_size {
            self.response_size_sum.fetch_add(size, Ordering::Relaxed);
            self.response_size_count.fetch_add(1, Ordering::Relaxed);
        }

        let ts_ms = (result.end_ns / 1_000_000) as u64;
        self.windows
            .record(ts_ms, result.success, latency_ns, result.status_code, result.response_size);
    }

    fn record_error(&self, class: &str) {
        let key = truncate_utf8(class, 100);
        self.error_counts
            .entry(key.clone())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
        self.error_last_write.insert(key, now_ms());

        if self.error_counts.len() > MAX_ERROR_KEYS {
            self.evict_oldest_error();
        }
    }

    /// Evict the least-recently-written error key once the table exceeds its
    /// cap (spec §3/§9: "a 1024-key cap... oldest-by-last-write eviction").
    fn evict_oldest_error(&self) {
        let oldest = self
            .error_last_write
            .iter()
            .min_by_key(|entry| *entry.value())
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.error_counts.remove(&key);
            self.error_last_write.remove(&key);
        }
    }

    /// An all-time snapshot as of now.
    pub fn snapshot(&self) -> Snapshot {
        let mut sorted = self.ring.snapshot();
        sorted.sort_unstable();

        let success = self.success_count.load(Ordering::Relaxed);
        let failure = self.failure_count.load(Ordering::Relaxed);
        let total = success + failure;

        let elapsed = self.started_at.read().elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        let elapsed_secs = elapsed.as_secs_f64().max(1e-9);

        let response_size_count = self.response_size_count.load(Ordering::Relaxed);
        let avg_response_size = if response_size_count == 0 {
            0.0
        } else {
            self.response_size_sum.load(Ordering::Relaxed) as f64 / response_size_count as f64
        };

        let error_counts: std::collections::HashMap<String, u64> = self
            .error_counts
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect();

        Snapshot {
            taken_at_ms: now_ms(),
            elapsed_ms,
            total_count: total,
            success_count: success,
            failure_count: failure,
            current_tps: self.current_tps(),
            overall_tps: total as f64 / elapsed_secs,
            min_ns: sorted.first().copied().unwrap_or(0) as f64,
            p10_ns: percentile_sorted(&sorted, 10.0),
            p25_ns: percentile_sorted(&sorted, 25.0),
            p50_ns: percentile_sorted(&sorted, 50.0),
            p75_ns: percentile_sorted(&sorted, 75.0),
            p90_ns: percentile_sorted(&sorted, 90.0),
            p95_ns: percentile_sorted(&sorted, 95.0),
            p99_ns: percentile_sorted(&sorted, 99.0),
            max_ns: sorted.last().copied().unwrap_or(0) as f64,
            mean_ns: mean(&sorted),
            avg_response_size,
            status_counts: self
                .status_counts
                .iter()
                .map(|e| (*e.key(), e.value().load(Ordering::Relaxed)))
                .collect(),
            top_errors: top_n(&error_counts, TOP_ERRORS_DEPTH),
            error_counts,
        }
    }

    /// Throughput over the last `RECENT_WINDOW_MS`, in tasks/sec — the
    /// "current TPS" spec §3 names distinctly from the run's overall TPS.
    fn current_tps(&self) -> f64 {
        let buckets = self.windows.recent_buckets(RECENT_WINDOW_MS);
        if buckets.is_empty() {
            return 0.0;
        }
        let total: u64 = buckets.iter().map(|b| b.success_count + b.failure_count).sum();
        total as f64 / (RECENT_WINDOW_MS as f64 / 1000.0)
    }

    /// Aggregates the windowed buckets whose start falls in the last
    /// `lookback_ms`, computing percentiles from the union of their sample
    /// lists (spec §4.1 `recent`). Falls back to the overall snapshot if no
    /// bucket has data in that window.
    pub fn recent(&self, lookback_ms: u64) -> Snapshot {
        let buckets = self.windows.recent_buckets(lookback_ms);
        if buckets.is_empty() {
            return self.snapshot();
        }

        let success_count: u64 = buckets.iter().map(|b| b.success_count).sum();
        let failure_count: u64 = buckets.iter().map(|b| b.failure_count).sum();
        let total_count = success_count + failure_count;

        let response_size_sum: u64 = buckets.iter().map(|b| b.response_size_sum).sum();
        let response_size_count: u64 = buckets.iter().map(|b| b.response_size_count).sum();
        let avg_response_size = if response_size_count == 0 {
            0.0
        } else {
            response_size_sum as f64 / response_size_count as f64
        };

        let mut status_counts: std::collections::HashMap<i32, u64> = std::collections::HashMap::new();
        for bucket in &buckets {
            for (code, count) in &bucket.status_counts {
                *status_counts.entry(*code).or_insert(0) += count;
            }
        }

        let mut samples: Vec<u64> = buckets.iter().flat_map(|b| b.samples.iter().copied()).collect();
        samples.sort_unstable();

        let elapsed_secs = (lookback_ms as f64 / 1000.0).max(1e-9);

        Snapshot {
            taken_at_ms: now_ms(),
            elapsed_ms: lookback_ms,
            total_count,
            success_count,
            failure_count,
            current_tps: total_count as f64 / elapsed_secs,
            overall_tps: total_count as f64 / elapsed_secs,
            min_ns: samples.first().copied().unwrap_or(0) as f64,
            p10_ns: percentile_sorted(&samples, 10.0),
            p25_ns: percentile_sorted(&samples, 25.0),
            p50_ns: percentile_sorted(&samples, 50.0),
            p75_ns: percentile_sorted(&samples, 75.0),
            p90_ns: percentile_sorted(&samples, 90.0),
            p95_ns: percentile_sorted(&samples, 95.0),
            p99_ns: percentile_sorted(&samples, 99.0),
            max_ns: samples.last().copied().unwrap_or(0) as f64,
            mean_ns: mean(&samples),
            avg_response_size,
            status_counts,
            // Bucket accumulators don't track error class, only status code
            // (spec §3's WindowBucket field list); a windowed error-class
            // breakdown is not part of this operation's contract.
            error_counts: std::collections::HashMap::new(),
            top_errors: Vec::new(),
        }
    }

    /// Drop windowed buckets older than the retention horizon. Intended to
    /// be called periodically by the owning test runner's control loop.
    pub fn gc(&self) {
        self.windows.gc();
    }

    /// Discard all recorded samples and counters, as when a warmup phase
    /// ends and its samples should not count toward the reported run (spec
    /// §4.4).
    pub fn reset(&self) {
        self.ring.clear();
        self.success_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.response_size_sum.store(0, Ordering::Relaxed);
        self.response_size_count.store(0, Ordering::Relaxed);
        self.status_counts.clear();
        self.error_counts.clear();
        self.error_last_write.clear();
        self.windows.clear();
        *self.started_at.write() = Instant::now();
    }

    /// Percentile for an arbitrary `p` (spec §4.1: "computable for
    /// arbitrary percentiles"), beyond the default map `snapshot()` always
    /// includes. Takes a fresh ring sample, so two calls are not
    /// guaranteed to see the same underlying data under concurrent writes.
    pub fn percentile(&self, p: f64) -> f64 {
        let mut sorted = self.ring.snapshot();
        sorted.sort_unstable();
        percentile_sorted(&sorted, p)
    }

    /// Stop accepting further `record` calls (no-op drops), for the window
    /// between drain completion and final snapshot read.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl Default for MetricsCore {
    fn default() -> Self {
        Self::new()
    }
}
