//! Per-second windowed counters, retained for a bounded horizon and swept by
//! a background GC pass. Grounds the "recent()" time-sliced view distinct
//! from the all-time snapshot (spec §4.1).

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// How long windowed buckets are retained before GC reclaims them.
/// Resolves spec §9's Open Question: the primary text (§3, §5) states 10
/// minutes; the competing "last hour" mention is rejected (see DESIGN.md).
pub const RETENTION_MS: u64 = 10 * 60 * 1000;

pub const WINDOW_SIZE_MS: u64 = 1_000;

/// Cap on the latency sample list each bucket keeps (spec §3: "a small
/// latency sample list"). Buckets only need to support percentile estimates
/// over a handful of seconds, not the whole run — the all-time `LatencyRing`
/// already covers that.
const BUCKET_SAMPLE_CAP: usize = 512;

/// Counters for a single one-second window. The scalar fields are atomic so
/// multiple task-completion callbacks can update the same bucket
/// concurrently without a lock; the status histogram and sample list need
/// their own concurrent containers since they're not single values.
#[derive(Default)]
pub struct WindowBucket {
    pub success_count: AtomicU64,
    pub failure_count: AtomicU64,
    /// Sum of latencies (ns) observed in this window, for a cheap windowed
    /// mean without re-deriving it from the ring.
    pub latency_sum_ns: AtomicU64,
    pub response_size_sum: AtomicU64,
    pub response_size_count: AtomicU64,
    status_counts: DashMap<i32, AtomicU64>,
    samples: Mutex<Vec<u64>>,
}

impl WindowBucket {
    pub fn record(&self, success: bool, latency_ns: u64, status_code: Option<i32>, response_size: Option<u64>) {
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        self.latency_sum_ns.fetch_add(latency_ns, Ordering::Relaxed);

        if let Some(code) = status_code {
            self.status_counts
                .entry(code)
                .or_insert_with(|| AtomicU64::new(0))
                .fetch_add(1, Ordering::Relaxed);
        }
        if let Some(size) = response_size {
            self.response_size_sum.fetch_add(size, Ordering::Relaxed);
            self.response_size_count.fetch_add(1, Ordering::Relaxed);
        }

        let mut samples = self.samples.lock();
        if samples.len() < BUCKET_SAMPLE_CAP {
            samples.push(latency_ns);
        }
    }

    pub fn total(&self) -> u64 {
        self.success_count.load(Ordering::Relaxed) + self.failure_count.load(Ordering::Relaxed)
    }

    pub fn mean_latency_ns(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.latency_sum_ns.load(Ordering::Relaxed) as f64 / total as f64
    }

    fn to_snapshot(&self, window_start_ms: u64) -> WindowBucketSnapshot {
        WindowBucketSnapshot {
            window_start_ms,
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            response_size_sum: self.response_size_sum.load(Ordering::Relaxed),
            response_size_count: self.response_size_count.load(Ordering::Relaxed),
            status_counts: self
                .status_counts
                .iter()
                .map(|e| (*e.key(), e.value().load(Ordering::Relaxed)))
                .collect(),
            samples: self.samples.lock().clone(),
        }
    }
}

/// An owned, point-in-time copy of one window's accumulators, returned by
/// `WindowedCounters::recent_buckets` so a caller can combine several
/// windows (spec §4.1 `recent`) without holding any bucket lock while it
/// does so.
#[derive(Debug, Clone, Default)]
pub struct WindowBucketSnapshot {
    pub window_start_ms: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub response_size_sum: u64,
    pub response_size_count: u64,
    pub status_counts: HashMap<i32, u64>,
    pub samples: Vec<u64>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Keyed by `window_start_ms = now_ms / WINDOW_SIZE_MS * WINDOW_SIZE_MS`.
/// Writers take the GC gate's read lock for the span of their bucket
/// mutation; the GC sweep takes the write lock, which excludes concurrent
/// bucket writers for the duration of the sweep. `DashMap` alone
/// serializes per-key access but not "no writer anywhere during GC", which
/// is what the gate adds.
pub struct WindowedCounters {
    buckets: DashMap<u64, WindowBucket>,
    gc_gate: RwLock<()>,
}

impl WindowedCounters {
    pub fn new() -> Self {
        WindowedCounters {
            buckets: DashMap::new(),
            gc_gate: RwLock::new(()),
        }
    }

    fn window_key(ts_ms: u64) -> u64 {
        ts_ms - (ts_ms % WINDOW_SIZE_MS)
    }

    /// Record one task outcome against the window its timestamp falls in.
    pub fn record(&self, ts_ms: u64, success: bool, latency_ns: u64, status_code: Option<i32>, response_size: Option<u64>) {
        let _read = self.gc_gate.read();
        let key = Self::window_key(ts_ms);
        self.buckets
            .entry(key)
            .or_insert_with(WindowBucket::default)
            .record(success, latency_ns, status_code, response_size);
    }

    /// Owned snapshots of the buckets whose window falls within the last
    /// `lookback_ms` (spec §4.1 `recent`).
    pub fn recent_buckets(&self, lookback_ms: u64) -> Vec<WindowBucketSnapshot> {
        let now = now_ms();
        let floor = now.saturating_sub(lookback_ms);
        self.buckets
            .iter()
            .filter(|entry| *entry.key() >= floor)
            .map(|entry| entry.to_snapshot(*entry.key()))
            .collect()
    }

    /// Drop buckets older than `RETENTION_MS`. Intended to run periodically
    /// from the test runner's control loop, not from every `record` call.
    pub fn gc(&self) {
        let _write = self.gc_gate.write();
        let now = now_ms();
        let floor = now.saturating_sub(RETENTION_MS);
        self.buckets.retain(|key, _| *key >= floor);
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn clear(&self) {
        let _write = self.gc_gate.write();
        self.buckets.clear();
    }
}

impl Default for WindowedCounters {
    fn default() -> Self {
        Self::new()
    }
}
