//! Fixed-capacity overwriting ring buffer of observed latencies.
//!
//! Mirrors the teacher's `LatencyCollector` (rtrb ring + atomics over a
//! lock-free write path), adapted from a bounded producer/consumer queue to
//! an overwriting sample reservoir: once full, the newest sample replaces the
//! oldest rather than blocking or dropping. `H` (capacity) is fixed at
//! construction.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Holds up to `capacity` latency samples (nanoseconds), overwriting the
/// oldest slot once full. Safe for concurrent `record` from many writers;
/// `snapshot` takes a consistent-enough copy for percentile computation (spec
/// §4.1 accepts a torn read under concurrent writes as a resolved tradeoff).
pub struct LatencyRing {
    slots: Vec<AtomicU64>,
    write_index: AtomicUsize,
    populated: AtomicUsize,
    capacity: usize,
}

impl LatencyRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be positive");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || AtomicU64::new(0));
        LatencyRing {
            slots,
            write_index: AtomicUsize::new(0),
            populated: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Record one latency sample, in nanoseconds. Lock-free: a single
    /// `fetch_add` claims the slot, so concurrent writers never race on the
    /// same index.
    pub fn record(&self, latency_ns: u64) {
        let idx = self.write_index.fetch_add(1, Ordering::Relaxed) % self.capacity;
        self.slots[idx].store(latency_ns, Ordering::Relaxed);
        let populated = self.populated.load(Ordering::Relaxed);
        if populated < self.capacity {
            // Best-effort catch-up; saturating, never exceeds capacity even
            // under a race between two readers of `populated`.
            self.populated.fetch_add(1, Ordering::Relaxed);
            let _ = populated;
        }
    }

    /// Snapshot the currently populated samples, unordered. Torn reads under
    /// concurrent `record` calls are acceptable (percentile estimates, not
    /// exact accounting).
    pub fn snapshot(&self) -> Vec<u64> {
        let populated = self.populated.load(Ordering::Relaxed).min(self.capacity);
        self.slots[..populated]
            .iter()
            .map(|s| s.load(Ordering::Relaxed))
            .collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.populated.load(Ordering::Relaxed).min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reset to empty, as if freshly constructed. Used when a test runner
    /// transitions out of `Warmup` and metrics should not count warmup
    /// samples (spec §4.4).
    pub fn clear(&self) {
        self.write_index.store(0, Ordering::Relaxed);
        self.populated.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_up_to_capacity() {
        let ring = LatencyRing::new(4);
        for v in [1, 2, 3, 4] {
            ring.record(v);
        }
        assert_eq!(ring.len(), 4);
        let mut snap = ring.snapshot();
        snap.sort_unstable();
        assert_eq!(snap, vec![1, 2, 3, 4]);
    }

    #[test]
    fn overwrites_oldest_when_full() {
        let ring = LatencyRing::new(3);
        for v in [1, 2, 3, 4, 5] {
            ring.record(v);
        }
        assert_eq!(ring.len(), 3);
        let snap = ring.snapshot();
        assert_eq!(snap.len(), 3);
    }

    #[test]
    fn clear_resets_state() {
        let ring = LatencyRing::new(2);
        ring.record(10);
        ring.record(20);
        ring.clear();
        assert!(ring.is_empty());
        ring.record(30);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn concurrent_writers_never_exceed_capacity() {
        use std::sync::Arc;
        use std::thread;

        let ring = Arc::new(LatencyRing::new(100));
        let mut handles = vec![];
        for t in 0..8 {
            let ring = Arc::clone(&ring);
            handles.push(thread::spawn(move || {
                for i in 0..1000u64 {
                    ring.record(t * 1000 + i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ring.len(), 100);
        assert_eq!(ring.snapshot().len(), 100);
    }
}
