//! Metrics core (spec §4.1): lock-free outcome recording, percentile
//! snapshots, and retained windowed counters.

pub mod core;
pub mod ring;
pub mod snapshot;
pub mod window;

pub use core::MetricsCore;
pub use snapshot::{mean, percentile, percentile_sorted, top_n, Snapshot};
