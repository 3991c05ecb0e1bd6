//! `DistributedCoordinator`: splits a `TestPlan` across worker nodes and
//! aggregates their reported metrics (spec §4.5). Named distinctly from the
//! single-node `controller::LoadController` to avoid the name collision
//! spec §6 notes between "Control API" and "Controller".

use super::rpc::WorkerRpc;
use super::types::{Assignment, Worker, WorkerHealth, WorkerId, WorkerInfo, WorkerMetrics};
use crate::error::DistributionError;
use crate::metrics::{top_n, Snapshot};
use crate::plan::{ExecutionMode, TestPlan};
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// How many recent `WorkerMetrics` samples are retained per worker, beyond
/// the latest one the aggregation algorithm actually uses. Lets a future
/// reporting layer plot a worker's short-term trend; this crate's own
/// `aggregate` only reads the newest sample per worker.
const METRICS_HISTORY_DEPTH: usize = 20;

/// Minimum number of workers that must have reported at all, and the
/// minimum request count *every* reporting worker must carry, before
/// `aggregate` will produce a result rather than
/// `DistributionError::InsufficientSampleSize` (spec §4.5: "must refuse to
/// aggregate if any worker reports fewer than a configurable minimum count
/// (default 100) to avoid small-sample bias").
const MIN_REPORTING_WORKERS: usize = 1;
const MIN_SAMPLE_COUNT: u64 = 100;

struct RegisteredWorker {
    info: WorkerInfo,
    rpc: Arc<dyn WorkerRpc>,
}

/// Coordinates a distributed test across registered worker nodes: computes
/// each worker's proportional share of the plan, dispatches assignments,
/// and aggregates the metrics workers push back.
pub struct DistributedCoordinator {
    workers: DashMap<WorkerId, RegisteredWorker>,
    metrics_history: DashMap<WorkerId, VecDeque<WorkerMetrics>>,
}

impl DistributedCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(DistributedCoordinator {
            workers: DashMap::new(),
            metrics_history: DashMap::new(),
        })
    }

    pub fn register_worker(&self, worker: Worker, rpc: Arc<dyn WorkerRpc>) {
        let id = worker.id;
        self.workers.insert(
            id,
            RegisteredWorker {
                info: WorkerInfo {
                    worker,
                    health: WorkerHealth::Healthy,
                    current_load: 0,
                    last_heartbeat_ms: now_ms(),
                },
                rpc,
            },
        );
    }

    pub fn deregister_worker(&self, worker_id: WorkerId) {
        self.workers.remove(&worker_id);
        self.metrics_history.remove(&worker_id);
    }

    /// Refresh a worker's cached health/load from a heartbeat result.
    pub fn update_worker_info(&self, info: WorkerInfo) {
        if let Some(mut entry) = self.workers.get_mut(&info.worker.id) {
            entry.info = info;
        }
    }

    /// Transition any worker whose last heartbeat is older than
    /// `2 * heartbeat_interval` to `Disconnected` (spec §4.5). Intended to
    /// be called periodically by whatever drives the coordinator's control
    /// loop, on the same cadence as its heartbeat polling.
    pub fn sweep_disconnected_workers(&self, heartbeat_interval: std::time::Duration) {
        let threshold_ms = 2 * heartbeat_interval.as_millis() as u64;
        let now = now_ms();
        for mut entry in self.workers.iter_mut() {
            if now.saturating_sub(entry.info.last_heartbeat_ms) > threshold_ms {
                entry.info.health = WorkerHealth::Disconnected;
            }
        }
    }

    fn candidate_workers(&self, task_kind: &str) -> Vec<WorkerInfo> {
        self.workers
            .iter()
            .map(|e| e.info.clone())
            .filter(|info| info.health.is_assignable() && info.worker.supports(task_kind))
            .collect()
    }

    /// Split `plan`'s target across capable, healthy workers in proportion
    /// to each worker's available capacity, dispatch the assignment to
    /// each, and return the assignments sent. The last worker (by the
    /// iteration order used here) absorbs any remainder from integer/float
    /// rounding so shares sum exactly to the plan's total (spec §4.5).
    pub async fn distribute(
        &self,
        test_id: &str,
        task_kind: &str,
        plan: &TestPlan,
    ) -> Result<Vec<Assignment>, DistributionError> {
        let mut candidates = self.candidate_workers(task_kind);
        if candidates.is_empty() {
            return Err(DistributionError::NoCapableWorkers(task_kind.to_string()));
        }
        candidates.sort_by_key(|c| c.worker.id.0);

        let shares = match plan.mode {
            ExecutionMode::Concurrency { max_concurrency } => {
                split_u32_proportionally(max_concurrency, &candidates)
            }
            ExecutionMode::Rate { target_rate } => split_rate_proportionally(target_rate, &candidates),
            ExecutionMode::Hybrid { max_concurrency, target_rate } => {
                split_hybrid_proportionally(max_concurrency, target_rate, &candidates)
            }
        };

        let mut assignments = Vec::new();
        let mut rejected = 0usize;

        for (info, share) in candidates.iter().zip(shares.iter()) {
            let assignment = Assignment {
                test_id: test_id.to_string(),
                worker_id: info.worker.id,
                task_kind: task_kind.to_string(),
                plan: plan.clone(),
                share_mode: *share,
            };

            let rpc = match self.workers.get(&info.worker.id) {
                Some(w) => Arc::clone(&w.rpc),
                None => {
                    rejected += 1;
                    continue;
                }
            };

            match rpc.assign_task(assignment.clone()).await {
                Ok(()) => assignments.push(assignment),
                Err(_) => rejected += 1,
            }
        }

        if assignments.is_empty() {
            return Err(DistributionError::AllWorkersRejected(rejected + assignments.len()));
        }

        Ok(assignments)
    }

    /// Stop a distributed test on every worker it was assigned to.
    pub async fn stop_test(&self, test_id: &str) {
        for entry in self.workers.iter() {
            let _ = entry.rpc.stop_test(entry.info.worker.id, test_id).await;
        }
    }

    /// Record a worker's metrics push, retaining the last
    /// `METRICS_HISTORY_DEPTH` samples per worker.
    pub fn record_worker_metrics(&self, metrics: WorkerMetrics) {
        let mut history = self.metrics_history.entry(metrics.worker_id).or_insert_with(VecDeque::new);
        if history.len() >= METRICS_HISTORY_DEPTH {
            history.pop_front();
        }
        history.push_back(metrics);
    }

    pub fn history_for(&self, worker_id: WorkerId) -> Vec<WorkerMetrics> {
        self.metrics_history
            .get(&worker_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Aggregate the latest sample from each worker reporting on
    /// `test_id` into one approximate combined snapshot. Percentiles are
    /// recombined by count-weighted averaging of each worker's own
    /// percentiles, which is an approximation (not a reconstruction of the
    /// underlying sample population) — documented as such per spec §4.5.
    pub fn aggregate(&self, test_id: &str) -> Result<Snapshot, DistributionError> {
        let latest: Vec<Snapshot> = self
            .metrics_history
            .iter()
            .filter_map(|entry| entry.value().back().cloned())
            .filter(|m| m.test_id == test_id)
            .map(|m| m.snapshot)
            .collect();

        if latest.len() < MIN_REPORTING_WORKERS {
            return Err(DistributionError::InsufficientSampleSize {
                min: MIN_REPORTING_WORKERS,
                min_count: MIN_SAMPLE_COUNT,
            });
        }
        // Spec §4.5: a single under-sampled worker invalidates the whole
        // aggregate, not just its own contribution — small-sample bias in
        // one worker's percentiles would otherwise skew the weighted
        // average silently.
        if latest.iter().any(|s| s.total_count < MIN_SAMPLE_COUNT) {
            return Err(DistributionError::InsufficientSampleSize {
                min: MIN_REPORTING_WORKERS,
                min_count: MIN_SAMPLE_COUNT,
            });
        }

        Ok(combine_snapshots(&latest))
    }
}

fn split_u32_proportionally(total: u32, candidates: &[WorkerInfo]) -> Vec<ExecutionMode> {
    let weights: Vec<u32> = candidates.iter().map(|c| c.available_capacity().max(1)).collect();
    let weight_sum: u64 = weights.iter().map(|w| *w as u64).sum();

    let mut shares: Vec<u32> = weights
        .iter()
        .map(|w| ((total as u64 * *w as u64) / weight_sum.max(1)) as u32)
        .collect();

    if let Some(last) = shares.last_mut() {
        let allocated_before_last: u32 = shares[..shares.len() - 1].iter().sum();
        *last = total.saturating_sub(allocated_before_last);
    }

    shares
        .into_iter()
        .map(|max_concurrency| ExecutionMode::Concurrency { max_concurrency })
        .collect()
}

fn split_rate_proportionally(total: f64, candidates: &[WorkerInfo]) -> Vec<ExecutionMode> {
    let weights: Vec<f64> = candidates.iter().map(|c| (c.available_capacity().max(1)) as f64).collect();
    let weight_sum: f64 = weights.iter().sum();

    let mut shares: Vec<f64> = weights.iter().map(|w| total * w / weight_sum.max(1.0)).collect();

    if let Some(last) = shares.last_mut() {
        let allocated_before_last: f64 = shares[..shares.len() - 1].iter().sum();
        *last = (total - allocated_before_last).max(0.0);
    }

    shares.into_iter().map(|target_rate| ExecutionMode::Rate { target_rate }).collect()
}

/// Splits both the concurrency ceiling and the target rate proportionally
/// (spec §4.5's algorithm, applied to both of `Hybrid`'s two quantities),
/// zipping the two per-worker share vectors back into one `ExecutionMode`
/// each.
fn split_hybrid_proportionally(
    max_concurrency: u32,
    target_rate: f64,
    candidates: &[WorkerInfo],
) -> Vec<ExecutionMode> {
    let concurrency_shares = split_u32_proportionally(max_concurrency, candidates);
    let rate_shares = split_rate_proportionally(target_rate, candidates);

    concurrency_shares
        .into_iter()
        .zip(rate_shares)
        .map(|(c, r)| {
            let max_concurrency = match c {
                ExecutionMode::Concurrency { max_concurrency } => max_concurrency,
                _ => unreachable!("split_u32_proportionally always returns Concurrency"),
            };
            let target_rate = match r {
                ExecutionMode::Rate { target_rate } => target_rate,
                _ => unreachable!("split_rate_proportionally always returns Rate"),
            };
            ExecutionMode::Hybrid { max_concurrency, target_rate }
        })
        .collect()
}

fn combine_snapshots(snapshots: &[Snapshot]) -> Snapshot {
    let taken_at_ms = snapshots.iter().map(|s| s.taken_at_ms).max().unwrap_or(0);
    let elapsed_ms = snapshots.iter().map(|s| s.elapsed_ms).max().unwrap_or(0);
    let total_count: u64 = snapshots.iter().map(|s| s.total_count).sum();
    let success_count: u64 = snapshots.iter().map(|s| s.success_count).sum();
    let failure_count: u64 = snapshots.iter().map(|s| s.failure_count).sum();

    let weighted = |pick: fn(&Snapshot) -> f64| -> f64 {
        if total_count == 0 {
            return 0.0;
        }
        snapshots
            .iter()
            .map(|s| pick(s) * s.total_count as f64)
            .sum::<f64>()
            / total_count as f64
    };

    let mut status_counts: HashMap<i32, u64> = HashMap::new();
    let mut error_counts: HashMap<String, u64> = HashMap::new();
    for snap in snapshots {
        for (code, count) in &snap.status_counts {
            *status_counts.entry(*code).or_insert(0) += count;
        }
        for (class, count) in &snap.error_counts {
            *error_counts.entry(class.clone()).or_insert(0) += count;
        }
    }

    Snapshot {
        taken_at_ms,
        elapsed_ms,
        total_count,
        success_count,
        failure_count,
        // Spec §4.5: aggregate TPS is summed across workers, not averaged.
        current_tps: snapshots.iter().map(|s| s.current_tps).sum(),
        overall_tps: snapshots.iter().map(|s| s.overall_tps).sum(),
        // Spec §4.5: "min and max are set to global min and max across workers".
        min_ns: {
            let m = snapshots.iter().map(|s| s.min_ns).fold(f64::INFINITY, f64::min);
            if m.is_finite() {
                m
            } else {
                0.0
            }
        },
        p10_ns: weighted(|s| s.p10_ns),
        p25_ns: weighted(|s| s.p25_ns),
        p50_ns: weighted(|s| s.p50_ns),
        p75_ns: weighted(|s| s.p75_ns),
        p90_ns: weighted(|s| s.p90_ns),
        p95_ns: weighted(|s| s.p95_ns),
        p99_ns: weighted(|s| s.p99_ns),
        max_ns: snapshots.iter().map(|s| s.max_ns).fold(0.0, f64::max),
        mean_ns: weighted(|s| s.mean_ns),
        avg_response_size: weighted(|s| s.avg_response_size),
        status_counts,
        top_errors: top_n(&error_counts, 10),
        error_counts,
    }
}
