//! `ExecutionEngine`: bounded-concurrency task scheduler (spec §4.3). Spawns
//! one lightweight `tokio` task per unit of work, gated by a resizable
//! semaphore permit pool.

use crate::metrics::MetricsCore;
use crate::task::{now_ns, TaskFactory, TaskId, TaskIdAllocator, TaskResult};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use tokio::task::AbortHandle;
use tokio::time::Duration;

/// Tracking needed to force-cancel a still-running task at shutdown: the
/// handle to abort it, and the start time so a `Cancelled` result can still
/// carry an accurate duration.
struct ActiveTask {
    abort: AbortHandle,
    start_ns: u128,
}

/// Bounded-concurrency scheduler. Each `submit` acquires a permit, spawns a
/// `tokio` task that runs the unit of work to completion, records the
/// outcome into the attached `MetricsCore`, and releases the permit.
///
/// Concurrency may be resized at any time via `set_concurrency`; a shrink
/// takes effect as in-flight permits are released rather than revoking
/// permits already held, matching spec §4.3's "decreases take effect as
/// in-flight tasks drain."
pub struct ExecutionEngine {
    semaphore: Arc<Semaphore>,
    /// Target permit count; used to compute how many permits a resize
    /// should add or let drain away.
    target_concurrency: AtomicU64,
    metrics: Arc<MetricsCore>,
    ids: TaskIdAllocator,
    submitted: AtomicU64,
    completed: AtomicU64,
    active: AtomicU64,
    closed: AtomicBool,
    idle_notify: Arc<Notify>,
    /// Tasks currently in flight, keyed by id, so a stuck drain can abort
    /// them individually at the force-cancellation boundary (spec §4.3/§7).
    active_tasks: DashMap<TaskId, ActiveTask>,
}

impl ExecutionEngine {
    pub fn new(initial_concurrency: u32, metrics: Arc<MetricsCore>) -> Arc<Self> {
        Arc::new(ExecutionEngine {
            semaphore: Arc::new(Semaphore::new(initial_concurrency as usize)),
            target_concurrency: AtomicU64::new(initial_concurrency as u64),
            metrics,
            ids: TaskIdAllocator::new(),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            active: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            idle_notify: Arc::new(Notify::new()),
            active_tasks: DashMap::new(),
        })
    }

    /// Resize the permit pool. Growing adds permits immediately; shrinking
    /// releases fewer permits than held so the pool contracts naturally as
    /// in-flight tasks finish (never forcibly cancels a running task).
    pub fn set_concurrency(self: &Arc<Self>, new_target: u32) {
        let old_target = self.target_concurrency.swap(new_target as u64, Ordering::SeqCst);
        if new_target as u64 > old_target {
            self.semaphore.add_permits((new_target as u64 - old_target) as usize);
        }
        // Shrinking: permits acquired under the old target are simply not
        // replenished on release (see `release_permit_for_shrink`).
    }

    fn release_permit(self: &Arc<Self>) {
        let current_target = self.target_concurrency.load(Ordering::SeqCst);
        let available = self.semaphore.available_permits() as u64;
        // Only release a permit back to the pool if doing so would not push
        // available permits above the current target — this is how a
        // shrink "takes effect as in-flight tasks drain" without forcibly
        // revoking permits already held.
        if available < current_target {
            self.semaphore.add_permits(1);
        }
    }

    /// Submit one unit of work, waiting for a permit to become available.
    /// Returns the `TaskId` assigned to it; the caller does not await
    /// completion (fire-and-forget, matching spec §4.3's async submission
    /// model — completion is observed via `MetricsCore`).
    pub async fn submit(self: &Arc<Self>, factory: Arc<dyn TaskFactory>) -> Option<TaskId> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(p) => p,
            Err(_) => return None,
        };
        Some(self.spawn_task(factory, permit))
    }

    /// Non-blocking submission: returns `None` immediately if no permit is
    /// currently available, rather than waiting.
    pub fn try_submit(self: &Arc<Self>, factory: Arc<dyn TaskFactory>) -> Option<TaskId> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        Some(self.spawn_task(factory, permit))
    }

    fn spawn_task(
        self: &Arc<Self>,
        factory: Arc<dyn TaskFactory>,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) -> TaskId {
        let id = self.ids.next();
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
        let start_ns = now_ns();

        let engine = Arc::clone(self);
        let join_handle = tokio::spawn(async move {
            let task = factory.create(id);
            let outcome = task.execute().await;
            let end_ns = now_ns();

            // If this task was force-cancelled the entry is already gone and
            // the result has already been recorded as Cancelled; aborting
            // drops this future before it gets here, so this only runs for
            // tasks that finished on their own.
            if engine.active_tasks.remove(&id).is_none() {
                return;
            }

            let result = match outcome {
                Ok(o) => {
                    let mut r = TaskResult::success(id, start_ns, end_ns);
                    r.status_code = o.status_code;
                    r.response_size = o.response_size;
                    r.tags = o.tags;
                    r
                }
                Err(e) => TaskResult::failure(id, start_ns, end_ns, e),
            };

            engine.metrics.record(&result);
            engine.completed.fetch_add(1, Ordering::Relaxed);
            let still_active = engine.active.fetch_sub(1, Ordering::Relaxed) - 1;
            drop(permit);
            engine.release_permit();
            if still_active == 0 {
                engine.idle_notify.notify_waiters();
            }
        });

        self.active_tasks.insert(id, ActiveTask { abort: join_handle.abort_handle(), start_ns });
        id
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Stop accepting new submissions. In-flight tasks continue to
    /// completion.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait for all in-flight tasks to finish, up to `graceful_timeout`; if
    /// tasks remain active past that, wait up to `force_timeout` more, then
    /// forcibly cancel whatever is still outstanding (spec §4.3's two-phase
    /// drain; spec §7 "uncompleted tasks ... recorded as Cancelled
    /// failures"). Returns `true` if the engine reached zero active tasks,
    /// whether by graceful completion, timed-out completion, or force-cancel.
    pub async fn await_drain(&self, graceful_timeout: Duration, force_timeout: Duration) -> bool {
        if self.wait_idle(graceful_timeout).await {
            return true;
        }
        if self.wait_idle(force_timeout).await {
            return true;
        }
        self.force_cancel_outstanding();
        self.active() == 0
    }

    /// Abort every task still tracked in `active_tasks` and record each as a
    /// `Cancelled` failure. Called once the force timeout has elapsed and a
    /// task is still refusing to finish on its own.
    fn force_cancel_outstanding(&self) {
        let outstanding: Vec<TaskId> = self.active_tasks.iter().map(|entry| *entry.key()).collect();
        for id in outstanding {
            let Some((_, task)) = self.active_tasks.remove(&id) else {
                continue;
            };
            task.abort.abort();
            let end_ns = now_ns();
            let result = TaskResult::cancelled(id, task.start_ns, end_ns);
            self.metrics.record(&result);
            self.completed.fetch_add(1, Ordering::Relaxed);
            self.active.fetch_sub(1, Ordering::Relaxed);
        }
        self.idle_notify.notify_waiters();
    }

    async fn wait_idle(&self, timeout: Duration) -> bool {
        if self.active() == 0 {
            return true;
        }
        let notified = self.idle_notify.notified();
        tokio::select! {
            _ = notified => self.active() == 0,
            _ = tokio::time::sleep(timeout) => self.active() == 0,
        }
    }
}
