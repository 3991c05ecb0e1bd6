//! The unit-of-work abstraction (spec §3, §9 "runtime reflection / dynamic
//! dispatch over tasks"). A `Task` is a small polymorphic capability with a
//! single `execute` method, not a reflective plugin system — plugin discovery
//! by classpath scanning is an external concern (spec §6); the core only ever
//! sees a `TaskFactory`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonically increasing task identity, assigned by the execution engine.
/// A newtype rather than a bare `u64` so "assigned by the engine, never by
/// the caller" is enforced at the type level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues monotonically increasing `TaskId`s for one test run.
#[derive(Debug, Default)]
pub struct TaskIdAllocator(AtomicU64);

impl TaskIdAllocator {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn next(&self) -> TaskId {
        TaskId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

const ERROR_CLASS_MAX_LEN: usize = 100;

/// Truncate a string to at most `max_len` bytes without splitting a UTF-8
/// char boundary (spec §3's "truncated to 100 characters" must not panic on
/// multi-byte boundaries).
pub(crate) fn truncate_utf8(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Immutable outcome of a single task invocation. Constructed only at task
/// completion; never mutated afterward (spec §3 invariant).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub start_ns: u128,
    pub end_ns: u128,
    pub success: bool,
    pub error_class: Option<String>,
    pub status_code: Option<i32>,
    pub response_size: Option<u64>,
    pub tags: Option<HashMap<String, String>>,
}

impl TaskResult {
    /// Latency of this result, as end minus start.
    pub fn latency(&self) -> std::time::Duration {
        std::time::Duration::from_nanos(self.end_ns.saturating_sub(self.start_ns) as u64)
    }

    pub fn success(task_id: TaskId, start_ns: u128, end_ns: u128) -> Self {
        TaskResult {
            task_id,
            start_ns,
            end_ns,
            success: true,
            error_class: None,
            status_code: None,
            response_size: None,
            tags: None,
        }
    }

    pub fn failure(task_id: TaskId, start_ns: u128, end_ns: u128, error_class: impl Into<String>) -> Self {
        TaskResult {
            task_id,
            start_ns,
            end_ns,
            success: false,
            error_class: Some(truncate_utf8(&error_class.into(), ERROR_CLASS_MAX_LEN)),
            status_code: None,
            response_size: None,
            tags: None,
        }
    }

    pub fn cancelled(task_id: TaskId, start_ns: u128, end_ns: u128) -> Self {
        Self::failure(task_id, start_ns, end_ns, "Cancelled")
    }

    pub fn with_status_code(mut self, code: i32) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn with_response_size(mut self, size: u64) -> Self {
        self.response_size = Some(size);
        self
    }

    pub fn with_tags(mut self, tags: HashMap<String, String>) -> Self {
        self.tags = Some(tags);
        self
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch. The execution
/// engine stamps `start_ns`/`end_ns` with this, not `Instant`, so that
/// `Result`s remain meaningful once serialized across the distributed
/// boundary (spec §6: "timestamps are epoch milliseconds").
pub fn now_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

/// A callable unit of work. Stateless across invocations; any per-call state
/// comes from the `TaskFactory` that built it (spec §3). `execute` must be
/// safe to invoke concurrently with other tasks (never with itself — each
/// task runs exactly once).
#[async_trait]
pub trait Task: Send + Sync {
    /// Errors are reified into a failure `TaskResult` by the engine; a task
    /// never needs to construct timing fields itself.
    async fn execute(&self) -> std::result::Result<TaskOutcome, String>;
}

/// What a task reports about its own completion, before the engine stamps
/// timing and identity onto it.
#[derive(Debug, Clone, Default)]
pub struct TaskOutcome {
    pub status_code: Option<i32>,
    pub response_size: Option<u64>,
    pub tags: Option<HashMap<String, String>>,
}

impl TaskOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status_code(mut self, code: i32) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn with_response_size(mut self, size: u64) -> Self {
        self.response_size = Some(size);
        self
    }
}

/// Builds one `Task` per invocation, given the id the engine assigned it.
/// Must be safe for concurrent invocation (spec §6).
pub trait TaskFactory: Send + Sync {
    fn create(&self, id: TaskId) -> Box<dyn Task>;
}

/// Adapts a plain closure into a `TaskFactory`, for tests and small scenario
/// binaries that don't need a dedicated struct per task kind.
pub struct FnTaskFactory<F>(pub F)
where
    F: Fn(TaskId) -> Box<dyn Task> + Send + Sync;

impl<F> TaskFactory for FnTaskFactory<F>
where
    F: Fn(TaskId) -> Box<dyn Task> + Send + Sync,
{
    fn create(&self, id: TaskId) -> Box<dyn Task> {
        (self.0)(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopTask;

    #[async_trait]
    impl Task for NoopTask {
        async fn execute(&self) -> std::result::Result<TaskOutcome, String> {
            Ok(TaskOutcome::new())
        }
    }

    #[test]
    fn task_id_allocator_is_monotonic() {
        let alloc = TaskIdAllocator::new();
        let ids: Vec<TaskId> = (0..5).map(|_| alloc.next()).collect();
        for w in ids.windows(2) {
            assert!(w[1].0 > w[0].0);
        }
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "a".repeat(99) + "€€€"; // multi-byte chars straddling the 100-byte cut
        let truncated = truncate_utf8(&s, 100);
        assert!(truncated.len() <= 100);
        assert!(std::str::from_utf8(truncated.as_bytes()).is_ok());
    }

    #[test]
    fn truncate_is_noop_under_limit() {
        assert_eq!(truncate_utf8("short", 100), "short");
    }

    #[tokio::test]
    async fn task_factory_produces_independent_tasks() {
        let factory = FnTaskFactory(|_id| Box::new(NoopTask) as Box<dyn Task>);
        let t1 = factory.create(TaskId(0));
        let outcome = t1.execute().await.unwrap();
        assert!(outcome.status_code.is_none());
    }

    #[test]
    fn failure_result_truncates_error_class() {
        let long_error = "x".repeat(500);
        let result = TaskResult::failure(TaskId(1), 0, 100, long_error);
        assert_eq!(result.error_class.unwrap().len(), 100);
        assert!(!result.success);
    }
}
