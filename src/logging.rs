//! Lifecycle event logging: test start/stop, phase transitions, worker
//! join/leave, assignment accept/reject. Not per-task logging — at load-test
//! volumes that would dwarf the work being measured; per-task outcomes go
//! through `MetricsCore` instead.
//!
//! Structurally this is the teacher's `log_collector.rs` `LogCollector`: a
//! dual-sink design with an always-on disk/log-crate sink and a best-effort
//! live consumer, fed by an unbounded `crossbeam_channel` so producers never
//! block. The teacher dispatches to a UI channel; this dispatches to
//! whatever snapshot/status consumer the embedding application wires up
//! (the browser/report layer is out of scope here, per spec §6).

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::thread;

/// One structured lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub timestamp: DateTime<Utc>,
    pub level: log::Level,
    pub test_id: Option<String>,
    pub message: String,
}

impl LifecycleEvent {
    pub fn new(level: log::Level, test_id: Option<String>, message: impl Into<String>) -> Self {
        LifecycleEvent {
            timestamp: Utc::now(),
            level,
            test_id,
            message: message.into(),
        }
    }
}

/// Collects lifecycle events onto an unbounded channel and fans them out to
/// the process `log` facade (always) and, best-effort, to a live consumer
/// (e.g. a status-polling endpoint or the bundled scenario binaries'
/// stdout printer).
///
/// Producers (`log_event`) never block: the channel is unbounded and the
/// live-consumer dispatch uses `try_send` semantics via a bounded
/// `tokio::sync::mpsc` the caller may attach with `attach_live_consumer`.
pub struct RunLogger {
    sender: Sender<LifecycleEvent>,
    _worker: thread::JoinHandle<()>,
}

impl RunLogger {
    /// Spawn the background persister thread and return a logger handle.
    /// `live_consumer`, if provided, receives a best-effort copy of every
    /// event (dropped, never blocking, if the consumer is slow or gone).
    pub fn new(live_consumer: Option<tokio::sync::mpsc::Sender<LifecycleEvent>>) -> Self {
        let (sender, receiver): (Sender<LifecycleEvent>, Receiver<LifecycleEvent>) = unbounded();

        let worker = thread::Builder::new()
            .name("loadforge-log-persist".into())
            .spawn(move || Self::persist_loop(receiver, live_consumer))
            .expect("failed to spawn log persister thread");

        RunLogger { sender, _worker: worker }
    }

    fn persist_loop(
        receiver: Receiver<LifecycleEvent>,
        live_consumer: Option<tokio::sync::mpsc::Sender<LifecycleEvent>>,
    ) {
        for event in receiver.iter() {
            match event.level {
                log::Level::Error => log::error!("[{:?}] {}", event.test_id, event.message),
                log::Level::Warn => log::warn!("[{:?}] {}", event.test_id, event.message),
                log::Level::Info => log::info!("[{:?}] {}", event.test_id, event.message),
                log::Level::Debug => log::debug!("[{:?}] {}", event.test_id, event.message),
                log::Level::Trace => log::trace!("[{:?}] {}", event.test_id, event.message),
            }

            if let Some(consumer) = &live_consumer {
                let _ = consumer.try_send(event.clone());
            }
        }
    }

    pub fn log(&self, level: log::Level, test_id: Option<&str>, message: impl Into<String>) {
        let event = LifecycleEvent::new(level, test_id.map(str::to_string), message);
        // An unbounded channel send only fails if every receiver has been
        // dropped, i.e. the persister thread panicked; dropping the event
        // in that case beats poisoning the caller's control loop.
        let _ = self.sender.send(event);
    }

    pub fn info(&self, test_id: &str, message: impl Into<String>) {
        self.log(log::Level::Info, Some(test_id), message);
    }

    pub fn warn(&self, test_id: &str, message: impl Into<String>) {
        self.log(log::Level::Warn, Some(test_id), message);
    }

    pub fn error(&self, test_id: &str, message: impl Into<String>) {
        self.log(log::Level::Error, Some(test_id), message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn events_reach_the_live_consumer() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let logger = RunLogger::new(Some(tx));

        logger.info("test-1", "phase transitioned to Ramping");

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("event should arrive")
            .expect("channel should remain open");

        assert_eq!(received.message, "phase transitioned to Ramping");
        assert_eq!(received.test_id.as_deref(), Some("test-1"));
    }

    #[test]
    fn logger_without_consumer_does_not_panic() {
        let logger = RunLogger::new(None);
        logger.warn("test-2", "worker disconnected");
        // Give the background thread a moment to drain; no assertion beyond
        // "this does not panic or hang".
        thread::sleep(Duration::from_millis(20));
    }
}
