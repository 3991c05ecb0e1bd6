//! `LocalWorkerRpc`: an in-process `WorkerRpc` implementation backed by a
//! `tokio::sync::mpsc` command channel to a `WorkerNode`, for single-process
//! tests and the bundled scenario binaries. A production deployment
//! supplies its own `WorkerRpc` over gRPC/HTTP instead.

use super::rpc::WorkerRpc;
use super::types::{Assignment, WorkerId, WorkerInfo};
use super::worker_node::WorkerNode;
use crate::error::WorkerUnreachable;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

enum Command {
    Assign(Assignment, oneshot::Sender<Result<(), WorkerUnreachable>>),
    Stop(String, oneshot::Sender<Result<(), WorkerUnreachable>>),
    Heartbeat(oneshot::Sender<WorkerInfo>),
}

/// Routes `WorkerRpc` calls to a `WorkerNode` over an `mpsc` command
/// channel, modeling the process boundary a real RPC transport would cross
/// even though everything runs in the same process here.
pub struct LocalWorkerRpc {
    tx: mpsc::Sender<Command>,
}

impl LocalWorkerRpc {
    pub fn spawn(node: Arc<WorkerNode>) -> Self {
        let (tx, mut rx) = mpsc::channel::<Command>(256);

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::Assign(assignment, reply) => {
                        let _ = reply.send(node.assign(assignment));
                    }
                    Command::Stop(test_id, reply) => {
                        let _ = reply.send(node.stop_test(&test_id));
                    }
                    Command::Heartbeat(reply) => {
                        let _ = reply.send(node.info());
                    }
                }
            }
        });

        LocalWorkerRpc { tx }
    }

    async fn send_command(&self, worker_id: WorkerId, operation: &'static str, cmd: Command) -> Result<(), WorkerUnreachable> {
        self.tx.send(cmd).await.map_err(|_| WorkerUnreachable::Rpc {
            worker_id: worker_id.to_string(),
            operation,
            reason: "worker command channel closed".into(),
        })
    }
}

#[async_trait]
impl WorkerRpc for LocalWorkerRpc {
    async fn assign_task(&self, assignment: Assignment) -> Result<(), WorkerUnreachable> {
        let worker_id = assignment.worker_id;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_command(worker_id, "AssignTask", Command::Assign(assignment, reply_tx))
            .await?;
        reply_rx.await.map_err(|_| WorkerUnreachable::Rpc {
            worker_id: worker_id.to_string(),
            operation: "AssignTask",
            reason: "worker dropped reply channel".into(),
        })?
    }

    async fn stop_test(&self, worker_id: WorkerId, test_id: &str) -> Result<(), WorkerUnreachable> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_command(worker_id, "StopTest", Command::Stop(test_id.to_string(), reply_tx))
            .await?;
        reply_rx.await.map_err(|_| WorkerUnreachable::Rpc {
            worker_id: worker_id.to_string(),
            operation: "StopTest",
            reason: "worker dropped reply channel".into(),
        })?
    }

    async fn heartbeat(&self, worker_id: WorkerId) -> Result<WorkerInfo, WorkerUnreachable> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_command(worker_id, "Heartbeat", Command::Heartbeat(reply_tx)).await?;
        reply_rx.await.map_err(|_| WorkerUnreachable::Rpc {
            worker_id: worker_id.to_string(),
            operation: "Heartbeat",
            reason: "worker dropped reply channel".into(),
        })
    }
}
