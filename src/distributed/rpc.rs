//! `WorkerRpc`: the async trait standing in for the wire transport between
//! controller and worker, which spec §6 explicitly places out of scope.
//! Enrichment pulled from `guyernest-rust-mcp-sdk`'s transport-trait
//! pattern — the teacher has no RPC abstraction of its own, so this trait
//! and its in-process implementation are the pack's contribution, not the
//! teacher's.

use super::types::{Assignment, WorkerId, WorkerInfo};
use crate::error::WorkerUnreachable;
use async_trait::async_trait;

/// The four operations a coordinator needs to perform against a worker
/// (spec §4.5): assign a share of a test, stop it early, check liveness,
/// and (implicitly, via the worker's own push loop) receive metrics. A
/// production implementation transports these over gRPC or HTTP; this
/// crate ships only the trait and an in-process implementation for tests
/// and the bundled scenario binaries.
#[async_trait]
pub trait WorkerRpc: Send + Sync {
    async fn assign_task(&self, assignment: Assignment) -> Result<(), WorkerUnreachable>;

    async fn stop_test(&self, worker_id: WorkerId, test_id: &str) -> Result<(), WorkerUnreachable>;

    async fn heartbeat(&self, worker_id: WorkerId) -> Result<WorkerInfo, WorkerUnreachable>;
}
