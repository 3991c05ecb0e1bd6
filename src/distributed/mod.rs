//! Distributed coordination (spec §4.5): splitting a test across worker
//! nodes and aggregating the metrics they report back.

pub mod coordinator;
pub mod local;
pub mod rpc;
pub mod types;
pub mod worker_node;

pub use coordinator::DistributedCoordinator;
pub use rpc::WorkerRpc;
pub use types::{Assignment, Worker, WorkerHealth, WorkerId, WorkerInfo, WorkerMetrics};
pub use worker_node::{TaskKindRegistry, WorkerNode};
