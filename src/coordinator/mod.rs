// Coordinator interface: task queue, holds, pathfinding and sign registry.
//
// The agent only ever talks to the coordinator through the `Coordinator`
// trait, so components receive it by injection and tests substitute an
// in-memory double. `HttpCoordinator` is the production implementation.

mod client;

pub use client::HttpCoordinator;

use crate::types::{Hold, Location, Operation, OperationStatus, PathNode, ScanRegion, Slot, Vec3};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Answer of a path request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PathfindingResponse {
    PathFound { path: Vec<PathNode> },
    Error,
}

/// Failure reported by the coordinator itself (as opposed to transport errors).
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("coordinator returned {status} for {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
}

/// Remote coordinator calls used by the agent.
///
/// Every call is bound to the registered agent identity. Errors are surfaced
/// to the caller; only the callers decide whether to log and continue.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Keep-alive ping.
    async fn heartbeat(&self) -> Result<()>;

    /// Raise an operator-visible alert.
    async fn alert(&self, description: &str) -> Result<()>;

    /// Ask for the next operation. `None` when the queue has nothing for us.
    async fn poll_operation(
        &self,
        location: Location,
        has_clear_inventory: bool,
    ) -> Result<Option<Operation>>;

    async fn operation_complete(&self, operation_id: &str, status: OperationStatus) -> Result<()>;

    /// Upload the full content of the container at `location`.
    async fn inventory_scanned(&self, location: Location, slots: &[Slot], open_from: Vec3)
        -> Result<()>;

    async fn get_hold(&self, hold_id: &str) -> Result<Hold>;

    /// Lease any free slot. `None` when no slot is available.
    async fn acquire_free_hold(&self) -> Result<Option<Hold>>;

    async fn release_hold(&self, hold_id: &str) -> Result<()>;

    async fn find_path(&self, start: Location, end: Location) -> Result<PathfindingResponse>;

    async fn send_sign_scan_data(&self, regions: &[ScanRegion]) -> Result<()>;

    /// Compiled sign configuration (storage complexes and their layout).
    async fn sign_config(&self) -> Result<Value>;
}
