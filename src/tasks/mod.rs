// Task handlers, one per operation kind.
//
// Every handler composes the path executor, the container engine and the
// coordinator. Failures propagate to the agent loop, which reports the
// operation as aborted; holds already resolved are not released here.

mod clear;
mod scan;
mod shulker;
mod transfer;

use crate::config::AgentConfig;
use crate::coordinator::Coordinator;
use crate::inventory::{ContainerEngine, InventoryError};
use crate::navigation::PathExecutor;
use crate::session::{BlockFace, Command, CommandSink};
use crate::signs::SignCollector;
use crate::types::{Hold, Location, OperationKind, Vec3};
use anyhow::{Context, Result};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("shulker did not return to carry slot {slot} after {attempts} polls")]
    ShulkerNotReturned { slot: usize, attempts: u32 },

    #[error("{holds} source holds, {destinations} destination holds and {counts} counts do not line up")]
    MismatchedHolds {
        holds: usize,
        destinations: usize,
        counts: usize,
    },
}

/// Runs one operation at a time on behalf of the agent loop.
pub struct TaskExecutor {
    navigator: Arc<PathExecutor>,
    engine: Arc<ContainerEngine>,
    signs: Arc<SignCollector>,
    coordinator: Arc<dyn Coordinator>,
    sink: Arc<dyn CommandSink>,
    config: AgentConfig,
}

impl TaskExecutor {
    pub fn new(
        navigator: Arc<PathExecutor>,
        engine: Arc<ContainerEngine>,
        signs: Arc<SignCollector>,
        coordinator: Arc<dyn Coordinator>,
        sink: Arc<dyn CommandSink>,
        config: AgentConfig,
    ) -> Self {
        Self {
            navigator,
            engine,
            signs,
            coordinator,
            sink,
            config,
        }
    }

    pub fn navigator(&self) -> &Arc<PathExecutor> {
        &self.navigator
    }

    /// Execute `kind` to completion.
    pub async fn execute(&self, kind: &OperationKind) -> Result<()> {
        info!(kind = kind.name(), "Executing operation");
        match kind {
            OperationKind::ScanInventory {
                location,
                open_from,
            } => self.scan_inventory(*location, *open_from).await,
            OperationKind::ScanSigns {
                location,
                take_portal,
            } => self.scan_signs(*location, *take_portal).await,
            OperationKind::MoveItems {
                source_holds,
                destination_holds,
                counts,
            } => {
                self.move_items(source_holds, destination_holds, counts)
                    .await
            }
            OperationKind::DropItems {
                drop_from,
                aim_towards,
                source_holds,
            } => {
                self.drop_items(*drop_from, *aim_towards, source_holds)
                    .await
            }
            OperationKind::ImportInventory {
                chest_location,
                node_location,
                destination_holds,
            } => {
                self.import_inventory(*chest_location, *node_location, destination_holds)
                    .await
            }
            OperationKind::LoadShulker {
                shulker_station_location,
                shulker_hold,
                source_holds,
            } => {
                self.load_shulker(*shulker_station_location, shulker_hold, source_holds)
                    .await
            }
            OperationKind::UnloadShulker {
                shulker_station_location,
                shulker_hold,
                destination_holds,
            } => {
                self.unload_shulker(*shulker_station_location, shulker_hold, destination_holds)
                    .await
            }
        }
    }

    async fn resolve_hold(&self, hold_id: &str) -> Result<Hold> {
        self.coordinator
            .get_hold(hold_id)
            .await
            .with_context(|| format!("Failed to resolve hold {}", hold_id))
    }

    async fn resolve_holds(&self, hold_ids: &[String]) -> Result<Vec<Hold>> {
        let mut holds = Vec::with_capacity(hold_ids.len());
        for id in hold_ids {
            holds.push(self.resolve_hold(id).await?);
        }
        Ok(holds)
    }

    /// Walk to where `container` can be reached from and open it.
    async fn open_container(&self, container: Location, open_from: Vec3) -> Result<()> {
        self.navigator
            .navigate_to(Location::new(open_from, container.dim))
            .await?;
        self.engine
            .open_at(container.vec3, self.navigator.pose())
            .await?;
        Ok(())
    }

    /// Report the open container's contents to the coordinator.
    async fn upload_snapshot(&self, location: Location, open_from: Vec3) -> Result<()> {
        let slots = self
            .engine
            .container_slots()
            .ok_or(InventoryError::ContainerNotOpen)?;
        self.coordinator
            .inventory_scanned(location, &slots, open_from)
            .await
            .with_context(|| format!("Failed to upload inventory of {}", location))
    }

    /// Press the button (or any block) at `pos`.
    pub fn push_button_at(&self, pos: Vec3) {
        debug!(pos = %pos, "Pushing button");
        self.sink.send(Command::InteractBlock {
            pos,
            face: BlockFace::Down,
            sequence: 1,
        });
    }
}

/// Tracks which hold container is open while a handler walks its holds.
///
/// Consecutive holds in the same container share one open; moving on to a
/// different container closes the current one first.
struct HoldCursor {
    current: Option<(Location, Vec3)>,
    upload_on_close: bool,
}

impl HoldCursor {
    fn new(upload_on_close: bool) -> Self {
        Self {
            current: None,
            upload_on_close,
        }
    }

    /// Make sure the container of `hold` is the open one.
    async fn visit(&mut self, executor: &TaskExecutor, hold: &Hold) -> Result<()> {
        if matches!(self.current, Some((location, _)) if location == hold.location) {
            return Ok(());
        }
        self.finish(executor).await?;
        executor
            .open_container(hold.location, hold.open_from)
            .await?;
        self.current = Some((hold.location, hold.open_from));
        Ok(())
    }

    /// Close the open container, if any.
    async fn finish(&mut self, executor: &TaskExecutor) -> Result<()> {
        if let Some((location, open_from)) = self.current.take() {
            if self.upload_on_close {
                executor.upload_snapshot(location, open_from).await?;
            }
            executor.engine.close_window();
        }
        Ok(())
    }
}
