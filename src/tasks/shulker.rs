//! Shulker station handlers.
//!
//! A station is a block the agent stands on; the shulker is placed two blocks
//! above it and a button four blocks above it drives a piston that breaks the
//! placed box, after which the item drops back into the first hotbar slot.

use super::{HoldCursor, TaskError, TaskExecutor};
use crate::inventory::{Count, Direction, CONTAINER_SLOTS, HOTBAR_START};
use crate::types::{Hold, Location, Vec3};
use anyhow::Result;
use tokio::time::sleep;
use tracing::{debug, info};

/// Carry slot the shulker travels in; quick-access slot 0.
const SHULKER_CARRY_SLOT: usize = HOTBAR_START;

fn placement(station: Vec3) -> Vec3 {
    station.offset(0, 2, 0)
}

fn button(station: Vec3) -> Vec3 {
    station.offset(0, 4, 0)
}

impl TaskExecutor {
    pub(super) async fn load_shulker(
        &self,
        station: Location,
        shulker_hold: &str,
        source_holds: &[Option<String>],
    ) -> Result<()> {
        let shulker = self.resolve_hold(shulker_hold).await?;
        self.take_shulker(&shulker).await?;

        let mut cursor = HoldCursor::new(true);
        for (slot, hold_id) in source_holds.iter().enumerate() {
            let Some(hold_id) = hold_id else { continue };
            let hold = self.resolve_hold(hold_id).await?;
            cursor.visit(self, &hold).await?;
            self.engine
                .transfer(slot, hold.slot as usize, Count::All, Direction::ToCarry)?;
        }
        cursor.finish(self).await?;

        self.place_shulker(station).await?;
        for slot in 0..CONTAINER_SLOTS {
            if self.engine.carry_slot(slot).is_some() {
                self.engine
                    .transfer(slot, slot, Count::All, Direction::ToContainer)?;
            }
        }
        self.engine.close_window();

        self.break_shulker(station.vec3).await?;
        self.return_shulker(&shulker).await?;

        info!(hold = %shulker.id, "Shulker loaded");
        Ok(())
    }

    pub(super) async fn unload_shulker(
        &self,
        station: Location,
        shulker_hold: &str,
        destination_holds: &[Option<String>],
    ) -> Result<()> {
        let shulker = self.resolve_hold(shulker_hold).await?;
        self.take_shulker(&shulker).await?;

        let unloaded = destination_holds.len().min(CONTAINER_SLOTS);

        self.place_shulker(station).await?;
        for slot in 0..unloaded {
            if self.engine.container_slot(slot).is_some() {
                self.engine
                    .transfer(slot, slot, Count::All, Direction::ToCarry)?;
            }
        }
        self.engine.close_window();

        self.break_shulker(station.vec3).await?;
        self.return_shulker(&shulker).await?;

        let mut cursor = HoldCursor::new(true);
        for (slot, hold_id) in destination_holds.iter().take(unloaded).enumerate() {
            let Some(hold_id) = hold_id else { continue };
            if self.engine.carry_slot(slot).is_none() {
                continue;
            }
            let hold = self.resolve_hold(hold_id).await?;
            cursor.visit(self, &hold).await?;
            self.engine
                .transfer(slot, hold.slot as usize, Count::All, Direction::ToContainer)?;
        }
        cursor.finish(self).await?;

        info!(hold = %shulker.id, "Shulker unloaded");
        Ok(())
    }

    /// Fetch the shulker from its hold into the first hotbar slot.
    async fn take_shulker(&self, shulker: &Hold) -> Result<()> {
        self.open_container(shulker.location, shulker.open_from)
            .await?;
        self.engine.transfer(
            SHULKER_CARRY_SLOT,
            shulker.slot as usize,
            Count::Exactly(1),
            Direction::ToCarry,
        )?;
        self.upload_snapshot(shulker.location, shulker.open_from)
            .await?;
        self.engine.close_window();
        Ok(())
    }

    async fn return_shulker(&self, shulker: &Hold) -> Result<()> {
        self.open_container(shulker.location, shulker.open_from)
            .await?;
        self.engine.transfer(
            SHULKER_CARRY_SLOT,
            shulker.slot as usize,
            Count::Exactly(1),
            Direction::ToContainer,
        )?;
        self.upload_snapshot(shulker.location, shulker.open_from)
            .await?;
        self.engine.close_window();
        Ok(())
    }

    /// Walk to the station, put the shulker down and open it.
    async fn place_shulker(&self, station: Location) -> Result<()> {
        self.navigator.navigate_to(station).await?;

        let target = placement(station.vec3);
        self.engine
            .place_from_hotbar(SHULKER_CARRY_SLOT - HOTBAR_START, target)?;
        sleep(self.config.shulker.settle()).await;

        self.engine.open_at(target, self.navigator.pose()).await?;
        Ok(())
    }

    /// Trigger the piston and wait for the shulker to land back in the
    /// hotbar.
    async fn break_shulker(&self, station: Vec3) -> Result<()> {
        self.push_button_at(button(station));
        sleep(self.config.shulker.settle()).await;

        let attempts = self.config.shulker.return_poll_attempts;
        for attempt in 1..=attempts {
            sleep(self.config.shulker.return_poll_interval()).await;
            if self.engine.carry_slot(SHULKER_CARRY_SLOT).is_some() {
                debug!(attempt, "Shulker returned");
                return Ok(());
            }
        }

        Err(TaskError::ShulkerNotReturned {
            slot: SHULKER_CARRY_SLOT,
            attempts,
        }
        .into())
    }
}
