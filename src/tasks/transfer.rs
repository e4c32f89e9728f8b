use super::{HoldCursor, TaskError, TaskExecutor};
use crate::inventory::{Count, Direction, CONTAINER_SLOTS};
use crate::types::{Location, Vec3};
use anyhow::Result;
use tracing::{debug, info};

impl TaskExecutor {
    /// Move `counts[i]` items from source hold `i` to destination hold `i`,
    /// carrying them in carry slot `i`.
    pub(super) async fn move_items(
        &self,
        source_holds: &[String],
        destination_holds: &[String],
        counts: &[u32],
    ) -> Result<()> {
        if source_holds.len() != counts.len() || destination_holds.len() != counts.len() {
            return Err(TaskError::MismatchedHolds {
                holds: source_holds.len(),
                destinations: destination_holds.len(),
                counts: counts.len(),
            }
            .into());
        }

        let sources = self.resolve_holds(source_holds).await?;
        let destinations = self.resolve_holds(destination_holds).await?;

        let mut cursor = HoldCursor::new(false);
        for (slot, (hold, &count)) in sources.iter().zip(counts).enumerate() {
            cursor.visit(self, hold).await?;
            self.engine.transfer(
                slot,
                hold.slot as usize,
                Count::Exactly(count),
                Direction::ToCarry,
            )?;
        }
        for (slot, (hold, &count)) in destinations.iter().zip(counts).enumerate() {
            cursor.visit(self, hold).await?;
            self.engine.transfer(
                slot,
                hold.slot as usize,
                Count::Exactly(count),
                Direction::ToContainer,
            )?;
        }
        cursor.finish(self).await?;

        info!(pairs = counts.len(), "Items moved");
        Ok(())
    }

    /// Empty the source holds into the carry inventory and throw everything
    /// out at `drop_from`, facing `aim_towards`.
    pub(super) async fn drop_items(
        &self,
        drop_from: Location,
        aim_towards: Vec3,
        source_holds: &[String],
    ) -> Result<()> {
        let sources = self.resolve_holds(source_holds).await?;

        let mut cursor = HoldCursor::new(false);
        for (slot, hold) in sources.iter().enumerate() {
            cursor.visit(self, hold).await?;
            self.engine
                .transfer(slot, hold.slot as usize, Count::All, Direction::ToCarry)?;
        }
        cursor.finish(self).await?;

        self.navigator.navigate_to(drop_from).await?;
        self.navigator.pose().look_towards(aim_towards);
        for slot in 0..sources.len() {
            self.engine.drop_items(slot)?;
        }

        info!(stacks = sources.len(), at = %drop_from, "Items dropped");
        Ok(())
    }

    /// Pull stacks out of an unmanaged chest and file them into the
    /// destination holds, one stack per hold.
    pub(super) async fn import_inventory(
        &self,
        chest_location: Vec3,
        node_location: Location,
        destination_holds: &[String],
    ) -> Result<()> {
        self.navigator.navigate_to(node_location).await?;
        self.engine
            .open_at(chest_location, self.navigator.pose())
            .await?;

        let occupied: Vec<usize> = self
            .engine
            .container_slots()
            .unwrap_or_default()
            .iter()
            .take(CONTAINER_SLOTS)
            .enumerate()
            .filter_map(|(slot, item)| item.as_ref().map(|_| slot))
            .collect();

        let mut taken = 0;
        for chest_slot in occupied.into_iter().take(destination_holds.len()) {
            self.engine
                .transfer(taken, chest_slot, Count::All, Direction::ToCarry)?;
            taken += 1;
        }
        self.engine.close_window();
        debug!(taken, chest = %chest_location, "Stacks taken from import chest");

        // Only the holds that will actually receive a stack are resolved
        let destinations = self.resolve_holds(&destination_holds[..taken]).await?;

        let mut cursor = HoldCursor::new(false);
        for (slot, hold) in destinations.iter().enumerate() {
            cursor.visit(self, hold).await?;
            self.engine
                .transfer(slot, hold.slot as usize, Count::All, Direction::ToContainer)?;
        }
        cursor.finish(self).await?;

        info!(stacks = taken, "Inventory imported");
        Ok(())
    }
}
