use super::TaskExecutor;
use crate::inventory::{Count, Direction};
use crate::types::Hold;
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

impl TaskExecutor {
    /// Deposit every occupied carry slot into a freshly leased hold.
    ///
    /// Returns `false` as soon as the coordinator has no free hold left;
    /// slots already deposited stay deposited. An unknown carry inventory
    /// counts as clear.
    pub async fn clear_inventory(&self) -> Result<bool> {
        let Some(carry) = self.engine.carry_slots() else {
            return Ok(true);
        };

        for (slot, item) in carry.iter().enumerate() {
            if item.is_none() {
                continue;
            }

            let Some(hold) = self
                .coordinator
                .acquire_free_hold()
                .await
                .context("Failed to lease a free hold")?
            else {
                info!(slot, "No free hold available, carry inventory not cleared");
                return Ok(false);
            };

            if let Err(e) = self.deposit(&hold, slot).await {
                if let Err(release_err) = self.coordinator.release_hold(&hold.id).await {
                    warn!(hold = %hold.id, error = %release_err, "Failed to release hold");
                }
                return Err(e);
            }

            self.coordinator
                .release_hold(&hold.id)
                .await
                .with_context(|| format!("Failed to release hold {}", hold.id))?;
            debug!(slot, hold = %hold.id, "Carry slot deposited");
        }

        Ok(true)
    }

    async fn deposit(&self, hold: &Hold, carry_slot: usize) -> Result<()> {
        self.open_container(hold.location, hold.open_from).await?;
        self.engine.transfer(
            carry_slot,
            hold.slot as usize,
            Count::All,
            Direction::ToContainer,
        )?;
        self.upload_snapshot(hold.location, hold.open_from).await?;
        self.engine.close_window();
        Ok(())
    }
}
