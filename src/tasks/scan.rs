use super::TaskExecutor;
use crate::session::Command;
use crate::types::{Location, Vec3};
use anyhow::Result;
use tracing::info;

/// View distance requested when asking the server to resend chunks.
const SCAN_VIEW_DISTANCE: u8 = 16;

impl TaskExecutor {
    pub(super) async fn scan_inventory(&self, location: Location, open_from: Vec3) -> Result<()> {
        self.open_container(location, open_from).await?;
        self.upload_snapshot(location, open_from).await?;
        self.engine.close_window();
        info!(location = %location, "Inventory scanned");
        Ok(())
    }

    /// Stand at `location` (optionally through a portal) and let the server
    /// stream every chunk in view; the router records their signs.
    pub(super) async fn scan_signs(
        &self,
        location: Location,
        take_portal: Option<Vec3>,
    ) -> Result<()> {
        self.navigator.navigate_to(location).await?;
        if let Some(portal) = take_portal {
            self.navigator.take_portal(portal).await?;
        }

        self.sink.send(Command::ClientInformation {
            view_distance: SCAN_VIEW_DISTANCE,
        });
        self.signs.wait_until_quiet(&self.config.signs).await;
        self.sink.send(Command::ClientInformation {
            view_distance: SCAN_VIEW_DISTANCE,
        });

        info!(
            location = %location,
            pending_regions = self.signs.pending_count(),
            "Sign scan finished"
        );
        Ok(())
    }
}
