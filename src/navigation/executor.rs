use super::NavigationError;
use crate::config::NavigationConfig;
use crate::coordinator::{Coordinator, PathfindingResponse};
use crate::pose::PoseTracker;
use crate::types::{Location, PathNode, Vec3};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Drives the pose along a coordinator-computed path.
///
/// Movement is a sequence of absolute position assertions: the server is the
/// position authority and has its movement check disabled, so the agent
/// "flies" by repeating where it wants to be until the target chunk shows up.
pub struct PathExecutor {
    pose: Arc<PoseTracker>,
    coordinator: Arc<dyn Coordinator>,
    config: NavigationConfig,
}

impl PathExecutor {
    pub fn new(
        pose: Arc<PoseTracker>,
        coordinator: Arc<dyn Coordinator>,
        config: NavigationConfig,
    ) -> Self {
        Self {
            pose,
            coordinator,
            config,
        }
    }

    pub fn pose(&self) -> &Arc<PoseTracker> {
        &self.pose
    }

    /// Travel to `target`. A no-op when already standing on it.
    ///
    /// Pathfinder failures and hop failures abort the whole call; the
    /// remaining waypoints are not attempted.
    pub async fn navigate_to(&self, target: Location) -> Result<()> {
        let current = self.pose.current_location();
        if current == target {
            debug!(target = %target, "Already at destination");
            return Ok(());
        }

        info!(from = %current, to = %target, "Starting navigation");

        let response = self
            .coordinator
            .find_path(current, target)
            .await
            .context("Failed to request path")?;
        let path = match response {
            PathfindingResponse::PathFound { path } => path,
            PathfindingResponse::Error => {
                return Err(NavigationError::NoPath {
                    from: current,
                    to: target,
                }
                .into())
            }
        };

        for node in &path {
            match node {
                PathNode::Vec(vec) => self.fly_to(*vec).await?,
                PathNode::Portal {
                    vec,
                    destination_dim,
                } => {
                    debug!(portal = %vec, destination = %destination_dim, "Portal hop");
                    self.take_portal(*vec).await?
                }
            }
        }

        info!(target = %target, hops = path.len(), "Navigation complete");
        sleep(self.config.settle()).await;
        Ok(())
    }

    /// Vector hop: assert the block-centred position until its chunk is loaded.
    pub async fn fly_to(&self, target: Vec3) -> Result<(), NavigationError> {
        let (x, y, z) = block_centre(target);
        let interval = self.config.poll_interval();
        debug!(target = %target, "Flying");

        sleep(interval).await;
        self.pose.assert_position(x, y, z);
        sleep(interval).await;

        let mut polls = 0u32;
        while !self.pose.is_chunk_loaded_at(target.x, target.z) {
            if let Some(limit) = self.config.max_chunk_wait_polls {
                if polls >= limit {
                    return Err(NavigationError::ChunkWaitExhausted {
                        x: target.x,
                        z: target.z,
                        polls,
                    });
                }
            }
            polls += 1;
            self.pose.assert_position(x, y, z);
            sleep(interval).await;
        }

        debug!(target = %target, polls, "Chunk loaded");
        Ok(())
    }

    /// Portal hop: step into the portal and wait for the world to change.
    ///
    /// Each attempt steps back out to the starting position, waits an
    /// escalating backoff, steps in again and watches for the transfer.
    pub async fn take_portal(&self, portal: Vec3) -> Result<(), NavigationError> {
        let (x, y, z) = block_centre(portal);
        let start = self.pose.pose();
        let starting_world = self.pose.world_name();
        let interval = self.config.poll_interval();

        info!(portal = %portal, from = %start.world, "Taking portal");
        self.pose.assert_position(x, y, z);

        let mut attempt = 0u32;
        while attempt < self.config.portal_attempts && self.pose.world_name() == starting_world {
            info!(
                attempt = attempt + 1,
                of = self.config.portal_attempts,
                "Portal attempt"
            );

            self.pose.assert_position(start.x, start.y, start.z);
            sleep(self.config.portal_backoff(attempt)).await;
            self.pose.assert_position(x, y, z);

            let deadline = Instant::now() + self.config.portal_wait();
            while self.pose.world_name() == starting_world && Instant::now() < deadline {
                self.pose.assert_position(x, y, z);
                sleep(interval).await;
            }
            attempt += 1;
        }

        if self.pose.world_name() == starting_world {
            warn!(portal = %portal, attempts = attempt, "Portal transfer failed");
            return Err(NavigationError::PortalFailed { attempts: attempt });
        }

        let arrived = self.pose.pose();
        let (ax, az) = (arrived.x.floor() as i32, arrived.z.floor() as i32);
        if !self
            .pose
            .wait_for_chunk(ax, az, interval, self.config.max_chunk_wait_polls)
            .await
        {
            return Err(NavigationError::ChunkWaitExhausted {
                x: ax,
                z: az,
                polls: self.config.max_chunk_wait_polls.unwrap_or_default(),
            });
        }

        info!(world = %self.pose.world(), "Portal taken");
        Ok(())
    }
}

fn block_centre(block: Vec3) -> (f64, f64, f64) {
    (block.x as f64 + 0.5, block.y as f64, block.z as f64 + 0.5)
}
