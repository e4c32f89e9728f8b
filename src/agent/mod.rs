// Top-level scheduling: event routing, the worker loop, the heartbeat timer
// and the runtime that owns them

mod router;
mod runtime;
mod worker;

pub use router::{run_event_pump, EventRouter};
pub use runtime::AgentRuntime;
pub use worker::{AgentLoop, LoopPhase};

use crate::config::MIN_TIMER_PERIOD;
use crate::coordinator::Coordinator;
use crate::types::{Dimension, Location, Vec2, Vec3};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// Idle position taken from the coordinator's sign configuration.
///
/// The first complex wins. A `Tower` is entered at its origin; a `FlatFloor`
/// at its first bound, one block above the floor level.
pub fn home_location(sign_config: &Value) -> Option<Location> {
    let complex = sign_config
        .get("complexes")?
        .as_object()?
        .values()
        .next()?;

    if let Some(tower) = complex.get("Tower") {
        let dim: Dimension = serde_json::from_value(tower.get("dimension")?.clone()).ok()?;
        let origin: Vec3 = serde_json::from_value(tower.get("origin")?.clone()).ok()?;
        return Some(Location::new(origin, dim));
    }

    if let Some(floor) = complex.get("FlatFloor") {
        let dim: Dimension = serde_json::from_value(floor.get("dimension")?.clone()).ok()?;
        let corner: Vec2 =
            serde_json::from_value(floor.get("bounds")?.as_array()?.first()?.clone()).ok()?;
        let y_level = i32::try_from(floor.get("y_level")?.as_i64()?).ok()?;
        return Some(Location::new(
            Vec3::new(corner.x, y_level + 1, corner.z),
            dim,
        ));
    }

    None
}

/// Background timer: keep the agent registration alive.
///
/// The first ping goes out one period after start. Failures are logged and
/// the schedule continues. A zero period is raised to [`MIN_TIMER_PERIOD`].
pub async fn run_heartbeat_loop(coordinator: Arc<dyn Coordinator>, period: Duration) {
    let period = period.max(MIN_TIMER_PERIOD);
    let mut interval = time::interval_at(Instant::now() + period, period);
    info!(period_secs = period.as_secs(), "Heartbeat loop started");

    loop {
        interval.tick().await;
        match coordinator.heartbeat().await {
            Ok(()) => debug!("Heartbeat sent"),
            Err(e) => warn!(error = %e, "Heartbeat failed"),
        }
    }
}

#[cfg(test)]
mod tests;
