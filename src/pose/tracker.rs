use crate::session::{Command, CommandSink, DeathMarker, RelativeFlags};
use crate::types::{Dimension, Location, Vec3};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Chunk coordinates: block coordinates floor-divided by 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub cx: i32,
    pub cz: i32,
}

impl ChunkKey {
    pub const fn new(cx: i32, cz: i32) -> Self {
        Self { cx, cz }
    }

    /// Chunk containing the block at (x, z).
    pub fn containing(x: i32, z: i32) -> Self {
        Self::new(x.div_euclid(16), z.div_euclid(16))
    }
}

/// Continuous position paired with its world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub world: Dimension,
}

impl Pose {
    /// Block-granularity form, as sent to the coordinator.
    pub fn location(&self) -> Location {
        Location::new(
            Vec3::new(
                self.x.floor() as i32,
                self.y.floor() as i32,
                self.z.floor() as i32,
            ),
            self.world,
        )
    }
}

struct PoseState {
    world_name: String,
    world_ready: bool,
    x: f64,
    y: f64,
    z: f64,
    position_ready: bool,
    loaded_chunks: HashSet<ChunkKey>,
}

/// Reconciles world, position and chunk notifications into one pose.
///
/// Event handlers run on the session side and only take the state lock for
/// the duration of the update; commands are sent after the lock is released.
/// Readers always see world and position from the same event together.
pub struct PoseTracker {
    state: Mutex<PoseState>,
    sink: Arc<dyn CommandSink>,
}

impl PoseTracker {
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self {
            state: Mutex::new(PoseState {
                world_name: String::new(),
                world_ready: false,
                x: 0.0,
                y: 0.0,
                z: 0.0,
                position_ready: false,
                loaded_chunks: HashSet::new(),
            }),
            sink,
        }
    }

    fn state(&self) -> MutexGuard<'_, PoseState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Login or respawn into `world_name`.
    ///
    /// Position is unknown until the next position update. A death marker
    /// means the server is waiting on the respawn screen.
    pub fn on_world_change(&self, world_name: &str, death: Option<&DeathMarker>) {
        {
            let mut state = self.state();
            state.world_name = world_name.to_string();
            state.world_ready = true;
            state.position_ready = false;
            state.loaded_chunks.clear();
        }

        info!(world = %world_name, "World changed");

        if let Some(death) = death {
            info!(pos = %death.pos, world = %death.world, "Death marker present, respawning");
            self.sink.send(Command::Respawn);
        }
    }

    /// Killed; the world is not usable until the respawn completes.
    pub fn on_combat_death(&self) {
        {
            let mut state = self.state();
            state.world_ready = false;
            state.position_ready = false;
        }
        info!("Entered respawn screen");
        self.sink.send(Command::Respawn);
    }

    /// Server-side position correction.
    ///
    /// The teleport is always acknowledged. Each axis is applied on its own:
    /// relative axes add the delta, the others take the value.
    pub fn on_position_update(
        &self,
        x: f64,
        y: f64,
        z: f64,
        relative: RelativeFlags,
        teleport_id: i32,
    ) {
        self.sink.send(Command::AcceptTeleport { teleport_id });

        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            warn!(teleport_id, "Ignoring position update with non-finite coordinates");
            return;
        }

        let mut state = self.state();
        state.x = apply_axis(state.x, x, relative.contains(RelativeFlags::X));
        state.y = apply_axis(state.y, y, relative.contains(RelativeFlags::Y));
        state.z = apply_axis(state.z, z, relative.contains(RelativeFlags::Z));
        state.position_ready = true;

        debug!(
            x = state.x,
            y = state.y,
            z = state.z,
            teleport_id,
            "Position accepted"
        );
    }

    pub fn on_chunk_load(&self, cx: i32, cz: i32) {
        self.state().loaded_chunks.insert(ChunkKey::new(cx, cz));
    }

    /// A forgotten chunk is recorded as seen, the same as a load. Eviction
    /// only happens on world change.
    pub fn on_chunk_forget(&self, cx: i32, cz: i32) {
        self.state().loaded_chunks.insert(ChunkKey::new(cx, cz));
    }

    /// World and position are both known.
    pub fn is_ready(&self) -> bool {
        let state = self.state();
        state.world_ready && state.position_ready
    }

    pub fn pose(&self) -> Pose {
        let state = self.state();
        Pose {
            x: state.x,
            y: state.y,
            z: state.z,
            world: Dimension::from_world_name(&state.world_name),
        }
    }

    /// Floor of the current pose, paired with its world.
    pub fn current_location(&self) -> Location {
        self.pose().location()
    }

    pub fn world(&self) -> Dimension {
        Dimension::from_world_name(&self.state().world_name)
    }

    /// Raw server world name, used to detect dimension transfers.
    pub fn world_name(&self) -> String {
        self.state().world_name.clone()
    }

    /// Whether the chunk holding block (x, z) has been seen since the last
    /// world change.
    pub fn is_chunk_loaded_at(&self, x: i32, z: i32) -> bool {
        self.state()
            .loaded_chunks
            .contains(&ChunkKey::containing(x, z))
    }

    pub fn loaded_chunk_count(&self) -> usize {
        self.state().loaded_chunks.len()
    }

    /// Poll until the chunk holding (x, z) is loaded.
    ///
    /// Returns false if `max_polls` is set and exhausted.
    pub async fn wait_for_chunk(
        &self,
        x: i32,
        z: i32,
        interval: Duration,
        max_polls: Option<u32>,
    ) -> bool {
        let mut polls = 0u32;
        while !self.is_chunk_loaded_at(x, z) {
            if let Some(limit) = max_polls {
                if polls >= limit {
                    return false;
                }
            }
            polls += 1;
            tokio::time::sleep(interval).await;
        }
        true
    }

    /// Set the local position and assert it to the server.
    ///
    /// Relies on the server's movement check being disabled, so the assertion
    /// is accepted as-is.
    pub fn assert_position(&self, x: f64, y: f64, z: f64) {
        {
            let mut state = self.state();
            state.x = x;
            state.y = y;
            state.z = z;
        }
        self.sink.send(Command::MoveTo {
            x,
            y,
            z,
            on_ground: true,
        });
    }

    /// Face the centre of the given block.
    pub fn look_towards(&self, target: Vec3) {
        let pose = self.pose();
        let (yaw, pitch) = rotation_towards(&pose, target);
        self.sink.send(Command::SetRotation { yaw, pitch });
    }
}

fn apply_axis(current: f64, value: f64, relative: bool) -> f64 {
    if relative {
        current + value
    } else {
        value
    }
}

/// Yaw and pitch (degrees) for looking from `from` at the centre of `target`.
///
/// Yaw is normalised to [0, 360); pitch is positive when looking down.
pub fn rotation_towards(from: &Pose, target: Vec3) -> (f32, f32) {
    let dx = (target.x as f64 + 0.5) - from.x;
    let dy = target.y as f64 - from.y;
    let dz = (target.z as f64 + 0.5) - from.z;
    let r = (dx * dx + dy * dy + dz * dz).sqrt();

    let mut yaw = -dx.atan2(dz).to_degrees();
    if yaw < 0.0 {
        yaw += 360.0;
    }

    let pitch = if r == 0.0 { 0.0 } else { -(dy / r).asin().to_degrees() };

    (yaw as f32, pitch as f32)
}
