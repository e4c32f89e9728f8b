// Game session seam: typed inbound events and outbound commands.
//
// Wire encoding lives outside this crate. Events arrive already decoded and
// commands leave through a `CommandSink`; `bridge` provides the JSON-lines
// transport used by the binary.

pub mod bridge;

use crate::types::{ItemStack, Slot, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use bridge::BridgeSession;

/// Per-axis relative flags of a position update.
///
/// A set bit means the value on that axis is a delta, not an absolute value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelativeFlags(pub u8);

impl RelativeFlags {
    pub const X: RelativeFlags = RelativeFlags(0b001);
    pub const Y: RelativeFlags = RelativeFlags(0b010);
    pub const Z: RelativeFlags = RelativeFlags(0b100);
    pub const NONE: RelativeFlags = RelativeFlags(0);

    pub fn contains(self, other: RelativeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for RelativeFlags {
    type Output = RelativeFlags;

    fn bitor(self, rhs: RelativeFlags) -> RelativeFlags {
        RelativeFlags(self.0 | rhs.0)
    }
}

/// Last death marker sent with a world change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeathMarker {
    pub world: String,
    pub pos: Vec3,
}

/// Sign block entity carried by a chunk load. Coordinates are chunk-local on
/// x/z and absolute on y.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignEntity {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub front: Vec<String>,
    pub back: Vec<String>,
}

/// Window shape announced when a container opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerKind {
    Generic9x3,
    ShulkerBox,
    Other,
}

impl ContainerKind {
    /// Only single-row-of-27 layouts are tracked.
    pub fn is_supported(self) -> bool {
        matches!(self, ContainerKind::Generic9x3 | ContainerKind::ShulkerBox)
    }
}

/// Events delivered by the network session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// Login or respawn into a world.
    WorldChange {
        world: String,
        #[serde(default)]
        death: Option<DeathMarker>,
    },
    PositionUpdate {
        x: f64,
        y: f64,
        z: f64,
        #[serde(default)]
        relative: RelativeFlags,
        teleport_id: i32,
    },
    ChunkLoad {
        cx: i32,
        cz: i32,
        #[serde(default)]
        signs: Vec<SignEntity>,
    },
    ChunkForget {
        cx: i32,
        cz: i32,
    },
    ChunkBatchFinished,
    ContainerOpen {
        container_id: i32,
        kind: ContainerKind,
    },
    ContainerContent {
        container_id: i32,
        state_seq: i32,
        slots: Vec<Slot>,
    },
    ContainerSlot {
        container_id: i32,
        state_seq: i32,
        slot: i16,
        item: Slot,
    },
    ContainerClose {
        container_id: i32,
    },
    CombatDeath,
    Disconnected {
        reason: String,
    },
}

/// Face of the block an interaction targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockFace {
    Down,
    Up,
    North,
    South,
    West,
    East,
}

/// Mouse action of a slot click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClickAction {
    /// Take the whole stack, or put the whole held stack down.
    Left,
    /// Put a single unit of the held stack down.
    Right,
}

/// Commands sent back to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum Command {
    AcceptTeleport {
        teleport_id: i32,
    },
    Respawn,
    MoveTo {
        x: f64,
        y: f64,
        z: f64,
        on_ground: bool,
    },
    SetRotation {
        yaw: f32,
        pitch: f32,
    },
    InteractBlock {
        pos: Vec3,
        face: BlockFace,
        sequence: i32,
    },
    SetHeldSlot {
        slot: u8,
    },
    ClickSlot {
        container_id: i32,
        state_seq: i32,
        slot: i16,
        action: ClickAction,
        /// Predicted stack on the cursor after the click.
        carried: Option<ItemStack>,
        /// Predicted slot contents after the click, keyed by raw slot.
        changed: BTreeMap<i16, Slot>,
    },
    DropStack {
        container_id: i32,
        state_seq: i32,
        slot: i16,
    },
    CloseContainer {
        container_id: i32,
    },
    /// Re-send client settings; the server answers with a fresh chunk stream.
    ClientInformation {
        view_distance: u8,
    },
    ChunkBatchReceived {
        chunks_per_tick: f32,
    },
}

/// Outbound half of the session.
///
/// `send` must not block: the engines call it from the worker while event
/// handlers may be running on the session side.
pub trait CommandSink: Send + Sync {
    fn send(&self, command: Command);
}
