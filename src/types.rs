//! Shared data model: block positions, dimensions, item stacks, holds and
//! the operations handed out by the coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Block-granularity position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Vec3 {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Offset by the given amounts.
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Horizontal-only position, used for scan region bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: i32,
    pub z: i32,
}

/// The three worlds a server hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Overworld,
    TheNether,
    TheEnd,
}

impl Dimension {
    /// Map a server world name (e.g. `minecraft:the_nether`) to a dimension.
    ///
    /// Anything that is not the nether or the end is treated as the overworld.
    pub fn from_world_name(name: &str) -> Self {
        match name {
            "minecraft:the_nether" => Dimension::TheNether,
            "minecraft:the_end" => Dimension::TheEnd,
            _ => Dimension::Overworld,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Overworld => "Overworld",
            Dimension::TheNether => "TheNether",
            Dimension::TheEnd => "TheEnd",
        };
        f.write_str(name)
    }
}

/// Discrete position paired with its world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub vec3: Vec3,
    pub dim: Dimension,
}

impl Location {
    pub const fn new(vec3: Vec3, dim: Dimension) -> Self {
        Self { vec3, dim }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.vec3, self.dim)
    }
}

/// One occupied item slot.
///
/// `data_components` is opaque to the agent; it is forwarded to the
/// coordinator untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_id: i32,
    pub count: u32,
    #[serde(default)]
    pub data_components: Option<Value>,
}

impl ItemStack {
    pub fn new(item_id: i32, count: u32) -> Self {
        Self {
            item_id,
            count,
            data_components: None,
        }
    }

    /// Same item (id and extra data) with a different amount.
    pub fn with_count(&self, count: u32) -> Self {
        Self {
            item_id: self.item_id,
            count,
            data_components: self.data_components.clone(),
        }
    }
}

/// A slot in either shadow array. `None` is an empty slot.
pub type Slot = Option<ItemStack>;

/// Identity handed out by the coordinator at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub id: String,
    pub last_seen: String,
}

/// Exclusive lease on one container slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hold {
    pub id: String,
    pub location: Location,
    pub slot: u32,
    pub valid_until: DateTime<Utc>,
    pub open_from: Vec3,
}

/// Unit of work polled from the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub priority: String,
    pub status: String,
    pub kind: OperationKind,
}

/// Task payloads, one variant per task kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OperationKind {
    ScanInventory {
        location: Location,
        open_from: Vec3,
    },
    ScanSigns {
        location: Location,
        #[serde(default)]
        take_portal: Option<Vec3>,
    },
    MoveItems {
        source_holds: Vec<String>,
        destination_holds: Vec<String>,
        counts: Vec<u32>,
    },
    DropItems {
        drop_from: Location,
        aim_towards: Vec3,
        source_holds: Vec<String>,
    },
    ImportInventory {
        chest_location: Vec3,
        node_location: Location,
        destination_holds: Vec<String>,
    },
    LoadShulker {
        shulker_station_location: Location,
        shulker_hold: String,
        source_holds: Vec<Option<String>>,
    },
    UnloadShulker {
        shulker_station_location: Location,
        shulker_hold: String,
        destination_holds: Vec<Option<String>>,
    },
}

impl OperationKind {
    /// Tag name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::ScanInventory { .. } => "ScanInventory",
            OperationKind::ScanSigns { .. } => "ScanSigns",
            OperationKind::MoveItems { .. } => "MoveItems",
            OperationKind::DropItems { .. } => "DropItems",
            OperationKind::ImportInventory { .. } => "ImportInventory",
            OperationKind::LoadShulker { .. } => "LoadShulker",
            OperationKind::UnloadShulker { .. } => "UnloadShulker",
        }
    }
}

/// Final status reported for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Complete,
    Aborted,
}

/// One waypoint of a path computed by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PathNode {
    Vec(Vec3),
    Portal {
        vec: Vec3,
        destination_dim: Dimension,
    },
}

/// Text of one sign face at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sign {
    pub lines: Vec<String>,
    pub location: Location,
}

/// Signs observed in one loaded chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRegion {
    pub signs: Vec<Sign>,
    pub bounds: [Vec2; 2],
    pub dimension: Dimension,
}
