use crate::types::Vec3;
use std::fmt;
use thiserror::Error;

/// Which shadow array a slot index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotArea {
    Carry,
    Container,
}

impl fmt::Display for SlotArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotArea::Carry => f.write_str("carry"),
            SlotArea::Container => f.write_str("container"),
        }
    }
}

/// Precondition failures of the container engine.
///
/// Never retried inside the engine; the calling task decides.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("no container is open")]
    ContainerNotOpen,

    #[error("carry inventory has not been received yet")]
    InventoryNotPresent,

    #[error("{area} slot {slot} is out of range")]
    SlotOutOfRange { area: SlotArea, slot: usize },

    #[error("{area} slot {slot} is empty")]
    SlotEmpty { area: SlotArea, slot: usize },

    #[error("{area} slot {slot} holds {available} items, {requested} requested")]
    InsufficientCount {
        area: SlotArea,
        slot: usize,
        available: u32,
        requested: u32,
    },

    #[error("transfer count must be at least one")]
    InvalidCount,

    #[error("chunk holding container at {pos} not loaded after {polls} polls")]
    ChunkNotLoaded { pos: Vec3, polls: u32 },

    #[error("{area} slot {slot} holds an implausible stack of {count}")]
    StackTooLarge {
        area: SlotArea,
        slot: usize,
        count: u32,
    },

    #[error("merging {moving} items into {area} slot {slot} exceeds the stack limit")]
    StackOverflow {
        area: SlotArea,
        slot: usize,
        moving: u32,
    },

    #[error("container at {pos} did not open after {attempts} attempts")]
    OpenAttemptsExhausted { pos: Vec3, attempts: u32 },

    #[error("container {container_id} is still open")]
    ContainerStillOpen { container_id: i32 },
}
