// Waypoint execution against paths computed by the coordinator

mod executor;

pub use executor::PathExecutor;

use crate::types::Location;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error("no path from {from} to {to}")]
    NoPath { from: Location, to: Location },

    #[error("world did not change after {attempts} portal attempts")]
    PortalFailed { attempts: u32 },

    #[error("chunk at ({x}, {z}) did not load after {polls} polls")]
    ChunkWaitExhausted { x: i32, z: i32, polls: u32 },
}
