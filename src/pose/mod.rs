// Authoritative local pose, world and loaded-chunk tracking

mod tracker;

pub use tracker::{rotation_towards, ChunkKey, Pose, PoseTracker};
