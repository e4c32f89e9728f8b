// Shared data model
pub mod types;

// Game session events, commands and the bridge transport
pub mod session;

// Position and loaded-chunk tracking
pub mod pose;

// Path execution
pub mod navigation;

// Container transaction engine
pub mod inventory;

// Sign observation batching
pub mod signs;

// Coordinator API client
pub mod coordinator;

// Per-operation task handlers
pub mod tasks;

// Agent loop, event routing and runtime
pub mod agent;

// Configuration
pub mod config;

#[cfg(test)]
pub(crate) mod testing;
