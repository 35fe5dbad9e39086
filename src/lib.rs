//! SkyWeave - Real-time cooperative aerial swarm simulator
//!
//! Advances a leader/follower UAV swarm through a bounded voxel world at
//! 40 Hz: weighted A* path planning for the leader, a three-force reactive
//! steering law for the followers, and a UDP fabric streaming telemetry out
//! and accepting control commands in.

pub mod config;
pub mod error;
pub mod net;
pub mod sim;
pub mod swarm;
pub mod world;

// Re-export key types for embedding and tests
pub use config::SimConfig;
pub use error::PlanError;
pub use sim::{SimShared, Simulator};
pub use swarm::{Formation, PathFollower, SwarmTuning, TuningStore, Uav};
pub use world::{Goal, Obstacle, Planner, VoxelGrid};

/// Initialize tracing for the process.
pub fn setup_logging(level: Option<String>) {
    let filter = level.unwrap_or_else(|| "info".to_string());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
