//! World model
//!
//! A bounded voxel world with static obstacles, plus the weighted A* planner
//! that searches it. Obstacles keep their analytic descriptors so the
//! environment can be serialized for the visualizer after rasterization.

pub mod grid;
pub mod planner;

pub use grid::VoxelGrid;
pub use planner::Planner;

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Analytic obstacle descriptor, as serialized to the visualizer.
///
/// Positions are the shape's center in world meters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Obstacle {
    Box {
        x: f64,
        y: f64,
        z: f64,
        width: f64,
        depth: f64,
        height: f64,
    },
    Cylinder {
        x: f64,
        y: f64,
        z: f64,
        radius: f64,
        height: f64,
    },
    Sphere {
        x: f64,
        y: f64,
        z: f64,
        radius: f64,
    },
}

/// Spherical goal region.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Goal {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub radius: f64,
}

impl Goal {
    pub fn new(center: DVec3, radius: f64) -> Self {
        Goal {
            x: center.x,
            y: center.y,
            z: center.z,
            radius,
        }
    }

    pub fn center(&self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }
}

/// One-shot startup datagram describing the static world.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub obstacles: Vec<Obstacle>,
    pub goal: Option<Goal>,
}
