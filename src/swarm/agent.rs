//! UAV agent: kinematic state, neighbor bookkeeping, and the reactive
//! steering law.
//!
//! Agents are point masses with instantaneous velocity control. Each tick a
//! follower sums three forces (formation slot pursuit, separation, obstacle
//! repulsion) plus a low-gain alignment term, then integrates the result into
//! its velocity under a per-axis speed clamp.

use std::time::{Duration, Instant};

use glam::DVec3;

use super::formation::rotate_offset;
use super::tuning::SwarmTuning;
use crate::world::VoxelGrid;

/// A neighbor is usable for steering while younger than this.
pub const FRESH_TTL: Duration = Duration::from_millis(500);
/// Entries older than this are evicted by the stale sweep.
pub const STALE_TTL: Duration = Duration::from_millis(1000);

const FORMATION_GAIN: f64 = 0.15;
const FORMATION_CAP: f64 = 2.0;
const SEPARATION_EPS: f64 = 1e-3;
const SEPARATION_CAP: f64 = 1.5;
/// Obstacle scan radius around the agent's cell, in cells.
const OBSTACLE_RADIUS: i32 = 3;
const OBSTACLE_MAX_FORCE: f64 = 5.0;

// force-mixing gains; the tunable weights multiply on top
const COHESION_MIX: f64 = 2.5;
const SEPARATION_MIX: f64 = 1.0;
const ALIGNMENT_MIX: f64 = 0.3;
const OBSTACLE_WEIGHT: f64 = 1.0;
const OBSTACLE_MIX: f64 = 3.0;
const ALTITUDE_GAIN: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Autonomous,
    Manual,
}

/// Last-known kinematics of another agent.
#[derive(Debug, Clone, Copy)]
pub struct NeighborInfo {
    pub id: u32,
    pub pos: DVec3,
    pub vel: DVec3,
    pub last_seen: Instant,
}

#[derive(Debug, Clone)]
pub struct Uav {
    id: u32,
    pub pos: DVec3,
    pub vel: DVec3,
    pub mode: ControlMode,
    neighbors: Vec<NeighborInfo>,
}

impl Uav {
    pub fn new(id: u32, pos: DVec3, vel: DVec3) -> Self {
        Uav {
            id,
            pos,
            vel,
            mode: ControlMode::Autonomous,
            neighbors: Vec::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_leader(&self) -> bool {
        self.id == 0
    }

    pub fn update_position(&mut self, dt: f64) {
        self.pos += self.vel * dt;
    }

    /// Record another agent's kinematics, refreshing an existing entry or
    /// appending a new one.
    pub fn record_neighbor(&mut self, id: u32, pos: DVec3, vel: DVec3, now: Instant) {
        for n in &mut self.neighbors {
            if n.id == id {
                n.pos = pos;
                n.vel = vel;
                n.last_seen = now;
                return;
            }
        }
        self.neighbors.push(NeighborInfo {
            id,
            pos,
            vel,
            last_seen: now,
        });
    }

    pub fn remove_stale_neighbors(&mut self, now: Instant) {
        self.neighbors
            .retain(|n| now.duration_since(n.last_seen) <= STALE_TTL);
    }

    pub fn fresh_neighbors(&self, now: Instant) -> Vec<&NeighborInfo> {
        self.neighbors
            .iter()
            .filter(|n| now.duration_since(n.last_seen) <= FRESH_TTL)
            .collect()
    }

    #[cfg(test)]
    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Net steering force for one tick.
    ///
    /// `hold_altitude` feeds the Z damping channel; the tick loop passes the
    /// agent's own altitude, which holds height rather than acquiring the
    /// commanded one.
    pub fn steering_force(
        &self,
        slot_offset: DVec3,
        grid: &VoxelGrid,
        tuning: &SwarmTuning,
        hold_altitude: f64,
        now: Instant,
    ) -> DVec3 {
        let fresh = self.fresh_neighbors(now);

        let formation = self.formation_force(slot_offset, &fresh);
        let separation = self.separation_force(&fresh, tuning.separation);
        let alignment = self.alignment_force(&fresh);
        let obstacle = self.obstacle_force(grid);

        let mut net = formation * (tuning.cohesion * COHESION_MIX)
            + separation * (tuning.separation * SEPARATION_MIX)
            + alignment * (tuning.alignment * ALIGNMENT_MIX)
            + obstacle * (OBSTACLE_WEIGHT * OBSTACLE_MIX);
        net.z += ALTITUDE_GAIN * (hold_altitude - self.pos.z);
        net
    }

    /// Integrate a steering force into velocity with the per-axis clamp.
    pub fn apply_steering(&mut self, force: DVec3, dt: f64, max_speed: f64) {
        self.vel = (self.vel + force * dt)
            .clamp(DVec3::splat(-max_speed), DVec3::splat(max_speed));
    }

    /// Proportional pursuit of the assigned formation slot.
    ///
    /// The leader's last-known state comes from the neighbor table; if id 0
    /// is absent the first fresh neighbor stands in. Formations are planar at
    /// the leader's altitude.
    fn formation_force(&self, slot_offset: DVec3, fresh: &[&NeighborInfo]) -> DVec3 {
        let leader = match fresh.iter().find(|n| n.id == 0).or_else(|| fresh.first()) {
            Some(l) => l,
            None => return DVec3::ZERO,
        };

        let heading_vel = if leader.vel.length() < 1e-6 {
            DVec3::new(0.0, 1.0, 0.0)
        } else {
            leader.vel
        };
        let rotated = rotate_offset(slot_offset, heading_vel);
        let target = DVec3::new(
            leader.pos.x + rotated.x,
            leader.pos.y + rotated.y,
            leader.pos.z,
        );

        let mut cmd = (target - self.pos) * FORMATION_GAIN;
        if cmd.length() > FORMATION_CAP {
            cmd = cmd.normalize() * FORMATION_CAP;
        }
        cmd
    }

    /// Inverse-distance repulsion from neighbors inside the separation
    /// radius. Co-located neighbors give no direction and are skipped.
    fn separation_force(&self, fresh: &[&NeighborInfo], radius: f64) -> DVec3 {
        let mut acc = DVec3::ZERO;
        for n in fresh {
            let d = self.pos.distance(n.pos);
            if d <= f64::EPSILON || d >= radius {
                continue;
            }
            acc += (self.pos - n.pos) / d * (1.0 / (d + SEPARATION_EPS));
        }
        if acc.length() > SEPARATION_CAP {
            acc = acc.normalize() * SEPARATION_CAP;
        }
        acc
    }

    /// Boids alignment toward the mean neighbor velocity, normalized once.
    fn alignment_force(&self, fresh: &[&NeighborInfo]) -> DVec3 {
        if fresh.is_empty() {
            return DVec3::ZERO;
        }
        let mean = fresh.iter().fold(DVec3::ZERO, |acc, n| acc + n.vel) / fresh.len() as f64;
        mean - self.vel
    }

    /// Repulsion away from blocked cells in the surrounding scan cube.
    /// Out-of-bounds cells count as blocked, so the world border pushes back.
    fn obstacle_force(&self, grid: &VoxelGrid) -> DVec3 {
        let cell = grid.to_grid(self.pos);
        let mut acc = DVec3::ZERO;
        for dk in -OBSTACLE_RADIUS..=OBSTACLE_RADIUS {
            for dj in -OBSTACLE_RADIUS..=OBSTACLE_RADIUS {
                for di in -OBSTACLE_RADIUS..=OBSTACLE_RADIUS {
                    if di == 0 && dj == 0 && dk == 0 {
                        continue;
                    }
                    if !grid.is_blocked(cell[0] + di, cell[1] + dj, cell[2] + dk) {
                        continue;
                    }
                    let d = ((di * di + dj * dj + dk * dk) as f64).sqrt();
                    let away = DVec3::new(-di as f64, -dj as f64, -dk as f64) / d;
                    acc += away * (OBSTACLE_MAX_FORCE / (d * d));
                }
            }
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_world() -> VoxelGrid {
        VoxelGrid::new(40, 40, 40, 5.0)
    }

    #[test]
    fn position_integrates_velocity() {
        let mut uav = Uav::new(1, DVec3::ZERO, DVec3::new(2.0, -4.0, 1.0));
        uav.update_position(0.5);
        assert_eq!(uav.pos, DVec3::new(1.0, -2.0, 0.5));
    }

    #[test]
    fn neighbor_table_updates_in_place() {
        let now = Instant::now();
        let mut uav = Uav::new(1, DVec3::ZERO, DVec3::ZERO);
        uav.record_neighbor(0, DVec3::X, DVec3::Y, now);
        uav.record_neighbor(0, DVec3::splat(2.0), DVec3::Y, now);
        assert_eq!(uav.neighbor_count(), 1);
        assert_eq!(uav.fresh_neighbors(now)[0].pos, DVec3::splat(2.0));
    }

    #[test]
    fn stale_neighbors_are_evicted_fresh_filtered() {
        let t0 = Instant::now();
        let mut uav = Uav::new(1, DVec3::ZERO, DVec3::ZERO);
        uav.record_neighbor(0, DVec3::X, DVec3::ZERO, t0);
        uav.record_neighbor(2, DVec3::Y, DVec3::ZERO, t0 + Duration::from_millis(800));

        // 1.1 s after t0: neighbor 0 is past the stale threshold
        let now = t0 + Duration::from_millis(1100);
        uav.remove_stale_neighbors(now);
        assert_eq!(uav.neighbor_count(), 1);

        // neighbor 2 is 300 ms old: fresh
        assert_eq!(uav.fresh_neighbors(now).len(), 1);
        // at 1.4 s it is 600 ms old: kept but no longer fresh
        let later = t0 + Duration::from_millis(1400);
        uav.remove_stale_neighbors(later);
        assert_eq!(uav.neighbor_count(), 1);
        assert!(uav.fresh_neighbors(later).is_empty());
    }

    #[test]
    fn separation_is_zero_without_neighbors_in_range() {
        let now = Instant::now();
        let grid = empty_world();
        let mut uav = Uav::new(1, DVec3::new(0.0, 0.0, 50.0), DVec3::ZERO);
        uav.record_neighbor(2, DVec3::new(50.0, 0.0, 50.0), DVec3::ZERO, now);

        let force = uav.separation_force(&uav.fresh_neighbors(now), 10.0);
        assert_eq!(force, DVec3::ZERO);

        // and the whole steering force is finite with an empty grid around
        let f = uav.steering_force(DVec3::ZERO, &grid, &SwarmTuning::default(), uav.pos.z, now);
        assert!(f.is_finite());
    }

    #[test]
    fn separation_pushes_apart_and_caps() {
        let now = Instant::now();
        let mut uav = Uav::new(1, DVec3::new(0.0, 0.0, 50.0), DVec3::ZERO);
        uav.record_neighbor(2, DVec3::new(0.5, 0.0, 50.0), DVec3::ZERO, now);
        let force = uav.separation_force(&uav.fresh_neighbors(now), 10.0);
        assert!(force.x < 0.0, "should push away from the neighbor");
        assert!(force.length() <= SEPARATION_CAP + 1e-12);
    }

    #[test]
    fn colocated_neighbor_does_not_produce_nan() {
        let now = Instant::now();
        let p = DVec3::new(0.0, 0.0, 20.0);
        let mut uav = Uav::new(1, p, DVec3::ZERO);
        uav.record_neighbor(2, p, DVec3::ZERO, now);
        let force = uav.separation_force(&uav.fresh_neighbors(now), 10.0);
        assert!(force.is_finite());
    }

    #[test]
    fn formation_force_points_at_rotated_slot() {
        let now = Instant::now();
        let grid = empty_world();
        let tuning = SwarmTuning::default();
        // leader cruising +Y at (0, 0, 20); follower well behind its slot
        let mut uav = Uav::new(1, DVec3::new(0.0, -40.0, 20.0), DVec3::ZERO);
        uav.record_neighbor(0, DVec3::new(0.0, 0.0, 20.0), DVec3::new(0.0, 1.0, 0.0), now);

        let slot = DVec3::new(0.0, -10.0, 0.0);
        let f = uav.steering_force(slot, &grid, &tuning, uav.pos.z, now);
        // slot target is (0, -10, 20): force pulls +Y, nothing lateral
        assert!(f.y > 0.0);
        assert!(f.x.abs() < 1e-9);
    }

    #[test]
    fn obstacle_force_repels_from_blocked_cells() {
        let mut grid = empty_world();
        let uav = Uav::new(1, DVec3::new(0.0, 0.0, 100.0), DVec3::ZERO);
        let cell = grid.to_grid(uav.pos);
        // wall two cells ahead in +X
        grid.set_block(cell[0] + 2, cell[1], cell[2], true);

        let force = uav.obstacle_force(&grid);
        assert!(force.x < 0.0, "should push away from +X wall, got {:?}", force);
        assert!(force.y.abs() < 1e-9);
    }

    #[test]
    fn velocity_clamp_is_per_axis() {
        let mut uav = Uav::new(1, DVec3::ZERO, DVec3::new(4.9, -4.9, 0.0));
        uav.apply_steering(DVec3::new(100.0, -100.0, 2.0), 0.025, 5.0);
        assert_eq!(uav.vel.x, 5.0);
        assert_eq!(uav.vel.y, -5.0);
        assert!((uav.vel.z - 0.05).abs() < 1e-12);
    }
}
