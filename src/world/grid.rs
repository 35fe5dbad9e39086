//! Voxel occupancy grid.
//!
//! World space is continuous meters with the XY plane centered on the origin
//! and Z = 0 at the ground; grid space is integer cell indices. The mapping:
//!
//!   grid_i  = floor((x - origin_x) / resolution)
//!   world_x = origin_x + (i + 0.5) * resolution
//!
//! Occupancy is one bit per cell, packed into u64 words and allocated once at
//! construction. Out-of-bounds queries report blocked, so the world border
//! acts as an implicit wall.

use glam::DVec3;
use rand::Rng;
use tracing::info;

use super::{EnvironmentFrame, Goal, Obstacle};

/// Extra clearance (meters) between randomly placed obstacle footprints.
pub const DEFAULT_SPACING_BUFFER: f64 = 10.0;

/// Ceiling (meters) under which floating spheres are generated.
const SPHERE_CEILING: f64 = 200.0;

pub struct VoxelGrid {
    nx: i32,
    ny: i32,
    nz: i32,
    resolution: f64,
    origin: DVec3,
    occupancy: Vec<u64>,
    obstacles: Vec<Obstacle>,
    goal: Option<Goal>,
}

impl VoxelGrid {
    pub fn new(nx: i32, ny: i32, nz: i32, resolution: f64) -> Self {
        assert!(nx > 0 && ny > 0 && nz > 0, "grid dimensions must be positive");
        let cells = nx as usize * ny as usize * nz as usize;
        VoxelGrid {
            nx,
            ny,
            nz,
            resolution,
            // center the XY plane on the world origin, ground at z = 0
            origin: DVec3::new(
                -(nx as f64) * resolution / 2.0,
                -(ny as f64) * resolution / 2.0,
                0.0,
            ),
            occupancy: vec![0u64; (cells + 63) / 64],
            obstacles: Vec::new(),
            goal: None,
        }
    }

    pub fn dims(&self) -> (i32, i32, i32) {
        (self.nx, self.ny, self.nz)
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn origin(&self) -> DVec3 {
        self.origin
    }

    pub fn in_bounds(&self, i: i32, j: i32, k: i32) -> bool {
        i >= 0 && i < self.nx && j >= 0 && j < self.ny && k >= 0 && k < self.nz
    }

    #[inline]
    fn cell_index(&self, i: i32, j: i32, k: i32) -> usize {
        ((k * self.ny + j) * self.nx + i) as usize
    }

    /// Mark one cell blocked or free. Out-of-bounds writes are a no-op.
    pub fn set_block(&mut self, i: i32, j: i32, k: i32, blocked: bool) {
        if !self.in_bounds(i, j, k) {
            return;
        }
        let idx = self.cell_index(i, j, k);
        let bit = 1u64 << (idx % 64);
        if blocked {
            self.occupancy[idx / 64] |= bit;
        } else {
            self.occupancy[idx / 64] &= !bit;
        }
    }

    /// Out-of-bounds cells report blocked.
    pub fn is_blocked(&self, i: i32, j: i32, k: i32) -> bool {
        if !self.in_bounds(i, j, k) {
            return true;
        }
        let idx = self.cell_index(i, j, k);
        self.occupancy[idx / 64] & (1u64 << (idx % 64)) != 0
    }

    pub fn to_grid(&self, p: DVec3) -> [i32; 3] {
        let g = (p - self.origin) / self.resolution;
        [g.x.floor() as i32, g.y.floor() as i32, g.z.floor() as i32]
    }

    /// Center of cell (i, j, k) in world meters.
    pub fn to_world(&self, i: i32, j: i32, k: i32) -> DVec3 {
        self.origin
            + DVec3::new(
                (i as f64 + 0.5) * self.resolution,
                (j as f64 + 0.5) * self.resolution,
                (k as f64 + 0.5) * self.resolution,
            )
    }

    /// True when the world point falls in a free, in-bounds cell.
    pub fn is_free_world(&self, p: DVec3) -> bool {
        let [i, j, k] = self.to_grid(p);
        !self.is_blocked(i, j, k)
    }

    /// Force the 3x3x3 neighborhood around a cell free. Used by the planner
    /// to recover endpoints that rasterization swallowed.
    pub fn clear_bubble(&mut self, center: [i32; 3]) {
        for dk in -1..=1 {
            for dj in -1..=1 {
                for di in -1..=1 {
                    self.set_block(center[0] + di, center[1] + dj, center[2] + dk, false);
                }
            }
        }
    }

    /// Rasterize an axis-aligned box given two opposite corners, with a
    /// 1-cell phantom halo so repulsion forces trigger before contact.
    pub fn add_box(&mut self, p0: DVec3, p1: DVec3) {
        let g0 = self.to_grid(p0);
        let g1 = self.to_grid(p1);
        let margin = 1;

        let i0 = (g0[0].min(g1[0]) - margin).clamp(0, self.nx - 1);
        let i1 = (g0[0].max(g1[0]) + margin).clamp(0, self.nx - 1);
        let j0 = (g0[1].min(g1[1]) - margin).clamp(0, self.ny - 1);
        let j1 = (g0[1].max(g1[1]) + margin).clamp(0, self.ny - 1);
        let k0 = (g0[2].min(g1[2]) - margin).clamp(0, self.nz - 1);
        let k1 = (g0[2].max(g1[2]) + margin).clamp(0, self.nz - 1);

        for k in k0..=k1 {
            for j in j0..=j1 {
                for i in i0..=i1 {
                    self.set_block(i, j, k, true);
                }
            }
        }

        self.obstacles.push(Obstacle::Box {
            x: 0.5 * (p0.x + p1.x),
            y: 0.5 * (p0.y + p1.y),
            z: 0.5 * (p0.z + p1.z),
            width: (p1.x - p0.x).abs(),
            depth: (p1.y - p0.y).abs(),
            height: (p1.z - p0.z).abs(),
        });
    }

    /// Rasterize a sphere: every cell whose center lies inside the radius.
    pub fn add_sphere(&mut self, center: DVec3, radius: f64) {
        let gc = self.to_grid(center);
        let r = (radius / self.resolution).ceil() as i32;

        for k in gc[2] - r..=gc[2] + r {
            if k < 0 || k >= self.nz {
                continue;
            }
            for j in gc[1] - r..=gc[1] + r {
                if j < 0 || j >= self.ny {
                    continue;
                }
                for i in gc[0] - r..=gc[0] + r {
                    if i < 0 || i >= self.nx {
                        continue;
                    }
                    if self.to_world(i, j, k).distance_squared(center) <= radius * radius {
                        self.set_block(i, j, k, true);
                    }
                }
            }
        }

        self.obstacles.push(Obstacle::Sphere {
            x: center.x,
            y: center.y,
            z: center.z,
            radius,
        });
    }

    /// Rasterize a vertical cylinder centered at `center` (mid-height).
    pub fn add_cylinder(&mut self, center: DVec3, radius: f64, height: f64) {
        let gc = self.to_grid(center);
        let r_cell = (radius / self.resolution).ceil() as i32;
        let half_h = height / 2.0;
        let h_cell = (half_h / self.resolution).ceil() as i32;
        let r_sq = radius * radius;

        for k in gc[2] - h_cell..=gc[2] + h_cell {
            if k < 0 || k >= self.nz {
                continue;
            }
            let dz = self.origin.z + (k as f64 + 0.5) * self.resolution - center.z;
            if dz.abs() > half_h {
                continue;
            }
            for j in gc[1] - r_cell..=gc[1] + r_cell {
                if j < 0 || j >= self.ny {
                    continue;
                }
                let dy = self.origin.y + (j as f64 + 0.5) * self.resolution - center.y;
                for i in gc[0] - r_cell..=gc[0] + r_cell {
                    if i < 0 || i >= self.nx {
                        continue;
                    }
                    let dx = self.origin.x + (i as f64 + 0.5) * self.resolution - center.x;
                    if dx * dx + dy * dy <= r_sq {
                        self.set_block(i, j, k, true);
                    }
                }
            }
        }

        self.obstacles.push(Obstacle::Cylinder {
            x: center.x,
            y: center.y,
            z: center.z,
            radius,
            height,
        });
    }

    /// Populate the world with `count` random obstacles.
    ///
    /// Type is uniform over cylinder/box/sphere. Cylinders and boxes sit on
    /// the ground; spheres float between `r` and `200 - r` meters. Placement
    /// keeps bounding-disc footprints at least `spacing_buffer` meters apart,
    /// giving up after 20 attempts and placing anyway.
    pub fn generate_random(&mut self, count: usize, spacing_buffer: f64, rng: &mut impl Rng) {
        if count == 0 {
            return;
        }

        let world_min_x = self.origin.x;
        let world_max_x = self.origin.x + self.nx as f64 * self.resolution;
        let world_min_y = self.origin.y;
        let world_max_y = self.origin.y + self.ny as f64 * self.resolution;

        // (x, y, effective footprint radius) of everything placed so far
        let mut placed: Vec<(f64, f64, f64)> = Vec::with_capacity(count);

        for _ in 0..count {
            let kind = rng.gen_range(0..3u8);

            let (radius, width, depth, height, effective_radius) = match kind {
                0 => {
                    let r = rng.gen_range(3.0..15.0);
                    let h = rng.gen_range(10.0..60.0);
                    (r, 0.0, 0.0, h, r)
                }
                1 => {
                    let w: f64 = rng.gen_range(6.0..20.0);
                    let d: f64 = rng.gen_range(6.0..20.0);
                    let h = rng.gen_range(10.0..60.0);
                    (0.0, w, d, h, 0.5 * (w * w + d * d).sqrt())
                }
                _ => {
                    let r = rng.gen_range(3.0..15.0);
                    (r, 0.0, 0.0, 0.0, r)
                }
            };

            let mut cx = rng.gen_range(world_min_x..world_max_x);
            let mut cy = rng.gen_range(world_min_y..world_max_y);
            for _attempt in 0..20 {
                let too_close = placed.iter().any(|&(px, py, pr)| {
                    let min_dist = effective_radius + pr + spacing_buffer;
                    (cx - px).powi(2) + (cy - py).powi(2) < min_dist * min_dist
                });
                if !too_close {
                    break;
                }
                cx = rng.gen_range(world_min_x..world_max_x);
                cy = rng.gen_range(world_min_y..world_max_y);
            }
            placed.push((cx, cy, effective_radius));

            match kind {
                0 => {
                    // base on the ground
                    self.add_cylinder(DVec3::new(cx, cy, height / 2.0), radius, height);
                }
                1 => {
                    self.add_box(
                        DVec3::new(cx - width / 2.0, cy - depth / 2.0, 0.0),
                        DVec3::new(cx + width / 2.0, cy + depth / 2.0, height),
                    );
                }
                _ => {
                    let min_z = radius;
                    let max_z = SPHERE_CEILING - radius;
                    let cz = if max_z > min_z {
                        rng.gen_range(min_z..max_z)
                    } else {
                        min_z
                    };
                    self.add_sphere(DVec3::new(cx, cy, cz), radius);
                }
            }
        }

        info!("[World] Generated {} random obstacles", count);
    }

    pub fn set_goal(&mut self, center: DVec3, radius: f64) {
        self.goal = Some(Goal::new(center, radius));
    }

    pub fn goal(&self) -> Option<Goal> {
        self.goal
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn environment_frame(&self) -> EnvironmentFrame {
        EnvironmentFrame {
            kind: "environment",
            obstacles: self.obstacles.clone(),
            goal: self.goal,
        }
    }
}
