//! Weighted A* over the voxel grid.
//!
//! Searches the 26-connected neighborhood with √n move costs, forbids
//! corner-cutting through blocked face pairs, and smooths the raw cell path
//! with a sampled line-of-sight pass. Scratch arrays are owned by the planner
//! and reset with a generation stamp instead of a full clear, so frequent
//! replans don't rewrite O(nx·ny·nz) memory.

use std::collections::BinaryHeap;

use glam::DVec3;
use tracing::debug;

use super::VoxelGrid;
use crate::error::PlanError;

const SQRT_2: f64 = std::f64::consts::SQRT_2;
const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// 26-neighborhood steps with their move costs (√ of nonzero components).
const NEIGHBORS: [([i32; 3], f64); 26] = [
    // face moves
    ([1, 0, 0], 1.0),
    ([-1, 0, 0], 1.0),
    ([0, 1, 0], 1.0),
    ([0, -1, 0], 1.0),
    ([0, 0, 1], 1.0),
    ([0, 0, -1], 1.0),
    // edge diagonals
    ([1, 1, 0], SQRT_2),
    ([1, -1, 0], SQRT_2),
    ([-1, 1, 0], SQRT_2),
    ([-1, -1, 0], SQRT_2),
    ([1, 0, 1], SQRT_2),
    ([1, 0, -1], SQRT_2),
    ([-1, 0, 1], SQRT_2),
    ([-1, 0, -1], SQRT_2),
    ([0, 1, 1], SQRT_2),
    ([0, 1, -1], SQRT_2),
    ([0, -1, 1], SQRT_2),
    ([0, -1, -1], SQRT_2),
    // corner diagonals
    ([1, 1, 1], SQRT_3),
    ([1, 1, -1], SQRT_3),
    ([1, -1, 1], SQRT_3),
    ([1, -1, -1], SQRT_3),
    ([-1, 1, 1], SQRT_3),
    ([-1, 1, -1], SQRT_3),
    ([-1, -1, 1], SQRT_3),
    ([-1, -1, -1], SQRT_3),
];

/// Open-set entry. Ordered by `f` ascending so the std max-heap pops the
/// cheapest node; duplicates are skipped on pop via the closed stamp.
struct OpenNode {
    idx: usize,
    f: f64,
    g: f64,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f
    }
}
impl Eq for OpenNode {}
impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.f.total_cmp(&self.f)
    }
}

pub struct Planner {
    nx: i32,
    ny: i32,
    nz: i32,
    resolution: f64,
    g_score: Vec<f64>,
    parent: Vec<i32>,
    // generation stamps: an entry is valid only when its stamp equals the
    // current generation, which makes reset O(1)
    stamp: Vec<u32>,
    closed: Vec<u32>,
    generation: u32,
}

impl Planner {
    pub fn new(grid: &VoxelGrid) -> Self {
        let (nx, ny, nz) = grid.dims();
        let total = nx as usize * ny as usize * nz as usize;
        Planner {
            nx,
            ny,
            nz,
            resolution: grid.resolution(),
            g_score: vec![f64::INFINITY; total],
            parent: vec![-1; total],
            stamp: vec![0; total],
            closed: vec![0; total],
            generation: 0,
        }
    }

    #[inline]
    fn to_index(&self, c: [i32; 3]) -> usize {
        ((c[2] * self.ny + c[1]) * self.nx + c[0]) as usize
    }

    #[inline]
    fn to_cell(&self, idx: usize) -> [i32; 3] {
        let idx = idx as i32;
        [idx % self.nx, (idx / self.nx) % self.ny, idx / (self.nx * self.ny)]
    }

    /// Euclidean distance in grid coordinates; admissible for √n move costs.
    fn heuristic(a: [i32; 3], b: [i32; 3]) -> f64 {
        let dx = (a[0] - b[0]) as f64;
        let dy = (a[1] - b[1]) as f64;
        let dz = (a[2] - b[2]) as f64;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Corner-cutting guard: a diagonal move is legal only if every
    /// axis-aligned face cell it slips past is free.
    fn diagonal_clear(grid: &VoxelGrid, from: [i32; 3], step: [i32; 3]) -> bool {
        let components = step.iter().filter(|&&s| s != 0).count();
        if components < 2 {
            return true;
        }
        if step[0] != 0 && grid.is_blocked(from[0] + step[0], from[1], from[2]) {
            return false;
        }
        if step[1] != 0 && grid.is_blocked(from[0], from[1] + step[1], from[2]) {
            return false;
        }
        if step[2] != 0 && grid.is_blocked(from[0], from[1], from[2] + step[2]) {
            return false;
        }
        true
    }

    /// Raw A* returning the cell path from start to goal inclusive.
    ///
    /// Blocked but in-bounds endpoints get a 3x3x3 bubble cleared around them
    /// so agents rasterized into an obstacle can still plan out.
    pub fn plan_cells(
        &mut self,
        grid: &mut VoxelGrid,
        start: DVec3,
        goal: DVec3,
    ) -> Result<Vec<[i32; 3]>, PlanError> {
        let gs = grid.to_grid(start);
        let gg = grid.to_grid(goal);
        if !grid.in_bounds(gs[0], gs[1], gs[2]) || !grid.in_bounds(gg[0], gg[1], gg[2]) {
            return Err(PlanError::OutOfBounds);
        }
        if grid.is_blocked(gs[0], gs[1], gs[2]) {
            grid.clear_bubble(gs);
        }
        if grid.is_blocked(gg[0], gg[1], gg[2]) {
            grid.clear_bubble(gg);
        }

        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            // stamp wrap: stale stamps could alias, force a clean slate
            self.stamp.fill(0);
            self.closed.fill(0);
            self.generation = 1;
        }
        let gen = self.generation;

        let start_idx = self.to_index(gs);
        let goal_idx = self.to_index(gg);
        self.g_score[start_idx] = 0.0;
        self.parent[start_idx] = -1;
        self.stamp[start_idx] = gen;

        let mut open = BinaryHeap::new();
        open.push(OpenNode {
            idx: start_idx,
            f: Self::heuristic(gs, gg),
            g: 0.0,
        });

        let mut found = false;
        while let Some(node) = open.pop() {
            if self.closed[node.idx] == gen {
                continue;
            }
            self.closed[node.idx] = gen;
            if node.idx == goal_idx {
                found = true;
                break;
            }

            let cell = self.to_cell(node.idx);
            for (step, cost) in NEIGHBORS {
                let next = [cell[0] + step[0], cell[1] + step[1], cell[2] + step[2]];
                if !grid.in_bounds(next[0], next[1], next[2])
                    || grid.is_blocked(next[0], next[1], next[2])
                    || !Self::diagonal_clear(grid, cell, step)
                {
                    continue;
                }
                let next_idx = self.to_index(next);
                let tentative = node.g + cost;
                if self.stamp[next_idx] != gen || tentative < self.g_score[next_idx] {
                    self.g_score[next_idx] = tentative;
                    self.parent[next_idx] = node.idx as i32;
                    self.stamp[next_idx] = gen;
                    open.push(OpenNode {
                        idx: next_idx,
                        f: tentative + Self::heuristic(next, gg),
                        g: tentative,
                    });
                }
            }
        }

        if !found {
            return Err(PlanError::NoPath);
        }

        let mut cells = Vec::new();
        let mut at = goal_idx as i32;
        while at >= 0 {
            cells.push(self.to_cell(at as usize));
            at = self.parent[at as usize];
        }
        cells.reverse();
        Ok(cells)
    }

    /// Plan a smoothed world-space path from start to goal.
    pub fn plan(
        &mut self,
        grid: &mut VoxelGrid,
        start: DVec3,
        goal: DVec3,
    ) -> Result<Vec<DVec3>, PlanError> {
        let cells = self.plan_cells(grid, start, goal)?;
        let raw: Vec<DVec3> = cells.iter().map(|&[i, j, k]| grid.to_world(i, j, k)).collect();
        let smooth = self.smooth(grid, &raw);
        debug!(
            "[Planner] Planned path: {} raw cells, {} waypoints after smoothing",
            raw.len(),
            smooth.len()
        );
        Ok(smooth)
    }

    /// Line-of-sight check sampled every half cell; every sample must land in
    /// a free, in-bounds cell.
    fn line_clear(&self, grid: &VoxelGrid, a: DVec3, b: DVec3) -> bool {
        let dist = a.distance(b);
        let steps = (dist / (0.5 * self.resolution)).ceil().max(1.0) as usize;
        for s in 0..=steps {
            let t = s as f64 / steps as f64;
            if !grid.is_free_world(a.lerp(b, t)) {
                return false;
            }
        }
        true
    }

    /// Drop interior waypoints whose removal keeps the segment to the next
    /// point collision-free. First and last waypoints always survive.
    fn smooth(&self, grid: &VoxelGrid, pts: &[DVec3]) -> Vec<DVec3> {
        if pts.len() <= 2 {
            return pts.to_vec();
        }
        let mut kept = vec![pts[0]];
        let mut anchor = pts[0];
        for i in 1..pts.len() - 1 {
            if self.line_clear(grid, anchor, pts[i + 1]) {
                continue;
            }
            kept.push(pts[i]);
            anchor = pts[i];
        }
        kept.push(pts[pts.len() - 1]);
        kept
    }
}
