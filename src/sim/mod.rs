//! Simulator core.
//!
//! Owns the shared state every worker touches: the voxel world behind a
//! read-write lock, the planner with its scratch, the swarm (agents, slot
//! table, path follower, goal) behind one mutex, the tuning store, and the
//! three atomic flags. The tick loop lives in [`ticker`].
//!
//! Lock discipline: the tick loop takes the swarm mutex and may read the
//! grid while holding it; everyone else finishes grid/planner work and drops
//! those locks *before* touching the swarm, so the two orders cannot cycle.

pub mod ticker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::DVec3;
use parking_lot::{Mutex, RwLock};
use rand::thread_rng;
use tracing::{info, warn};

use crate::config::SimConfig;
use crate::swarm::formation::slot_offsets;
use crate::swarm::{Formation, PathFollower, SwarmTuning, TuningStore, Uav};
use crate::world::grid::DEFAULT_SPACING_BUFFER;
use crate::world::{Goal, Planner, VoxelGrid};

/// Base position agents return to on `rtb`.
pub const HOME: DVec3 = DVec3::new(0.0, 0.0, 20.0);
/// Initial cruise velocity along +Y.
const INITIAL_VELOCITY: DVec3 = DVec3::new(0.0, 1.0, 0.0);
/// Goal sphere radius, roughly three agent lengths.
const GOAL_RADIUS: f64 = 6.0;

/// Everything behind the swarm mutex.
pub struct SwarmState {
    pub agents: Vec<Uav>,
    pub formation: Formation,
    pub slots: Vec<DVec3>,
    pub follower: PathFollower,
    pub goal: Goal,
    /// Active `altitude_change` band: the tick loop zeroes vertical velocity
    /// once the leader crosses it.
    pub altitude_target: Option<f64>,
}

impl SwarmState {
    pub fn leader_index(&self) -> Option<usize> {
        self.agents.iter().position(|a| a.is_leader())
    }

    pub fn recompute_slots(&mut self, spacing: f64) {
        self.slots = slot_offsets(self.agents.len(), self.formation, spacing);
    }

    /// Rebuild the swarm around the preserved leader kinematics. New agents
    /// spawn co-located with the leader; the steering law spreads them out.
    pub fn resize(&mut self, new_size: usize, spacing: f64) {
        let new_size = new_size.max(1);
        let (pos, vel) = match self.leader_index() {
            Some(i) => (self.agents[i].pos, self.agents[i].vel),
            None => (HOME, INITIAL_VELOCITY),
        };
        self.agents = (0..new_size as u32).map(|id| Uav::new(id, pos, vel)).collect();
        self.recompute_slots(spacing);
        info!("[Sim] Resized swarm to {} UAVs", new_size);
    }
}

pub struct SimShared {
    pub config: SimConfig,
    pub grid: RwLock<VoxelGrid>,
    pub planner: Mutex<Planner>,
    pub swarm: Mutex<SwarmState>,
    pub tuning: TuningStore,
    pub running: AtomicBool,
    pub leader_autopilot: AtomicBool,
    pub reached_goal: AtomicBool,
}

impl SimShared {
    /// Plan between two world points, falling back to the direct two-point
    /// path on failure so the follower stays armed. Grid and planner locks
    /// are released before this returns.
    pub fn plan_or_direct(&self, start: DVec3, goal: DVec3) -> Vec<DVec3> {
        let mut grid = self.grid.write();
        let mut planner = self.planner.lock();
        match planner.plan(&mut grid, start, goal) {
            Ok(path) => path,
            Err(err) => {
                warn!("[Planner] {} ({} -> {}); using direct path", err, start, goal);
                vec![start, goal]
            }
        }
    }

    pub fn change_formation(&self, formation: Formation) {
        let spacing = self.tuning.get().separation;
        let mut swarm = self.swarm.lock();
        swarm.formation = formation;
        swarm.recompute_slots(spacing);
        info!("[Sim] Formation changed to {}.", formation.name());
    }

    /// Return-to-base: re-enable autopilot and bind a fresh path from the
    /// leader's position back home.
    pub fn return_to_base(&self) {
        let start = {
            let swarm = self.swarm.lock();
            match swarm.leader_index() {
                Some(i) => swarm.agents[i].pos,
                None => return,
            }
        };
        let path = self.plan_or_direct(start, HOME);
        let mut swarm = self.swarm.lock();
        swarm.follower.set_path(path);
        self.leader_autopilot.store(true, Ordering::SeqCst);
        info!("[Sim] RTB: leader returning to {}", HOME);
    }

    /// `flight_mode autonomous`: replan to the current goal and hand the
    /// leader back to the follower.
    pub fn resume_autonomous(&self) {
        let (start, goal) = {
            let swarm = self.swarm.lock();
            match swarm.leader_index() {
                Some(i) => (swarm.agents[i].pos, swarm.goal),
                None => return,
            }
        };
        let path = self.plan_or_direct(start, goal.center());
        let mut swarm = self.swarm.lock();
        swarm.follower.set_path(path);
        swarm.altitude_target = None;
        self.reached_goal.store(false, Ordering::SeqCst);
        self.leader_autopilot.store(true, Ordering::SeqCst);
        info!("[Sim] Flight mode: autonomous");
    }

    pub fn set_manual(&self) {
        self.leader_autopilot.store(false, Ordering::SeqCst);
        info!("[Sim] Flight mode: controlled");
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Debug aid: dump every agent's kinematics.
    pub fn log_swarm_status(&self) {
        let swarm = self.swarm.lock();
        info!("[Sim] Swarm status ({} UAVs)", swarm.agents.len());
        for a in &swarm.agents {
            info!(
                "  {}: position {:.2}, {:.2}, {:.2}. velocity {:.2}, {:.2}, {:.2}",
                a.id(),
                a.pos.x,
                a.pos.y,
                a.pos.z,
                a.vel.x,
                a.vel.y,
                a.vel.z
            );
        }
    }
}

pub struct Simulator {
    shared: Arc<SimShared>,
}

impl Simulator {
    /// Build the world, deploy the swarm in LINE formation around the home
    /// point, pick the corner goal, and bind the initial plan.
    pub fn new(config: SimConfig) -> Self {
        let cells = config.cells_per_axis();
        let mut grid = VoxelGrid::new(cells, cells, cells, config.resolution);
        grid.generate_random(config.obstacle_count, DEFAULT_SPACING_BUFFER, &mut thread_rng());

        let start = HOME;
        // corner goal pulled half a cell inside the border, 50 m above start
        let corner = config.border / 2.0 - 0.5 * config.resolution;
        let goal_center = DVec3::new(corner, corner, start.z + 50.0);
        grid.set_goal(goal_center, GOAL_RADIUS);
        let goal = Goal::new(goal_center, GOAL_RADIUS);

        let mut planner = Planner::new(&grid);
        let path = match planner.plan(&mut grid, start, goal_center) {
            Ok(path) => path,
            Err(err) => {
                warn!("[Planner] initial plan failed: {}; using direct path", err);
                vec![start, goal_center]
            }
        };
        let mut follower = PathFollower::new(config.resolution);
        follower.set_path(path);

        let tuning = TuningStore::new(SwarmTuning {
            swarm_size: config.swarm_size,
            ..SwarmTuning::default()
        });
        let spacing = tuning.get().separation;

        let n = config.swarm_size.max(1);
        let mut agents: Vec<Uav> =
            (0..n as u32).map(|id| Uav::new(id, start, INITIAL_VELOCITY)).collect();
        let formation = Formation::Line;
        let slots = slot_offsets(n, formation, spacing);
        // deploy in formation: axis-aligned offsets, Z held at leader altitude
        for (agent, slot) in agents.iter_mut().zip(&slots) {
            agent.pos = DVec3::new(start.x + slot.x, start.y + slot.y, start.z);
        }

        let shared = Arc::new(SimShared {
            config,
            grid: RwLock::new(grid),
            planner: Mutex::new(planner),
            swarm: Mutex::new(SwarmState {
                agents,
                formation,
                slots,
                follower,
                goal,
                altitude_target: None,
            }),
            tuning,
            running: AtomicBool::new(false),
            leader_autopilot: AtomicBool::new(true),
            reached_goal: AtomicBool::new(false),
        });

        info!("[Sim] Created swarm with {} UAVs", n);
        shared.log_swarm_status();
        Simulator { shared }
    }

    pub fn shared(&self) -> Arc<SimShared> {
        Arc::clone(&self.shared)
    }
}
