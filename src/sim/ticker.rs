//! Fixed-rate physics loop.
//!
//! One tick: drive the leader along its path, integrate every agent, emit
//! telemetry, sync neighbor tables, steer the followers, then check the
//! goal. Runs at 40 Hz on its own thread; the loop sleeps to the next
//! deadline rather than a fixed interval so tick drift does not accumulate.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use glam::DVec3;
use rayon::prelude::*;
use tracing::info;

use super::SimShared;
use crate::net::telemetry::{AgentTelemetry, TelemetryFrame};
use crate::swarm::formation::fibonacci_sphere;

/// Physics timestep in seconds; the loop runs at 1/UAVDT = 40 Hz.
pub const UAVDT: f64 = 0.025;

/// Rendezvous sphere radius as a multiple of the goal radius.
const RENDEZVOUS_SCALE: f64 = 1.4;

/// Spawn the physics thread. It exits when `running` clears.
pub fn spawn(shared: Arc<SimShared>, mut telemetry: AgentTelemetry) -> JoinHandle<()> {
    shared.running.store(true, Ordering::SeqCst);
    thread::spawn(move || {
        let period = Duration::from_secs_f64(UAVDT);
        let mut next = Instant::now() + period;
        while shared.running.load(Ordering::SeqCst) {
            tick_once(&shared, &mut telemetry);

            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
                next += period;
            } else {
                // overran the deadline: restart the schedule instead of
                // bursting to catch up
                next = now + period;
            }
        }
        info!("[Sim] Physics loop stopped");
    })
}

/// Advance the simulation by one tick. A paused simulator mutates nothing.
pub fn tick_once(shared: &SimShared, telemetry: &mut AgentTelemetry) {
    if !shared.running.load(Ordering::SeqCst) {
        return;
    }

    let now = Instant::now();
    let tuning = shared.tuning.get();
    let mut swarm = shared.swarm.lock();

    // apply a pending resize request before anything reads the swarm shape
    if tuning.swarm_size != swarm.agents.len() {
        swarm.resize(tuning.swarm_size, tuning.separation);
    }
    telemetry.ensure_agents(swarm.agents.len());

    // 1. leader guidance: path follower while the autopilot is engaged,
    //    otherwise the altitude band from a manual climb command
    if let Some(idx) = swarm.leader_index() {
        if shared.leader_autopilot.load(Ordering::SeqCst) {
            let (pos, vel) = (swarm.agents[idx].pos, swarm.agents[idx].vel);
            if let Some(v) = swarm.follower.desired_velocity(pos, vel) {
                swarm.agents[idx].vel = v;
            }
        }
        if let Some(target) = swarm.altitude_target {
            let leader = &mut swarm.agents[idx];
            let crossed = (leader.vel.z > 0.0 && leader.pos.z >= target)
                || (leader.vel.z < 0.0 && leader.pos.z <= target)
                || leader.vel.z == 0.0;
            if crossed {
                leader.pos.z = target;
                leader.vel.z = 0.0;
                swarm.altitude_target = None;
            }
        }
    }

    // 2 + 3. integrate and emit post-integration telemetry
    for (i, agent) in swarm.agents.iter_mut().enumerate() {
        agent.update_position(UAVDT);
        telemetry.emit(i, &TelemetryFrame::capture(agent.id(), agent.pos, agent.vel));
    }

    // 4. centralized neighbor sync: every agent learns every other agent's
    //    post-integration state, then sheds entries past the stale TTL
    let snapshot: Vec<(u32, DVec3, DVec3)> = swarm
        .agents
        .iter()
        .map(|a| (a.id(), a.pos, a.vel))
        .collect();
    for (i, agent) in swarm.agents.iter_mut().enumerate() {
        for (j, &(id, pos, vel)) in snapshot.iter().enumerate() {
            if i != j {
                agent.record_neighbor(id, pos, vel, now);
            }
        }
        agent.remove_stale_neighbors(now);
    }

    // 5. follower steering: forces computed in a read-only parallel pass,
    //    then applied sequentially
    let forces: Vec<Option<DVec3>> = {
        let grid_guard = shared.grid.read();
        let grid: &crate::world::VoxelGrid = &grid_guard;
        let agents = &swarm.agents;
        let slots = &swarm.slots;
        agents
            .par_iter()
            .enumerate()
            .map(|(i, agent)| {
                if agent.is_leader() {
                    return None;
                }
                let slot = slots.get(i).copied().unwrap_or(DVec3::ZERO);
                Some(agent.steering_force(slot, grid, &tuning, agent.pos.z, now))
            })
            .collect()
    };
    for (agent, force) in swarm.agents.iter_mut().zip(forces) {
        if let Some(force) = force {
            agent.apply_steering(force, UAVDT, tuning.max_speed);
        }
    }

    // 6. goal check: latch once, park the leader, ring the followers around
    //    the beacon
    if !shared.reached_goal.load(Ordering::SeqCst) {
        if let Some(idx) = swarm.leader_index() {
            let goal = swarm.goal;
            if swarm.agents[idx].pos.distance(goal.center()) <= goal.radius {
                shared.reached_goal.store(true, Ordering::SeqCst);
                shared.leader_autopilot.store(false, Ordering::SeqCst);
                swarm.agents[idx].vel = DVec3::ZERO;

                let center = swarm.agents[idx].pos;
                let followers = swarm.agents.len().saturating_sub(1);
                let ring = fibonacci_sphere(followers, RENDEZVOUS_SCALE * goal.radius);
                let mut slot = 0;
                for agent in swarm.agents.iter_mut() {
                    if agent.is_leader() {
                        continue;
                    }
                    agent.pos = center + ring[slot];
                    agent.vel = DVec3::ZERO;
                    slot += 1;
                }
                info!(
                    "[Sim] Goal reached; {} followers arranged on rendezvous sphere",
                    followers
                );
            }
        }
    }
}
