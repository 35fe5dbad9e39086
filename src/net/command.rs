//! UDP command listener.
//!
//! One plain-text command per datagram, received on an IPv6 any-address
//! socket (dual-stack where the OS allows it). Trailing newlines, spaces,
//! and NULs are stripped; unknown commands are ignored.

use std::f64::consts::{FRAC_PI_2, PI};
use std::net::UdpSocket;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use super::RECV_TIMEOUT;
use crate::sim::SimShared;
use crate::swarm::agent::ControlMode;
use crate::swarm::Formation;

/// Heading increment for `move_leader left|right`: 5 degrees.
const TURN_STEP: f64 = PI / 36.0;
const ACCEL_STEP: f64 = 1.0;
const DECEL_STEP: f64 = 0.5;
/// Vertical speed commanded by `altitude_change`, m/s.
const CLIMB_RATE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderMove {
    Accelerate,
    Decelerate,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Formation(Formation),
    MoveLeader(LeaderMove),
    AltitudeChange(f64),
    ReturnToBase,
    FlightAutonomous,
    FlightControlled,
}

/// Parse one datagram's text. `None` means not a command we know.
pub fn parse(raw: &str) -> Option<Command> {
    let text = raw.trim_end_matches(['\n', '\r', ' ', '\0']);
    let mut words = text.split_whitespace();
    let head = words.next()?;

    match head {
        "1" | "line" => Some(Command::Formation(Formation::Line)),
        "2" | "vee" => Some(Command::Formation(Formation::FlyingV)),
        "3" | "circle" => Some(Command::Formation(Formation::Circle)),
        "move_leader" => match words.next()? {
            "accelerate" => Some(Command::MoveLeader(LeaderMove::Accelerate)),
            "decelerate" => Some(Command::MoveLeader(LeaderMove::Decelerate)),
            "left" => Some(Command::MoveLeader(LeaderMove::Left)),
            "right" => Some(Command::MoveLeader(LeaderMove::Right)),
            _ => None,
        },
        "altitude_change" => words.next()?.parse().ok().map(Command::AltitudeChange),
        "rtb" => Some(Command::ReturnToBase),
        "flight_mode" => match words.next()? {
            "autonomous" => Some(Command::FlightAutonomous),
            "controlled" => Some(Command::FlightControlled),
            _ => None,
        },
        _ => None,
    }
}

/// Apply a parsed command to the shared simulator state.
pub fn apply(shared: &SimShared, cmd: Command) {
    match cmd {
        Command::Formation(f) => shared.change_formation(f),
        Command::MoveLeader(mv) => move_leader(shared, mv),
        Command::AltitudeChange(delta) => altitude_change(shared, delta),
        Command::ReturnToBase => shared.return_to_base(),
        Command::FlightAutonomous => shared.resume_autonomous(),
        Command::FlightControlled => shared.set_manual(),
    }
}

/// Adjust the leader's 2D heading/speed. Vertical velocity is preserved and
/// the autopilot is disengaged until explicitly re-enabled.
fn move_leader(shared: &SimShared, mv: LeaderMove) {
    shared.leader_autopilot.store(false, Ordering::SeqCst);

    let mut swarm = shared.swarm.lock();
    let idx = match swarm.leader_index() {
        Some(i) => i,
        None => return,
    };
    let leader = &mut swarm.agents[idx];

    let mut speed = (leader.vel.x * leader.vel.x + leader.vel.y * leader.vel.y).sqrt();
    let mut heading = leader.vel.y.atan2(leader.vel.x);
    if speed < 1e-3 {
        // stationary leader: default heading +Y
        heading = FRAC_PI_2;
    }

    match mv {
        LeaderMove::Accelerate => speed += ACCEL_STEP,
        LeaderMove::Decelerate => speed = (speed - DECEL_STEP).max(0.0),
        LeaderMove::Left => heading -= TURN_STEP,
        LeaderMove::Right => heading += TURN_STEP,
    }

    leader.vel.x = speed * heading.cos();
    leader.vel.y = speed * heading.sin();
    leader.mode = ControlMode::Manual;
}

/// Start a climb or descent toward `current + delta`; the tick loop zeroes
/// the vertical velocity once the leader crosses the target band.
fn altitude_change(shared: &SimShared, delta: f64) {
    if delta == 0.0 {
        return;
    }
    shared.leader_autopilot.store(false, Ordering::SeqCst);

    let mut swarm = shared.swarm.lock();
    let idx = match swarm.leader_index() {
        Some(i) => i,
        None => return,
    };
    let target = swarm.agents[idx].pos.z + delta;
    swarm.agents[idx].vel.z = CLIMB_RATE * delta.signum();
    swarm.agents[idx].mode = ControlMode::Manual;
    swarm.altitude_target = Some(target);
}

pub struct CommandListener {
    port: u16,
}

impl CommandListener {
    pub fn new(port: u16) -> Self {
        CommandListener { port }
    }

    /// Spawn the receive loop. A failed bind aborts this worker (logged);
    /// the simulator keeps running without manual control.
    pub fn spawn(&self, shared: Arc<SimShared>) -> Option<JoinHandle<()>> {
        // "::" binds all IPv6 interfaces; on Linux this accepts IPv4 too
        let socket = match UdpSocket::bind(("::", self.port)) {
            Ok(s) => s,
            Err(err) => {
                error!(
                    "[Command] Failed to bind IPv6 listener on port {}: {}",
                    self.port, err
                );
                return None;
            }
        };
        if let Err(err) = socket.set_read_timeout(Some(RECV_TIMEOUT)) {
            warn!("[Command] Could not set receive timeout: {}", err);
        }
        info!("[Command] IPv6 command listener started on port {}", self.port);

        Some(thread::spawn(move || listen_loop(socket, shared)))
    }
}

fn listen_loop(socket: UdpSocket, shared: Arc<SimShared>) {
    let mut buf = [0u8; 1024];
    while shared.running.load(Ordering::SeqCst) {
        let len = match socket.recv_from(&mut buf) {
            Ok((len, _src)) => len,
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(err) => {
                warn!("[Command] Receive error: {}", err);
                continue;
            }
        };

        let text = String::from_utf8_lossy(&buf[..len]);
        debug!("[Command] Received command: [{}]", text.trim_end());
        match parse(&text) {
            Some(cmd) => apply(&shared, cmd),
            None => debug!("[Command] Ignoring unknown command"),
        }
    }
    debug!("[Command] Listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::sim::Simulator;
    use glam::DVec3;

    fn shared() -> Arc<SimShared> {
        Simulator::new(SimConfig {
            swarm_size: 3,
            border: 200.0,
            resolution: 5.0,
            obstacle_count: 0,
            ..SimConfig::default()
        })
        .shared()
    }

    #[test]
    fn parses_the_command_table() {
        assert_eq!(parse("1"), Some(Command::Formation(Formation::Line)));
        assert_eq!(parse("vee\n"), Some(Command::Formation(Formation::FlyingV)));
        assert_eq!(parse("circle\r\n"), Some(Command::Formation(Formation::Circle)));
        assert_eq!(
            parse("move_leader left"),
            Some(Command::MoveLeader(LeaderMove::Left))
        );
        assert_eq!(
            parse("move_leader accelerate \0\0"),
            Some(Command::MoveLeader(LeaderMove::Accelerate))
        );
        assert_eq!(parse("altitude_change -12.5"), Some(Command::AltitudeChange(-12.5)));
        assert_eq!(parse("rtb"), Some(Command::ReturnToBase));
        assert_eq!(parse("flight_mode autonomous"), Some(Command::FlightAutonomous));
        assert_eq!(parse("flight_mode controlled"), Some(Command::FlightControlled));
    }

    #[test]
    fn unknown_commands_are_ignored() {
        assert_eq!(parse("self_destruct"), None);
        assert_eq!(parse("move_leader sideways"), None);
        assert_eq!(parse("flight_mode"), None);
        assert_eq!(parse(""), None);
        assert_eq!(parse("altitude_change up"), None);
    }

    #[test]
    fn turn_preserves_speed_and_kills_autopilot() {
        let shared = shared();
        {
            let mut swarm = shared.swarm.lock();
            swarm.agents[0].vel = DVec3::new(0.0, 2.0, 0.5);
        }
        apply(&shared, Command::MoveLeader(LeaderMove::Left));

        assert!(!shared.leader_autopilot.load(Ordering::SeqCst));
        let swarm = shared.swarm.lock();
        let v = swarm.agents[0].vel;
        let speed = (v.x * v.x + v.y * v.y).sqrt();
        assert!((speed - 2.0).abs() < 1e-9, "2D speed must be preserved");
        // heading rotated from pi/2 by -5 degrees
        let heading = v.y.atan2(v.x);
        assert!((heading - (FRAC_PI_2 - TURN_STEP)).abs() < 1e-9);
        // vertical channel untouched
        assert_eq!(v.z, 0.5);
    }

    #[test]
    fn accelerate_and_decelerate_floor_at_zero() {
        let shared = shared();
        {
            let mut swarm = shared.swarm.lock();
            swarm.agents[0].vel = DVec3::new(0.0, 0.3, 0.0);
        }
        apply(&shared, Command::MoveLeader(LeaderMove::Decelerate));
        {
            let swarm = shared.swarm.lock();
            let v = swarm.agents[0].vel;
            assert!((v.x * v.x + v.y * v.y).sqrt() < 1e-9, "speed floors at zero");
        }
        apply(&shared, Command::MoveLeader(LeaderMove::Accelerate));
        let swarm = shared.swarm.lock();
        let v = swarm.agents[0].vel;
        // stationary leader accelerates along the default +Y heading
        assert!((v.y - 1.0).abs() < 1e-9);
        assert!(v.x.abs() < 1e-9);
    }

    #[test]
    fn altitude_change_sets_climb_band() {
        let shared = shared();
        apply(&shared, Command::AltitudeChange(15.0));
        assert!(!shared.leader_autopilot.load(Ordering::SeqCst));
        let swarm = shared.swarm.lock();
        assert_eq!(swarm.agents[0].vel.z, 1.0);
        assert_eq!(swarm.altitude_target, Some(35.0));
    }

    #[test]
    fn formation_digit_switches_and_recomputes_slots() {
        let shared = shared();
        apply(&shared, Command::Formation(Formation::Circle));
        let swarm = shared.swarm.lock();
        assert_eq!(swarm.formation, Formation::Circle);
        assert_eq!(swarm.slots.len(), swarm.agents.len());
        assert_eq!(swarm.slots[0], DVec3::ZERO);
    }
}
