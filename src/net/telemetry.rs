//! Telemetry: per-agent frame emitters and the aggregator.
//!
//! Agents fire one JSON frame per tick at the aggregator's listen port. The
//! aggregator keeps only the latest frame per agent id and re-emits the
//! whole set downstream every 100 ms, one datagram per agent. Tuning
//! control messages (`swarm_settings`) arrive on the same listen socket.

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use glam::DVec3;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{downstream_host, resolve, send_json, RECV_TIMEOUT};
use crate::sim::SimShared;
use crate::swarm::TuningPatch;

/// Base UDP port for per-agent emitter sockets; agent `id` binds `8000+id`.
pub const AGENT_PORT_BASE: u16 = 8000;

const EGRESS_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
}

/// One agent state report, as it travels over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub id: u32,
    pub position: Position,
    pub velocity: Velocity,
    pub timestamp: String,
}

impl TelemetryFrame {
    pub fn capture(id: u32, pos: DVec3, vel: DVec3) -> Self {
        TelemetryFrame {
            id,
            position: Position {
                x: pos.x,
                y: pos.y,
                z: pos.z,
            },
            velocity: Velocity {
                vx: vel.x,
                vy: vel.y,
                vz: vel.z,
            },
            timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

/// Fire-and-forget frame emitters, one socket per agent.
///
/// Sockets prefer their well-known `8000+id` port and fall back to an
/// ephemeral one when it is taken; a failed bind disables that agent's
/// emitter and is logged once.
pub struct AgentTelemetry {
    dest: SocketAddr,
    sockets: Vec<Option<UdpSocket>>,
}

impl AgentTelemetry {
    pub fn new(dest: SocketAddr) -> Self {
        AgentTelemetry {
            dest,
            sockets: Vec::new(),
        }
    }

    /// Grow or shrink the socket table to match the swarm.
    pub fn ensure_agents(&mut self, count: usize) {
        while self.sockets.len() < count {
            let id = self.sockets.len();
            let preferred = AGENT_PORT_BASE.wrapping_add(id as u16);
            let socket = UdpSocket::bind(("0.0.0.0", preferred))
                .or_else(|_| UdpSocket::bind(("0.0.0.0", 0)));
            match socket {
                Ok(s) => self.sockets.push(Some(s)),
                Err(err) => {
                    warn!("[Telemetry] UAV {} has no emitter socket: {}", id, err);
                    self.sockets.push(None);
                }
            }
        }
        self.sockets.truncate(count);
    }

    pub fn emit(&self, agent_idx: usize, frame: &TelemetryFrame) {
        if let Some(Some(socket)) = self.sockets.get(agent_idx) {
            send_json(socket, self.dest, frame);
        }
    }
}

/// Aggregator: ingress + egress worker threads over one latest-frame map.
pub struct TelemetryHub {
    listen_port: u16,
    visualizer_port: u16,
}

impl TelemetryHub {
    pub fn new(listen_port: u16, visualizer_port: u16) -> Self {
        TelemetryHub {
            listen_port,
            visualizer_port,
        }
    }

    /// Spawn both workers. A failed bind aborts the hub (logged); the rest
    /// of the simulator keeps running without telemetry.
    pub fn spawn(&self, shared: Arc<SimShared>) -> Vec<JoinHandle<()>> {
        let socket = match UdpSocket::bind(("0.0.0.0", self.listen_port)) {
            Ok(s) => s,
            Err(err) => {
                error!(
                    "[Telemetry] Failed to bind listen socket on port {}: {}",
                    self.listen_port, err
                );
                return Vec::new();
            }
        };
        if let Err(err) = socket.set_read_timeout(Some(RECV_TIMEOUT)) {
            warn!("[Telemetry] Could not set receive timeout: {}", err);
        }
        info!("[Telemetry] Listening on port {}", self.listen_port);

        let latest: Arc<Mutex<HashMap<u64, serde_json::Value>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let ingress = {
            let shared = Arc::clone(&shared);
            let latest = Arc::clone(&latest);
            thread::spawn(move || ingress_loop(socket, shared, latest))
        };
        let egress = {
            let shared = Arc::clone(&shared);
            let latest = Arc::clone(&latest);
            let port = self.visualizer_port;
            thread::spawn(move || egress_loop(shared, latest, port))
        };
        vec![ingress, egress]
    }
}

fn ingress_loop(
    socket: UdpSocket,
    shared: Arc<SimShared>,
    latest: Arc<Mutex<HashMap<u64, serde_json::Value>>>,
) {
    let mut buf = [0u8; 2048];
    while shared.running.load(std::sync::atomic::Ordering::SeqCst) {
        let len = match socket.recv_from(&mut buf) {
            Ok((len, _src)) => len,
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(err) => {
                warn!("[Telemetry] Receive error: {}", err);
                continue;
            }
        };

        let value: serde_json::Value = match serde_json::from_slice(&buf[..len]) {
            Ok(v) => v,
            Err(err) => {
                warn!("[Telemetry] Discarding malformed frame: {}", err);
                continue;
            }
        };

        ingest(&shared, &latest, value);
    }
    debug!("[Telemetry] Ingress loop stopped");
}

/// Route one parsed datagram: settings update or agent frame.
fn ingest(
    shared: &SimShared,
    latest: &Mutex<HashMap<u64, serde_json::Value>>,
    value: serde_json::Value,
) {
    if value.get("type").and_then(|t| t.as_str()) == Some("swarm_settings") {
        let payload = value.get("payload").cloned().unwrap_or(serde_json::Value::Null);
        match serde_json::from_value::<TuningPatch>(payload) {
            Ok(patch) => shared.tuning.apply(patch),
            Err(err) => warn!("[Telemetry] Bad swarm_settings payload: {}", err),
        }
        return;
    }

    match value.get("id").and_then(|id| id.as_u64()) {
        Some(id) => {
            latest.lock().insert(id, value);
        }
        None => warn!("[Telemetry] Discarding frame without numeric id"),
    }
}

fn egress_loop(
    shared: Arc<SimShared>,
    latest: Arc<Mutex<HashMap<u64, serde_json::Value>>>,
    visualizer_port: u16,
) {
    let socket = match UdpSocket::bind(("0.0.0.0", 0)) {
        Ok(s) => s,
        Err(err) => {
            error!("[Telemetry] Failed to open egress socket: {}", err);
            return;
        }
    };

    while shared.running.load(std::sync::atomic::Ordering::SeqCst) {
        thread::sleep(EGRESS_PERIOD);

        let frames: Vec<serde_json::Value> = latest.lock().values().cloned().collect();
        if frames.is_empty() {
            continue;
        }

        // resolved every cycle so a moving DNS target is honored
        let host = downstream_host();
        let addr = match resolve(&host, visualizer_port) {
            Ok(a) => a,
            Err(err) => {
                warn!("[Telemetry] Cannot resolve {}: {}", host, err);
                continue;
            }
        };
        for frame in &frames {
            send_json(&socket, addr, frame);
        }
    }
    debug!("[Telemetry] Egress loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::sim::Simulator;

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
    fn frame_matches_wire_schema() {
        let frame = TelemetryFrame::capture(
            4,
            DVec3::new(1.0, 2.0, 3.0),
            DVec3::new(0.1, 0.2, 0.3),
        );
        let v = serde_json::to_value(&frame).unwrap();
        assert_eq!(v["id"], 4);
        assert_eq!(v["position"]["z"], 3.0);
        assert_eq!(v["velocity"]["vx"], 0.1);
        let ts = v["timestamp"].as_str().unwrap();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "T");
    }

    #[test]
    fn ingest_keeps_latest_frame_per_id() {
        let shared = shared();
        let latest = Mutex::new(HashMap::new());
        ingest(&shared, &latest, serde_json::json!({"id": 1, "position": {"x": 0.0}}));
        ingest(&shared, &latest, serde_json::json!({"id": 1, "position": {"x": 9.0}}));
        ingest(&shared, &latest, serde_json::json!({"id": 2, "position": {"x": 5.0}}));
        let map = latest.lock();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&1]["position"]["x"], 9.0);
    }

    #[test]
    fn ingest_routes_settings_to_tuning_store() {
        let shared = shared();
        let latest = Mutex::new(HashMap::new());
        ingest(
            &shared,
            &latest,
            serde_json::json!({
                "type": "swarm_settings",
                "payload": {"max_speed": 7.5, "cohesion": 2.0}
            }),
        );
        let t = shared.tuning.get();
        assert_eq!(t.max_speed, 7.5);
        assert_eq!(t.cohesion, 2.0);
        // unrelated fields untouched, nothing entered the frame map
        assert_eq!(t.separation, 10.0);
        assert!(latest.lock().is_empty());
    }

    #[test]
    fn ingest_rejects_fractional_swarm_size() {
        let shared = shared();
        let latest = Mutex::new(HashMap::new());
        ingest(
            &shared,
            &latest,
            serde_json::json!({"type": "swarm_settings", "payload": {"swarm_size": 2.5}}),
        );
        assert_eq!(shared.tuning.get().swarm_size, 3);
    }

    #[test]
    fn emitters_bind_and_send() {
        // sink socket stands in for the aggregator
        let sink = UdpSocket::bind(("127.0.0.1", 0)).unwrap();
        let mut agents = AgentTelemetry::new(sink.local_addr().unwrap());
        agents.ensure_agents(3);
        let frame = TelemetryFrame::capture(0, DVec3::ZERO, DVec3::ZERO);
        agents.emit(0, &frame);
        agents.emit(7, &frame); // out of range: ignored

        sink.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut buf = [0u8; 2048];
        let (len, _) = sink.recv_from(&mut buf).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(v["id"], 0);
    }
}
