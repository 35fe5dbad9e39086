//! UDP plumbing shared by the telemetry and command workers.
//!
//! All sends are fire-and-forget: failures are logged and dropped, never
//! retried, and never escalate past the worker that hit them.

pub mod command;
pub mod telemetry;

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use serde::Serialize;
use tracing::{info, warn};

use crate::world::EnvironmentFrame;

/// Environment variable naming the downstream visualizer host.
pub const DOWNSTREAM_HOST_ENV: &str = "SKYWEAVE_UDP_HOST";

/// How long blocking receives wait before re-checking the running flag.
pub const RECV_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(500);

pub fn downstream_host() -> String {
    std::env::var(DOWNSTREAM_HOST_ENV).unwrap_or_else(|_| "127.0.0.1".to_string())
}

/// Resolve a host:port pair. Called per send cycle on purpose: the
/// downstream host may be a DNS name whose address moves.
pub fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses"))
}

/// Serialize and send one JSON datagram. Errors are logged and swallowed.
pub fn send_json<T: Serialize>(socket: &UdpSocket, addr: SocketAddr, payload: &T) {
    let bytes = match serde_json::to_vec(payload) {
        Ok(b) => b,
        Err(err) => {
            warn!("[Net] Failed to encode datagram: {}", err);
            return;
        }
    };
    if let Err(err) = socket.send_to(&bytes, addr) {
        warn!("[Net] Failed to send {} bytes to {}: {}", bytes.len(), addr, err);
    }
}

/// One-shot startup datagram describing obstacles and goal to the
/// visualizer.
pub fn send_environment(frame: &EnvironmentFrame, visualizer_port: u16) {
    let socket = match UdpSocket::bind(("0.0.0.0", 0)) {
        Ok(s) => s,
        Err(err) => {
            warn!("[Net] Could not open environment socket: {}", err);
            return;
        }
    };
    let host = downstream_host();
    match resolve(&host, visualizer_port) {
        Ok(addr) => {
            send_json(&socket, addr, frame);
            info!(
                "[Net] Environment frame sent to {} ({} obstacles)",
                addr,
                frame.obstacles.len()
            );
        }
        Err(err) => warn!("[Net] Could not resolve {}: {}", host, err),
    }
}
