use std::env;

/// Process configuration, read once at startup.
///
/// Every field can be overridden through a `SKYWEAVE_*` environment variable;
/// the defaults reproduce the standard deployment (750 m world at 5 m
/// resolution, visualizer on 6000, commands on 6001).
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Number of agents at startup (leader included).
    pub swarm_size: usize,
    /// UDP port the telemetry aggregator listens on for agent frames.
    pub telemetry_listen_port: u16,
    /// UDP port of the downstream visualizer.
    pub visualizer_port: u16,
    /// UDP port the command listener binds (IPv6 dual-stack).
    pub command_port: u16,
    /// World extent in meters along each axis.
    pub border: f64,
    /// Voxel edge length in meters.
    pub resolution: f64,
    /// Number of random obstacles generated at startup.
    pub obstacle_count: usize,
}

impl SimConfig {
    pub fn from_env() -> Self {
        SimConfig {
            swarm_size: read_env("SKYWEAVE_SWARM_SIZE", 9),
            telemetry_listen_port: read_env("SKYWEAVE_TELEMETRY_PORT", 6100),
            visualizer_port: read_env("SKYWEAVE_VISUALIZER_PORT", 6000),
            command_port: read_env("SKYWEAVE_COMMAND_PORT", 6001),
            border: read_env("SKYWEAVE_BORDER", 750.0),
            resolution: read_env("SKYWEAVE_RESOLUTION", 5.0),
            obstacle_count: read_env("SKYWEAVE_OBSTACLE_COUNT", 40),
        }
    }

    /// Grid cell count along one axis.
    pub fn cells_per_axis(&self) -> i32 {
        (self.border / self.resolution) as i32
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        // Defaults only; no environment reads so tests stay hermetic.
        SimConfig {
            swarm_size: 9,
            telemetry_listen_port: 6100,
            visualizer_port: 6000,
            command_port: 6001,
            border: 750.0,
            resolution: 5.0,
            obstacle_count: 40,
        }
    }
}

fn read_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
