use std::env;

use tracing::info;

use skyweave::net::command::CommandListener;
use skyweave::net::telemetry::{AgentTelemetry, TelemetryHub};
use skyweave::net::{resolve, send_environment};
use skyweave::sim::ticker;
use skyweave::{setup_logging, SimConfig, Simulator};

fn main() {
    setup_logging(env::var("RUST_LOG").ok());

    let config = SimConfig::from_env();
    info!("Loaded config: {:?}", config);

    let sim = Simulator::new(config.clone());
    let shared = sim.shared();

    // one-shot world description for the visualizer
    let frame = shared.grid.read().environment_frame();
    send_environment(&frame, config.visualizer_port);

    // telemetry aggregator + command listener workers
    let hub = TelemetryHub::new(config.telemetry_listen_port, config.visualizer_port);
    let mut handles = Vec::new();

    // agents emit to the aggregator's listen port on localhost
    let dest = match resolve("127.0.0.1", config.telemetry_listen_port) {
        Ok(addr) => addr,
        Err(err) => {
            // localhost resolution cannot realistically fail; bail loudly
            eprintln!("fatal: cannot resolve telemetry destination: {}", err);
            std::process::exit(1);
        }
    };
    let mut telemetry = AgentTelemetry::new(dest);
    telemetry.ensure_agents(config.swarm_size);

    // physics loop flips `running` on; the hub and listener loops watch it
    handles.push(ticker::spawn(shared.clone(), telemetry));
    handles.extend(hub.spawn(shared.clone()));
    if let Some(h) = CommandListener::new(config.command_port).spawn(shared.clone()) {
        handles.push(h);
    }

    info!(
        "Simulator running: {} UAVs, commands on {}, telemetry to {}",
        config.swarm_size, config.command_port, config.visualizer_port
    );

    for handle in handles {
        let _ = handle.join();
    }
}
