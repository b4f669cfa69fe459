mod cli;
mod gps;
mod killmon;
mod postmaster;
mod route_loop;
mod sensor;

use clap::Parser;
use kharon_core::beacon::BeaconTable;
use kharon_core::worldmap::MapStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const COMMAND_QUEUE_LEN: usize = 64;
const SAMPLE_QUEUE_LEN: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = cli::Options::parse();

    let filter = if options.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = match MapStore::open(&options.map_root) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, root = %options.map_root.display(), "failed to open world map");
            std::process::exit(1);
        }
    };
    let beacons = match BeaconTable::load(&options.map_root) {
        Ok(beacons) => beacons,
        Err(e) => {
            error!(error = %e, root = %options.map_root.display(), "failed to load beacon graph");
            std::process::exit(1);
        }
    };
    info!(root = %options.map_root.display(), "world map and beacon graph loaded");

    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_LEN);
    let (sample_tx, sample_rx) = mpsc::channel(SAMPLE_QUEUE_LEN);

    let postmaster_port = options.postmaster_port;
    let postmaster_commands = command_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = postmaster::run(postmaster_port, postmaster_commands).await {
            error!(error = %e, "postmaster task exited");
        }
    });

    let kill_monitor_port = options.kill_monitor_port;
    tokio::spawn(async move {
        let action: Arc<dyn killmon::SystemAction> = Arc::new(killmon::LoggingSystemAction);
        if let Err(e) = killmon::run(kill_monitor_port, action).await {
            error!(error = %e, "kill-monitor task exited");
        }
    });

    let sensor_port = options.sensor_port;
    let sensor_samples = sample_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = sensor::run(sensor_port, sensor_samples).await {
            error!(error = %e, "sensor ingest task exited");
        }
    });

    if let (Some(device), Some(forward_to)) = (options.gps_device.clone(), options.gps_forward_to.clone()) {
        tokio::spawn(async move {
            if let Err(e) = gps::run(&device, &forward_to).await {
                error!(error = %e, "gps ingest task exited");
            }
        });
    }

    let state = route_loop::RouteLoop::new(store, beacons);
    route_loop::run(state, command_rx, sample_rx).await;

    Ok(())
}
