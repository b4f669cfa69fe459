//! Process-level CLI flags for the `kharon` agent binary, mirroring
//! `jet1090::cli::Options`'s derive-based `clap` style.

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "kharon",
    version,
    about = "Autonomous marine navigation agent: postmaster, kill-monitor, sensor ingest and route control"
)]
pub struct Options {
    /// Root of the tiled world map (world.map1, 15sec/, 5sec/)
    #[arg(long, default_value = "/opt/kharon/data/map")]
    pub map_root: PathBuf,

    /// Root of the per-host config/device tree
    #[arg(long, default_value = "/opt/kharon/data")]
    pub config_root: PathBuf,

    /// Host name used to select this device's config subtree
    #[arg(long, default_value_t = default_hostname())]
    pub host: String,

    /// Postmaster TCP command plane listen port
    #[arg(long, default_value_t = 9100)]
    pub postmaster_port: u16,

    /// Kill-monitor TCP listen port
    #[arg(long, default_value_t = crate::killmon::DEFAULT_PORT)]
    pub kill_monitor_port: u16,

    /// Sensor packet ingest TCP listen port
    #[arg(long, default_value_t = 9105)]
    pub sensor_port: u16,

    /// GPS serial device path (e.g. /dev/ttyUSB0); omit to disable GPS ingest
    #[arg(long)]
    pub gps_device: Option<String>,

    /// TCP endpoint GPS sentences are forwarded to, host:port
    #[arg(long)]
    pub gps_forward_to: Option<String>,

    /// Activate verbose (debug-level) logging
    #[arg(short, long, default_value = "false")]
    pub verbose: bool,
}

fn default_hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
