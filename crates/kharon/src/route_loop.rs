//! Route-controller driving loop: the task that owns the `MapStore`,
//! `BeaconTable` and `RouteController`, applies commands from the
//! postmaster, folds in sensor samples, and ticks the controller on a
//! fixed cadence.
//!
//! Per spec §5, the path field / composite / vector-stream state stays
//! plain single-threaded Rust owned by this one task; `tokio` supplies
//! only the cooperating-agent scheduling around it, matching
//! `jet1090::main`'s `tokio::spawn` + shared-state pattern (there,
//! behind a `Mutex`; here, behind sole ownership of this task since
//! nothing else needs concurrent access to route state).

use kharon_core::angles::Bam16;
use kharon_core::beacon::BeaconTable;
use kharon_core::geometry::WorldCoordinate;
use kharon_core::route::RouteController;
use kharon_core::streams::ResampledVectorStream;
use kharon_core::worldmap::MapStore;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::postmaster::Command;
use crate::sensor::SensorSample;

pub const TICK_PERIOD_MS: u64 = 500;

pub struct RouteLoop {
    pub store: MapStore,
    pub beacons: BeaconTable,
    pub controller: RouteController,
    pub imu: ResampledVectorStream,
    pub autopilot_active: bool,
    pub last_position: Option<WorldCoordinate>,
}

impl RouteLoop {
    pub fn new(store: MapStore, beacons: BeaconTable) -> Self {
        RouteLoop {
            store,
            beacons,
            controller: RouteController::new(),
            imu: ResampledVectorStream::new(0),
            autopilot_active: false,
            last_position: None,
        }
    }

    fn apply_command(&mut self, command: Command) {
        match command {
            Command::Annotation(text) => info!(%text, "annotation"),
            Command::Shutdown => info!("shutdown requested via postmaster"),
            Command::AutopilotOn => {
                self.autopilot_active = true;
                info!("autopilot engaged");
            }
            Command::AutopilotOff => {
                self.autopilot_active = false;
                info!("autopilot disengaged");
            }
            Command::SetHeading { degrees: Some(d) } => {
                self.controller.override_active_course_all(Bam16::from_degrees(d));
            }
            Command::SetHeading { degrees: None } => {
                self.controller.set_default_active_course();
            }
            Command::SetDestination { lon_bam32, lat_bam32, radius_m } => {
                use kharon_core::angles::Bam32;
                let lon = Bam32(lon_bam32).to_signed_degrees();
                let lat = Bam32(lat_bam32).to_signed_degrees();
                self.controller.set_destination(WorldCoordinate { lon, lat }, radius_m);
                if let Some(pos) = self.last_position {
                    if let Err(e) = self.controller.trace_initial(&self.store, &mut self.beacons, pos) {
                        warn!(error = %e, "route trace failed after set_destination");
                    }
                }
            }
            Command::ModulePause(name) => info!(module = %name, "module pause requested"),
            Command::ModuleResume(name) => info!(module = %name, "module resume requested"),
        }
    }

    fn apply_sample(&mut self, sample: SensorSample) {
        match sample {
            SensorSample::Imu { timestamp_sec, sample } => {
                self.imu.add_sample(sample, timestamp_sec);
            }
            SensorSample::Gps { sentence, .. } => {
                if let Some(pos) = parse_gga_position(&sentence) {
                    self.last_position = Some(pos);
                }
            }
            SensorSample::OpticalFrame { .. } => {
                // optical accumulation feeds C9, driven by a separate task;
                // nothing for the route loop to do with a raw frame.
            }
        }
    }

    fn tick(&mut self) {
        let Some(pos) = self.last_position else {
            return;
        };
        if self.controller.destination.is_none() {
            return;
        }
        match self.controller.update(&self.store, &self.beacons, pos) {
            Ok(_heading) => {}
            Err(e) => warn!(error = %e, "route controller update failed"),
        }
    }
}

/// Minimal GGA fix extraction (lat/lon only); enough to drive the route
/// loop without pulling in a full NMEA parser crate for one sentence
/// type.
fn parse_gga_position(sentence: &str) -> Option<WorldCoordinate> {
    if !sentence.starts_with("GPGGA") {
        return None;
    }
    let fields: Vec<&str> = sentence.split(',').collect();
    if fields.len() < 6 {
        return None;
    }
    let lat_raw: f64 = fields[2].parse().ok()?;
    let lat_deg = (lat_raw / 100.0).trunc();
    let lat_min = lat_raw - lat_deg * 100.0;
    let mut lat = lat_deg + lat_min / 60.0;
    if fields[3] == "S" {
        lat = -lat;
    }
    let lon_raw: f64 = fields[4].parse().ok()?;
    let lon_deg = (lon_raw / 100.0).trunc();
    let lon_min = lon_raw - lon_deg * 100.0;
    let mut lon = lon_deg + lon_min / 60.0;
    if fields[5] == "W" {
        lon = -lon;
    }
    Some(WorldCoordinate { lon, lat })
}

pub async fn run(
    mut state: RouteLoop,
    mut commands: mpsc::Receiver<Command>,
    mut samples: mpsc::Receiver<SensorSample>,
) {
    let mut ticker = interval(Duration::from_millis(TICK_PERIOD_MS));
    loop {
        tokio::select! {
            Some(command) = commands.recv() => state.apply_command(command),
            Some(sample) = samples.recv() => state.apply_sample(sample),
            _ = ticker.tick() => state.tick(),
            else => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gga_northwest_fix() {
        let pos = parse_gga_position("GPGGA,123519,4916.45,N,12311.12,W,1,08,0.9,545.4,M,46.9,M,,").unwrap();
        assert!((pos.lat - 49.2742).abs() < 1e-3);
        assert!((pos.lon - (-123.1853)).abs() < 1e-3);
    }

    #[test]
    fn non_gga_sentence_is_ignored() {
        assert!(parse_gga_position("GPRMC,123519,A").is_none());
    }
}
