//! Route controller (C7): owns destination/vessel state, the active
//! composite and path field, and the lifecycle that ties them together —
//! destination set, beacon trace, vessel-centered trace, and the 15 nm
//! offset rebuild as the vessel nears the edge of the window.
//!
//! Grounded on `core/include/external/route_control.h` for the flag
//! vocabulary and `path_map.c`'s `trace_route_initial` /
//! `rebuild_map_by_vessel_offset` for the lifecycle. `route_map` and
//! `radial_viability` (traffic/collision avoidance, autopilot tiller
//! control) are out of scope.

use crate::angles::Bam16;
use crate::beacon::{is_inhibited_by_vessel_proximity, BeaconTable, BeaconUnreachable};
use crate::composite::build_composite;
use crate::geometry::{distance_meters, offset_position, pixel_position_in_map, WorldCoordinate};
use crate::pathfield::{PathField, VESSEL_OFFSET_FROM_MAP_CENTER_NM};
use crate::worldmap::MapStore;

pub mod course_flags {
    pub const NORMAL: u8 = 0x01;
    pub const SUGGEST_CHANGE: u8 = 0x02;
    pub const MAKE_CHANGE: u8 = 0x04;
    pub const CHANGE_MASK: u8 = SUGGEST_CHANGE | MAKE_CHANGE;
}

pub mod speed_flags {
    pub const NORMAL: u8 = 0x01;
    pub const SUGGEST_CHANGE: u8 = 0x02;
    pub const MAKE_CHANGE: u8 = 0x04;
    pub const FULL_STOP: u8 = 0x80;
}

pub mod state_flags {
    pub const CHECK_TERRAIN: u8 = 0x01;
    pub const CHECK_TRAFFIC: u8 = 0x02;
    pub const RUNNING_BLIND: u8 = 0x10;
    pub const REACHED_DESTINATION: u8 = 0x20;
    pub const PATH_LOCAL_MINIMUM: u8 = 0x40;
    pub const CHECK_MASK: u8 = CHECK_TERRAIN | CHECK_TRAFFIC;
}

pub mod persistent_flags {
    pub const DIVERT: u32 = 0x0000_0001;
    pub const PATH_CLEAR: u32 = 0x0000_0002;
    pub const HAVE_POSITION: u32 = 0x0000_0100;
    pub const HAVE_DESTINATION: u32 = 0x0000_0200;
    pub const HAVE_POS_DEST_MASK: u32 = HAVE_POSITION | HAVE_DESTINATION;
    pub const STARTING_UP_BLIND: u32 = 0x0000_0800;
    pub const AUTOPILOT_ACTIVE: u32 = 0x0001_0000;
    pub const AUTOPILOT_ERROR: u32 = 0x0002_0000;
    pub const DIVERT_RECOVER_MASK: u32 = DIVERT | PATH_CLEAR;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RouteFlags {
    pub course: u8,
    pub speed: u8,
    pub state: u8,
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error(transparent)]
    Unreachable(#[from] BeaconUnreachable),
    #[error(transparent)]
    Illegal(#[from] crate::geometry::IllegalCoordinate),
}

/// Owns the active 60x60 nm window and its path field, and tracks the
/// vessel/destination relationship across route-control cycles.
pub struct RouteController {
    pub destination: Option<WorldCoordinate>,
    pub destination_radius_m: f64,
    pub last_known_position: Option<WorldCoordinate>,
    pub true_path_heading: Bam16,
    pub flags: RouteFlags,
    pub persistent_flags: u32,
    field: Option<PathField>,
    vessel_start_pix: Option<crate::geometry::ImageCoordinate>,
}

impl RouteController {
    pub fn new() -> Self {
        RouteController {
            destination: None,
            destination_radius_m: 0.0,
            last_known_position: None,
            true_path_heading: Bam16::default(),
            flags: RouteFlags::default(),
            persistent_flags: 0,
            field: None,
            vessel_start_pix: None,
        }
    }

    pub fn set_destination(&mut self, dest: WorldCoordinate, radius_m: f64) {
        self.destination = Some(dest);
        self.destination_radius_m = radius_m;
        self.persistent_flags |= persistent_flags::HAVE_DESTINATION;
    }

    /// Full route trace from scratch: traces the beacon graph to the
    /// destination, builds the vessel-centered composite, relaxes the
    /// path field, then re-centers 15 nm ahead along the suggested
    /// course and retraces once more (matching the original's two-pass
    /// `trace_route_initial`).
    pub fn trace_initial(
        &mut self,
        store: &MapStore,
        beacons: &mut BeaconTable,
        vessel_pos: WorldCoordinate,
    ) -> Result<(), RouteError> {
        let dest = self.destination.ok_or(crate::geometry::IllegalCoordinate {
            label: "route_controller.destination",
            lon: f64::NAN,
            lat: f64::NAN,
        })?;
        beacons.trace_paths_to_destination(store, dest)?;

        self.build_and_trace(store, beacons, vessel_pos, dest)?;
        self.rebuild_by_vessel_offset(store, beacons, vessel_pos, dest)?;
        self.persistent_flags |= persistent_flags::HAVE_POSITION;
        Ok(())
    }

    fn build_and_trace(
        &mut self,
        store: &MapStore,
        beacons: &BeaconTable,
        center: WorldCoordinate,
        dest: WorldCoordinate,
    ) -> Result<(), RouteError> {
        let composite = build_composite(store, center);
        let mut field = PathField::new(&composite);
        field.reset();

        let dest_pix = pixel_position_in_map(
            field.center,
            node_extent_m(&field),
            node_extent_m(&field),
            field.side as u32,
            dest,
        );
        field.seed_point(dest_pix, 0.0);

        for b in beacons.load_into_path_field(&field) {
            if b.path_weight <= 0.0 {
                continue;
            }
            let beacon_world = crate::geometry::from_akn(b.coords);
            if is_inhibited_by_vessel_proximity(center, beacon_world) {
                continue;
            }
            field.seed_point(b.pos_in_map, 2.0 * b.path_weight);
        }

        field.drain_and_assign_courses(field.center.lat);

        let vessel_pix = pixel_position_in_map(
            field.center,
            node_extent_m(&field),
            node_extent_m(&field),
            field.side as u32,
            center,
        );
        self.vessel_start_pix = Some(vessel_pix);
        if let Some(node) = field.at(vessel_pix) {
            self.true_path_heading = node.true_course;
        }
        self.field = Some(field);
        Ok(())
    }

    /// Re-centers the window 15 nm ahead of the vessel along its
    /// suggested course (or directly on the vessel if the vessel's cell
    /// has no path information), then retraces.
    fn rebuild_by_vessel_offset(
        &mut self,
        store: &MapStore,
        beacons: &BeaconTable,
        vessel_pos: WorldCoordinate,
        dest: WorldCoordinate,
    ) -> Result<(), RouteError> {
        let field = self.field.as_ref().expect("traced before rebuild");
        let vessel_pix = self.vessel_start_pix.expect("traced before rebuild");
        let node = field.at(vessel_pix);
        let new_center = match node {
            Some(n) if n.weight >= 0.0 => {
                let course = n.true_course.to_degrees();
                offset_position(
                    vessel_pos,
                    course,
                    crate::geometry::nautical_miles_to_meters(VESSEL_OFFSET_FROM_MAP_CENTER_NM),
                )
            }
            _ => vessel_pos,
        };
        self.build_and_trace(store, beacons, new_center, dest)
    }

    /// One control-loop update: retraces if the vessel has moved near
    /// the edge of the current window, evaluates reached-destination,
    /// and returns the current suggested true heading.
    pub fn update(
        &mut self,
        store: &MapStore,
        beacons: &BeaconTable,
        vessel_pos: WorldCoordinate,
    ) -> Result<Bam16, RouteError> {
        self.last_known_position = Some(vessel_pos);
        let dest = match self.destination {
            Some(d) => d,
            None => {
                self.flags.state |= state_flags::RUNNING_BLIND;
                return Ok(self.true_path_heading);
            }
        };

        if distance_meters(vessel_pos, dest) <= self.destination_radius_m {
            self.flags.state |= state_flags::REACHED_DESTINATION;
            return Ok(self.true_path_heading);
        }

        let needs_rebuild = match &self.field {
            None => true,
            Some(field) => {
                let vessel_pix = pixel_position_in_map(
                    field.center,
                    node_extent_m(field),
                    node_extent_m(field),
                    field.side as u32,
                    vessel_pos,
                );
                vessel_pix.is_off_map()
            }
        };

        if needs_rebuild {
            if let Err(e) = self.rebuild_by_vessel_offset(store, beacons, vessel_pos, dest) {
                self.flags.state |= state_flags::RUNNING_BLIND;
                return Err(e);
            }
        }

        let field = self.field.as_ref().unwrap();
        let vessel_pix = pixel_position_in_map(
            field.center,
            node_extent_m(field),
            node_extent_m(field),
            field.side as u32,
            vessel_pos,
        );
        match field.at(vessel_pix) {
            Some(n) if n.weight >= 0.0 => {
                self.flags.state &= !state_flags::RUNNING_BLIND;
                self.true_path_heading = n.active_course;
                Ok(n.active_course)
            }
            _ => {
                self.flags.state |= state_flags::RUNNING_BLIND;
                Ok(self.true_path_heading)
            }
        }
    }

    pub fn override_active_course_all(&mut self, course: Bam16) {
        if let Some(field) = self.field.as_mut() {
            field.override_active_course_all(course);
        }
    }

    pub fn set_default_active_course(&mut self) {
        if let Some(field) = self.field.as_mut() {
            field.set_default_active_course();
        }
    }
}

impl Default for RouteController {
    fn default() -> Self {
        Self::new()
    }
}

fn node_extent_m(field: &PathField) -> f64 {
    crate::geometry::nautical_miles_to_meters(60.0) / field.side as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_controller_has_no_destination_and_is_not_running_blind_yet() {
        let rc = RouteController::new();
        assert!(rc.destination.is_none());
        assert_eq!(rc.flags.state, 0);
    }

    #[test]
    fn setting_destination_sets_have_destination_persistent_flag() {
        let mut rc = RouteController::new();
        rc.set_destination(WorldCoordinate { lon: 10.0, lat: 10.0 }, 100.0);
        assert_ne!(
            rc.persistent_flags & persistent_flags::HAVE_DESTINATION,
            0
        );
    }

    #[test]
    fn update_without_destination_runs_blind() {
        let mut rc = RouteController::new();
        let store = MapStore::in_memory(vec![
            crate::worldmap::L1Square {
                low: -100,
                high: -10,
                flags: 0,
                reserved: 0,
            };
            crate::worldmap::L1_SQUARE_COUNT
        ]);
        let beacons = BeaconTable::in_memory(
            [crate::beacon::BeaconIndexRecord { offset_to_first: 0, num_records: 0 }; 180],
            vec![],
        );
        let heading = rc
            .update(&store, &beacons, WorldCoordinate { lon: 10.0, lat: 10.0 })
            .unwrap();
        assert_eq!(heading, Bam16::default());
        assert_ne!(rc.flags.state & state_flags::RUNNING_BLIND, 0);
    }
}
