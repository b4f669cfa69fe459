//! Long-range beacon graph (C6): a sparse, precomputed set of waypoints
//! connected by a neighbor graph, used to seed the raster path field with
//! a cost-to-go estimate before the fine-grained relaxation runs.
//!
//! Grounded on the original's `beacon.c` and, for default beacon
//! placement, `mapping/pharos/default_beacons.c`.

use deku::prelude::*;

use crate::geometry::{pixel_position_in_map, to_akn, AknPosition, ImageCoordinate, WorldCoordinate};
use crate::pathfield::{PathField, VESSEL_BEACON_INHIBITION_RING_NM};
use crate::stack::RelaxationStack;
use crate::worldmap::{MapStore, L3_SIDE};

pub const MAX_BEACON_NEIGHBORS: usize = 8;
pub const MAX_PATH_MAP_BEACONS: usize = 12;
pub const BEACON_STACK_SIZE: usize = 16384;
pub const BEACON_INCLINATION_LIMIT: f64 = 84.0;

pub const DEFAULT_LAT_OFFSET_DEG: f64 = 1.0 / 8.0;
pub const DEFAULT_LAT_STEP_DEG: f64 = 1.0 / 4.0;
pub const DEFAULT_LAT_SOUTHERN_BOUNDS_AKN: f64 = 170.0;
const DEG_TO_METER: f64 = 111_320.0;
pub const DEFAULT_LON_STEP_MET: f64 = (19.0 / 60.0) * DEG_TO_METER;

#[derive(Debug, Clone, Copy, DekuRead, DekuWrite)]
#[deku(endian = "little")]
pub struct BeaconNeighbor {
    pub nbr_index: u32,
    pub path_weight: f32,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
#[deku(endian = "little")]
pub struct BeaconRecord {
    pub akn_x: f32,
    pub akn_y: f32,
    pub num_neighbors: i32,
    pub index: u32,
    pub neighbors: [BeaconNeighbor; MAX_BEACON_NEIGHBORS],
}

#[derive(Debug, Clone, Copy, DekuRead, DekuWrite)]
#[deku(endian = "little")]
pub struct BeaconIndexRecord {
    pub offset_to_first: u32,
    pub num_records: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum BeaconStoreError {
    #[error("beacon index file has wrong size: {found} bytes, expected {expected}")]
    IndexSizeMismatch { found: u64, expected: u64 },
    #[error("beacon I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("beacon record decode error: {0}")]
    Decode(String),
}

/// A beacon placed near the map center, with its precomputed cost-to-go
/// weight and display position, grounded on `map_beacon_reference_type`.
#[derive(Debug, Clone, Copy)]
pub struct BeaconReference {
    pub index: u32,
    pub coords: AknPosition,
    pub pos_in_map: ImageCoordinate,
    pub center_dist_met: f64,
    pub path_weight: f64,
}

pub struct BeaconTable {
    indices: [BeaconIndexRecord; 180],
    records: Vec<BeaconRecord>,
    weights: Vec<f32>,
    stack: RelaxationStack,
}

impl BeaconTable {
    pub fn load(store_root: &std::path::Path) -> Result<Self, BeaconStoreError> {
        let idx_bytes = std::fs::read(store_root.join("beacons.idx"))?;
        let expected = 180 * 8;
        if idx_bytes.len() as u64 != expected as u64 {
            return Err(BeaconStoreError::IndexSizeMismatch {
                found: idx_bytes.len() as u64,
                expected: expected as u64,
            });
        }
        let mut indices = [BeaconIndexRecord { offset_to_first: 0, num_records: 0 }; 180];
        for (i, chunk) in idx_bytes.chunks_exact(8).enumerate() {
            let (_, rec) = BeaconIndexRecord::from_bytes((chunk, 0))
                .map_err(|e| BeaconStoreError::Decode(e.to_string()))?;
            indices[i] = rec;
        }

        let bin_bytes = std::fs::read(store_root.join("beacons.bin"))?;
        let mut records = Vec::with_capacity(bin_bytes.len() / 80);
        for chunk in bin_bytes.chunks_exact(80) {
            let (_, rec) = BeaconRecord::from_bytes((chunk, 0))
                .map_err(|e| BeaconStoreError::Decode(e.to_string()))?;
            records.push(rec);
        }
        let weights = vec![-1.0f32; records.len()];

        Ok(BeaconTable {
            indices,
            records,
            weights,
            stack: RelaxationStack::with_capacity(BEACON_STACK_SIZE),
        })
    }

    #[cfg(test)]
    pub fn in_memory(indices: [BeaconIndexRecord; 180], records: Vec<BeaconRecord>) -> Self {
        let weights = vec![-1.0f32; records.len()];
        BeaconTable {
            indices,
            records,
            weights,
            stack: RelaxationStack::with_capacity(BEACON_STACK_SIZE),
        }
    }

    fn add_to_stack(&mut self, root_idx: u32, weight_to_neighbor: f32, neighbor_idx: u32) {
        if self.records[neighbor_idx as usize].num_neighbors <= 0 {
            return;
        }
        let root_weight = self.weights[root_idx as usize];
        let neighbor_weight = self.weights[neighbor_idx as usize];
        let path_weight = root_weight + weight_to_neighbor;
        if neighbor_weight < 0.0 || neighbor_weight > path_weight {
            self.weights[neighbor_idx as usize] = path_weight;
            self.stack.push(neighbor_idx);
        }
    }

    fn process_next(&mut self) {
        let root_idx = match self.stack.pop() {
            Some(i) => i,
            None => return,
        };
        let root = self.records[root_idx as usize].clone();
        let n = root.num_neighbors.max(0) as usize;
        for nbr in root.neighbors.iter().take(n) {
            self.add_to_stack(root_idx, nbr.path_weight, nbr.nbr_index);
        }
    }

    fn get_beacon_indices(&self, map_center: AknPosition) -> (u32, u32) {
        let mut row_low = libm::floor(map_center.akn_y) as u32;
        let row_high_signed = libm::round(map_center.akn_y) as u32;
        let mut row_high = row_high_signed;
        if row_low == row_high && row_low > 0 {
            row_low -= 1;
        }
        if row_high == 180 {
            row_high = 179;
        }
        let rec = self.indices[row_low as usize];
        let first = rec.offset_to_first;
        let mut num = rec.num_records;
        if row_low != row_high {
            num += self.indices[row_high as usize].num_records;
        }
        (first, num)
    }

    fn add_beacon_to_list(
        &self,
        map_center: AknPosition,
        candidate: &BeaconRecord,
        beacon_idx: u32,
        lat_correction: f64,
        path_field: &PathField,
        beacons: &mut Vec<BeaconReference>,
    ) {
        let mut dx = libm::fabs(candidate.akn_x as f64 - map_center.akn_x);
        let dy = libm::fabs(candidate.akn_y as f64 - map_center.akn_y);
        if dx > 180.0 {
            dx = 360.0 - dx;
        }
        dx *= lat_correction;
        if dx >= 0.5 || dy >= 0.5 {
            return;
        }
        let dist = libm::sqrt(dx * dx + dy * dy);
        if dist < 1.0 / 60.0 {
            return;
        }
        let apos = AknPosition {
            akn_x: candidate.akn_x as f64,
            akn_y: candidate.akn_y as f64,
        };
        let world = crate::geometry::from_akn(apos);
        let pix = pixel_position_in_map(
            path_field.center,
            node_extent_m(path_field),
            node_extent_m(path_field),
            path_field.side as u32,
            world,
        );
        if pix.is_off_map() {
            return;
        }
        let candidate_ref = BeaconReference {
            index: beacon_idx,
            coords: apos,
            pos_in_map: pix,
            center_dist_met: dist,
            path_weight: -1.0,
        };
        if beacons.len() < MAX_PATH_MAP_BEACONS {
            beacons.push(candidate_ref);
            resort_beacons(beacons);
        } else if dist < beacons[MAX_PATH_MAP_BEACONS - 1].center_dist_met {
            beacons[MAX_PATH_MAP_BEACONS - 1] = candidate_ref;
            resort_beacons(beacons);
        }
    }

    /// Populates a path field's beacon list for its current center,
    /// pulling each kept beacon's precomputed cost-to-go weight.
    pub fn load_into_path_field(&self, path_field: &PathField) -> Vec<BeaconReference> {
        let map_center = to_akn(path_field.center);
        let (first, num) = self.get_beacon_indices(map_center);
        let lat_scale = libm::sin(map_center.akn_y.to_radians());
        let mut beacons = Vec::new();
        for i in first..first + num {
            let rec = &self.records[i as usize];
            self.add_beacon_to_list(map_center, rec, i, lat_scale, path_field, &mut beacons);
        }
        for b in beacons.iter_mut() {
            b.path_weight = self.weights[b.index as usize] as f64;
        }
        beacons
    }

    /// Offline-style per-route seeding: builds a path field centered on
    /// the destination, then floods the beacon graph outward from every
    /// beacon reachable there. Returns an error if the destination has
    /// no accessible beacons nearby (treated as unreachable).
    pub fn trace_paths_to_destination(
        &mut self,
        store: &MapStore,
        destination: WorldCoordinate,
    ) -> Result<(), BeaconUnreachable> {
        for w in self.weights.iter_mut() {
            *w = -1.0;
        }
        let mut dest = destination;
        if dest.lon < 0.0 {
            dest.lon += 360.0;
        }
        let composite = crate::composite::build_composite(store, dest);
        let mut field = PathField::new(&composite);
        field.reset();
        let dest_pix = pixel_position_in_map(
            dest,
            node_extent_m(&field),
            node_extent_m(&field),
            field.side as u32,
            dest,
        );
        field.seed_point(dest_pix, 0.0);
        field.drain_and_assign_courses(dest.lat);

        let beacons = self.load_into_path_field(&field);
        if beacons.is_empty() {
            return Err(BeaconUnreachable);
        }
        self.stack.clear();
        for b in &beacons {
            let idx = b.pos_in_map.x as usize + b.pos_in_map.y as usize * L3_SIDE;
            let weight = field.nodes[idx].weight;
            if weight > 0.0 {
                self.weights[b.index as usize] = weight as f32;
                self.stack.push(b.index);
            }
        }
        while !self.stack.is_empty() {
            self.process_next();
        }
        Ok(())
    }
}

fn resort_beacons(beacons: &mut [BeaconReference]) {
    if beacons.len() <= 1 {
        return;
    }
    let mut end = beacons.len() - 1;
    while end > 0 {
        let prev = end - 1;
        if beacons[end].center_dist_met < beacons[prev].center_dist_met {
            beacons.swap(prev, end);
        } else {
            break;
        }
        end = prev;
    }
}

fn node_extent_m(field: &PathField) -> f64 {
    crate::geometry::nautical_miles_to_meters(60.0) / field.side as f64
}

#[derive(Debug, thiserror::Error)]
#[error("no accessible beacons found near destination; it appears to be unreachable")]
pub struct BeaconUnreachable;

/// True if a beacon's candidate seed should be skipped because the
/// vessel is already within the raster's fine-grained reach.
pub fn is_inhibited_by_vessel_proximity(vessel: WorldCoordinate, beacon: WorldCoordinate) -> bool {
    crate::geometry::distance_meters(vessel, beacon)
        < crate::geometry::nautical_miles_to_meters(VESSEL_BEACON_INHIBITION_RING_NM)
}

/// Generates the default global beacon placement grid, grounded on
/// `default_beacons.c`: roughly-equal-area rows stepping south from the
/// pole, skipping rows over solid land and near-vertical magnetic dip.
pub fn generate_default_positions<F>(mut water_and_inclination_ok: F) -> Vec<AknPosition>
where
    F: FnMut(AknPosition) -> bool,
{
    let mut out = Vec::new();
    let mut akn_y = DEFAULT_LAT_OFFSET_DEG;
    while akn_y < DEFAULT_LAT_SOUTHERN_BOUNDS_AKN {
        let circum_scale = libm::sin(akn_y.to_radians());
        let circum_met = circum_scale * 360.0 * DEG_TO_METER;
        let steps = libm::ceil(circum_met / DEFAULT_LON_STEP_MET).max(1.0);
        let step_size_met = circum_met / steps;
        let meter_to_deg = 1.0 / DEG_TO_METER;
        let mut i = 0.0;
        while i < steps {
            let akn_x = if circum_scale > 0.0 {
                i * step_size_met * meter_to_deg / circum_scale
            } else {
                0.0
            };
            let pos = AknPosition { akn_x, akn_y };
            if water_and_inclination_ok(pos) {
                out.push(pos);
            }
            i += 1.0;
        }
        akn_y += DEFAULT_LAT_STEP_DEG;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_record(index: u32) -> BeaconRecord {
        BeaconRecord {
            akn_x: 0.0,
            akn_y: 0.0,
            num_neighbors: -1,
            index,
            neighbors: [BeaconNeighbor { nbr_index: 0, path_weight: 0.0 }; MAX_BEACON_NEIGHBORS],
        }
    }

    #[test]
    fn resort_moves_only_the_out_of_order_tail_entry() {
        let mut list = vec![
            BeaconReference {
                index: 0,
                coords: AknPosition { akn_x: 0.0, akn_y: 0.0 },
                pos_in_map: ImageCoordinate { x: 0, y: 0 },
                center_dist_met: 1.0,
                path_weight: 0.0,
            },
            BeaconReference {
                index: 1,
                coords: AknPosition { akn_x: 0.0, akn_y: 0.0 },
                pos_in_map: ImageCoordinate { x: 0, y: 0 },
                center_dist_met: 2.0,
                path_weight: 0.0,
            },
            BeaconReference {
                index: 2,
                coords: AknPosition { akn_x: 0.0, akn_y: 0.0 },
                pos_in_map: ImageCoordinate { x: 0, y: 0 },
                center_dist_met: 0.5,
                path_weight: 0.0,
            },
        ];
        resort_beacons(&mut list);
        let dists: Vec<f64> = list.iter().map(|b| b.center_dist_met).collect();
        assert_eq!(dists, vec![0.5, 1.0, 2.0]);
    }

    #[test]
    fn neighbor_with_no_neighbors_initialized_is_not_added() {
        let mut table = BeaconTable::in_memory(
            [BeaconIndexRecord { offset_to_first: 0, num_records: 0 }; 180],
            vec![blank_record(0), blank_record(1)],
        );
        table.weights[0] = 5.0;
        table.add_to_stack(0, 1.0, 1);
        assert!(table.stack.pop().is_none());
    }

    #[test]
    fn default_beacon_generation_skips_rows_failing_the_predicate() {
        let positions = generate_default_positions(|_| false);
        assert!(positions.is_empty());
    }
}
