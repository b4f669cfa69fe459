//! Path field (C5): raster Dijkstra relaxation over the 720x720 composite,
//! producing per-cell parent pointers and true/active course vectors.
//!
//! Grounded on the original's `path_map.c` stack-based relaxation and
//! `world_map.c`'s `mark_land_adjacency`. Penalties, the 8-neighbor
//! traversal order, and the 5-generation course-assignment walk all
//! mirror that algorithm; only naming and error handling are idiomatic
//! Rust.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::angles::Bam16;
use crate::composite::CompositeMap;
use crate::geometry::{offset_mask, offset_mask_wide, ImageCoordinate, WorldCoordinate};
use crate::stack::RelaxationStack;

pub const SIDE: usize = crate::composite::COMPOSITE_SIDE;
pub const NUM_ANCESTORS_FOR_DIRECTION: usize = 5;

/// Below this depth, a cell is fully blocked regardless of local context.
pub const ABS_MIN_TRAVERSABLE_DEPTH_METERS: f64 = 3.0;
/// Below this depth a traversal penalty is applied but the cell is not
/// outright blocked.
pub const MIN_TRAVERSABLE_DEPTH_METERS: f64 = 6.0;
/// Beacons within this radius of the vessel are not seeded, since the
/// vessel is already inside the fine-grained raster's reach.
pub const VESSEL_BEACON_INHIBITION_RING_NM: f64 = 4.0;
/// Recenter distance used when the vessel nears the edge of the window.
/// The spec widens this from the original's 10 nm to 15 nm.
pub const VESSEL_OFFSET_FROM_MAP_CENTER_NM: f64 = 15.0;

const PROCESSED: u8 = 1;
const NO_ACCESS: u8 = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureNode {
    pub depth_meters: i16,
    pub land_cnt: u8,
    pub near_cnt: u8,
}

/// Derived from a [`CompositeMap`]'s depth codes: per-cell traversal
/// hazard counts, grounded on `mark_land_adjacency`.
#[derive(Debug, Clone)]
pub struct FeatureGrid {
    pub side: usize,
    pub nodes: Vec<FeatureNode>,
}

impl FeatureGrid {
    pub fn build(composite: &CompositeMap) -> Self {
        let side = composite.side;
        let mut nodes = vec![FeatureNode::default(); side * side];
        for y in 0..side {
            for x in 0..side {
                let code = composite.get(x, y);
                // decode() saturates unknown (255) to 0xFFFF, which as a
                // signed i16 becomes -1: indistinguishable from "land" to
                // the penalty function below. That is intentional: areas
                // we have no data for are treated as impassable.
                let meters = crate::depth::decode(code) as i16;
                nodes[x + y * side].depth_meters = meters;
            }
        }
        let mut grid = FeatureGrid { side, nodes };
        grid.mark_land_adjacency();
        grid
    }

    fn idx(&self, x: usize, y: usize) -> usize {
        x + y * self.side
    }

    fn is_land(&self, x: usize, y: usize) -> bool {
        (self.nodes[self.idx(x, y)].depth_meters as f64) <= MIN_TRAVERSABLE_DEPTH_METERS
    }

    fn mark_land_adjacency(&mut self) {
        let side = self.side;
        for y in 1..side - 1 {
            for x in 1..side - 1 {
                if !self.is_land(x, y) {
                    continue;
                }
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        let nx = (x as i32 + dx) as usize;
                        let ny = (y as i32 + dy) as usize;
                        let i = self.idx(nx, ny);
                        self.nodes[i].land_cnt = self.nodes[i].land_cnt.saturating_add(1);
                    }
                }
            }
        }
        // ring at radius 2 (12 cells) and radius 3 (20 cells), both
        // recorded as "near" rather than "land" adjacency.
        const RING2: &[(i32, i32)] = &[
            (-1, -2), (0, -2), (1, -2),
            (-2, -1), (2, -1),
            (-2, 0), (2, 0),
            (-2, 1), (2, 1),
            (-1, 2), (0, 2), (1, 2),
        ];
        const RING3: &[(i32, i32)] = &[
            (-2, -3), (-1, -3), (0, -3), (1, -3), (2, -3),
            (-3, -2), (3, -2),
            (-3, -1), (3, -1),
            (-3, 0), (3, 0),
            (-3, 1), (3, 1),
            (-3, 2), (3, 2),
            (-2, 3), (-1, 3), (0, 3), (1, 3), (2, 3),
        ];
        for y in 2..side - 2 {
            for x in 2..side - 2 {
                if !self.is_land(x, y) {
                    continue;
                }
                for &(dx, dy) in RING2 {
                    let nx = (x as i32 + dx) as usize;
                    let ny = (y as i32 + dy) as usize;
                    let i = self.idx(nx, ny);
                    self.nodes[i].near_cnt = self.nodes[i].near_cnt.saturating_add(1);
                }
            }
        }
        for y in 3..side - 3 {
            for x in 3..side - 3 {
                if !self.is_land(x, y) {
                    continue;
                }
                for &(dx, dy) in RING3 {
                    let nx = (x as i32 + dx) as usize;
                    let ny = (y as i32 + dy) as usize;
                    let i = self.idx(nx, ny);
                    self.nodes[i].near_cnt = self.nodes[i].near_cnt.saturating_add(1);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PathNode {
    pub parent_id: i32,
    pub weight: f64,
    pub passage_penalty: f64,
    pub true_course: Bam16,
    pub active_course: Bam16,
    flags: u8,
}

impl PathNode {
    fn is_processed(&self) -> bool {
        self.flags & PROCESSED != 0
    }
    fn is_no_access(&self) -> bool {
        self.flags & NO_ACCESS != 0
    }
}

/// A seeded reference to a beacon used when loading long-range cost-to-go
/// estimates into the raster (populated by `beacon.rs`).
#[derive(Debug, Clone, Copy)]
pub struct BeaconSeed {
    pub pos: ImageCoordinate,
    pub path_weight: f64,
}

pub struct PathField {
    pub center: WorldCoordinate,
    pub side: usize,
    pub feature: FeatureGrid,
    pub nodes: Vec<PathNode>,
    stack: RelaxationStack,
    rng: StdRng,
}

const OFF_E: (i32, i32) = (1, 0);
const OFF_W: (i32, i32) = (-1, 0);
const OFF_N: (i32, i32) = (0, -1);
const OFF_S: (i32, i32) = (0, 1);
const OFF_NE: (i32, i32) = (1, -1);
const OFF_NW: (i32, i32) = (-1, -1);
const OFF_SE: (i32, i32) = (1, 1);
const OFF_SW: (i32, i32) = (-1, 1);

impl PathField {
    pub fn new(composite: &CompositeMap) -> Self {
        let side = composite.side;
        let feature = FeatureGrid::build(composite);
        PathField {
            center: composite.center,
            side,
            feature,
            nodes: vec![PathNode::default(); side * side],
            stack: RelaxationStack::with_capacity(side * side),
            // seeded deterministically: jitter only needs to break ties,
            // not be cryptographically random.
            rng: StdRng::seed_from_u64(12345),
        }
    }

    fn idx(&self, x: usize, y: usize) -> usize {
        x + y * self.side
    }

    pub fn reset(&mut self) {
        for n in self.nodes.iter_mut() {
            *n = PathNode {
                parent_id: -1,
                weight: -1.0,
                passage_penalty: 0.0,
                true_course: Bam16::default(),
                active_course: Bam16::default(),
                flags: 0,
            };
        }
        self.stack.clear();
        self.rng = StdRng::seed_from_u64(12345);
    }

    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.side && (y as usize) < self.side
    }

    /// Core relaxation step shared by axis and diagonal moves.
    fn relax(&mut self, root_idx: usize, new_x: i32, new_y: i32, traverse_wt: f64) {
        if !self.in_bounds(new_x, new_y) {
            return;
        }
        let new_idx = self.idx(new_x as usize, new_y as usize);
        if self.nodes[new_idx].is_no_access() {
            return;
        }
        let feat = self.feature.nodes[new_idx];
        let mut penalty = if feat.land_cnt > 0 {
            25.0 + 5.0 * feat.land_cnt as f64
        } else if feat.near_cnt > 0 {
            0.3 * feat.near_cnt as f64
        } else {
            0.0
        };

        let depth = feat.depth_meters as f64;
        if depth <= ABS_MIN_TRAVERSABLE_DEPTH_METERS {
            self.nodes[new_idx].weight = -1.0;
            self.nodes[new_idx].passage_penalty = 1000.0;
            self.nodes[new_idx].parent_id = -1;
            self.nodes[new_idx].flags |= NO_ACCESS;
            return;
        }
        if depth < MIN_TRAVERSABLE_DEPTH_METERS {
            penalty += 20.0 * (MIN_TRAVERSABLE_DEPTH_METERS - depth);
        }

        let jitter = 0.1 * (self.rng.gen::<f64>() - 0.5);
        let root = self.nodes[root_idx];
        let new_weight = root.weight + penalty + traverse_wt + jitter;

        let child = self.nodes[new_idx];
        if child.is_processed() && child.weight >= 0.0 && child.weight <= new_weight {
            return;
        }
        self.nodes[new_idx].parent_id = root_idx as i32;
        self.nodes[new_idx].weight = new_weight;
        self.nodes[new_idx].passage_penalty = penalty;
        self.nodes[new_idx].flags |= PROCESSED;
        self.stack.push(new_idx as u32);
    }

    fn relax_axis(&mut self, root_idx: usize, off: (i32, i32)) {
        let (rx, ry) = (
            (root_idx % self.side) as i32,
            (root_idx / self.side) as i32,
        );
        self.relax(root_idx, rx + off.0, ry + off.1, 1.0);
    }

    fn relax_diag(&mut self, root_idx: usize, off: (i32, i32)) {
        let (rx, ry) = (
            (root_idx % self.side) as i32,
            (root_idx / self.side) as i32,
        );
        let new_x = rx + off.0;
        let new_y = ry + off.1;
        if !self.in_bounds(new_x, new_y) {
            return;
        }
        let new_idx = self.idx(new_x as usize, new_y as usize);
        if self.nodes[new_idx].is_no_access() {
            return;
        }
        // the two axis-adjacent cells that "corner" this diagonal step.
        let vert_idx = self.idx(rx as usize, new_y as usize);
        let horiz_idx = self.idx(new_x as usize, ry as usize);
        let vert = self.nodes[vert_idx];
        let horiz = self.nodes[horiz_idx];
        let vert_ok = !vert.is_no_access();
        let horiz_ok = !horiz.is_no_access();
        if !vert_ok && !horiz_ok {
            return;
        }
        let nbr_penalty = if vert_ok && (!horiz_ok || vert.passage_penalty <= horiz.passage_penalty)
        {
            vert.passage_penalty
        } else {
            horiz.passage_penalty
        };
        let traverse_wt = nbr_penalty + 1.25;
        self.relax(root_idx, new_x, new_y, traverse_wt);
    }

    fn process_next(&mut self) {
        let root_idx = match self.stack.pop() {
            Some(i) => i as usize,
            None => return,
        };
        self.relax_axis(root_idx, OFF_E);
        self.relax_axis(root_idx, OFF_W);
        self.relax_axis(root_idx, OFF_N);
        self.relax_axis(root_idx, OFF_S);
        self.relax_diag(root_idx, OFF_NE);
        self.relax_diag(root_idx, OFF_NW);
        self.relax_diag(root_idx, OFF_SE);
        self.relax_diag(root_idx, OFF_SW);
    }

    /// Seeds a single cell directly (used for the destination and for
    /// beacons loaded from the long-range graph).
    pub fn seed_point(&mut self, pos: ImageCoordinate, weight: f64) {
        if pos.is_off_map() {
            return;
        }
        let idx = self.idx(pos.x as usize, pos.y as usize);
        self.nodes[idx] = PathNode {
            parent_id: -1,
            weight,
            passage_penalty: 0.0,
            true_course: Bam16::default(),
            active_course: Bam16::default(),
            flags: PROCESSED,
        };
        self.stack.push(idx as u32);
    }

    /// Drains the relaxation stack, compacting it on overflow, then
    /// assigns course vectors from the resulting parent tree.
    pub fn drain_and_assign_courses(&mut self, center_latitude: f64) {
        while !self.stack.is_empty() {
            self.process_next();
        }
        self.build_course_vectors(center_latitude);
    }

    fn pos_of(&self, idx: usize) -> ImageCoordinate {
        ImageCoordinate {
            x: (idx % self.side) as u16,
            y: (idx / self.side) as u16,
        }
    }

    fn build_course_vectors(&mut self, center_latitude: f64) {
        let scale = center_latitude.to_radians().cos();
        for idx in 0..self.nodes.len() {
            if self.nodes[idx].weight < 0.0 {
                continue;
            }
            let pos = self.pos_of(idx);
            let mut ancestor_idx = idx;
            let mut base_direction: Option<u8> = None;
            let mut last_valid = idx;
            for gen in 0..NUM_ANCESTORS_FOR_DIRECTION {
                let parent = self.nodes[ancestor_idx].parent_id;
                if parent < 0 {
                    break;
                }
                let parent = parent as usize;
                let parent_pos = self.pos_of(parent);
                let ancestor_pos = self.pos_of(ancestor_idx);
                if gen == 0 {
                    base_direction = Some(offset_mask(parent_pos, ancestor_pos));
                } else {
                    let dir = offset_mask_wide(parent_pos, ancestor_pos);
                    if let Some(base) = base_direction {
                        if dir & base == 0 {
                            break;
                        }
                    }
                }
                last_valid = parent;
                ancestor_idx = parent;
            }
            let ancestor_pos = self.pos_of(last_valid);
            let dx = ancestor_pos.x as f64 - pos.x as f64;
            let dy = ancestor_pos.y as f64 - pos.y as f64;
            let theta = libm::atan2(dx * scale, -dy).to_degrees();
            let course = Bam16::from_degrees(theta);
            self.nodes[idx].true_course = course;
            self.nodes[idx].active_course = course;
        }
    }

    pub fn override_active_course_all(&mut self, course: Bam16) {
        for n in self.nodes.iter_mut() {
            n.active_course = course;
        }
    }

    pub fn set_default_active_course(&mut self) {
        for n in self.nodes.iter_mut() {
            n.active_course = n.true_course;
        }
    }

    pub fn at(&self, pos: ImageCoordinate) -> Option<&PathNode> {
        if pos.is_off_map() {
            return None;
        }
        self.nodes.get(self.idx(pos.x as usize, pos.y as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth;

    fn open_water_composite() -> CompositeMap {
        CompositeMap {
            center: WorldCoordinate { lon: 10.0, lat: 10.0 },
            side: SIDE,
            codes: vec![depth::encode(50); SIDE * SIDE],
        }
    }

    #[test]
    fn feature_grid_open_water_has_no_hazard_counts() {
        let composite = open_water_composite();
        let grid = FeatureGrid::build(&composite);
        assert!(grid.nodes.iter().all(|n| n.land_cnt == 0 && n.near_cnt == 0));
    }

    #[test]
    fn feature_grid_marks_land_neighbors_including_self() {
        let mut composite = open_water_composite();
        let cx = SIDE / 2;
        let cy = SIDE / 2;
        composite.codes[cx + cy * SIDE] = depth::encode(0);
        let grid = FeatureGrid::build(&composite);
        // the land cell and its 8 neighbors (9 total) all get land_cnt
        // incremented by this single land cell.
        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                let x = (cx as i32 + dx) as usize;
                let y = (cy as i32 + dy) as usize;
                assert_eq!(grid.nodes[x + y * SIDE].land_cnt, 1);
            }
        }
    }

    #[test]
    fn destination_seed_has_zero_weight_and_no_parent() {
        let composite = open_water_composite();
        let mut field = PathField::new(&composite);
        field.reset();
        field.seed_point(ImageCoordinate { x: 360, y: 360 }, 0.0);
        field.drain_and_assign_courses(10.0);
        let node = field.at(ImageCoordinate { x: 360, y: 360 }).unwrap();
        assert_eq!(node.parent_id, -1);
        assert_eq!(node.weight, 0.0);
    }

    #[test]
    fn open_water_relaxation_propagates_finite_weights_outward() {
        let composite = open_water_composite();
        let mut field = PathField::new(&composite);
        field.reset();
        field.seed_point(ImageCoordinate { x: 360, y: 360 }, 0.0);
        field.drain_and_assign_courses(10.0);
        let near = field.at(ImageCoordinate { x: 361, y: 360 }).unwrap();
        assert!(near.weight > 0.0);
        assert!(near.parent_id >= 0);
    }

    #[test]
    fn land_cell_becomes_no_access_and_blocks_relaxation() {
        let mut composite = open_water_composite();
        composite.codes[361 + 360 * SIDE] = depth::encode(0);
        let mut field = PathField::new(&composite);
        field.reset();
        field.seed_point(ImageCoordinate { x: 360, y: 360 }, 0.0);
        field.drain_and_assign_courses(10.0);
        let land = field.at(ImageCoordinate { x: 361, y: 360 }).unwrap();
        assert_eq!(land.weight, -1.0);
    }
}
