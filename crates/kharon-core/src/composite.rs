//! Composite extractor (C4): builds a 720×720 depth-code raster covering
//! a 60 nm × 60 nm window centered on an arbitrary (lat, lon).

use crate::depth;
use crate::geometry::{to_akn, AknPosition, WorldCoordinate};
use crate::worldmap::{L3_SIDE, MapStore};

pub const COMPOSITE_SIDE: usize = L3_SIDE;

/// Arctic threshold (inclusive): at or above this latitude the composite
/// is filled with a single deep-but-safe constant and no sampling is
/// done (spec §3, §8 Scenario 5).
pub const ARCTIC_LAT_THRESHOLD: f64 = 87.0;
/// Antarctic threshold (inclusive, as a magnitude): at or below this
/// latitude the composite is filled with a single "land/ice" constant.
pub const ANTARCTIC_LAT_THRESHOLD: f64 = -84.0;

/// Constant fill used near the North Pole: deep water, safe to treat as
/// a uniform traversable depth (code 155 ≈ 2200 m).
pub const ARCTIC_FILL_CODE: u8 = 155;
/// Constant fill used near Antarctica: treated as land/ice (depth 0).
pub const ANTARCTIC_FILL_CODE: u8 = 0;

#[derive(Debug, Clone)]
pub struct CompositeMap {
    pub center: WorldCoordinate,
    pub side: usize,
    pub codes: Vec<u8>,
}

impl CompositeMap {
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.codes[x + y * self.side]
    }

    fn set_if_shallower(&mut self, x: usize, y: usize, code: u8) {
        let idx = x + y * self.side;
        let existing = self.codes[idx];
        if existing == depth::UNKNOWN_DEPTH_CODE || code < existing {
            self.codes[idx] = code;
        }
    }
}

fn deg_per_nm(center_lat: f64) -> f64 {
    let far_edge = if center_lat < 0.0 {
        libm::fabs(center_lat - 0.5)
    } else {
        libm::fabs(center_lat + 0.5)
    };
    1.0 / (60.0 * libm::cos(far_edge.to_radians()))
}

/// Column within the composite for an AKN position, given the window's
/// AKN center and a longitude scale (cos of the position's co-latitude).
/// Returns `None` when the position falls outside the 60 nm window.
fn map_column(pos: AknPosition, center: AknPosition, scale: f64) -> Option<u16> {
    let mut akn_x = pos.akn_x;
    if akn_x < 0.0 {
        akn_x += 360.0;
    } else if akn_x >= 360.0 {
        akn_x -= 360.0;
    }
    let mut dx_deg = akn_x - center.akn_x;
    if libm::fabs(dx_deg) > 180.0 {
        if dx_deg < 0.0 {
            dx_deg += 360.0;
        } else {
            dx_deg -= 360.0;
        }
    }
    let dx_nm = scale * dx_deg * 60.0;
    if libm::fabs(dx_nm) >= 30.0 {
        return None;
    }
    let dx_left_nm = dx_nm + 30.0;
    let dx_left_col = dx_left_nm * (COMPOSITE_SIDE as f64 / 60.0);
    let col = libm::round(dx_left_col) as i64;
    if col < 0 || col as usize >= COMPOSITE_SIDE {
        None
    } else {
        Some(col as u16)
    }
}

fn map_row(pos: AknPosition, center: AknPosition) -> Option<u16> {
    let dy_deg = pos.akn_y - center.akn_y;
    let dy_nm = dy_deg * 60.0;
    if libm::fabs(dy_nm) >= 30.0 {
        return None;
    }
    let dy_top_nm = dy_nm + 30.0;
    let dy_top_row = dy_top_nm * (COMPOSITE_SIDE as f64 / 60.0);
    let row = libm::round(dy_top_row) as i64;
    if row < 0 || row as usize >= COMPOSITE_SIDE {
        None
    } else {
        Some(row as u16)
    }
}

/// Build a 60 nm × 60 nm composite centered on `latlon`, sampling from
/// `store`.
pub fn build_composite(store: &MapStore, latlon: WorldCoordinate) -> CompositeMap {
    let side = COMPOSITE_SIDE;
    if latlon.lat >= ARCTIC_LAT_THRESHOLD {
        return CompositeMap {
            center: latlon,
            side,
            codes: vec![ARCTIC_FILL_CODE; side * side],
        };
    }
    if latlon.lat <= ANTARCTIC_LAT_THRESHOLD {
        return CompositeMap {
            center: latlon,
            side,
            codes: vec![ANTARCTIC_FILL_CODE; side * side],
        };
    }

    let mut map = CompositeMap {
        center: latlon,
        side,
        codes: vec![depth::UNKNOWN_DEPTH_CODE; side * side],
    };

    let center = to_akn(latlon);
    let dpn = deg_per_nm(latlon.lat);
    let half_width_deg = dpn * 30.0;
    let left = libm::floor(center.akn_x - half_width_deg) as i32;
    let right = libm::ceil(center.akn_x + half_width_deg) as i32;
    let top = libm::floor(center.akn_y - 0.5) as i32;

    for map_y in top..=top + 1 {
        if map_y < 0 || map_y >= 180 {
            continue;
        }
        for map_x in left..=right {
            let akn_x_cell = (((map_x % 360) + 360) % 360) as u32;
            let akn_y_cell = map_y as u32;

            for y in 0..L3_SIDE {
                let in_akn_y = map_y as f64 + y as f64 / L3_SIDE as f64;
                let dy_deg = in_akn_y - center.akn_y;
                if libm::fabs(dy_deg) >= 0.5 {
                    if dy_deg >= 0.5 {
                        break;
                    }
                    continue;
                }
                let out_row = match map_row(
                    AknPosition { akn_x: 0.0, akn_y: in_akn_y },
                    center,
                ) {
                    Some(r) => r as usize,
                    None => continue,
                };
                let scale = libm::cos((in_akn_y - 90.0).to_radians());

                for x in 0..L3_SIDE {
                    let in_akn_x = map_x as f64 + x as f64 / L3_SIDE as f64;
                    let dx_deg = in_akn_x - center.akn_x;
                    let dx_nm = scale * dx_deg * 60.0;
                    if libm::fabs(dx_nm) < 30.0 {
                        let out_col = match map_column(
                            AknPosition { akn_x: in_akn_x, akn_y: in_akn_y },
                            center,
                            scale,
                        ) {
                            Some(c) => c as usize,
                            None => continue,
                        };
                        let code = store.depth_at(akn_x_cell, akn_y_cell, x, y);
                        map.set_if_shallower(out_col, out_row, code);
                    } else if dx_nm >= 30.0 {
                        break;
                    }
                }
            }
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worldmap::L1Square;

    fn open_water_store() -> MapStore {
        let grid = vec![
            L1Square {
                low: -4000,
                high: -10,
                flags: 0,
                reserved: 0,
            };
            crate::worldmap::L1_SQUARE_COUNT
        ];
        MapStore::in_memory(grid)
    }

    #[test]
    fn deg_per_nm_matches_equator_one_sixtieth() {
        let d = deg_per_nm(0.0);
        approx::assert_relative_eq!(d, 1.0 / 60.0, epsilon = 1e-9);
    }

    #[test]
    fn scenario_arctic_constant_fill() {
        let store = open_water_store();
        let map = build_composite(&store, WorldCoordinate { lon: 0.0, lat: 88.0 });
        assert!(map.codes.iter().all(|&c| c == ARCTIC_FILL_CODE));
    }

    #[test]
    fn scenario_antarctic_constant_fill() {
        let store = open_water_store();
        let map = build_composite(&store, WorldCoordinate { lon: 0.0, lat: -85.0 });
        assert!(map.codes.iter().all(|&c| c == ANTARCTIC_FILL_CODE));
    }

    #[test]
    fn open_water_composite_has_no_unknown_cells() {
        let store = open_water_store();
        let map = build_composite(&store, WorldCoordinate { lon: 10.0, lat: 10.0 });
        assert!(map.codes.iter().all(|&c| c != depth::UNKNOWN_DEPTH_CODE));
    }

    #[test]
    fn composite_sampling_min_depth_invariant() {
        // every cell either unknown or the minimum depth code of its
        // contributing source cells; with a uniform store, every cell
        // must equal that uniform encoded depth exactly.
        let store = open_water_store();
        let map = build_composite(&store, WorldCoordinate { lon: 10.0, lat: 10.0 });
        let expected = depth::encode(10);
        assert!(map.codes.iter().all(|&c| c == expected));
    }
}
