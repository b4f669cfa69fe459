//! Image-to-sphere accumulator (C9): projects camera pixels onto a
//! latitude/longitude grid aligned to the image center, distributing
//! each pixel's contribution across its 2x2 neighboring output cells.
//!
//! Grounded on `core/core_modules/optical_up/accumulator.c`
//! (`push_pixel_to_accumulator`, `update_world_pix`,
//! `clear_vy_accumulator`) and `dist_map.h`'s 64-entry weight table,
//! transcribed verbatim below.

/// One pre-split weighting of a subpixel position among its surrounding
/// accumulator quad. Every entry sums to 64 (spec §4.7, §8 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionWeights {
    pub nw: u8,
    pub ne: u8,
    pub sw: u8,
    pub se: u8,
}

/// 8x8 grid of subpixel positions (`map_idx = frac_x + frac_y*8`),
/// transcribed byte-for-byte from `dist_map.h`.
pub const DISTRIBUTION_MAP: [DistributionWeights; 64] = {
    const fn w(nw: u8, ne: u8, sw: u8, se: u8) -> DistributionWeights {
        DistributionWeights { nw, ne, sw, se }
    }
    [
        w(64, 0, 0, 0), w(56, 8, 0, 0), w(48, 16, 0, 0), w(40, 24, 0, 0),
        w(32, 32, 0, 0), w(24, 40, 0, 0), w(16, 48, 0, 0), w(8, 56, 0, 0),
        w(56, 0, 8, 0), w(49, 7, 7, 1), w(42, 14, 6, 2), w(35, 21, 5, 3),
        w(28, 28, 4, 4), w(21, 35, 3, 5), w(14, 42, 2, 6), w(7, 49, 1, 7),
        w(48, 0, 16, 0), w(42, 6, 14, 2), w(36, 12, 12, 4), w(30, 18, 10, 6),
        w(24, 24, 8, 8), w(18, 30, 6, 10), w(12, 36, 4, 12), w(6, 42, 2, 14),
        w(40, 0, 24, 0), w(35, 5, 21, 3), w(30, 10, 18, 6), w(25, 15, 15, 9),
        w(20, 20, 12, 12), w(15, 25, 9, 15), w(10, 30, 6, 18), w(5, 35, 3, 21),
        w(32, 0, 32, 0), w(28, 4, 28, 4), w(24, 8, 24, 8), w(20, 12, 20, 12),
        w(16, 16, 16, 16), w(12, 20, 12, 20), w(8, 24, 8, 24), w(4, 28, 4, 28),
        w(24, 0, 40, 0), w(21, 3, 35, 5), w(18, 6, 30, 10), w(15, 9, 25, 15),
        w(12, 12, 20, 20), w(9, 15, 15, 25), w(6, 18, 10, 30), w(3, 21, 5, 35),
        w(16, 0, 48, 0), w(14, 2, 42, 6), w(12, 4, 36, 12), w(10, 6, 30, 18),
        w(8, 8, 24, 24), w(6, 10, 18, 30), w(4, 12, 12, 36), w(2, 14, 6, 42),
        w(8, 0, 56, 0), w(7, 1, 49, 7), w(6, 2, 42, 14), w(5, 3, 35, 21),
        w(4, 4, 28, 28), w(3, 5, 21, 35), w(2, 6, 14, 42), w(1, 7, 7, 49),
    ]
};

/// A 3-vector in the unit sphere's world frame: right-handed, X left,
/// Y up, Z forward.
pub type SphereVector = [f64; 3];

/// Convert a unit-sphere position to (lat, lon) degrees, spec §4.7:
/// `lat = asin(0.99999 * v_y)`; `lon = atan2(-v_x, v_z)`, normalized to
/// `(-180, 180]` (the original normalizes to `[0,360)`; spec.md is
/// explicit about the signed range, so that governs here).
pub fn vector_to_latlon_deg(v: SphereVector) -> (f64, f64) {
    let mut lon = libm::atan2(-v[0], v[2]).to_degrees();
    if lon <= -180.0 {
        lon += 360.0;
    } else if lon > 180.0 {
        lon -= 360.0;
    }
    let lat = libm::asin(0.99999 * v[1]).to_degrees();
    (lat, lon)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AccumulatorCell {
    pub y: u32,
    pub v: u32,
    pub z: u32,
    pub w: u32,
}

impl AccumulatorCell {
    fn update(&mut self, y_val: u8, v_val: u8, border: u32, wt: u32) {
        self.y += y_val as u32 * wt;
        self.v += v_val as u32 * wt;
        self.z |= border;
        self.w += wt;
    }
}

/// An output pixel produced by [`ImageAccumulator::flatten`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPixel {
    pub y: u8,
    pub v: u8,
    pub border: u8,
}

/// Sentinel for a cell with no contributions (or the always-empty outer
/// ring): mid-gray, border flag set (spec §4.7).
pub const EMPTY_PIXEL: OutputPixel = OutputPixel { y: 128, v: 128, border: 255 };

/// Projects camera pixels onto an equirectangular grid aligned to an
/// image center, accumulating weighted contributions into a 2x2 quad
/// per pixel (spec §4.7). `cols`/`rows` include the always-empty outer
/// border ring produced by [`flatten`](Self::flatten).
pub struct ImageAccumulator {
    pub cols: usize,
    pub rows: usize,
    half_width_deg: f64,
    half_height_deg: f64,
    cells: Vec<AccumulatorCell>,
}

impl ImageAccumulator {
    pub fn new(cols: usize, rows: usize, width_deg: f64, height_deg: f64) -> Self {
        ImageAccumulator {
            cols,
            rows,
            half_width_deg: width_deg / 2.0,
            half_height_deg: height_deg / 2.0,
            cells: vec![AccumulatorCell::default(); cols * rows],
        }
    }

    pub fn clear(&mut self) {
        for c in self.cells.iter_mut() {
            *c = AccumulatorCell::default();
        }
    }

    fn cell_mut(&mut self, x: usize, y: usize) -> &mut AccumulatorCell {
        &mut self.cells[x + y * self.cols]
    }

    /// Pushes one camera pixel onto the accumulator. `pix_per_degree_x8`
    /// is `8 * pix_per_degree` (spec: "Multiply by 8 x pix_per_degree to
    /// obtain a subpixel index"). Pixels that fall outside the
    /// accumulator's extent are dropped silently.
    #[allow(clippy::too_many_arguments)]
    pub fn push_pixel(
        &mut self,
        sphere_pos: SphereVector,
        y_val: u8,
        v_val: u8,
        border: bool,
        image_center_lat_deg: f64,
        image_center_lon_deg: f64,
        pix_per_degree_x8: f64,
    ) {
        let (lat, lon) = vector_to_latlon_deg(sphere_pos);
        let mut rel_lon = lon - image_center_lon_deg;
        if rel_lon <= -180.0 {
            rel_lon += 360.0;
        } else if rel_lon > 180.0 {
            rel_lon -= 360.0;
        }
        let rel_lat = lat - image_center_lat_deg;

        // recenter so (0,0) is the accumulator's top-left corner.
        let off_lat = self.half_height_deg - rel_lat;
        let off_lon = rel_lon + self.half_width_deg;

        let x_pos_x8 = (off_lon * pix_per_degree_x8) as i64;
        let y_pos_x8 = (off_lat * pix_per_degree_x8) as i64;
        if x_pos_x8 < 0 || y_pos_x8 < 0 {
            return;
        }
        let x_pos_x8 = x_pos_x8 as u64;
        let y_pos_x8 = y_pos_x8 as u64;
        let x_bin = (x_pos_x8 >> 3) as usize;
        let y_bin = (y_pos_x8 >> 3) as usize;
        if x_bin + 1 >= self.cols || y_bin + 1 >= self.rows {
            return;
        }

        let map_idx = ((x_pos_x8 & 0x07) + ((y_pos_x8 & 0x07) << 3)) as usize;
        let weights = DISTRIBUTION_MAP[map_idx];
        let border_flag = if border { 255u32 } else { 0 };

        self.cell_mut(x_bin, y_bin).update(y_val, v_val, border_flag, weights.nw as u32);
        self.cell_mut(x_bin + 1, y_bin).update(y_val, v_val, border_flag, weights.ne as u32);
        self.cell_mut(x_bin, y_bin + 1).update(y_val, v_val, border_flag, weights.sw as u32);
        self.cell_mut(x_bin + 1, y_bin + 1).update(y_val, v_val, border_flag, weights.se as u32);
    }

    /// Produces the finished frame: every interior cell with `w > 0`
    /// becomes `(y/w, v/w)` with `border = 255` iff any contribution was
    /// flagged a border pixel; everything else (no contributions, and
    /// always the outer ring) is [`EMPTY_PIXEL`]. Per spec §9, every
    /// touched pixel gets its own update here — there is no aliasing
    /// between a pixel's output and its neighbor's (the source's
    /// documented vertical-blur pointer bug has no counterpart in this
    /// per-cell accumulation scheme).
    pub fn flatten(&self) -> Vec<OutputPixel> {
        let mut out = vec![EMPTY_PIXEL; self.cols * self.rows];
        for y in 1..self.rows.saturating_sub(1) {
            for x in 1..self.cols.saturating_sub(1) {
                let cell = self.cells[x + y * self.cols];
                if cell.w == 0 {
                    continue;
                }
                out[x + y * self.cols] = OutputPixel {
                    y: (cell.y / cell.w).min(255) as u8,
                    v: (cell.v / cell.w).min(255) as u8,
                    border: if cell.z != 0 { 255 } else { 0 },
                };
            }
        }
        out
    }
}

/// Validates the static [`DISTRIBUTION_MAP`]'s monotonicity invariants
/// (spec §4.7, §8): along a row, `nw`/`sw` are non-increasing and
/// `ne`/`se` are non-decreasing; along a column, `nw`/`ne` are
/// non-increasing and `sw`/`se` are non-decreasing. Every entry sums to
/// 64.
pub fn check_distribution_map_invariants() -> bool {
    for row in 0..8 {
        for x in 1..8 {
            let prev = DISTRIBUTION_MAP[row * 8 + x - 1];
            let cur = DISTRIBUTION_MAP[row * 8 + x];
            if prev.nw < cur.nw || prev.ne > cur.ne || prev.sw < cur.sw || prev.se > cur.se {
                return false;
            }
        }
    }
    for col in 0..8 {
        for y in 1..8 {
            let prev = DISTRIBUTION_MAP[(y - 1) * 8 + col];
            let cur = DISTRIBUTION_MAP[y * 8 + col];
            if prev.nw < cur.nw || prev.ne < cur.ne || prev.sw > cur.sw || prev.se > cur.se {
                return false;
            }
        }
    }
    DISTRIBUTION_MAP
        .iter()
        .all(|w| w.nw as u32 + w.ne as u32 + w.sw as u32 + w.se as u32 == 64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_map_invariants_hold() {
        assert!(check_distribution_map_invariants());
    }

    #[test]
    fn vector_to_latlon_center_is_origin() {
        let (lat, lon) = vector_to_latlon_deg([0.0, 0.0, 1.0]);
        assert!(lat.abs() < 1e-6);
        assert!(lon.abs() < 1e-6);
    }

    #[test]
    fn scenario_center_pixel_splits_across_two_rows() {
        // ppd=80 -> pix_per_degree_x8 = 640; accumulator sized generously.
        let mut acc = ImageAccumulator::new(64, 64, 0.8 * 64.0, 0.8 * 64.0);
        acc.push_pixel([0.0, 0.0, 1.0], 100, 0, false, 0.0, 0.0, 640.0);
        let total_w: u32 = (0..acc.cols * acc.rows).map(|i| acc.cells[i].w).sum();
        assert_eq!(total_w, 64);
    }

    #[test]
    fn flatten_empty_cell_is_sentinel() {
        let acc = ImageAccumulator::new(8, 8, 6.0, 6.0);
        let pixels = acc.flatten();
        assert!(pixels.iter().all(|p| *p == EMPTY_PIXEL));
    }

    #[test]
    fn flatten_outer_ring_is_always_empty_even_with_data() {
        let mut acc = ImageAccumulator::new(8, 8, 6.0, 6.0);
        // push enough energy that, if reachable, row/col 0 would light up;
        // geometry keeps contributions interior, so this just exercises
        // the invariant that index (0, *) / (*, 0) never gets touched.
        acc.push_pixel([0.0, 0.0, 1.0], 200, 10, true, 0.0, 0.0, 80.0);
        let pixels = acc.flatten();
        for x in 0..acc.cols {
            assert_eq!(pixels[x], EMPTY_PIXEL);
            assert_eq!(pixels[x + (acc.rows - 1) * acc.cols], EMPTY_PIXEL);
        }
        for y in 0..acc.rows {
            assert_eq!(pixels[y * acc.cols], EMPTY_PIXEL);
            assert_eq!(pixels[acc.cols - 1 + y * acc.cols], EMPTY_PIXEL);
        }
    }

    #[test]
    fn flatten_with_contribution_averages_correctly() {
        let mut acc = ImageAccumulator::new(16, 16, 12.0, 12.0);
        acc.push_pixel([0.0, 0.0, 1.0], 100, 50, false, 0.0, 0.0, 80.0);
        let pixels = acc.flatten();
        let touched: Vec<_> = pixels.iter().filter(|p| **p != EMPTY_PIXEL).collect();
        assert!(!touched.is_empty());
        for p in touched {
            assert!(p.y <= 255);
            assert!(p.v <= 255);
        }
    }
}
