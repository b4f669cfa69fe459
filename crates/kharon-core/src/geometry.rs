//! World-coordinate geometry: the Alaska-North (AKN) rotated frame, meter
//! offsets, and the 8-direction bitmasks used by path-field course
//! assignment.

const DEG_LAT_TO_METER: f64 = 111_320.0;
const METER_TO_DEG_LAT: f64 = 1.0 / DEG_LAT_TO_METER;
const NM_TO_METERS: f64 = 1852.0;

/// A geographic coordinate, longitude in `[0, 360)`, latitude in
/// `[-90, 90]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldCoordinate {
    pub lon: f64,
    pub lat: f64,
}

/// A rotated coordinate with origin at the International Date Line /
/// North Pole intersection: `akn_x = lon + 180`, `akn_y = 90 - lat`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AknPosition {
    pub akn_x: f64,
    pub akn_y: f64,
}

/// Fatal: the caller supplied a coordinate outside representable bounds.
/// Per spec §7 this is a numerical/invariant error — these are always
/// bugs upstream, not a recoverable condition.
#[derive(Debug, thiserror::Error)]
#[error("coordinate from '{label}' has illegal value: {lon:.5},{lat:.5}")]
pub struct IllegalCoordinate {
    pub label: &'static str,
    pub lon: f64,
    pub lat: f64,
}

pub fn check_world_coordinate(
    coord: WorldCoordinate,
    label: &'static str,
) -> Result<(), IllegalCoordinate> {
    if !(0.0..360.0).contains(&coord.lon) || !(-90.0..=90.0).contains(&coord.lat) {
        return Err(IllegalCoordinate {
            label,
            lon: coord.lon,
            lat: coord.lat,
        });
    }
    Ok(())
}

pub fn to_akn(world: WorldCoordinate) -> AknPosition {
    let mut akn_x = 180.0 + world.lon;
    if akn_x >= 360.0 {
        akn_x -= 360.0;
    }
    AknPosition {
        akn_x,
        akn_y: 90.0 - world.lat,
    }
}

pub fn from_akn(akn: AknPosition) -> WorldCoordinate {
    let mut lon = akn.akn_x - 180.0;
    if lon < 0.0 {
        lon += 360.0;
    }
    WorldCoordinate {
        lon,
        lat: 90.0 - akn.akn_y,
    }
}

/// East/north meter offset of `dest` from `src`. `dx` uses a latitude
/// correction evaluated at the mean latitude of the two points.
pub fn meter_offset(src: WorldCoordinate, dest: WorldCoordinate) -> (f64, f64) {
    let mut dx_deg = dest.lon - src.lon;
    if dx_deg <= -360.0 {
        dx_deg += 360.0;
    } else if dx_deg >= 360.0 {
        dx_deg -= 360.0;
    }
    let mean_lat_rad = (0.5 * (src.lat + dest.lat)).to_radians();
    let dx = dx_deg * DEG_LAT_TO_METER * libm::cos(mean_lat_rad);
    let dy = (dest.lat - src.lat) * DEG_LAT_TO_METER;
    (dx, dy)
}

pub fn distance_meters(src: WorldCoordinate, dest: WorldCoordinate) -> f64 {
    let (dx, dy) = meter_offset(src, dest);
    libm::sqrt(dx * dx + dy * dy)
}

/// Coordinate offset by `range_m` meters at true heading `heading_deg`
/// from `source`.
pub fn offset_position(
    source: WorldCoordinate,
    heading_deg: f64,
    range_m: f64,
) -> WorldCoordinate {
    let rad = heading_deg.to_radians();
    let (s, c) = (libm::sin(rad), libm::cos(rad));
    let dx_met = range_m * s;
    let dy_met = range_m * c;
    let lat_corr = libm::cos(source.lat.to_radians());
    let dx_deg = dx_met * METER_TO_DEG_LAT / lat_corr;
    let dy_deg = dy_met * METER_TO_DEG_LAT;
    let mut lon = source.lon + dx_deg;
    if lon < 0.0 {
        lon += 360.0;
    } else if lon >= 360.0 {
        lon -= 360.0;
    }
    WorldCoordinate {
        lon,
        lat: source.lat + dy_deg,
    }
}

pub fn nautical_miles_to_meters(nm: f64) -> f64 {
    nm * NM_TO_METERS
}

/// Pixel position within a composite map, or the off-map sentinel
/// `(65535, 65535)` when outside bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCoordinate {
    pub x: u16,
    pub y: u16,
}

pub const OFF_MAP: ImageCoordinate = ImageCoordinate {
    x: 65535,
    y: 65535,
};

impl ImageCoordinate {
    pub fn is_off_map(self) -> bool {
        self == OFF_MAP
    }
}

/// Resolve `pos`'s pixel location within a composite map of side
/// `map_side` cells centered on `center`, given the per-cell meter
/// extent `(node_width_m, node_height_m)`.
pub fn pixel_position_in_map(
    center: WorldCoordinate,
    node_width_m: f64,
    node_height_m: f64,
    map_side: u32,
    pos: WorldCoordinate,
) -> ImageCoordinate {
    let (dx, dy) = meter_offset(center, pos);
    let x_offset_pix = libm::floor(dx / node_width_m) as i32;
    // positive dy is up; array origin is top-left, so invert.
    let y_offset_pix = libm::floor(-dy / node_height_m) as i32;
    let half = (map_side / 2) as i32;
    let x_pix = half + x_offset_pix;
    let y_pix = half + y_offset_pix;
    if x_pix < 0 || y_pix < 0 || x_pix as u32 >= map_side || y_pix as u32 >= map_side {
        OFF_MAP
    } else {
        ImageCoordinate {
            x: x_pix as u16,
            y: y_pix as u16,
        }
    }
}

/// 8-direction bitfield: N=0x80, NE=0x40, E=0x20, SE=0x10, S=0x08,
/// SW=0x04, W=0x02, NW=0x01. `0` means `a == b` (no offset).
pub fn offset_mask(a: ImageCoordinate, b: ImageCoordinate) -> u8 {
    let dx = a.x as i32 - b.x as i32 + 1;
    let dy = a.y as i32 - b.y as i32 + 1;
    debug_assert!((0..=2).contains(&dx));
    debug_assert!((0..=2).contains(&dy));
    match dx + dy * 3 {
        1 => 0b1000_0000, // N
        2 => 0b0100_0000, // NE
        5 => 0b0010_0000, // E
        8 => 0b0001_0000, // SE
        7 => 0b0000_1000, // S
        6 => 0b0000_0100, // SW
        3 => 0b0000_0010, // W
        0 => 0b0000_0001, // NW
        _ => 0,
    }
}

/// Same direction as [`offset_mask`] but with the two adjacent
/// (±45°) bits also set, used to test whether a course stays within
/// 45° of some reference direction.
pub fn offset_mask_wide(a: ImageCoordinate, b: ImageCoordinate) -> u8 {
    let dx = a.x as i32 - b.x as i32 + 1;
    let dy = a.y as i32 - b.y as i32 + 1;
    match dx + dy * 3 {
        1 => 0b1100_0001, // N
        2 => 0b1110_0000, // NE
        5 => 0b0111_0000, // E
        8 => 0b0011_1000, // SE
        7 => 0b0001_1100, // S
        6 => 0b0000_1110, // SW
        3 => 0b0000_0111, // W
        0 => 0b1000_0011, // NW
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn akn_round_trip_scenario() {
        let world = WorldCoordinate {
            lon: -122.5 + 360.0,
            lat: 49.1,
        };
        let akn = to_akn(world);
        assert_relative_eq!(akn.akn_x, 57.5, epsilon = 1e-9);
        assert_relative_eq!(akn.akn_y, 40.9, epsilon = 1e-9);
    }

    #[test]
    fn akn_world_round_trip_is_identity() {
        let world = WorldCoordinate { lon: 237.5, lat: 49.1 };
        let akn = to_akn(world);
        let back = from_akn(akn);
        assert_relative_eq!(back.lon, world.lon, epsilon = 1e-9);
        assert_relative_eq!(back.lat, world.lat, epsilon = 1e-9);
    }

    #[test]
    fn illegal_coordinate_is_rejected() {
        let bad = WorldCoordinate { lon: 400.0, lat: 0.0 };
        assert!(check_world_coordinate(bad, "test").is_err());
        let good = WorldCoordinate { lon: 10.0, lat: 10.0 };
        assert!(check_world_coordinate(good, "test").is_ok());
    }

    #[test]
    fn offset_mask_matches_narrow_table() {
        let center = ImageCoordinate { x: 10, y: 10 };
        let north = ImageCoordinate { x: 10, y: 9 };
        assert_eq!(offset_mask(center, north), 0b1000_0000);
        let east = ImageCoordinate { x: 11, y: 10 };
        assert_eq!(offset_mask(center, east), 0b0010_0000);
    }

    #[test]
    fn offset_mask_wide_includes_narrow_bit() {
        let center = ImageCoordinate { x: 10, y: 10 };
        let north = ImageCoordinate { x: 10, y: 9 };
        let narrow = offset_mask(center, north);
        let wide = offset_mask_wide(center, north);
        assert_eq!(wide & narrow, narrow);
    }

    #[test]
    fn off_map_sentinel_triggers_outside_window() {
        let center = WorldCoordinate { lon: 10.0, lat: 10.0 };
        let far = WorldCoordinate { lon: 50.0, lat: 10.0 };
        let pix = pixel_position_in_map(center, 100.0, 100.0, 720, far);
        assert!(pix.is_off_map());
    }
}
