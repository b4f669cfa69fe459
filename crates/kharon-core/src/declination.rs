//! Declination/inclination lookup (C10): a precomputed magnetic field
//! table, read once at startup and queried read-only thereafter.
//!
//! Grounded on `core/include/routing/mapping.h`'s declination/inclination
//! fields and its `MAGENTIC_POLE_CAUTION_INCLINATION` constant; the text
//! table format itself is not present in the retrieved original source
//! (only its test fixture survives), so the parser implements the
//! simplest format consistent with that test: one `lat lon declination
//! inclination` record per line, gridded at `GRID_RESOLUTION_DEG`
//! (spec §4.8: "≥0.5° resolution").

use std::collections::HashMap;
use std::path::Path;

/// WMM "caution" inclination magnitude: beyond this, a location is close
/// enough to a magnetic pole that heading data is unreliable (spec §4.4,
/// used to exclude candidate beacon rows).
pub const MAGNETIC_POLE_CAUTION_INCLINATION_DEG: f64 = 84.0;
/// WMM "unstable" inclination magnitude; not used for beacon exclusion
/// today but retained since the original table carries it as a second
/// threshold.
pub const MAGNETIC_POLE_UNSTABLE_INCLINATION_DEG: f64 = 88.0;

pub const GRID_RESOLUTION_DEG: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagneticField {
    pub declination_deg: f64,
    pub inclination_deg: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum DeclinationError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed declination record on line {line}: {text:?}")]
    Malformed { line: usize, text: String },
}

fn grid_key(lat: f64, lon: f64) -> (i32, i32) {
    let lat_idx = libm::round(lat / GRID_RESOLUTION_DEG) as i32;
    let mut lon_norm = lon;
    while lon_norm < 0.0 {
        lon_norm += 360.0;
    }
    while lon_norm >= 360.0 {
        lon_norm -= 360.0;
    }
    let lon_idx = libm::round(lon_norm / GRID_RESOLUTION_DEG) as i32;
    (lat_idx, lon_idx)
}

/// A read-only, process-wide magnetic field table keyed by nearest grid
/// point. Spec §5: "read-only after load; no locking needed for reads."
pub struct DeclinationTable {
    grid: HashMap<(i32, i32), MagneticField>,
}

impl DeclinationTable {
    pub fn parse(text: &str) -> Result<Self, DeclinationError> {
        let mut grid = HashMap::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return Err(DeclinationError::Malformed {
                    line: lineno + 1,
                    text: line.to_string(),
                });
            }
            let parse = |s: &str| -> Result<f64, DeclinationError> {
                s.parse::<f64>().map_err(|_| DeclinationError::Malformed {
                    line: lineno + 1,
                    text: line.to_string(),
                })
            };
            let lat = parse(fields[0])?;
            let lon = parse(fields[1])?;
            let declination_deg = parse(fields[2])?;
            let inclination_deg = parse(fields[3])?;
            grid.insert(
                grid_key(lat, lon),
                MagneticField { declination_deg, inclination_deg },
            );
        }
        Ok(DeclinationTable { grid })
    }

    pub fn load(path: &Path) -> Result<Self, DeclinationError> {
        let text = std::fs::read_to_string(path).map_err(|source| DeclinationError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Nearest-grid-point lookup (spec §4.8). Falls back to a zero field
    /// (no declination, vertical-neutral inclination) for points with no
    /// table coverage, rather than failing the caller — declination is
    /// an advisory correction, not routing-critical data.
    pub fn lookup(&self, lat: f64, lon: f64) -> MagneticField {
        self.grid
            .get(&grid_key(lat, lon))
            .copied()
            .unwrap_or(MagneticField { declination_deg: 0.0, inclination_deg: 0.0 })
    }

    pub fn is_near_magnetic_pole(&self, lat: f64, lon: f64) -> bool {
        libm::fabs(self.lookup(lat, lon).inclination_deg) > MAGNETIC_POLE_CAUTION_INCLINATION_DEG
    }
}

/// True heading from magnetic, given declination east-positive (spec
/// §4.8's route-controller use: "convert between true and magnetic
/// headings").
pub fn magnetic_to_true_deg(magnetic_deg: f64, declination_deg: f64) -> f64 {
    let mut t = magnetic_deg + declination_deg;
    while t < 0.0 {
        t += 360.0;
    }
    while t >= 360.0 {
        t -= 360.0;
    }
    t
}

pub fn true_to_magnetic_deg(true_deg: f64, declination_deg: f64) -> f64 {
    magnetic_to_true_deg(true_deg, -declination_deg)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "\
90.0 0.0 4.23 87.66
49.0 237.0 15.97 69.89
";

    #[test]
    fn scenario_near_pole_lookup() {
        let table = DeclinationTable::parse(FIXTURE).unwrap();
        let field = table.lookup(90.0, 0.0);
        assert!((field.declination_deg - 4.23).abs() < 1e-6);
        assert!((field.inclination_deg - 87.66).abs() < 1e-6);
    }

    #[test]
    fn lookup_wraps_longitude_into_0_360() {
        let table = DeclinationTable::parse(FIXTURE).unwrap();
        // -123 == 237 mod 360
        let field = table.lookup(49.0, -123.0);
        assert!((field.declination_deg - 15.97).abs() < 1e-6);
    }

    #[test]
    fn missing_coverage_returns_neutral_field() {
        let table = DeclinationTable::parse(FIXTURE).unwrap();
        let field = table.lookup(-10.0, -10.0);
        assert_eq!(field, MagneticField { declination_deg: 0.0, inclination_deg: 0.0 });
    }

    #[test]
    fn magnetic_pole_caution_threshold() {
        let table = DeclinationTable::parse(FIXTURE).unwrap();
        assert!(table.is_near_magnetic_pole(90.0, 0.0));
        assert!(!table.is_near_magnetic_pole(-10.0, -10.0));
    }

    #[test]
    fn true_magnetic_round_trip() {
        let m = true_to_magnetic_deg(90.0, 15.0);
        let t = magnetic_to_true_deg(m, 15.0);
        assert!((t - 90.0).abs() < 1e-9);
    }

    #[test]
    fn malformed_line_is_rejected() {
        assert!(DeclinationTable::parse("not a number here\n").is_err());
    }
}
