//! Config tree (spec §6): per-host endpoints and sensor configuration
//! read from `/opt/kharon/data/dev/<host>/`. Structured pieces (the
//! destination list, per-device modality files) are parsed with
//! `serde`; the single-line `compass_correction` file keeps the
//! source's own trivial line format rather than gaining a schema it
//! never had.

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config directory missing: {0}")]
    MissingDir(PathBuf),
    #[error("io error reading {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("malformed destination line {line} in {path}: {text:?}")]
    MalformedDestination { path: PathBuf, line: usize, text: String },
    #[error("malformed compass correction in {0}")]
    MalformedCompassCorrection(PathBuf),
}

/// One named destination, as listed in `destinations.txt`
/// (`<name> <lon> <lat> <radius_m>`, `#`-comments, blank lines ignored).
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    pub name: String,
    pub lon: f64,
    pub lat: f64,
    pub radius_m: f64,
}

pub const DESTINATIONS_PATH: &str = "/opt/kharon/charlie/destinations.txt";

pub fn load_destinations(path: &Path) -> Result<Vec<Destination>, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    parse_destinations(path, &text)
}

fn parse_destinations(path: &Path, text: &str) -> Result<Vec<Destination>, ConfigError> {
    let mut out = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(ConfigError::MalformedDestination {
                path: path.to_path_buf(),
                line: lineno + 1,
                text: line.to_string(),
            });
        }
        let bad = || ConfigError::MalformedDestination {
            path: path.to_path_buf(),
            line: lineno + 1,
            text: line.to_string(),
        };
        let lon: f64 = fields[1].parse().map_err(|_| bad())?;
        let lat: f64 = fields[2].parse().map_err(|_| bad())?;
        let radius_m: f64 = fields[3].parse().map_err(|_| bad())?;
        out.push(Destination { name: fields[0].to_string(), lon, lat, radius_m });
    }
    Ok(out)
}

pub fn find_destination(destinations: &[Destination], name: &str) -> Option<Destination> {
    destinations.iter().find(|d| d.name == name).cloned()
}

/// Per-IMU compass correction: a single line `<x_offset> <z_offset>`
/// applied to magnetometer readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompassCorrection {
    pub x_offset: f64,
    pub z_offset: f64,
}

pub fn load_compass_correction(path: &Path) -> Result<CompassCorrection, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() != 2 {
        return Err(ConfigError::MalformedCompassCorrection(path.to_path_buf()));
    }
    let x_offset: f64 = fields[0]
        .parse()
        .map_err(|_| ConfigError::MalformedCompassCorrection(path.to_path_buf()))?;
    let z_offset: f64 = fields[1]
        .parse()
        .map_err(|_| ConfigError::MalformedCompassCorrection(path.to_path_buf()))?;
    Ok(CompassCorrection { x_offset, z_offset })
}

/// `modality/mag/{offset,scale,softiron}` and `modality/accel/{offset,scale}`:
/// each file holds whitespace-separated floats, one vector per file.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct ModalityCalibration {
    pub offset: [f64; 3],
    pub scale: [f64; 3],
    #[serde(default)]
    pub softiron: Option<[f64; 9]>,
}

fn read_vec_file<const N: usize>(path: &Path) -> Result<[f64; N], ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    let fields: Vec<f64> = text
        .split_whitespace()
        .map(|s| s.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| ConfigError::MalformedCompassCorrection(path.to_path_buf()))?;
    fields
        .try_into()
        .map_err(|_| ConfigError::MalformedCompassCorrection(path.to_path_buf()))
}

pub fn load_modality_calibration(dir: &Path, has_softiron: bool) -> Result<ModalityCalibration, ConfigError> {
    let offset = read_vec_file::<3>(&dir.join("offset"))?;
    let scale = read_vec_file::<3>(&dir.join("scale"))?;
    let softiron = if has_softiron {
        Some(read_vec_file::<9>(&dir.join("softiron"))?)
    } else {
        None
    };
    Ok(ModalityCalibration { offset, scale, softiron })
}

/// Per-host device config root: `/opt/kharon/data/dev/<host>/`.
pub fn host_config_root(data_root: &Path, host: &str) -> PathBuf {
    data_root.join("dev").join(host)
}

pub fn require_dir(path: &Path) -> Result<(), ConfigError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ConfigError::MissingDir(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_destinations_with_comments_and_blank_lines() {
        let text = "\
# charlie's usual spots
marina 10.0 20.0 150.0

fishing_hole -5.25 48.75 500.0
";
        let dests = parse_destinations(Path::new("destinations.txt"), text).unwrap();
        assert_eq!(dests.len(), 2);
        assert_eq!(dests[0].name, "marina");
        assert_eq!(dests[1].lon, -5.25);
    }

    #[test]
    fn rejects_malformed_destination_line() {
        let err = parse_destinations(Path::new("d.txt"), "bad_line 1.0\n");
        assert!(err.is_err());
    }

    #[test]
    fn find_destination_looks_up_by_name() {
        let dests = vec![Destination { name: "x".into(), lon: 1.0, lat: 2.0, radius_m: 3.0 }];
        assert!(find_destination(&dests, "x").is_some());
        assert!(find_destination(&dests, "y").is_none());
    }
}
