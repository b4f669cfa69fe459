//! Tiled world map (C3): persistent hierarchical bathymetry storage.
//!
//! A single L1 file covers the whole globe at 1°×1° resolution,
//! row-major in AKN order. L2 (15″) and L3 (5″) tiles refine individual
//! L1 cells when finer survey data exists, under
//! `15sec/<row10>/<x>_<y>.map2` and `5sec/<row10>/<x>_<y>.map3`.

use deku::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

use crate::depth;

pub const L1_SQUARE_COUNT: usize = 360 * 180;
pub const L2_SIDE: usize = 240;
pub const L3_SIDE: usize = 720;
pub const L2_SQUARE_COUNT: usize = L2_SIDE * L2_SIDE;
pub const L3_SQUARE_COUNT: usize = L3_SIDE * L3_SIDE;

pub const MAP_LEVEL1_FILE_NAME: &str = "world.map1";
pub const LEVEL2_DIR_NAME: &str = "15sec";
pub const LEVEL3_DIR_NAME: &str = "5sec";

/// L2-present flag in [`L1Square::flags`].
pub const MAP_FLAG_LEVEL_2: u16 = 0x01;
/// L3-present flag in [`L1Square::flags`].
pub const MAP_FLAG_LEVEL_3: u16 = 0x02;

/// Depth below which an L1 cell gets L2/L3 submap coverage.
pub const SUBMAP_DEPTH_THRESHOLD_METERS: i16 = 65;

/// One 1°×1° world-grid cell: elevation extremes (meters, land positive,
/// depth negative) plus submap-presence flags. Exactly 8 bytes on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct L1Square {
    pub low: i16,
    pub high: i16,
    pub flags: u16,
    pub reserved: u16,
}

impl L1Square {
    pub fn has_level2(&self) -> bool {
        self.flags & MAP_FLAG_LEVEL_2 != 0
    }

    pub fn has_level3(&self) -> bool {
        self.flags & MAP_FLAG_LEVEL_3 != 0
    }

    /// Depth code derived from this cell's `high` elevation, used when
    /// no L2/L3 tile is available. `high` is land-positive, so a
    /// negative `high` is submerged; non-negative means land/unknown.
    pub fn encoded_depth(&self) -> u8 {
        if self.high < 0 {
            depth::encode((-self.high) as u16)
        } else {
            depth::UNKNOWN_DEPTH_CODE
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MapStorageError {
    #[error("storage corrupt: {path} expected {expected} bytes, got {actual}")]
    SizeMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The complete L1 grid, row-major in AKN order (`akn_x` fastest).
pub struct LevelOneMap {
    pub grid: Vec<L1Square>,
}

impl LevelOneMap {
    pub fn index(akn_x: u32, akn_y: u32) -> usize {
        (akn_x as usize) + (akn_y as usize) * 360
    }

    pub fn get(&self, akn_x: u32, akn_y: u32) -> L1Square {
        self.grid[Self::index(akn_x, akn_y)]
    }
}

/// A square submap tile: a flat grid of depth codes.
#[derive(Debug, Clone)]
pub struct SubmapTile {
    pub side: usize,
    pub codes: Vec<u8>,
}

impl SubmapTile {
    pub fn empty(side: usize) -> Self {
        SubmapTile {
            side,
            codes: vec![depth::UNKNOWN_DEPTH_CODE; side * side],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.codes[x + y * self.side]
    }

    pub fn set(&mut self, x: usize, y: usize, code: u8) {
        self.codes[x + y * self.side] = code;
    }
}

/// Owns the root directory of a map store and the in-memory L1 grid.
/// L2/L3 tiles are read through on demand; loaders surface
/// [`MapStorageError`] on short reads or missing data rather than
/// aborting the process, so composite-building callers can degrade
/// gracefully (spec §7: storage corruption is fatal only at the point a
/// caller decides it cannot proceed without the tile).
pub struct MapStore {
    root: PathBuf,
    pub level1: LevelOneMap,
}

impl MapStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, MapStorageError> {
        let root = root.into();
        let level1 = Self::load_level1(&root)?;
        Ok(MapStore { root, level1 })
    }

    fn load_level1(root: &Path) -> Result<LevelOneMap, MapStorageError> {
        let path = root.join(MAP_LEVEL1_FILE_NAME);
        let bytes = fs::read(&path).map_err(|source| MapStorageError::Io {
            path: path.clone(),
            source,
        })?;
        let expected = L1_SQUARE_COUNT * 8;
        if bytes.len() != expected {
            return Err(MapStorageError::SizeMismatch {
                path,
                expected,
                actual: bytes.len(),
            });
        }
        let mut grid = Vec::with_capacity(L1_SQUARE_COUNT);
        let mut rest = bytes.as_slice();
        for _ in 0..L1_SQUARE_COUNT {
            let (tail, square) = L1Square::from_bytes((rest, 0)).expect("validated length");
            grid.push(square);
            rest = tail.0;
        }
        Ok(LevelOneMap { grid })
    }

    fn row10(akn_y: u32) -> u32 {
        (akn_y / 10) * 10
    }

    fn tile_path(&self, dir: &str, ext: &str, akn_x: u32, akn_y: u32) -> PathBuf {
        self.root
            .join(dir)
            .join(Self::row10(akn_y).to_string())
            .join(format!("{akn_x}_{akn_y}.{ext}"))
    }

    pub fn load_level2(&self, akn_x: u32, akn_y: u32) -> Result<SubmapTile, MapStorageError> {
        self.load_submap(self.tile_path(LEVEL2_DIR_NAME, "map2", akn_x, akn_y), L2_SIDE)
    }

    pub fn load_level3(&self, akn_x: u32, akn_y: u32) -> Result<SubmapTile, MapStorageError> {
        self.load_submap(self.tile_path(LEVEL3_DIR_NAME, "map3", akn_x, akn_y), L3_SIDE)
    }

    fn load_submap(&self, path: PathBuf, side: usize) -> Result<SubmapTile, MapStorageError> {
        let bytes = fs::read(&path).map_err(|source| MapStorageError::Io { path: path.clone(), source })?;
        let expected = side * side;
        if bytes.len() != expected {
            return Err(MapStorageError::SizeMismatch {
                path,
                expected,
                actual: bytes.len(),
            });
        }
        Ok(SubmapTile { side, codes: bytes })
    }

    /// Load the L3 tile for `(akn_x, akn_y)`, creating an empty
    /// (all-unknown) tile in memory if none exists on disk yet. Does not
    /// set the L1 flag or write to disk — that's the caller's job once
    /// the tile has real content (spec §4.1 write ordering: L3/L2 before
    /// L1, since L1 records which tiles exist).
    pub fn load_or_create_level3(&self, akn_x: u32, akn_y: u32) -> SubmapTile {
        self.load_level3(akn_x, akn_y)
            .unwrap_or_else(|_| SubmapTile::empty(L3_SIDE))
    }

    pub fn write_level3(&self, akn_x: u32, akn_y: u32, tile: &SubmapTile) -> std::io::Result<()> {
        let path = self.tile_path(LEVEL3_DIR_NAME, "map3", akn_x, akn_y);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &tile.codes)
    }

    pub fn write_level2(&self, akn_x: u32, akn_y: u32, tile: &SubmapTile) -> std::io::Result<()> {
        let path = self.tile_path(LEVEL2_DIR_NAME, "map2", akn_x, akn_y);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &tile.codes)
    }

    /// Depth-source preference for one L1 cell's sub-position: L3 if
    /// present and not unknown, else L2, else the encoded L1 `high`.
    pub fn depth_at(&self, akn_x: u32, akn_y: u32, sub_x: usize, sub_y: usize) -> u8 {
        let l1 = self.level1.get(akn_x, akn_y);
        if l1.has_level3() {
            if let Ok(tile) = self.load_level3(akn_x, akn_y) {
                // L3 is 720x720, finest sub-position directly addresses it.
                let code = tile.get(sub_x, sub_y);
                if code != depth::UNKNOWN_DEPTH_CODE {
                    return code;
                }
            }
        }
        if l1.has_level2() {
            if let Ok(tile) = self.load_level2(akn_x, akn_y) {
                // L2 is 240x240: 3 L3 cells per L2 cell.
                let l2x = (sub_x / 3).min(L2_SIDE - 1);
                let l2y = (sub_y / 3).min(L2_SIDE - 1);
                let code = tile.get(l2x, l2y);
                if code != depth::UNKNOWN_DEPTH_CODE {
                    return code;
                }
            }
        }
        l1.encoded_depth()
    }
}

#[cfg(test)]
impl MapStore {
    /// Build an in-memory store with no backing directory, for tests
    /// that only need L1 lookups (no L2/L3 tiles exist on disk, which is
    /// a normal, handled condition — `depth_at` falls back to L1).
    pub fn in_memory(grid: Vec<L1Square>) -> Self {
        MapStore {
            root: PathBuf::new(),
            level1: LevelOneMap { grid },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l1_square_deku_round_trip() {
        let square = L1Square {
            low: -100,
            high: -20,
            flags: MAP_FLAG_LEVEL_2 | MAP_FLAG_LEVEL_3,
            reserved: 0,
        };
        let bytes = square.to_bytes().unwrap();
        assert_eq!(bytes.len(), 8);
        let (_, back) = L1Square::from_bytes((&bytes, 0)).unwrap();
        assert_eq!(square, back);
    }

    #[test]
    fn l1_square_flags_roundtrip_semantics() {
        let square = L1Square {
            low: -50,
            high: -5,
            flags: MAP_FLAG_LEVEL_3,
            reserved: 0,
        };
        assert!(!square.has_level2());
        assert!(square.has_level3());
        assert_eq!(square.encoded_depth(), depth::encode(5));
    }

    #[test]
    fn land_cell_encodes_as_unknown() {
        let square = L1Square {
            low: 0,
            high: 30,
            flags: 0,
            reserved: 0,
        };
        assert_eq!(square.encoded_depth(), depth::UNKNOWN_DEPTH_CODE);
    }
}
