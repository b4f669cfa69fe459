//! Core navigation primitives for the Kharon autonomous piloting system:
//! angle encodings, depth codecs, bathymetry storage, the 60x60 nm
//! composite extractor, raster path-field routing, the long-range beacon
//! graph, the route controller, fixed-rate sensor streams, the optical
//! image accumulator, magnetic declination lookup, and the wire formats
//! shared by the external control interfaces.

pub mod accumulator;
pub mod angles;
pub mod beacon;
pub mod composite;
pub mod config;
pub mod declination;
pub mod depth;
pub mod geometry;
pub mod pathfield;
pub mod route;
pub mod stack;
pub mod streams;
pub mod wire;
pub mod worldmap;

pub mod prelude {
    pub use crate::accumulator::ImageAccumulator;
    pub use crate::angles::{Bam16, Bam32, Bam8};
    pub use crate::composite::CompositeMap;
    pub use crate::declination::DeclinationTable;
    pub use crate::geometry::{AknPosition, ImageCoordinate, WorldCoordinate};
    pub use crate::pathfield::PathField;
    pub use crate::route::RouteController;
    pub use crate::worldmap::MapStore;
}
