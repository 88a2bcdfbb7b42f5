//! Core library for terrain point clouds.
//!
//! Points live in a [`PointStore`]; a [`TerrainModel`] adds break lines and
//! keeps a k-d tree and a triangulated irregular network in step with the
//! store, rebuilding them lazily after every mutation. On top of those the
//! model answers neighbour queries, interpolates elevations, traces contours
//! and reports surface statistics.

pub mod analysis;
pub mod config;
pub mod dtm;
pub mod error;
pub mod geometry;
pub mod interpolation;
pub mod io;
pub mod model;
pub mod spatial;
pub mod statistics;
pub mod store;

pub use analysis::Contour;
pub use config::TerrainConfig;
pub use dtm::{BreakLine, BreaklineStrategy, Tin, TriangulationState};
pub use error::{Result, TerrainError};
pub use geometry::Point3;
pub use interpolation::{AccuracyMetrics, InterpolationMethod};
pub use model::{PointMatch, TerrainModel};
pub use statistics::TerrainStatistics;
pub use store::{Centimetric, CoordinateCodec, Exact, PointStore, TerrainPoint};
