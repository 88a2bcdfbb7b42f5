//! Elevation estimates at arbitrary `(x, y)` locations.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::error::{Result, TerrainError};
use crate::model::{check_finite, TerrainModel};
use crate::spatial::{Metric, SpatialIndex};
use crate::store::{CoordinateCodec, TerrainPoint};

/// Interpolation scheme used by [`TerrainModel::interpolate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    /// Linear interpolation inside the containing TIN triangle.
    Barycentric,
    /// Inverse squared distance weighting of the nearest points.
    Idw,
}

impl FromStr for InterpolationMethod {
    type Err = TerrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "barycentric" => Ok(Self::Barycentric),
            "idw" => Ok(Self::Idw),
            _ => Err(TerrainError::InvalidMethod(s.to_string())),
        }
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Barycentric => "barycentric",
            Self::Idw => "idw",
        })
    }
}

/// Most nodes [`TerrainModel::dense_grid`] will sample.
pub const MAX_GRID_NODES: u64 = 4_000_000;

/// Fewest stored points [`TerrainModel::accuracy_metrics`] will test.
const MIN_ACCURACY_POINTS: usize = 5;

fn ids_exhausted(after: u64) -> TerrainError {
    TerrainError::InvalidQuery(format!("no point ids left after {after}"))
}

/// Elevation error of an interpolated sample set, measured at stored points.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AccuracyMetrics {
    pub mean_absolute_error: f64,
    pub max_absolute_error: f64,
    pub rmse: f64,
    /// Mean horizontal distance from each test point to the sample it was
    /// compared with.
    pub mean_xy_distance: f64,
    pub test_points: usize,
}

/// Weighted mean of `(distance, z)` samples with weights `1 / d^2`.
/// The first sample within `epsilon` wins outright.
fn inverse_distance(samples: &[(f64, f64)], epsilon: f64) -> Option<f64> {
    if let Some(&(_, z)) = samples.iter().find(|(d, _)| *d <= epsilon) {
        return Some(z);
    }
    let (num, den) = samples.iter().fold((0.0, 0.0), |(num, den), &(d, z)| {
        let w = 1.0 / (d * d);
        (num + w * z, den + w)
    });
    (den > 0.0).then(|| num / den)
}

impl<C: CoordinateCodec> TerrainModel<C> {
    /// Estimates the elevation at `(x, y)` with `method`.
    pub fn interpolate(&self, x: f64, y: f64, method: InterpolationMethod) -> Result<f64> {
        check_finite(&[x, y])?;
        match method {
            InterpolationMethod::Barycentric => self.barycentric(x, y),
            InterpolationMethod::Idw => self.idw(x, y),
        }
    }

    /// Like [`interpolate`](Self::interpolate) with the method given by name.
    pub fn interpolate_named(&self, x: f64, y: f64, method: &str) -> Result<f64> {
        self.interpolate(x, y, method.parse()?)
    }

    /// Barycentric elevation, falling back to IDW outside the mesh.
    pub fn elevation_at(&self, x: f64, y: f64) -> Result<f64> {
        match self.interpolate(x, y, InterpolationMethod::Barycentric) {
            Err(TerrainError::OutsideBoundary { .. }) => {
                self.interpolate(x, y, InterpolationMethod::Idw)
            }
            other => other,
        }
    }

    fn barycentric(&self, x: f64, y: f64) -> Result<f64> {
        let tin = self.triangulation()?;
        if let Some(z) = tin.breakline_elevation(x, y, self.config().breakline_tolerance) {
            return Ok(z);
        }
        tin.elevation_at(x, y)
            .ok_or(TerrainError::OutsideBoundary { x, y })
    }

    fn idw(&self, x: f64, y: f64) -> Result<f64> {
        if self.is_empty() {
            return Err(TerrainError::InsufficientPoints { found: 0 });
        }
        let k = self.config().idw_neighbors.max(1);
        let samples: Vec<(f64, f64)> = self
            .nearest_planar(x, y, k)?
            .into_iter()
            .map(|m| (m.distance, m.point.z()))
            .collect();
        inverse_distance(&samples, self.config().coincidence_epsilon)
            .ok_or(TerrainError::InsufficientPoints { found: samples.len() })
    }

    /// Samples the surface on a regular grid covering the point bounds.
    ///
    /// Nodes outside the triangulation are skipped. The returned points are
    /// not added to the model; their ids continue after the largest stored id.
    /// Grids of more than [`MAX_GRID_NODES`] nodes, or that would run out of
    /// ids, are rejected with `InvalidQuery`.
    pub fn dense_grid(&self, resolution: f64) -> Result<Vec<TerrainPoint>> {
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(TerrainError::InvalidQuery(format!(
                "grid resolution {resolution} must be positive"
            )));
        }
        let tin = self.triangulation()?;
        let bounds = match self.store().bounds() {
            Some(b) => b,
            None => return Ok(Vec::new()),
        };
        let tolerance = self.config().breakline_tolerance;
        let cols = ((bounds.max_x - bounds.min_x) / resolution + 1e-9).floor() + 1.0;
        let rows = ((bounds.max_y - bounds.min_y) / resolution + 1e-9).floor() + 1.0;
        if cols * rows > MAX_GRID_NODES as f64 {
            return Err(TerrainError::InvalidQuery(format!(
                "a grid at resolution {resolution} has {:.0} nodes, more than {MAX_GRID_NODES}",
                cols * rows
            )));
        }
        let first_id = match self.store().max_id() {
            Some(id) => id.checked_add(1).ok_or_else(|| ids_exhausted(id))?,
            None => 0,
        };
        let mut grid = Vec::new();
        for j in 0..rows as u64 {
            let y = bounds.min_y + j as f64 * resolution;
            for i in 0..cols as u64 {
                let x = bounds.min_x + i as f64 * resolution;
                let z = match tin.breakline_elevation(x, y, tolerance) {
                    Some(z) => z,
                    None => match tin.elevation_at(x, y) {
                        Some(z) => z,
                        None => continue,
                    },
                };
                let id = first_id
                    .checked_add(grid.len() as u64)
                    .ok_or_else(|| ids_exhausted(first_id))?;
                grid.push(TerrainPoint::new(id, x, y, z)?);
            }
        }
        log::debug!("sampled {} grid nodes at resolution {}", grid.len(), resolution);
        Ok(grid)
    }

    /// Compares `samples`, typically a [`dense_grid`](Self::dense_grid), with
    /// a random `test_fraction` of the stored points. Each test point is
    /// matched to the horizontally nearest sample.
    ///
    /// Returns `None` with fewer than five stored points.
    pub fn accuracy_metrics<R: Rng + ?Sized>(
        &self,
        samples: &[TerrainPoint],
        test_fraction: f64,
        rng: &mut R,
    ) -> Result<Option<AccuracyMetrics>> {
        if !(test_fraction > 0.0 && test_fraction <= 1.0) {
            return Err(TerrainError::InvalidQuery(format!(
                "test fraction {test_fraction} must be in (0, 1]"
            )));
        }
        if self.len() < MIN_ACCURACY_POINTS {
            return Ok(None);
        }
        if samples.is_empty() {
            return Err(TerrainError::InvalidQuery(
                "no interpolated samples to compare".into(),
            ));
        }
        let index = SpatialIndex::build(
            samples.iter().map(TerrainPoint::coords).collect(),
            Metric::Planar,
            0,
        );
        let coords = self.store().as_array();
        let count = ((coords.len() as f64 * test_fraction) as usize).clamp(1, coords.len());

        let (mut abs_sum, mut max_abs, mut sq_sum, mut xy_sum) = (0.0, 0.0f64, 0.0, 0.0);
        for pos in rand::seq::index::sample(rng, coords.len(), count).iter() {
            let c = coords[pos];
            if let Some(hit) = index.nearest(c, 1).first() {
                let err = (c[2] - samples[hit.position].z()).abs();
                abs_sum += err;
                max_abs = max_abs.max(err);
                sq_sum += err * err;
                xy_sum += hit.distance;
            }
        }
        let n = count as f64;
        log::debug!("compared {} of {} points with {} samples", count, coords.len(), samples.len());
        Ok(Some(AccuracyMetrics {
            mean_absolute_error: abs_sum / n,
            max_absolute_error: max_abs,
            rmse: (sq_sum / n).sqrt(),
            mean_xy_distance: xy_sum / n,
            test_points: count,
        }))
    }

    /// Half of the mean horizontal spacing between each point and its
    /// nearest neighbour. Returns 1.0 when the spacing is undefined.
    pub fn estimate_resolution(&self) -> f64 {
        if self.len() < 2 {
            return 1.0;
        }
        let index = self.planar_index();
        let coords = self.store().as_array();
        let total: f64 = coords
            .iter()
            .enumerate()
            .filter_map(|(pos, c)| {
                index
                    .nearest(*c, 2)
                    .into_iter()
                    .find(|n| n.position != pos)
                    .map(|n| n.distance)
            })
            .sum();
        let spacing = total / coords.len() as f64 / 2.0;
        if spacing > 0.0 {
            spacing
        } else {
            1.0
        }
    }
}
