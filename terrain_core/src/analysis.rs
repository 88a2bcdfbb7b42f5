//! Least-squares plane fitting over point neighbourhoods, and contours.

use nalgebra::{Matrix3, Vector3};

use crate::error::Result;
use crate::geometry::{Point, Point3};
use crate::model::{check_finite, TerrainModel};
use crate::store::CoordinateCodec;

/// Plane fitted through a set of points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneFit {
    pub centroid: Point3,
    /// Unit normal, oriented upwards.
    pub normal: Point3,
    /// Angle between the plane and the horizontal, in degrees.
    pub slope_deg: f64,
    /// Standard deviation of the point distances to the plane.
    pub roughness: f64,
}

/// Fits a plane by principal component analysis: the normal is the
/// eigenvector of the covariance matrix with the smallest eigenvalue.
/// Returns `None` for fewer than three points.
pub fn fit_plane(points: &[[f64; 3]]) -> Option<PlaneFit> {
    if points.len() < 3 {
        return None;
    }
    let n = points.len() as f64;
    let centroid = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + Vector3::new(p[0], p[1], p[2]))
        / n;
    let covariance = points.iter().fold(Matrix3::zeros(), |acc, p| {
        let d = Vector3::new(p[0], p[1], p[2]) - centroid;
        acc + d * d.transpose()
    }) / n;

    let eigen = covariance.symmetric_eigen();
    let smallest = eigen.eigenvalues.imin();
    let mut normal: Vector3<f64> = eigen.eigenvectors.column(smallest).into_owned();
    let len = normal.norm();
    if len <= f64::EPSILON {
        return None;
    }
    normal /= len;
    if normal.z < 0.0 {
        normal = -normal;
    }

    let distances: Vec<f64> = points
        .iter()
        .map(|p| (Vector3::new(p[0], p[1], p[2]) - centroid).dot(&normal))
        .collect();
    let mean = distances.iter().sum::<f64>() / n;
    let variance = distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;

    Some(PlaneFit {
        centroid: Point3::new(centroid.x, centroid.y, centroid.z),
        normal: Point3::new(normal.x, normal.y, normal.z),
        slope_deg: normal.z.abs().clamp(-1.0, 1.0).acos().to_degrees(),
        roughness: variance.sqrt(),
    })
}

/// Contour of the surface at one elevation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Contour {
    pub level: f64,
    /// Unordered line pieces, one per triangle the level passes through.
    pub segments: Vec<[Point; 2]>,
}

/// Number of levels [`TerrainModel::contours`] uses when none are given.
pub const DEFAULT_CONTOUR_LEVELS: usize = 10;

/// `count` evenly spaced values from `min` to `max`, both included.
fn even_levels(min: f64, max: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let step = (max - min) / (count - 1) as f64;
            (0..count).map(|i| min + i as f64 * step).collect()
        }
    }
}

impl<C: CoordinateCodec> TerrainModel<C> {
    /// Contours of the triangulated surface at `levels`, or at
    /// [`DEFAULT_CONTOUR_LEVELS`] levels spread evenly from the lowest to the
    /// highest stored elevation. Empty with fewer than three points.
    pub fn contours(&self, levels: Option<&[f64]>) -> Result<Vec<Contour>> {
        if let Some(levels) = levels {
            check_finite(levels)?;
        }
        let bounds = match self.store().bounds() {
            Some(b) if self.len() >= 3 => b,
            _ => return Ok(Vec::new()),
        };
        let tin = self.triangulation()?;
        let levels = match levels {
            Some(levels) => levels.to_vec(),
            None => even_levels(bounds.min_z, bounds.max_z, DEFAULT_CONTOUR_LEVELS),
        };
        let contours: Vec<Contour> = levels
            .into_iter()
            .map(|level| Contour {
                level,
                segments: tin
                    .contour_segments(level)
                    .into_iter()
                    .map(|(p, q)| [p.xy(), q.xy()])
                    .collect(),
            })
            .collect();
        log::debug!(
            "traced {} contour pieces over {} levels",
            contours.iter().map(|c| c.segments.len()).sum::<usize>(),
            contours.len()
        );
        Ok(contours)
    }

    /// Plane through the points within `radius` of `center`, if at least
    /// three are found.
    pub fn neighbourhood_plane(&self, center: Point3, radius: f64) -> Result<Option<PlaneFit>> {
        let coords: Vec<[f64; 3]> = self
            .within_radius(center, radius)?
            .iter()
            .map(|m| m.point.coords())
            .collect();
        Ok(fit_plane(&coords))
    }

    /// Slope in degrees of the plane fitted to the neighbourhood of `center`.
    /// Zero when fewer than three points are within `radius`.
    pub fn local_slope(&self, center: Point3, radius: f64) -> Result<f64> {
        Ok(self
            .neighbourhood_plane(center, radius)?
            .map_or(0.0, |fit| fit.slope_deg))
    }

    /// Spread of the neighbourhood of `center` around its fitted plane.
    pub fn roughness(&self, center: Point3, radius: f64) -> Result<f64> {
        Ok(self
            .neighbourhood_plane(center, radius)?
            .map_or(0.0, |fit| fit.roughness))
    }
}
