//! Aggregate surface measurements over the triangulated terrain.

use std::collections::BTreeMap;

use crate::dtm::{triangle_slope_deg, Tin};
use crate::error::Result;
use crate::geometry::{cross, norm, orient2d, subtract};
use crate::model::TerrainModel;
use crate::store::{Bounds, CoordinateCodec, PointStore};

/// Summary of a terrain surface.
///
/// Areas and volume are measured over the triangulation. The volume is the
/// prism approximation: projected triangle area times the mean height of its
/// vertices above `base_elevation`, so parts below the base count negatively.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TerrainStatistics {
    pub point_count: usize,
    pub triangle_count: usize,
    pub bounds: Bounds,
    pub mean_elevation: f64,
    pub std_elevation: f64,
    pub mean_slope_deg: f64,
    pub max_slope_deg: f64,
    pub surface_area: f64,
    pub projected_area: f64,
    pub volume: f64,
    pub base_elevation: f64,
    /// Surface area over projected area. Zero when there is no mesh.
    pub rugosity: f64,
    /// Points per unit of projected area.
    pub point_density: f64,
    /// Mean slope of the triangles around each point, by point id.
    pub slopes: BTreeMap<u64, f64>,
}

impl TerrainStatistics {
    /// Statistics for a store too small to triangulate. Only the count and
    /// bounds are filled in; every measurement is zero.
    pub fn sparse<C: CoordinateCodec>(store: &PointStore<C>) -> Self {
        Self {
            point_count: store.len(),
            bounds: store.bounds().unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Measures `tin`, whose first `store.len()` vertices are the store's
    /// points in position order.
    pub fn compute<C: CoordinateCodec>(
        store: &PointStore<C>,
        tin: &Tin,
        base_elevation: Option<f64>,
    ) -> Self {
        let bounds = store.bounds().unwrap_or_default();
        let base = base_elevation.unwrap_or(bounds.min_z);
        let vertices = tin.vertices();

        let mut surface_area = 0.0;
        let mut projected_area = 0.0;
        let mut weighted_slope = 0.0;
        let mut max_slope: f64 = 0.0;
        let mut incident = vec![(0.0, 0usize); tin.source_count()];

        for t in tin.triangles() {
            let (a, b, c) = (vertices[t[0]], vertices[t[1]], vertices[t[2]]);
            let area = norm(cross(subtract(b, a), subtract(c, a))) / 2.0;
            let flat = orient2d(a.xy(), b.xy(), c.xy()).abs() / 2.0;
            let slope = triangle_slope_deg(a, b, c);
            surface_area += area;
            projected_area += flat;
            weighted_slope += slope * area;
            max_slope = max_slope.max(slope);
            for &v in t {
                if let Some(acc) = incident.get_mut(v) {
                    acc.0 += slope;
                    acc.1 += 1;
                }
            }
        }

        let slopes = incident
            .iter()
            .enumerate()
            .filter(|(_, (_, n))| *n > 0)
            .filter_map(|(pos, (sum, n))| store.id_at(pos).map(|id| (id, sum / *n as f64)))
            .collect();

        let coords = store.as_array();
        let n = coords.len() as f64;
        let mean_elevation = coords.iter().map(|c| c[2]).sum::<f64>() / n;
        let variance = coords
            .iter()
            .map(|c| (c[2] - mean_elevation).powi(2))
            .sum::<f64>()
            / n;

        Self {
            point_count: coords.len(),
            triangle_count: tin.triangles().len(),
            bounds,
            mean_elevation,
            std_elevation: variance.sqrt(),
            mean_slope_deg: if surface_area > 0.0 {
                weighted_slope / surface_area
            } else {
                0.0
            },
            max_slope_deg: max_slope,
            surface_area,
            projected_area,
            volume: tin.volume_to_elevation(base),
            base_elevation: base,
            rugosity: if projected_area > 0.0 {
                surface_area / projected_area
            } else {
                1.0
            },
            point_density: if projected_area > 0.0 {
                n / projected_area
            } else {
                0.0
            },
            slopes,
        }
    }
}

impl<C: CoordinateCodec> TerrainModel<C> {
    /// Surface statistics, with the volume measured above `base_elevation`
    /// (the lowest stored elevation when `None`).
    pub fn statistics(&self, base_elevation: Option<f64>) -> Result<TerrainStatistics> {
        if self.len() < 3 {
            return Ok(TerrainStatistics::sparse(self.store()));
        }
        let tin = self.triangulation()?;
        Ok(TerrainStatistics::compute(self.store(), &tin, base_elevation))
    }
}
