//! Terrain surface that rebuilds its derived structures when points change.

use std::convert::Infallible;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::TerrainConfig;
use crate::dtm::{BreakLine, Tin, TinOptions, TriangulationState};
use crate::error::{Result, TerrainError};
use crate::geometry::Point3;
use crate::spatial::{Metric, Neighbor, SpatialIndex};
use crate::store::{CoordinateCodec, Exact, PointStore, TerrainPoint};

/// Lazily built value tagged with the key (generation) it was built from.
struct Derived<K, T> {
    slot: RwLock<Option<(K, Arc<T>)>>,
}

impl<K: Copy + PartialEq, T> Derived<K, T> {
    fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    fn is_current(&self, key: K) -> bool {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        matches!(&*slot, Some((k, _)) if *k == key)
    }

    /// Returns the cached value for `key`, building it first when the cache
    /// is empty or was built from another key.
    fn get_or_build<E>(
        &self,
        key: K,
        build: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<Arc<T>, E> {
        {
            let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
            if let Some((k, value)) = &*slot {
                if *k == key {
                    return Ok(Arc::clone(value));
                }
            }
        }
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if let Some((k, value)) = &*slot {
            if *k == key {
                return Ok(Arc::clone(value));
            }
        }
        let value = Arc::new(build()?);
        *slot = Some((key, Arc::clone(&value)));
        Ok(value)
    }
}

/// A stored point returned by a neighbour query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointMatch {
    pub point: TerrainPoint,
    pub distance: f64,
}

/// Key of the triangulation cache: store generation and constraint revision.
type MeshKey = (u64, u64);

/// Terrain point cloud with break lines and lazily rebuilt spatial index and
/// triangulation.
///
/// Mutations take `&mut self`; queries take `&self` and may run concurrently.
/// Every derived structure remembers the store generation it was built from
/// and is rebuilt on the next query after a mutation.
pub struct TerrainModel<C: CoordinateCodec = Exact> {
    name: String,
    store: PointStore<C>,
    breaklines: Vec<BreakLine>,
    constraint_revision: u64,
    config: TerrainConfig,
    spatial: Derived<u64, SpatialIndex>,
    planar: Derived<u64, SpatialIndex>,
    tin: Derived<MeshKey, Tin>,
}

impl<C: CoordinateCodec> std::fmt::Debug for TerrainModel<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainModel")
            .field("name", &self.name)
            .field("points", &self.store.len())
            .field("breaklines", &self.breaklines.len())
            .field("generation", &self.store.generation())
            .finish()
    }
}

impl<C: CoordinateCodec> TerrainModel<C> {
    /// Creates an empty terrain with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, TerrainConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: TerrainConfig) -> Self {
        Self {
            name: name.into(),
            store: PointStore::new(),
            breaklines: Vec::new(),
            constraint_revision: 0,
            config,
            spatial: Derived::new(),
            planar: Derived::new(),
            tin: Derived::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Replaces the settings. The triangulation is rebuilt on next use.
    pub fn set_config(&mut self, config: TerrainConfig) {
        self.config = config;
        self.constraint_revision += 1;
    }

    pub fn store(&self) -> &PointStore<C> {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn add_point(&mut self, point: TerrainPoint) -> Result<usize> {
        self.store.add(point)
    }

    /// Adds all points or none; derived structures are rebuilt once.
    pub fn add_points<I>(&mut self, points: I) -> Result<usize>
    where
        I: IntoIterator<Item = TerrainPoint>,
    {
        self.store.add_batch(points)
    }

    pub fn get_point(&self, id: u64) -> Result<TerrainPoint> {
        self.store.get(id)
    }

    /// Removes a point. Points still referenced by a break line cannot be
    /// removed; remove the break line first.
    pub fn remove_point(&mut self, id: u64) -> Result<TerrainPoint> {
        if let Some(bl) = self.breaklines.iter().find(|b| b.references(id)) {
            return Err(TerrainError::ConstraintUnsatisfiable(format!(
                "point {} is an endpoint of break line {}-{}",
                id, bl.start, bl.end
            )));
        }
        self.store.remove(id)
    }

    fn validate_breakline(&self, start: u64, end: u64) -> Result<BreakLine> {
        let a = self.store.get(start)?;
        let b = self.store.get(end)?;
        if start == end {
            return Err(TerrainError::InvalidBreakLine {
                start,
                end,
                reason: "endpoints must be distinct points".into(),
            });
        }
        if a.x() == b.x() && a.y() == b.y() {
            return Err(TerrainError::InvalidBreakLine {
                start,
                end,
                reason: "endpoints share the same horizontal position".into(),
            });
        }
        Ok(BreakLine::new(start, end))
    }

    /// Declares a break line between two stored points. Declaring the same
    /// edge twice (in either direction) has no effect.
    pub fn add_break_line(&mut self, start: u64, end: u64) -> Result<()> {
        let bl = self.validate_breakline(start, end)?;
        if !self.breaklines.iter().any(|b| b.same_edge(&bl)) {
            self.breaklines.push(bl);
            self.constraint_revision += 1;
        }
        Ok(())
    }

    /// Declares a chain of break lines through consecutive ids. Either all
    /// segments are added or none.
    pub fn add_break_line_path(&mut self, ids: &[u64]) -> Result<()> {
        let segments = ids
            .windows(2)
            .map(|w| self.validate_breakline(w[0], w[1]))
            .collect::<Result<Vec<_>>>()?;
        for bl in segments {
            if !self.breaklines.iter().any(|b| b.same_edge(&bl)) {
                self.breaklines.push(bl);
            }
        }
        self.constraint_revision += 1;
        Ok(())
    }

    /// Removes the break line between `start` and `end` in either direction.
    pub fn remove_break_line(&mut self, start: u64, end: u64) -> bool {
        let target = BreakLine::new(start, end);
        let before = self.breaklines.len();
        self.breaklines.retain(|b| !b.same_edge(&target));
        let removed = self.breaklines.len() != before;
        if removed {
            self.constraint_revision += 1;
        }
        removed
    }

    pub fn break_lines(&self) -> &[BreakLine] {
        &self.breaklines
    }

    fn mesh_key(&self) -> MeshKey {
        (self.store.generation(), self.constraint_revision)
    }

    pub fn triangulation_state(&self) -> TriangulationState {
        if self.store.len() < 3 {
            TriangulationState::Empty
        } else if self.tin.is_current(self.mesh_key()) {
            TriangulationState::Built
        } else {
            TriangulationState::Unbuilt
        }
    }

    /// k-d tree over `(x, y, z)` for the current store generation.
    pub fn spatial_index(&self) -> Arc<SpatialIndex> {
        self.index(Metric::Euclidean3)
    }

    /// k-d tree over `(x, y)` for the current store generation.
    pub fn planar_index(&self) -> Arc<SpatialIndex> {
        self.index(Metric::Planar)
    }

    fn index(&self, metric: Metric) -> Arc<SpatialIndex> {
        let generation = self.store.generation();
        let cache = match metric {
            Metric::Euclidean3 => &self.spatial,
            Metric::Planar => &self.planar,
        };
        let built = cache.get_or_build(generation, || {
            Ok::<_, Infallible>(SpatialIndex::build(
                self.store.as_array().into_owned(),
                metric,
                generation,
            ))
        });
        match built {
            Ok(index) => index,
            Err(never) => match never {},
        }
    }

    /// Triangulation for the current points and break lines.
    pub fn triangulation(&self) -> Result<Arc<Tin>> {
        let key = self.mesh_key();
        self.tin.get_or_build(key, || -> Result<Tin> {
            let points: Vec<Point3> = self.store.as_array().iter().map(|&c| Point3::from(c)).collect();
            let constraints = self
                .breaklines
                .iter()
                .map(|b| {
                    let a = self.store.position_of(b.start).ok_or(TerrainError::NotFound(b.start))?;
                    let e = self.store.position_of(b.end).ok_or(TerrainError::NotFound(b.end))?;
                    Ok((a, e))
                })
                .collect::<Result<Vec<_>>>()?;
            let options = TinOptions {
                strategy: self.config.breakline_strategy,
                max_refinement_passes: self.config.max_refinement_passes,
                ..TinOptions::default()
            };
            Tin::build(points, &constraints, options, key.0)
        })
    }

    fn to_matches(&self, neighbors: Vec<Neighbor>) -> Vec<PointMatch> {
        neighbors
            .into_iter()
            .filter_map(|n| {
                self.store.point_at(n.position).map(|point| PointMatch {
                    point,
                    distance: n.distance,
                })
            })
            .collect()
    }

    /// Up to `k` points nearest to `query` by 3D distance, closest first.
    pub fn nearest(&self, query: Point3, k: usize) -> Result<Vec<PointMatch>> {
        check_finite(&[query.x, query.y, query.z])?;
        Ok(self.to_matches(self.spatial_index().nearest(query.to_array(), k)))
    }

    /// Up to `k` points nearest to `(x, y)` by horizontal distance.
    pub fn nearest_planar(&self, x: f64, y: f64, k: usize) -> Result<Vec<PointMatch>> {
        check_finite(&[x, y])?;
        Ok(self.to_matches(self.planar_index().nearest([x, y, 0.0], k)))
    }

    /// All points within `radius` of `center` by 3D distance, closest first.
    pub fn within_radius(&self, center: Point3, radius: f64) -> Result<Vec<PointMatch>> {
        check_finite(&[center.x, center.y, center.z])?;
        if !radius.is_finite() || radius < 0.0 {
            return Err(TerrainError::InvalidQuery(format!(
                "radius {radius} must be finite and non-negative"
            )));
        }
        Ok(self.to_matches(self.spatial_index().within_radius(center.to_array(), radius)))
    }
}

pub(crate) fn check_finite(values: &[f64]) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(TerrainError::InvalidQuery(format!(
            "query coordinates {values:?} must be finite"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(id: u64, x: f64, y: f64, z: f64) -> TerrainPoint {
        TerrainPoint::new(id, x, y, z).unwrap()
    }

    fn grid(model: &mut TerrainModel) {
        let pts = (0..9).map(|i| pt(i, (i % 3) as f64, (i / 3) as f64, i as f64));
        model.add_points(pts).unwrap();
    }

    #[test]
    fn state_machine() {
        let mut model: TerrainModel = TerrainModel::new("t");
        assert_eq!(model.triangulation_state(), TriangulationState::Empty);
        assert!(matches!(
            model.triangulation(),
            Err(TerrainError::InsufficientPoints { found: 0 })
        ));
        grid(&mut model);
        assert_eq!(model.triangulation_state(), TriangulationState::Unbuilt);
        model.triangulation().unwrap();
        assert_eq!(model.triangulation_state(), TriangulationState::Built);
        model.add_break_line(0, 8).unwrap();
        assert_eq!(model.triangulation_state(), TriangulationState::Unbuilt);
        model.triangulation().unwrap();
        model.add_point(pt(100, 5.0, 5.0, 0.0)).unwrap();
        assert_eq!(model.triangulation_state(), TriangulationState::Unbuilt);
    }

    #[test]
    fn index_is_rebuilt_after_mutation() {
        let mut model: TerrainModel = TerrainModel::new("t");
        grid(&mut model);
        let first = model.nearest(Point3::new(10.0, 10.0, 0.0), 1).unwrap();
        assert_eq!(first[0].point.id(), 8);
        model.add_point(pt(50, 9.0, 9.0, 0.0)).unwrap();
        let second = model.nearest(Point3::new(10.0, 10.0, 0.0), 1).unwrap();
        assert_eq!(second[0].point.id(), 50);
        assert_eq!(model.spatial_index().generation(), model.store().generation());
        model.remove_point(50).unwrap();
        let third = model.nearest(Point3::new(10.0, 10.0, 0.0), 1).unwrap();
        assert_eq!(third[0].point.id(), 8);
    }

    #[test]
    fn cached_index_is_shared_until_mutation() {
        let mut model: TerrainModel = TerrainModel::new("t");
        grid(&mut model);
        let a = model.spatial_index();
        let b = model.spatial_index();
        assert!(Arc::ptr_eq(&a, &b));
        model.add_point(pt(77, 7.0, 7.0, 7.0)).unwrap();
        assert!(!Arc::ptr_eq(&a, &model.spatial_index()));
    }

    #[test]
    fn radius_query_validates_radius() {
        let mut model: TerrainModel = TerrainModel::new("t");
        grid(&mut model);
        let err = model.within_radius(Point3::new(0.0, 0.0, 0.0), -1.0).unwrap_err();
        assert!(err.is_validation());
        let found = model.within_radius(Point3::new(0.0, 0.0, 0.0), 1.0).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].point.id(), 0);
    }

    #[test]
    fn empty_model_queries() {
        let model: TerrainModel = TerrainModel::new("t");
        assert!(model.nearest(Point3::new(0.0, 0.0, 0.0), 3).unwrap().is_empty());
        assert!(model.nearest(Point3::new(f64::NAN, 0.0, 0.0), 3).is_err());
    }

    #[test]
    fn breakline_validation() {
        let mut model: TerrainModel = TerrainModel::new("t");
        grid(&mut model);
        model.add_point(pt(20, 0.0, 0.0, 9.0)).unwrap();
        assert!(matches!(model.add_break_line(0, 99), Err(TerrainError::NotFound(99))));
        assert!(model.add_break_line(3, 3).unwrap_err().is_validation());
        assert!(model.add_break_line(0, 20).unwrap_err().is_validation());
        model.add_break_line(0, 8).unwrap();
        model.add_break_line(8, 0).unwrap();
        assert_eq!(model.break_lines().len(), 1);
        assert!(model.add_break_line_path(&[1, 4, 99]).is_err());
        assert_eq!(model.break_lines().len(), 1);
        model.add_break_line_path(&[1, 4, 7]).unwrap();
        assert_eq!(model.break_lines().len(), 3);
    }

    #[test]
    fn referenced_points_cannot_be_removed() {
        let mut model: TerrainModel = TerrainModel::new("t");
        grid(&mut model);
        model.add_break_line(0, 8).unwrap();
        let err = model.remove_point(8).unwrap_err();
        assert!(matches!(err, TerrainError::ConstraintUnsatisfiable(_)));
        assert!(model.get_point(8).is_ok());
        assert!(model.remove_break_line(8, 0));
        model.remove_point(8).unwrap();
    }

    #[test]
    fn tin_vertices_follow_store_positions() {
        let mut model: TerrainModel = TerrainModel::new("t");
        grid(&mut model);
        model.remove_point(4).unwrap();
        let tin = model.triangulation().unwrap();
        assert_eq!(tin.source_count(), 8);
        for (pos, v) in tin.vertices()[..tin.source_count()].iter().enumerate() {
            let p = model.store().point_at(pos).unwrap();
            assert_eq!(p.position(), *v);
        }
    }
}
