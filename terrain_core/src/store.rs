//! Compact point storage keyed by caller-assigned ids.
//!
//! A [`PointStore`] keeps ids and coordinates in two parallel dense vectors
//! (position order = insertion order) plus an `id -> position` map. How the
//! coordinates are held is chosen at the type level through a
//! [`CoordinateCodec`]: [`Exact`] keeps full `f64` values, [`Centimetric`]
//! keeps `i16` hundredths of a unit.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{Result, TerrainError};
use crate::geometry::{bearing_deg, distance3, grade_percent, Point3};

/// Immutable terrain sample with a caller-assigned id.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RawPoint", into = "RawPoint")]
pub struct TerrainPoint {
    id: u64,
    x: f64,
    y: f64,
    z: f64,
}

/// Unvalidated `[id, x, y, z]` tuple used for serialisation.
#[derive(serde::Serialize, serde::Deserialize)]
struct RawPoint(u64, f64, f64, f64);

impl TryFrom<RawPoint> for TerrainPoint {
    type Error = TerrainError;

    fn try_from(raw: RawPoint) -> Result<Self> {
        TerrainPoint::new(raw.0, raw.1, raw.2, raw.3)
    }
}

impl From<TerrainPoint> for RawPoint {
    fn from(p: TerrainPoint) -> Self {
        RawPoint(p.id, p.x, p.y, p.z)
    }
}

impl TerrainPoint {
    /// Creates a point, rejecting NaN and infinite coordinates.
    pub fn new(id: u64, x: f64, y: f64, z: f64) -> Result<Self> {
        for (axis, v) in [("x", x), ("y", y), ("z", z)] {
            if !v.is_finite() {
                return Err(TerrainError::invalid_point(
                    id,
                    format!("{axis} coordinate {v} is not finite"),
                ));
            }
        }
        Ok(Self { id, x, y, z })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    pub fn position(&self) -> Point3 {
        Point3::new(self.x, self.y, self.z)
    }

    pub fn coords(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Straight-line 3D distance to `other`.
    pub fn distance_to(&self, other: &TerrainPoint) -> f64 {
        distance3(self.position(), other.position())
    }

    /// Grade to `other` in percent; see [`grade_percent`].
    pub fn slope_to(&self, other: &TerrainPoint) -> f64 {
        grade_percent(self.position(), other.position())
    }

    /// Bearing to `other` in degrees clockwise from north.
    pub fn bearing_to(&self, other: &TerrainPoint) -> f64 {
        bearing_deg(self.position().xy(), other.position().xy())
    }
}

/// How a [`PointStore`] holds coordinates in memory.
pub trait CoordinateCodec: Send + Sync + 'static {
    /// Per-point coordinate representation.
    type Stored: Copy + PartialEq + fmt::Debug + Send + Sync;

    /// Smallest representable coordinate step, `0.0` when exact.
    const STEP: f64;

    /// Encodes validated coordinates. Fails when the value cannot be held.
    fn encode(id: u64, coords: [f64; 3]) -> Result<Self::Stored>;

    fn decode(stored: &Self::Stored) -> [f64; 3];

    /// Dense `[x, y, z]` rows for a slice of stored coordinates.
    fn dense(stored: &[Self::Stored]) -> Cow<'_, [[f64; 3]]> {
        Cow::Owned(stored.iter().map(Self::decode).collect())
    }
}

/// Full `f64` coordinates: 32 bytes per point including the id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Exact;

impl CoordinateCodec for Exact {
    type Stored = [f64; 3];
    const STEP: f64 = 0.0;

    fn encode(_id: u64, coords: [f64; 3]) -> Result<Self::Stored> {
        Ok(coords)
    }

    fn decode(stored: &Self::Stored) -> [f64; 3] {
        *stored
    }

    fn dense(stored: &[Self::Stored]) -> Cow<'_, [[f64; 3]]> {
        Cow::Borrowed(stored)
    }
}

/// Coordinates quantized to hundredths of a unit in `i16`.
///
/// Reads return `round(v * 100) / 100`, so a round trip is exact only to
/// within half a step (0.005). Representable range is roughly
/// `-327.68..=327.67`; anything outside is rejected on insertion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Centimetric;

impl Centimetric {
    pub const SCALE: f64 = 100.0;

    pub fn quantize(id: u64, v: f64) -> Result<i16> {
        let q = (v * Self::SCALE).round();
        if q < i16::MIN as f64 || q > i16::MAX as f64 {
            return Err(TerrainError::invalid_point(
                id,
                format!("coordinate {v} is outside the quantized range"),
            ));
        }
        Ok(q as i16)
    }

    pub fn dequantize(q: i16) -> f64 {
        q as f64 / Self::SCALE
    }
}

impl CoordinateCodec for Centimetric {
    type Stored = [i16; 3];
    const STEP: f64 = 1.0 / Centimetric::SCALE;

    fn encode(id: u64, coords: [f64; 3]) -> Result<Self::Stored> {
        Ok([
            Self::quantize(id, coords[0])?,
            Self::quantize(id, coords[1])?,
            Self::quantize(id, coords[2])?,
        ])
    }

    fn decode(stored: &Self::Stored) -> [f64; 3] {
        [
            Self::dequantize(stored[0]),
            Self::dequantize(stored[1]),
            Self::dequantize(stored[2]),
        ]
    }
}

/// Axis-aligned bounds of a set of points.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub min_z: f64,
    pub max_z: f64,
}

impl Bounds {
    /// Bounds of `coords`, or `None` when empty.
    pub fn from_coords(coords: &[[f64; 3]]) -> Option<Self> {
        let first = coords.first()?;
        let mut b = Bounds {
            min_x: first[0],
            max_x: first[0],
            min_y: first[1],
            max_y: first[1],
            min_z: first[2],
            max_z: first[2],
        };
        for c in &coords[1..] {
            b.min_x = b.min_x.min(c[0]);
            b.max_x = b.max_x.max(c[0]);
            b.min_y = b.min_y.min(c[1]);
            b.max_y = b.max_y.max(c[1]);
            b.min_z = b.min_z.min(c[2]);
            b.max_z = b.max_z.max(c[2]);
        }
        Some(b)
    }
}

/// Dense point storage with id lookup and a generation counter.
pub struct PointStore<C: CoordinateCodec = Exact> {
    ids: Vec<u64>,
    coords: Vec<C::Stored>,
    positions: HashMap<u64, usize>,
    generation: u64,
}

impl<C: CoordinateCodec> fmt::Debug for PointStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointStore")
            .field("len", &self.ids.len())
            .field("generation", &self.generation)
            .finish()
    }
}

impl<C: CoordinateCodec> Clone for PointStore<C> {
    fn clone(&self) -> Self {
        Self {
            ids: self.ids.clone(),
            coords: self.coords.clone(),
            positions: self.positions.clone(),
            generation: self.generation,
        }
    }
}

impl<C: CoordinateCodec> Default for PointStore<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Two stores are equal when they hold the same points in the same order.
impl<C: CoordinateCodec> PartialEq for PointStore<C> {
    fn eq(&self, other: &Self) -> bool {
        self.ids == other.ids && self.coords == other.coords
    }
}

impl<C: CoordinateCodec> PointStore<C> {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            ids: Vec::new(),
            coords: Vec::new(),
            positions: HashMap::new(),
            generation: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            coords: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
            generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Version number incremented by every mutation. Derived structures
    /// record the generation they were built from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// In-memory bytes used per point by ids and coordinates.
    pub fn bytes_per_point(&self) -> usize {
        std::mem::size_of::<u64>() + std::mem::size_of::<C::Stored>()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.positions.contains_key(&id)
    }

    /// Adds a point and returns its position.
    pub fn add(&mut self, point: TerrainPoint) -> Result<usize> {
        if self.contains(point.id) {
            return Err(TerrainError::DuplicateId(point.id));
        }
        let stored = C::encode(point.id, point.coords())?;
        let pos = self.ids.len();
        self.ids.push(point.id);
        self.coords.push(stored);
        self.positions.insert(point.id, pos);
        self.generation += 1;
        Ok(pos)
    }

    /// Adds all points or none. Returns the number of points added.
    pub fn add_batch<I>(&mut self, points: I) -> Result<usize>
    where
        I: IntoIterator<Item = TerrainPoint>,
    {
        let points = points.into_iter();
        let mut seen = HashSet::new();
        let mut staged = Vec::with_capacity(points.size_hint().0);
        for p in points {
            if self.contains(p.id) || !seen.insert(p.id) {
                return Err(TerrainError::DuplicateId(p.id));
            }
            staged.push((p.id, C::encode(p.id, p.coords())?));
        }
        if staged.is_empty() {
            return Ok(0);
        }
        self.ids.reserve(staged.len());
        self.coords.reserve(staged.len());
        for (id, stored) in &staged {
            self.positions.insert(*id, self.ids.len());
            self.ids.push(*id);
            self.coords.push(*stored);
        }
        self.generation += 1;
        log::debug!("added batch of {} points, store now holds {}", staged.len(), self.len());
        Ok(staged.len())
    }

    /// Returns the point with the given id.
    pub fn get(&self, id: u64) -> Result<TerrainPoint> {
        let pos = self.position_of(id).ok_or(TerrainError::NotFound(id))?;
        Ok(self.point_at_unchecked(pos))
    }

    /// Current position of `id`. Positions shift when earlier points are
    /// removed; ids are the only stable handle.
    pub fn position_of(&self, id: u64) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn point_at(&self, position: usize) -> Option<TerrainPoint> {
        (position < self.len()).then(|| self.point_at_unchecked(position))
    }

    pub fn id_at(&self, position: usize) -> Option<u64> {
        self.ids.get(position).copied()
    }

    fn point_at_unchecked(&self, pos: usize) -> TerrainPoint {
        let [x, y, z] = C::decode(&self.coords[pos]);
        TerrainPoint {
            id: self.ids[pos],
            x,
            y,
            z,
        }
    }

    /// Removes the point with the given id, compacting positions.
    pub fn remove(&mut self, id: u64) -> Result<TerrainPoint> {
        let pos = self.positions.remove(&id).ok_or(TerrainError::NotFound(id))?;
        let point = self.point_at_unchecked(pos);
        self.ids.remove(pos);
        self.coords.remove(pos);
        for p in self.positions.values_mut() {
            if *p > pos {
                *p -= 1;
            }
        }
        self.generation += 1;
        Ok(point)
    }

    /// Ids in position order.
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// Dense `[x, y, z]` rows in position order.
    pub fn as_array(&self) -> Cow<'_, [[f64; 3]]> {
        C::dense(&self.coords)
    }

    /// Iterates over all points in position order.
    pub fn iter(&self) -> impl Iterator<Item = TerrainPoint> + '_ {
        (0..self.len()).map(move |pos| self.point_at_unchecked(pos))
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_coords(&self.as_array())
    }

    /// Largest id in the store.
    pub fn max_id(&self) -> Option<u64> {
        self.ids.iter().copied().max()
    }

    /// 3D distance between two stored points.
    pub fn distance_between(&self, a: u64, b: u64) -> Result<f64> {
        Ok(self.get(a)?.distance_to(&self.get(b)?))
    }

    /// Grade in percent from `a` to `b`.
    pub fn slope_between(&self, a: u64, b: u64) -> Result<f64> {
        Ok(self.get(a)?.slope_to(&self.get(b)?))
    }

    /// Bearing in degrees clockwise from north from `a` to `b`.
    pub fn bearing_between(&self, a: u64, b: u64) -> Result<f64> {
        Ok(self.get(a)?.bearing_to(&self.get(b)?))
    }

    /// Builds a store from points, rejecting the whole set on any error.
    pub fn from_points<I>(points: I) -> Result<Self>
    where
        I: IntoIterator<Item = TerrainPoint>,
    {
        let mut store = Self::new();
        store.add_batch(points)?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(id: u64, x: f64, y: f64, z: f64) -> TerrainPoint {
        TerrainPoint::new(id, x, y, z).unwrap()
    }

    #[test]
    fn rejects_non_finite() {
        let err = TerrainPoint::new(1, f64::NAN, 0.0, 0.0).unwrap_err();
        assert!(err.is_validation());
        assert!(TerrainPoint::new(1, 0.0, f64::INFINITY, 0.0).is_err());
    }

    #[test]
    fn add_get_exact_is_bit_identical() {
        let mut store: PointStore = PointStore::new();
        let p = pt(7, 0.1 + 0.2, -1e-300, 12345.678901234);
        store.add(p).unwrap();
        let got = store.get(7).unwrap();
        assert_eq!(got.x().to_bits(), p.x().to_bits());
        assert_eq!(got.y().to_bits(), p.y().to_bits());
        assert_eq!(got.z().to_bits(), p.z().to_bits());
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut store: PointStore = PointStore::new();
        store.add(pt(1, 0.0, 0.0, 0.0)).unwrap();
        let err = store.add(pt(1, 5.0, 5.0, 5.0)).unwrap_err();
        assert!(matches!(err, TerrainError::DuplicateId(1)));
        assert_eq!(store.get(1).unwrap().x(), 0.0);
    }

    #[test]
    fn batch_is_atomic() {
        let mut store: PointStore = PointStore::new();
        store.add(pt(3, 0.0, 0.0, 0.0)).unwrap();
        let gen = store.generation();
        let err = store
            .add_batch(vec![pt(1, 0.0, 0.0, 0.0), pt(2, 1.0, 0.0, 0.0), pt(3, 2.0, 0.0, 0.0)])
            .unwrap_err();
        assert!(matches!(err, TerrainError::DuplicateId(3)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.generation(), gen);

        let err = store
            .add_batch(vec![pt(4, 0.0, 0.0, 0.0), pt(4, 0.0, 0.0, 0.0)])
            .unwrap_err();
        assert!(matches!(err, TerrainError::DuplicateId(4)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn batch_bumps_generation_once() {
        let mut store: PointStore = PointStore::new();
        let n = store
            .add_batch((0..10).map(|i| pt(i, i as f64, 0.0, 0.0)))
            .unwrap();
        assert_eq!(n, 10);
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn remove_compacts_positions() {
        let mut store: PointStore = PointStore::new();
        store
            .add_batch(vec![pt(10, 0.0, 0.0, 0.0), pt(20, 1.0, 0.0, 0.0), pt(30, 2.0, 0.0, 0.0)])
            .unwrap();
        let removed = store.remove(20).unwrap();
        assert_eq!(removed.x(), 1.0);
        assert_eq!(store.len(), 2);
        assert_eq!(store.position_of(10), Some(0));
        assert_eq!(store.position_of(30), Some(1));
        assert_eq!(store.as_array()[1], [2.0, 0.0, 0.0]);
        assert!(matches!(store.remove(20), Err(TerrainError::NotFound(20))));
        assert!(matches!(store.get(20), Err(TerrainError::NotFound(20))));
        let mut positions: Vec<usize> = store.ids().iter().map(|&id| store.position_of(id).unwrap()).collect();
        positions.sort_unstable();
        assert_eq!(positions, vec![0, 1]);
    }

    #[test]
    fn exact_array_view_borrows() {
        let mut store: PointStore = PointStore::new();
        store.add(pt(1, 1.0, 2.0, 3.0)).unwrap();
        assert!(matches!(store.as_array(), Cow::Borrowed(_)));
    }

    #[test]
    fn quantized_round_trip_within_half_step() {
        let mut store: PointStore<Centimetric> = PointStore::new();
        let p = pt(1, 12.3456, -7.891, 0.004);
        store.add(p).unwrap();
        let got = store.get(1).unwrap();
        assert!((got.x() - p.x()).abs() <= 0.005 + 1e-12);
        assert!((got.y() - p.y()).abs() <= 0.005 + 1e-12);
        assert!((got.z() - p.z()).abs() <= 0.005 + 1e-12);
        assert!(store.bytes_per_point() < 32 / 2);
        assert_eq!(PointStore::<Exact>::new().bytes_per_point(), 32);
    }

    #[test]
    fn quantized_rejects_out_of_range() {
        let mut store: PointStore<Centimetric> = PointStore::new();
        let err = store.add(pt(1, 400.0, 0.0, 0.0)).unwrap_err();
        assert!(err.is_validation());
        assert!(store.is_empty());
    }

    #[test]
    fn point_helpers() {
        let store: PointStore = PointStore::from_points(vec![
            pt(1, 0.0, 0.0, 0.0),
            pt(2, 3.0, 4.0, 0.0),
            pt(3, 10.0, 0.0, 1.0),
        ])
        .unwrap();
        assert!((store.distance_between(1, 2).unwrap() - 5.0).abs() < 1e-12);
        assert!((store.slope_between(1, 3).unwrap() - 10.0).abs() < 1e-12);
        assert!((store.bearing_between(1, 3).unwrap() - 90.0).abs() < 1e-12);
        assert!(store.bearing_between(1, 99).is_err());
    }

    #[test]
    fn serde_goes_through_validation() {
        let p: TerrainPoint = serde_json::from_str("[5, 1.0, 2.0, 3.0]").unwrap();
        assert_eq!(p.id(), 5);
        assert_eq!(serde_json::to_string(&p).unwrap(), "[5,1.0,2.0,3.0]");
    }
}
