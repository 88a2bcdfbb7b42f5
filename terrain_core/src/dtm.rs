//! Triangulated irregular network built from a point store snapshot.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, TerrainError};
use crate::geometry::{
    cross, distance, norm, orient2d, segments_cross, subtract, Line3, Point, Point3,
};

/// Straight constraint edge between two stored points, by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BreakLine {
    pub start: u64,
    pub end: u64,
}

impl BreakLine {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Returns `true` if the break line uses `id` as an endpoint.
    pub fn references(&self, id: u64) -> bool {
        self.start == id || self.end == id
    }

    /// Same endpoints regardless of direction.
    pub fn same_edge(&self, other: &BreakLine) -> bool {
        (self.start == other.start && self.end == other.end)
            || (self.start == other.end && self.end == other.start)
    }
}

/// How break lines are enforced on the Delaunay mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreaklineStrategy {
    /// Constrained Delaunay triangulation, falling back to [`Self::Refine`]
    /// when the library rejects the input.
    Constrained,
    /// Split crossed break-line segments at their midpoints and
    /// re-triangulate until no mesh edge crosses a break line.
    Refine,
}

/// Lifecycle of the triangulation owned by a terrain model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriangulationState {
    /// Fewer than three points; no triangulation exists.
    Empty,
    /// Points or break lines changed since the last build.
    Unbuilt,
    /// A mesh for the current store generation is available.
    Built,
}

/// Break line resolved to vertex positions of a particular mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constraint {
    pub start: usize,
    pub end: usize,
    pub line: Line3,
}

/// Settings for [`Tin::build`].
#[derive(Debug, Clone, Copy)]
pub struct TinOptions {
    pub strategy: BreaklineStrategy,
    pub max_refinement_passes: usize,
    /// Most vertices refinement may insert. `None` allows
    /// [`CONSTRAINT_VERTICES_PER_INPUT`] per input vertex and break-line piece.
    pub max_constraint_vertices: Option<usize>,
}

impl Default for TinOptions {
    fn default() -> Self {
        Self {
            strategy: BreaklineStrategy::Constrained,
            max_refinement_passes: 24,
            max_constraint_vertices: None,
        }
    }
}

/// Default refinement vertex allowance per input vertex and break-line piece.
pub const CONSTRAINT_VERTICES_PER_INPUT: usize = 8;

fn barycentric(p: Point, a: Point3, b: Point3, c: Point3) -> Option<(f64, f64, f64)> {
    let det = (b.y - c.y) * (a.x - c.x) + (c.x - b.x) * (a.y - c.y);
    if det.abs() < f64::EPSILON * f64::EPSILON {
        return None;
    }
    let u = ((b.y - c.y) * (p.x - c.x) + (c.x - b.x) * (p.y - c.y)) / det;
    let v = ((c.y - a.y) * (p.x - c.x) + (a.x - c.x) * (p.y - c.y)) / det;
    let w = 1.0 - u - v;
    Some((u, v, w))
}

/// Slope in degrees of the plane through `a`, `b`, `c`, measured between the
/// face normal and the vertical. Zero for degenerate faces.
pub fn triangle_slope_deg(a: Point3, b: Point3, c: Point3) -> f64 {
    let n = cross(subtract(b, a), subtract(c, a));
    let len = norm(n);
    if len <= f64::EPSILON {
        return 0.0;
    }
    (n.z.abs() / len).clamp(-1.0, 1.0).acos().to_degrees()
}

fn xy_key(p: Point3) -> (u64, u64) {
    // + 0.0 folds -0.0 into 0.0
    ((p.x + 0.0).to_bits(), (p.y + 0.0).to_bits())
}

/// For each vertex, the first vertex at the same `(x, y)`.
fn planar_representatives(vertices: &[Point3]) -> Vec<usize> {
    let mut first = HashMap::with_capacity(vertices.len());
    vertices
        .iter()
        .enumerate()
        .map(|(i, p)| *first.entry(xy_key(*p)).or_insert(i))
        .collect()
}

fn unique_positions(reps: &[usize]) -> Vec<usize> {
    (0..reps.len()).filter(|&i| reps[i] == i).collect()
}

/// Delaunay triangulation of the XY projection, counter-clockwise and
/// without zero-area faces. A vertex sharing its `(x, y)` with an earlier one
/// is left out of the mesh.
fn delaunay(vertices: &[Point3]) -> Vec<[usize; 3]> {
    let unique = unique_positions(&planar_representatives(vertices));
    let coords: Vec<delaunator::Point> = unique
        .iter()
        .map(|&i| delaunator::Point {
            x: vertices[i].x,
            y: vertices[i].y,
        })
        .collect();
    let triangulation = delaunator::triangulate(&coords);
    normalize(
        vertices,
        triangulation
            .triangles
            .chunks(3)
            .map(|c| [unique[c[0]], unique[c[1]], unique[c[2]]]),
    )
}

fn normalize(vertices: &[Point3], tris: impl Iterator<Item = [usize; 3]>) -> Vec<[usize; 3]> {
    tris.filter_map(|[a, b, c]| {
        let o = orient2d(vertices[a].xy(), vertices[b].xy(), vertices[c].xy());
        if o > 0.0 {
            Some([a, b, c])
        } else if o < 0.0 {
            Some([a, c, b])
        } else {
            None
        }
    })
    .collect()
}

fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Indices of the `segments` that are not edges of the mesh.
///
/// Segments never pass through a vertex, so a segment between two mesh
/// vertices that is not an edge is properly crossed by one.
fn missing_segments(triangles: &[[usize; 3]], segments: &[(usize, usize)]) -> Vec<usize> {
    let edges: HashSet<(usize, usize)> = triangles
        .iter()
        .flat_map(|t| [edge_key(t[0], t[1]), edge_key(t[1], t[2]), edge_key(t[2], t[0])])
        .collect();
    segments
        .iter()
        .enumerate()
        .filter(|&(_, &(a, b))| !edges.contains(&edge_key(a, b)))
        .map(|(i, _)| i)
        .collect()
}

/// Splits break lines at the vertices lying on them, so no vertex sits
/// inside a piece. Endpoints are replaced by their planar representatives;
/// zero-length and repeated pieces are dropped.
fn split_at_collinear_vertices(
    vertices: &[Point3],
    reps: &[usize],
    segments: &[(usize, usize)],
) -> Vec<(usize, usize)> {
    let mut refined = Vec::new();
    for &(a, b) in segments {
        let (a, b) = (reps[a], reps[b]);
        if a == b {
            continue;
        }
        let line = Line3::new(vertices[a], vertices[b]);
        let len = line.length().max(f64::EPSILON);
        let (lo, hi) = (vertices[a].xy(), vertices[b].xy());
        let mut mids: Vec<(usize, f64)> = (0..vertices.len())
            .filter(|&i| reps[i] == i && i != a && i != b)
            .filter(|&i| {
                let p = vertices[i];
                p.x >= lo.x.min(hi.x)
                    && p.x <= lo.x.max(hi.x)
                    && p.y >= lo.y.min(hi.y)
                    && p.y <= lo.y.max(hi.y)
            })
            .filter_map(|i| {
                let (t, perp) = line.project_xy(vertices[i].xy())?;
                (t > 0.0 && t < 1.0 && perp <= 1e-9 * len).then_some((i, t))
            })
            .collect();
        mids.sort_by(|x, y| x.1.total_cmp(&y.1));
        let mut last = a;
        for (idx, _) in mids {
            refined.push((last, idx));
            last = idx;
        }
        refined.push((last, b));
    }
    refined.sort_unstable_by_key(|&(a, b)| edge_key(a, b));
    refined.dedup_by_key(|&mut (a, b)| edge_key(a, b));
    refined
}

fn describe(vertices: &[Point3], (a, b): (usize, usize)) -> String {
    format!(
        "({:.3}, {:.3})-({:.3}, {:.3})",
        vertices[a].x, vertices[a].y, vertices[b].x, vertices[b].y
    )
}

/// First two break-line pieces that properly cross each other.
fn crossing_pair(
    vertices: &[Point3],
    segments: &[(usize, usize)],
) -> Option<((usize, usize), (usize, usize))> {
    for (i, &(a, b)) in segments.iter().enumerate() {
        let (pa, pb) = (vertices[a].xy(), vertices[b].xy());
        for &(c, d) in &segments[i + 1..] {
            let (qc, qd) = (vertices[c].xy(), vertices[d].xy());
            if pa.x.max(pb.x) < qc.x.min(qd.x)
                || pa.x.min(pb.x) > qc.x.max(qd.x)
                || pa.y.max(pb.y) < qc.y.min(qd.y)
                || pa.y.min(pb.y) > qc.y.max(qd.y)
            {
                continue;
            }
            if segments_cross(pa, pb, qc, qd) {
                return Some(((a, b), (c, d)));
            }
        }
    }
    None
}

/// Constrained Delaunay triangulation of `vertices` with `segments` as fixed
/// edges, or `None` when the library rejects the input or leaves a segment
/// out of the mesh.
fn constrained(
    vertices: &[Point3],
    reps: &[usize],
    segments: &[(usize, usize)],
) -> Option<Vec<[usize; 3]>> {
    let unique = unique_positions(reps);
    let mut compact = vec![0; vertices.len()];
    for (k, &i) in unique.iter().enumerate() {
        compact[i] = k;
    }
    let coords: Vec<(f64, f64)> = unique.iter().map(|&i| (vertices[i].x, vertices[i].y)).collect();
    let edges: Vec<(usize, usize)> = segments
        .iter()
        .map(|&(a, b)| (compact[a], compact[b]))
        .collect();
    match cdt::triangulate_with_edges(&coords, &edges) {
        Ok(tris) => {
            let triangles = normalize(
                vertices,
                tris.into_iter().map(|(a, b, c)| [unique[a], unique[b], unique[c]]),
            );
            if triangles.is_empty() || !missing_segments(&triangles, segments).is_empty() {
                log::warn!("constrained triangulation left break lines crossed, refining instead");
                None
            } else {
                Some(triangles)
            }
        }
        Err(e) => {
            log::warn!("constrained triangulation failed ({:?}), refining instead", e);
            None
        }
    }
}

/// Splits break-line pieces that are not mesh edges at their midpoints and
/// re-triangulates, for at most `max_passes` passes and `budget` inserted
/// vertices. A midpoint landing on an existing vertex reuses it. Returns the
/// mesh and the final pieces.
fn refine(
    vertices: &mut Vec<Point3>,
    segments: Vec<(usize, usize)>,
    max_passes: usize,
    budget: usize,
) -> Result<(Vec<[usize; 3]>, Vec<(usize, usize)>)> {
    let source = vertices.len();
    let mut by_position: HashMap<(u64, u64), usize> = HashMap::with_capacity(source);
    for (i, p) in vertices.iter().enumerate() {
        by_position.entry(xy_key(*p)).or_insert(i);
    }
    let mut segments = segments;
    let mut pass = 0;
    loop {
        let triangles = delaunay(vertices);
        let missing = missing_segments(&triangles, &segments);
        if missing.is_empty() {
            log::debug!(
                "break lines enforced after {} refinement passes ({} vertices)",
                pass,
                vertices.len()
            );
            return Ok((triangles, segments));
        }
        if pass == max_passes {
            return Err(TerrainError::ConstraintUnsatisfiable(format!(
                "{} break-line pieces still crossed after {} refinement passes",
                missing.len(),
                max_passes
            )));
        }
        let inserted = vertices.len() - source;
        if inserted + missing.len() > budget {
            return Err(TerrainError::ConstraintUnsatisfiable(format!(
                "{} break-line pieces still crossed after inserting {} of at most {} constraint vertices",
                missing.len(),
                inserted,
                budget
            )));
        }
        let missing: HashSet<usize> = missing.into_iter().collect();
        let mut next = Vec::with_capacity(segments.len() + missing.len());
        for (i, &(a, b)) in segments.iter().enumerate() {
            if !missing.contains(&i) {
                next.push((a, b));
                continue;
            }
            let midpoint = Line3::new(vertices[a], vertices[b]).midpoint();
            let mid = *by_position.entry(xy_key(midpoint)).or_insert(vertices.len());
            if mid == a || mid == b {
                return Err(TerrainError::ConstraintUnsatisfiable(format!(
                    "break-line piece {} is too short to split",
                    describe(vertices, (a, b))
                )));
            }
            if mid == vertices.len() {
                vertices.push(midpoint);
            }
            next.push((a, mid));
            next.push((mid, b));
        }
        segments = next;
        pass += 1;
    }
}

/// Point where the edge `a`-`b` reaches elevation `level`, if it does.
fn level_crossing(a: Point3, b: Point3, level: f64) -> Option<Point3> {
    let (da, db) = (a.z - level, b.z - level);
    if da * db > 0.0 || (da - db).abs() < f64::EPSILON {
        return None;
    }
    let p = Line3::new(a, b).point_at(da / (da - db));
    Some(Point3::new(p.x, p.y, level))
}

/// Triangulated Irregular Network constructed from 3D points.
///
/// Vertex positions `0..source_count()` are the store positions of the
/// snapshot the mesh was built from. Positions past that are constraint
/// vertices inserted on break lines during refinement; their elevation is the
/// linear interpolation along the break line. Of several vertices at the same
/// `(x, y)` only the first is part of the mesh.
#[derive(Debug, Clone)]
pub struct Tin {
    vertices: Vec<Point3>,
    triangles: Vec<[usize; 3]>,
    source_count: usize,
    constraints: Vec<Constraint>,
    segments: Vec<(usize, usize)>,
    generation: u64,
}

impl Tin {
    /// Builds a TIN from the provided vertices using Delaunay triangulation on the XY plane.
    pub fn from_points(points: Vec<Point3>) -> Result<Self> {
        Tin::build(points, &[], TinOptions::default(), 0)
    }

    /// Builds a TIN enforcing `breaklines` (pairs of vertex positions).
    /// `generation` is recorded so callers can detect a stale mesh.
    ///
    /// Break lines that properly cross each other can never both be mesh
    /// edges and fail with `ConstraintUnsatisfiable` before any refinement.
    pub fn build(
        points: Vec<Point3>,
        breaklines: &[(usize, usize)],
        options: TinOptions,
        generation: u64,
    ) -> Result<Self> {
        let found = points.len();
        if found < 3 {
            return Err(TerrainError::InsufficientPoints { found });
        }
        let constraints: Vec<Constraint> = breaklines
            .iter()
            .map(|&(start, end)| Constraint {
                start,
                end,
                line: Line3::new(points[start], points[end]),
            })
            .collect();

        let mut vertices = points;
        let mut triangles = delaunay(&vertices);
        if triangles.is_empty() {
            return Err(TerrainError::InsufficientPoints { found });
        }
        let mut segments = Vec::new();
        if !breaklines.is_empty() {
            let reps = planar_representatives(&vertices);
            let pieces = split_at_collinear_vertices(&vertices, &reps, breaklines);
            if let Some((p, q)) = crossing_pair(&vertices, &pieces) {
                return Err(TerrainError::ConstraintUnsatisfiable(format!(
                    "break lines {} and {} cross",
                    describe(&vertices, p),
                    describe(&vertices, q)
                )));
            }
            let enforced = match options.strategy {
                BreaklineStrategy::Constrained => constrained(&vertices, &reps, &pieces),
                BreaklineStrategy::Refine => None,
            };
            (triangles, segments) = match enforced {
                Some(mesh) => (mesh, pieces),
                None => {
                    let budget = options
                        .max_constraint_vertices
                        .unwrap_or(CONSTRAINT_VERTICES_PER_INPUT * (found + pieces.len()));
                    refine(&mut vertices, pieces, options.max_refinement_passes, budget)?
                }
            };
        }
        log::debug!(
            "triangulated {} points into {} triangles ({} constraint vertices, generation {})",
            found,
            triangles.len(),
            vertices.len() - found,
            generation
        );
        Ok(Self {
            vertices,
            triangles,
            source_count: found,
            constraints,
            segments,
            generation,
        })
    }

    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    /// Triangles as counter-clockwise vertex positions.
    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    /// Number of vertices that correspond to store positions.
    pub fn source_count(&self) -> usize {
        self.source_count
    }

    /// Number of vertices inserted on break lines.
    pub fn constraint_vertex_count(&self) -> usize {
        self.vertices.len() - self.source_count
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `true` if `a`-`b` is an edge of the mesh.
    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.triangles
            .iter()
            .any(|t| t.contains(&a) && t.contains(&b) && a != b)
    }

    /// Break-line pieces enforced as mesh edges, as vertex position pairs.
    pub fn constraint_segments(&self) -> &[(usize, usize)] {
        &self.segments
    }

    /// Returns `true` if every break-line piece is a mesh edge, so no mesh
    /// edge crosses a break line.
    pub fn respects_constraints(&self) -> bool {
        missing_segments(&self.triangles, &self.segments).is_empty()
    }

    /// Finds the triangle containing `(x, y)` and its barycentric weights.
    pub fn locate(&self, x: f64, y: f64) -> Option<(usize, [f64; 3])> {
        const EPS: f64 = 1e-9;
        let p = Point::new(x, y);
        for (i, tri) in self.triangles.iter().enumerate() {
            let a = self.vertices[tri[0]];
            let b = self.vertices[tri[1]];
            let c = self.vertices[tri[2]];
            if x < a.x.min(b.x).min(c.x) - EPS
                || x > a.x.max(b.x).max(c.x) + EPS
                || y < a.y.min(b.y).min(c.y) - EPS
                || y > a.y.max(b.y).max(c.y) + EPS
            {
                continue;
            }
            if let Some((u, v, w)) = barycentric(p, a, b, c) {
                if u >= -EPS && v >= -EPS && w >= -EPS {
                    return Some((i, [u, v, w]));
                }
            }
        }
        None
    }

    /// Barycentric elevation at `(x, y)`, ignoring break lines.
    pub fn elevation_at(&self, x: f64, y: f64) -> Option<f64> {
        let (i, w) = self.locate(x, y)?;
        let t = self.triangles[i];
        Some(
            w[0] * self.vertices[t[0]].z
                + w[1] * self.vertices[t[1]].z
                + w[2] * self.vertices[t[2]].z,
        )
    }

    /// Linear elevation along the closest break line within `tolerance`
    /// (perpendicular XY distance) of `(x, y)`, if any.
    pub fn breakline_elevation(&self, x: f64, y: f64, tolerance: f64) -> Option<f64> {
        let p = Point::new(x, y);
        self.constraints
            .iter()
            .filter_map(|c| {
                let (t, perp) = c.line.project_xy(p)?;
                ((0.0..=1.0).contains(&t) && perp <= tolerance).then(|| (perp, c.line.point_at(t).z))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, z)| z)
    }

    /// Returns the slope in degrees for each triangle in the TIN.
    pub fn triangle_slopes(&self) -> Vec<f64> {
        self.triangles
            .iter()
            .map(|t| {
                triangle_slope_deg(
                    self.vertices[t[0]],
                    self.vertices[t[1]],
                    self.vertices[t[2]],
                )
            })
            .collect()
    }

    /// Returns the slope at (x, y) if the point lies within the TIN.
    pub fn slope_at(&self, x: f64, y: f64) -> Option<f64> {
        let (i, _) = self.locate(x, y)?;
        Some(self.triangle_slopes_at(i))
    }

    fn triangle_slopes_at(&self, i: usize) -> f64 {
        let t = self.triangles[i];
        triangle_slope_deg(self.vertices[t[0]], self.vertices[t[1]], self.vertices[t[2]])
    }

    /// Pieces of the contour at `level`, one per triangle the level passes
    /// through. Faces lying flat at `level` contribute nothing.
    pub fn contour_segments(&self, level: f64) -> Vec<(Point3, Point3)> {
        let mut segments = Vec::new();
        for tri in &self.triangles {
            let [a, b, c] = tri.map(|i| self.vertices[i]);
            let top = a.z.max(b.z).max(c.z);
            if level < a.z.min(b.z).min(c.z) || level > top {
                continue;
            }
            // an edge lying on the level belongs to the face above it
            let on_level = [a, b, c].iter().filter(|v| v.z == level).count();
            if on_level == 2 && top == level {
                continue;
            }
            let mut pts: Vec<Point3> = Vec::with_capacity(3);
            for (p, q) in [(a, b), (b, c), (c, a)] {
                if let Some(x) = level_crossing(p, q, level) {
                    // a level through a vertex reaches it from two edges
                    if !pts.iter().any(|o| distance(o.xy(), x.xy()) <= 1e-9) {
                        pts.push(x);
                    }
                }
            }
            if let [p, q] = pts[..] {
                segments.push((p, q));
            }
        }
        segments
    }

    /// Volume between the surface and a horizontal plane at `base_elev`,
    /// summed as triangular prisms (projected area times mean vertex height).
    pub fn volume_to_elevation(&self, base_elev: f64) -> f64 {
        self.triangles
            .iter()
            .map(|t| {
                let a = self.vertices[t[0]];
                let b = self.vertices[t[1]];
                let c = self.vertices[t[2]];
                let area = orient2d(a.xy(), b.xy(), c.xy()).abs() / 2.0;
                area * ((a.z + b.z + c.z) / 3.0 - base_elev)
            })
            .sum()
    }
}
