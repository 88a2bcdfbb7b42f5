//! Basic geometry primitives for terrain operations.

/// Representation of a 2D point.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Representation of a 3D point.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Projection onto the XY plane.
    pub fn xy(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f64; 3]> for Point3 {
    fn from(c: [f64; 3]) -> Self {
        Point3::new(c[0], c[1], c[2])
    }
}

/// Representation of a 3D line segment between two points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line3 {
    pub start: Point3,
    pub end: Point3,
}

impl Line3 {
    /// Creates a new line segment.
    pub fn new(start: Point3, end: Point3) -> Self {
        Self { start, end }
    }

    /// Returns the length of the line segment.
    pub fn length(&self) -> f64 {
        distance3(self.start, self.end)
    }

    /// Returns the midpoint of the line segment.
    pub fn midpoint(&self) -> Point3 {
        self.point_at(0.5)
    }

    /// Point at parameter `t` along the segment (`0` = start, `1` = end).
    pub fn point_at(&self, t: f64) -> Point3 {
        Point3::new(
            self.start.x + t * (self.end.x - self.start.x),
            self.start.y + t * (self.end.y - self.start.y),
            self.start.z + t * (self.end.z - self.start.z),
        )
    }

    /// Projects `p` onto the segment in the XY plane. Returns the parameter
    /// along the segment (unclamped) and the perpendicular distance, or `None`
    /// when the segment has no horizontal extent.
    pub fn project_xy(&self, p: Point) -> Option<(f64, f64)> {
        let dx = self.end.x - self.start.x;
        let dy = self.end.y - self.start.y;
        let len2 = dx * dx + dy * dy;
        if len2 <= f64::EPSILON * f64::EPSILON {
            return None;
        }
        let t = ((p.x - self.start.x) * dx + (p.y - self.start.y) * dy) / len2;
        let perp = ((p.x - self.start.x) * dy - (p.y - self.start.y) * dx).abs() / len2.sqrt();
        Some((t, perp))
    }
}

/// Calculates the Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

/// Calculates the Euclidean distance between two 3D points.
pub fn distance3(a: Point3, b: Point3) -> f64 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2) + (b.z - a.z).powi(2)).sqrt()
}

pub(crate) fn subtract(a: Point3, b: Point3) -> Point3 {
    Point3::new(a.x - b.x, a.y - b.y, a.z - b.z)
}

pub(crate) fn cross(a: Point3, b: Point3) -> Point3 {
    Point3 {
        x: a.y * b.z - a.z * b.y,
        y: a.z * b.x - a.x * b.z,
        z: a.x * b.y - a.y * b.x,
    }
}

pub(crate) fn norm(v: Point3) -> f64 {
    (v.x * v.x + v.y * v.y + v.z * v.z).sqrt()
}

/// Twice the signed area of the triangle `a`, `b`, `c`. Positive when the
/// points turn counter-clockwise.
pub fn orient2d(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Returns `true` when segments `p1-p2` and `q1-q2` cross at a single point
/// interior to both. Touching at an endpoint or overlapping collinearly is
/// not a proper crossing.
pub fn segments_cross(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    let d1 = orient2d(q1, q2, p1).signum();
    let d2 = orient2d(q1, q2, p2).signum();
    let d3 = orient2d(p1, p2, q1).signum();
    let d4 = orient2d(p1, p2, q2).signum();
    let nonzero = |d: f64| d != 0.0 && !d.is_nan();
    nonzero(d1) && nonzero(d2) && nonzero(d3) && nonzero(d4) && d1 != d2 && d3 != d4
}

/// Bearing from `a` to `b` in degrees clockwise from north (+Y), in `[0, 360)`.
pub fn bearing_deg(a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let deg = dx.atan2(dy).to_degrees();
    if deg < 0.0 {
        deg + 360.0
    } else {
        deg
    }
}

/// Grade from `a` to `b` as a percentage (rise over run times 100). Vertical
/// pairs give infinity with the sign of the rise; identical positions give 0.
pub fn grade_percent(a: Point3, b: Point3) -> f64 {
    let run = distance(a.xy(), b.xy());
    let rise = b.z - a.z;
    if run == 0.0 {
        if rise == 0.0 {
            0.0
        } else {
            f64::INFINITY.copysign(rise)
        }
    } else {
        rise / run * 100.0
    }
}
