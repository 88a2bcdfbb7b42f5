//! k-d tree over a point store snapshot.
//!
//! The tree is implicit: positions are permuted so that every subrange
//! `[lo, hi)` has its splitting point at `(lo + hi) / 2`, with the split axis
//! chosen as the dimension of widest spread in that subrange. The index never
//! changes after construction; it remembers the store generation it was
//! built from so owners can detect staleness.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Distance used for neighbour queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Full 3D Euclidean distance over `(x, y, z)`.
    Euclidean3,
    /// Horizontal distance over `(x, y)`; `z` is ignored.
    Planar,
}

impl Metric {
    fn dims(self) -> usize {
        match self {
            Metric::Euclidean3 => 3,
            Metric::Planar => 2,
        }
    }

    fn distance2(self, a: &[f64; 3], b: &[f64; 3]) -> f64 {
        let mut sum = 0.0;
        for axis in 0..self.dims() {
            let d = a[axis] - b[axis];
            sum += d * d;
        }
        sum
    }
}

/// A point found by a neighbour query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Store position of the point.
    pub position: usize,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance2: f64,
    position: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance2
            .total_cmp(&other.distance2)
            .then(self.position.cmp(&other.position))
    }
}

impl From<Candidate> for Neighbor {
    fn from(c: Candidate) -> Self {
        Neighbor {
            position: c.position,
            distance: c.distance2.sqrt(),
        }
    }
}

/// Static k-d tree over `[x, y, z]` rows.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    metric: Metric,
    generation: u64,
    coords: Vec<[f64; 3]>,
    order: Vec<usize>,
    axes: Vec<u8>,
}

impl SpatialIndex {
    /// Builds the tree. `generation` is the store generation of `coords`.
    pub fn build(coords: Vec<[f64; 3]>, metric: Metric, generation: u64) -> Self {
        let mut order: Vec<usize> = (0..coords.len()).collect();
        let mut axes = vec![0u8; coords.len()];
        build_range(&coords, &mut order, &mut axes, metric.dims());
        log::debug!(
            "built {:?} k-d tree over {} points (generation {})",
            metric,
            coords.len(),
            generation
        );
        Self {
            metric,
            generation,
            coords,
            order,
            axes,
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Up to `k` nearest points ordered by ascending distance. Ties are
    /// ordered by ascending position.
    pub fn nearest(&self, query: [f64; 3], k: usize) -> Vec<Neighbor> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }
        let mut heap = BinaryHeap::with_capacity(k + 1);
        self.search_nearest(0, self.order.len(), &query, k, &mut heap);
        heap.into_sorted_vec().into_iter().map(Neighbor::from).collect()
    }

    /// All points within `radius` (inclusive) ordered by ascending distance.
    pub fn within_radius(&self, center: [f64; 3], radius: f64) -> Vec<Neighbor> {
        let mut found = Vec::new();
        if self.is_empty() || radius < 0.0 {
            return Vec::new();
        }
        self.search_radius(0, self.order.len(), &center, radius * radius, &mut found);
        found.sort_unstable();
        found.into_iter().map(Neighbor::from).collect()
    }

    fn search_nearest(
        &self,
        lo: usize,
        hi: usize,
        query: &[f64; 3],
        k: usize,
        heap: &mut BinaryHeap<Candidate>,
    ) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let position = self.order[mid];
        let point = &self.coords[position];
        let candidate = Candidate {
            distance2: self.metric.distance2(point, query),
            position,
        };
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().is_some_and(|worst| candidate < *worst) {
            heap.pop();
            heap.push(candidate);
        }

        let axis = self.axes[mid] as usize;
        let diff = query[axis] - point[axis];
        let (near, far) = if diff < 0.0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };
        self.search_nearest(near.0, near.1, query, k, heap);
        let must_visit = heap.len() < k || heap.peek().is_some_and(|w| diff * diff <= w.distance2);
        if must_visit {
            self.search_nearest(far.0, far.1, query, k, heap);
        }
    }

    fn search_radius(
        &self,
        lo: usize,
        hi: usize,
        center: &[f64; 3],
        radius2: f64,
        found: &mut Vec<Candidate>,
    ) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let position = self.order[mid];
        let point = &self.coords[position];
        let distance2 = self.metric.distance2(point, center);
        if distance2 <= radius2 {
            found.push(Candidate {
                distance2,
                position,
            });
        }
        let axis = self.axes[mid] as usize;
        let diff = center[axis] - point[axis];
        if diff <= 0.0 || diff * diff <= radius2 {
            self.search_radius(lo, mid, center, radius2, found);
        }
        if diff >= 0.0 || diff * diff <= radius2 {
            self.search_radius(mid + 1, hi, center, radius2, found);
        }
    }
}

fn build_range(coords: &[[f64; 3]], order: &mut [usize], axes: &mut [u8], dims: usize) {
    if order.len() <= 1 {
        return;
    }
    let axis = widest_axis(coords, order, dims);
    let mid = order.len() / 2;
    order.select_nth_unstable_by(mid, |&a, &b| coords[a][axis].total_cmp(&coords[b][axis]));
    axes[mid] = axis as u8;
    let (left_order, rest) = order.split_at_mut(mid);
    let (left_axes, rest_axes) = axes.split_at_mut(mid);
    build_range(coords, left_order, left_axes, dims);
    build_range(coords, &mut rest[1..], &mut rest_axes[1..], dims);
}

fn widest_axis(coords: &[[f64; 3]], order: &[usize], dims: usize) -> usize {
    let mut best = 0;
    let mut best_spread = f64::NEG_INFINITY;
    for axis in 0..dims {
        let (lo, hi) = order.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &p| {
            (lo.min(coords[p][axis]), hi.max(coords[p][axis]))
        });
        if hi - lo > best_spread {
            best_spread = hi - lo;
            best = axis;
        }
    }
    best
}
