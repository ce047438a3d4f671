//! Sub-element transformations and edge sub-segments.

use hpfem_quadrature::ReferenceShape;

/// Transformation index of a son of a refined element.
///
/// Triangles: `0..=2` are the corner sons at vertices `0..=2`, `3` is the central son (rotated
/// by 180 degrees). Quadrilaterals: `0..=3` are the quarters at vertices `0..=3`, `4`/`5` the
/// lower/upper halves and `6`/`7` the left/right halves.
pub type SonIndex = u8;

/// Current transformation matrix: the axis-aligned affine map `xi -> m * xi + t` taking the
/// reference element of a sub-element into the reference element of an ancestor.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ctm {
    pub m: [f64; 2],
    pub t: [f64; 2],
}

impl Default for Ctm {
    fn default() -> Self {
        Self::identity()
    }
}

impl Ctm {
    pub fn identity() -> Self {
        Self { m: [1.0, 1.0], t: [0.0, 0.0] }
    }

    /// The map taking the reference element of son `son` into its parent's reference element.
    pub fn son(shape: ReferenceShape, son: SonIndex) -> Self {
        let (m, t) = match (shape, son) {
            (ReferenceShape::Triangle, 0) => ([0.5, 0.5], [-0.5, -0.5]),
            (ReferenceShape::Triangle, 1) => ([0.5, 0.5], [0.5, -0.5]),
            (ReferenceShape::Triangle, 2) => ([0.5, 0.5], [-0.5, 0.5]),
            (ReferenceShape::Triangle, 3) => ([-0.5, -0.5], [-0.5, -0.5]),
            (ReferenceShape::Quadrilateral, 0) => ([0.5, 0.5], [-0.5, -0.5]),
            (ReferenceShape::Quadrilateral, 1) => ([0.5, 0.5], [0.5, -0.5]),
            (ReferenceShape::Quadrilateral, 2) => ([0.5, 0.5], [0.5, 0.5]),
            (ReferenceShape::Quadrilateral, 3) => ([0.5, 0.5], [-0.5, 0.5]),
            (ReferenceShape::Quadrilateral, 4) => ([1.0, 0.5], [0.0, -0.5]),
            (ReferenceShape::Quadrilateral, 5) => ([1.0, 0.5], [0.0, 0.5]),
            (ReferenceShape::Quadrilateral, 6) => ([0.5, 1.0], [-0.5, 0.0]),
            (ReferenceShape::Quadrilateral, 7) => ([0.5, 1.0], [0.5, 0.0]),
            _ => panic!("invalid son index {} for {:?}", son, shape),
        };
        Self { m, t }
    }

    /// Composes `self` with a further restriction `inner`, i.e. returns `self ∘ inner`.
    pub fn then(&self, inner: &Ctm) -> Ctm {
        Ctm {
            m: [self.m[0] * inner.m[0], self.m[1] * inner.m[1]],
            t: [self.m[0] * inner.t[0] + self.t[0], self.m[1] * inner.t[1] + self.t[1]],
        }
    }

    pub fn apply(&self, xi: [f64; 2]) -> [f64; 2] {
        [self.m[0] * xi[0] + self.t[0], self.m[1] * xi[1] + self.t[1]]
    }

    /// Absolute value of the determinant of the linear part.
    pub fn scale(&self) -> f64 {
        (self.m[0] * self.m[1]).abs()
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Locates edge `edge` of the region described by `self` on the edges of the element.
    ///
    /// Returns the element edge containing the region edge together with the parameter
    /// interval covered on it, or `None` if the region edge lies in the element interior.
    pub fn edge_on_element(&self, shape: ReferenceShape, edge: usize) -> Option<(usize, f64, f64)> {
        let start = self.apply(reference_edge_point(shape, edge, -1.0));
        let end = self.apply(reference_edge_point(shape, edge, 1.0));
        (0..shape.num_vertices()).find_map(|k| {
            let a = reference_edge_parameter(shape, k, start)?;
            let b = reference_edge_parameter(shape, k, end)?;
            (a < b).then_some((k, a, b))
        })
    }
}

/// Vertices of the reference element, counter-clockwise.
pub fn reference_vertices(shape: ReferenceShape) -> &'static [[f64; 2]] {
    match shape {
        ReferenceShape::Triangle => &[[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0]],
        ReferenceShape::Quadrilateral => &[[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]],
    }
}

/// The point with parameter `s` in `[-1, 1]` on local edge `edge` of the reference element.
///
/// Edge `k` runs from vertex `k` (at `s = -1`) to vertex `k + 1` (at `s = 1`).
pub fn reference_edge_point(shape: ReferenceShape, edge: usize, s: f64) -> [f64; 2] {
    let vertices = reference_vertices(shape);
    let a = vertices[edge];
    let b = vertices[(edge + 1) % vertices.len()];
    let (wa, wb) = (0.5 * (1.0 - s), 0.5 * (1.0 + s));
    [wa * a[0] + wb * b[0], wa * a[1] + wb * b[1]]
}

/// Derivative of [`reference_edge_point`] with respect to `s`.
pub fn reference_edge_tangent(shape: ReferenceShape, edge: usize) -> [f64; 2] {
    let vertices = reference_vertices(shape);
    let a = vertices[edge];
    let b = vertices[(edge + 1) % vertices.len()];
    [0.5 * (b[0] - a[0]), 0.5 * (b[1] - a[1])]
}

/// If `xi` lies on local edge `edge` of the reference element, returns its edge parameter.
pub fn reference_edge_parameter(shape: ReferenceShape, edge: usize, xi: [f64; 2]) -> Option<f64> {
    const TOL: f64 = 1e-12;
    let [x, y] = xi;
    let on_edge = match (shape, edge) {
        (ReferenceShape::Triangle, 0) | (ReferenceShape::Quadrilateral, 0) => (y + 1.0).abs() < TOL,
        (ReferenceShape::Triangle, 1) => (x + y).abs() < TOL,
        (ReferenceShape::Triangle, 2) | (ReferenceShape::Quadrilateral, 3) => (x + 1.0).abs() < TOL,
        (ReferenceShape::Quadrilateral, 1) => (x - 1.0).abs() < TOL,
        (ReferenceShape::Quadrilateral, 2) => (y - 1.0).abs() < TOL,
        _ => false,
    };
    if !on_edge {
        return None;
    }
    // Invert the linear parametrization along the dominant tangent component
    let start = reference_edge_point(shape, edge, -1.0);
    let tangent = reference_edge_tangent(shape, edge);
    let s = if tangent[0].abs() >= tangent[1].abs() {
        (x - start[0]) / tangent[0] - 1.0
    } else {
        (y - start[1]) / tangent[1] - 1.0
    };
    (-1.0 - TOL..=1.0 + TOL).contains(&s).then_some(s.clamp(-1.0, 1.0))
}

/// One step of bisecting an edge parameter interval.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Half {
    First,
    Second,
}

impl Half {
    pub fn flipped(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}

/// A dyadic sub-interval of an edge parameter range `[-1, 1]`, described by the chain of
/// bisections leading to it. The empty chain is the whole edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EdgeSegment {
    halves: Vec<Half>,
}

impl EdgeSegment {
    pub fn whole() -> Self {
        Self::default()
    }

    pub fn from_halves(halves: Vec<Half>) -> Self {
        Self { halves }
    }

    pub fn halves(&self) -> &[Half] {
        &self.halves
    }

    pub fn depth(&self) -> usize {
        self.halves.len()
    }

    pub fn is_whole(&self) -> bool {
        self.halves.is_empty()
    }

    pub fn push(&mut self, half: Half) {
        self.halves.push(half);
    }

    /// The segment obtained by restricting `self` further to `rest`.
    pub fn extended(&self, rest: &[Half]) -> Self {
        let mut halves = self.halves.clone();
        halves.extend_from_slice(rest);
        Self { halves }
    }

    /// The same physical segment seen from the opposite edge direction.
    pub fn flipped(&self) -> Self {
        Self {
            halves: self.halves.iter().map(|h| h.flipped()).collect(),
        }
    }

    /// If `prefix` contains `self`, returns the position of `self` relative to `prefix`.
    pub fn strip_prefix(&self, prefix: &EdgeSegment) -> Option<EdgeSegment> {
        self.halves
            .strip_prefix(prefix.halves.as_slice())
            .map(|rest| Self::from_halves(rest.to_vec()))
    }

    /// The parameter interval covered by the segment.
    pub fn interval(&self) -> (f64, f64) {
        let (mut a, mut b) = (-1.0, 1.0);
        for half in &self.halves {
            let mid = 0.5 * (a + b);
            match half {
                Half::First => b = mid,
                Half::Second => a = mid,
            }
        }
        (a, b)
    }

    /// Maps a local parameter `g` in `[-1, 1]` of the segment to the parameter on the edge.
    pub fn map(&self, g: f64) -> f64 {
        let (a, b) = self.interval();
        a + 0.5 * (g + 1.0) * (b - a)
    }

    /// Recovers the segment covering exactly `[a, b]`, if that interval is dyadic.
    pub fn from_interval(a: f64, b: f64) -> Option<Self> {
        const TOL: f64 = 1e-10;
        const MAX_DEPTH: usize = 48;
        let mut segment = Self::whole();
        let (mut lo, mut hi) = (-1.0, 1.0);
        loop {
            if (lo - a).abs() < TOL && (hi - b).abs() < TOL {
                return Some(segment);
            }
            if segment.depth() >= MAX_DEPTH || b - a > hi - lo + TOL {
                return None;
            }
            let mid = 0.5 * (lo + hi);
            if b <= mid + TOL {
                segment.push(Half::First);
                hi = mid;
            } else if a >= mid - TOL {
                segment.push(Half::Second);
                lo = mid;
            } else {
                return None;
            }
        }
    }
}
