//! Hierarchic shape functions on the reference triangle and quadrilateral.

use hpfem_quadrature::univariate::legendre;
use hpfem_quadrature::ReferenceShape;
use std::fmt::Debug;

/// Identifies a shape function of a shapeset on a given reference shape.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShapeFunction {
    /// Linear/bilinear function that is one at the given vertex.
    Vertex(u8),
    /// Edge function of polynomial degree `degree >= 2` along local edge `edge`.
    Edge { edge: u8, degree: u8 },
    Bubble { i: u8, j: u8 },
    /// Product of Legendre polynomials `P_i(xi) P_j(eta)`.
    Legendre { i: u8, j: u8 },
}

/// Value and reference derivatives `(f, df/dxi, df/deta)`.
pub type ShapeValue = [f64; 3];

pub trait Shapeset: Send + Sync + Debug {
    fn eval(&self, shape: ReferenceShape, function: ShapeFunction, xi: [f64; 2]) -> ShapeValue;

    /// Polynomial order of the function. On quadrilaterals this is the largest degree in
    /// either coordinate direction.
    fn order(&self, shape: ReferenceShape, function: ShapeFunction) -> i32;

    fn num_components(&self) -> usize {
        1
    }
}

/// The trace `(1 - s^2)/4 P_{k-2}(s)` of an edge function of degree `k >= 2` on its edge,
/// together with its derivative.
pub fn edge_kernel(s: f64, degree: u8) -> (f64, f64) {
    let (p, dp) = legendre(degree as usize - 2, s);
    let b = 0.25 * (1.0 - s * s);
    (b * p, -0.5 * s * p + b * dp)
}

#[rustfmt::skip]
fn quad_edge_parametrization(edge: u8, xi: [f64; 2]) -> (f64, [f64; 2], f64, [f64; 2]) {
    // (s, grad s, blend, grad blend)
    let [x, y] = xi;
    match edge {
        0 => ( x, [ 1.0,  0.0], 0.5 * (1.0 - y), [ 0.0, -0.5]),
        1 => ( y, [ 0.0,  1.0], 0.5 * (1.0 + x), [ 0.5,  0.0]),
        2 => (-x, [-1.0,  0.0], 0.5 * (1.0 + y), [ 0.0,  0.5]),
        3 => (-y, [ 0.0, -1.0], 0.5 * (1.0 - x), [-0.5,  0.0]),
        _ => panic!("invalid quadrilateral edge {}", edge),
    }
}

fn barycentric(xi: [f64; 2]) -> ([f64; 3], [[f64; 2]; 3]) {
    let [x, y] = xi;
    (
        [-0.5 * (x + y), 0.5 * (x + 1.0), 0.5 * (y + 1.0)],
        [[-0.5, -0.5], [0.5, 0.0], [0.0, 0.5]],
    )
}

/// Continuous hierarchic shapeset.
///
/// Edge functions restricted to their edge equal `(1 - s^2)/4 P_{k-2}(s)` with `s` running
/// from the first to the second edge vertex, on both reference shapes. Odd-degree edge
/// functions change sign when the edge parameter is reversed, which spaces account for
/// through the assembly list coefficient.
#[derive(Debug, Copy, Clone, Default)]
pub struct H1Shapeset;

impl H1Shapeset {
    pub fn vertex_functions(shape: ReferenceShape) -> impl Iterator<Item = ShapeFunction> {
        (0..shape.num_vertices() as u8).map(ShapeFunction::Vertex)
    }

    pub fn edge_functions(edge: usize, order: u32) -> impl Iterator<Item = ShapeFunction> {
        (2..=order as u8).map(move |degree| ShapeFunction::Edge {
            edge: edge as u8,
            degree,
        })
    }

    pub fn bubble_functions(shape: ReferenceShape, order: u32) -> Vec<ShapeFunction> {
        let p = order as u8;
        match shape {
            ReferenceShape::Triangle if p >= 3 => (0..=p - 3)
                .flat_map(|i| (0..=p - 3 - i).map(move |j| ShapeFunction::Bubble { i, j }))
                .collect(),
            ReferenceShape::Triangle => Vec::new(),
            ReferenceShape::Quadrilateral => (2..=p)
                .flat_map(|i| (2..=p).map(move |j| ShapeFunction::Bubble { i, j }))
                .collect(),
        }
    }

    fn eval_triangle(function: ShapeFunction, xi: [f64; 2]) -> ShapeValue {
        let (l, dl) = barycentric(xi);
        match function {
            ShapeFunction::Vertex(v) => {
                let v = v as usize;
                [l[v], dl[v][0], dl[v][1]]
            }
            ShapeFunction::Edge { edge, degree } => {
                let (a, b) = (edge as usize, (edge as usize + 1) % 3);
                let (p, dp) = legendre(degree as usize - 2, l[b] - l[a]);
                let grad = |d: usize| {
                    (dl[a][d] * l[b] + l[a] * dl[b][d]) * p + l[a] * l[b] * dp * (dl[b][d] - dl[a][d])
                };
                [l[a] * l[b] * p, grad(0), grad(1)]
            }
            ShapeFunction::Bubble { i, j } => {
                let bubble = l[0] * l[1] * l[2];
                let (pu, dpu) = legendre(i as usize, l[1] - l[0]);
                let (pw, dpw) = legendre(j as usize, 2.0 * l[2] - 1.0);
                let grad = |d: usize| {
                    let db = dl[0][d] * l[1] * l[2] + l[0] * dl[1][d] * l[2] + l[0] * l[1] * dl[2][d];
                    let du = dl[1][d] - dl[0][d];
                    let dw = 2.0 * dl[2][d];
                    db * pu * pw + bubble * dpu * du * pw + bubble * pu * dpw * dw
                };
                [bubble * pu * pw, grad(0), grad(1)]
            }
            ShapeFunction::Legendre { .. } => panic!("{:?} is not an H1 shape function", function),
        }
    }

    fn eval_quad(function: ShapeFunction, xi: [f64; 2]) -> ShapeValue {
        let [x, y] = xi;
        match function {
            ShapeFunction::Vertex(v) => {
                let (alpha, beta) = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)][v as usize];
                [
                    (1.0 + alpha * x) * (1.0 + beta * y) / 4.0,
                    alpha * (1.0 + beta * y) / 4.0,
                    beta * (1.0 + alpha * x) / 4.0,
                ]
            }
            ShapeFunction::Edge { edge, degree } => {
                let (s, ds, blend, dblend) = quad_edge_parametrization(edge, xi);
                let (l, dl) = edge_kernel(s, degree);
                [
                    l * blend,
                    dl * ds[0] * blend + l * dblend[0],
                    dl * ds[1] * blend + l * dblend[1],
                ]
            }
            ShapeFunction::Bubble { i, j } => {
                let (lx, dlx) = edge_kernel(x, i);
                let (ly, dly) = edge_kernel(y, j);
                [lx * ly, dlx * ly, lx * dly]
            }
            ShapeFunction::Legendre { .. } => panic!("{:?} is not an H1 shape function", function),
        }
    }
}

impl Shapeset for H1Shapeset {
    fn eval(&self, shape: ReferenceShape, function: ShapeFunction, xi: [f64; 2]) -> ShapeValue {
        match shape {
            ReferenceShape::Triangle => Self::eval_triangle(function, xi),
            ReferenceShape::Quadrilateral => Self::eval_quad(function, xi),
        }
    }

    fn order(&self, shape: ReferenceShape, function: ShapeFunction) -> i32 {
        match (shape, function) {
            (_, ShapeFunction::Vertex(_)) => 1,
            (_, ShapeFunction::Edge { degree, .. }) => degree as i32,
            (ReferenceShape::Triangle, ShapeFunction::Bubble { i, j }) => 3 + i as i32 + j as i32,
            (ReferenceShape::Quadrilateral, ShapeFunction::Bubble { i, j }) => i.max(j) as i32,
            (_, ShapeFunction::Legendre { .. }) => panic!("{:?} is not an H1 shape function", function),
        }
    }
}

/// Discontinuous shapeset of Legendre products.
#[derive(Debug, Copy, Clone, Default)]
pub struct L2Shapeset;

impl L2Shapeset {
    pub fn functions(shape: ReferenceShape, order: u32) -> Vec<ShapeFunction> {
        let p = order as u8;
        (0..=p)
            .flat_map(|i| (0..=p).map(move |j| (i, j)))
            .filter(|&(i, j)| shape == ReferenceShape::Quadrilateral || i + j <= p)
            .map(|(i, j)| ShapeFunction::Legendre { i, j })
            .collect()
    }
}

impl Shapeset for L2Shapeset {
    fn eval(&self, _shape: ReferenceShape, function: ShapeFunction, xi: [f64; 2]) -> ShapeValue {
        match function {
            ShapeFunction::Legendre { i, j } => {
                let (px, dpx) = legendre(i as usize, xi[0]);
                let (py, dpy) = legendre(j as usize, xi[1]);
                [px * py, dpx * py, px * dpy]
            }
            _ => panic!("{:?} is not an L2 shape function", function),
        }
    }

    fn order(&self, shape: ReferenceShape, function: ShapeFunction) -> i32 {
        match (shape, function) {
            (ReferenceShape::Triangle, ShapeFunction::Legendre { i, j }) => i as i32 + j as i32,
            (ReferenceShape::Quadrilateral, ShapeFunction::Legendre { i, j }) => i.max(j) as i32,
            _ => panic!("{:?} is not an L2 shape function", function),
        }
    }
}
