//! Reference-to-physical maps of straight-edged elements.

use crate::error::evaluation_error;
use crate::mesh::{reference_edge_tangent, ElementId, Mesh};
use hpfem_quadrature::ReferenceShape;
use itertools::Itertools;
use nalgebra::{distance, Matrix2, Point2, Vector2};

/// Maps the reference element onto a physical element.
///
/// Triangles are mapped affinely, quadrilaterals bilinearly.
#[derive(Debug, Clone, PartialEq)]
pub struct RefMap {
    shape: ReferenceShape,
    vertices: Vec<Point2<f64>>,
}

impl RefMap {
    pub fn new(shape: ReferenceShape, vertices: Vec<Point2<f64>>) -> Self {
        assert_eq!(vertices.len(), shape.num_vertices());
        Self { shape, vertices }
    }

    pub fn for_element(mesh: &Mesh, id: ElementId) -> Self {
        Self::new(mesh.element(id).shape(), mesh.element_points(id))
    }

    pub fn shape(&self) -> ReferenceShape {
        self.shape
    }

    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    #[rustfmt::skip]
    fn basis(&self, xi: &Point2<f64>) -> ([f64; 4], [Vector2<f64>; 4]) {
        let (x, y) = (xi.x, xi.y);
        match self.shape {
            ReferenceShape::Triangle => (
                [-0.5 * (x + y), 0.5 * (x + 1.0), 0.5 * (y + 1.0), 0.0],
                [
                    Vector2::new(-0.5, -0.5),
                    Vector2::new( 0.5,  0.0),
                    Vector2::new( 0.0,  0.5),
                    Vector2::zeros(),
                ],
            ),
            ReferenceShape::Quadrilateral => {
                let phi = |alpha: f64, beta: f64| (1.0 + alpha * x) * (1.0 + beta * y) / 4.0;
                let grad = |alpha: f64, beta: f64| {
                    Vector2::new(alpha * (1.0 + beta * y) / 4.0, beta * (1.0 + alpha * x) / 4.0)
                };
                (
                    [phi(-1.0, -1.0), phi(1.0, -1.0), phi(1.0, 1.0), phi(-1.0, 1.0)],
                    [grad(-1.0, -1.0), grad(1.0, -1.0), grad(1.0, 1.0), grad(-1.0, 1.0)],
                )
            }
        }
    }

    pub fn map(&self, xi: &Point2<f64>) -> Point2<f64> {
        let (phi, _) = self.basis(xi);
        let x = self
            .vertices
            .iter()
            .zip(phi)
            .fold(Vector2::zeros(), |acc, (v, phi)| acc + v.coords * phi);
        Point2::from(x)
    }

    /// The Jacobian `dx/dxi`, columns are the derivatives with respect to `xi` and `eta`.
    pub fn jacobian(&self, xi: &Point2<f64>) -> Matrix2<f64> {
        let (_, gradients) = self.basis(xi);
        self.vertices
            .iter()
            .zip(gradients)
            .fold(Matrix2::zeros(), |acc, (v, g)| acc + v.coords * g.transpose())
    }

    /// The inverse Jacobian together with the Jacobian determinant.
    pub fn inverse_jacobian(&self, xi: &Point2<f64>) -> eyre::Result<(Matrix2<f64>, f64)> {
        let j = self.jacobian(xi);
        let det = j.determinant();
        let inverse = j
            .try_inverse()
            .filter(|_| det > 0.0)
            .ok_or_else(|| evaluation_error(format!("singular or inverted reference map at {:?}", xi)))?;
        Ok((inverse, det))
    }

    /// Whether the Jacobian is constant, i.e. the element is a triangle or a parallelogram.
    pub fn is_const_jacobian(&self) -> bool {
        match self.shape {
            ReferenceShape::Triangle => true,
            ReferenceShape::Quadrilateral => {
                let v = &self.vertices;
                let defect = (v[0].coords + v[2].coords) - (v[1].coords + v[3].coords);
                defect.norm() <= 1e-12 * self.diameter()
            }
        }
    }

    /// Order added to integrands by the inverse Jacobian of a non-affine map.
    pub fn inv_ref_order(&self) -> i32 {
        if self.is_const_jacobian() {
            0
        } else {
            2
        }
    }

    /// Physical tangent `dx/ds` of local edge `edge` at the reference point `xi` on it.
    ///
    /// Its length is half the length of straight edges.
    pub fn edge_tangent(&self, edge: usize, xi: &Point2<f64>) -> Vector2<f64> {
        let [tx, ty] = reference_edge_tangent(self.shape, edge);
        self.jacobian(xi) * Vector2::new(tx, ty)
    }

    /// Outward unit normal of a counter-clockwise element, given an edge tangent.
    pub fn outward_normal(tangent: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(tangent.y, -tangent.x) / tangent.norm()
    }

    pub fn diameter(&self) -> f64 {
        self.vertices
            .iter()
            .tuple_combinations()
            .map(|(x, y)| distance(x, y))
            .fold(0.0, f64::max)
    }
}
