use super::Func;
use crate::error::{configuration_error, evaluation_error};
use crate::mesh::{ElementId, Mesh};
use crate::refmap::RefMap;
use crate::shapeset::{ShapeFunction, Shapeset};
use crate::space::{AsmList, Space};
use nalgebra::{Point2, Vector2};
use rustc_hash::FxHashMap;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// A scalar function defined element-wise on the active elements of a mesh.
pub trait MeshFunction: Send + Sync + Debug {
    fn mesh(&self) -> &Arc<Mesh>;

    /// Polynomial order of the function on the given element, used by the order oracle.
    fn order(&self, element: ElementId) -> i32;

    /// Evaluates values and physical derivatives at reference points of `element`.
    fn evaluate(&self, element: ElementId, points: &[[f64; 2]], out: &mut Func<f64>) -> eyre::Result<()>;
}

/// A finite element function given by coefficients with respect to the basis of a space.
///
/// Shape functions fixed by essential conditions enter with their lifting coefficients, so
/// the solution satisfies the boundary data.
#[derive(Debug, Clone)]
pub struct Solution {
    mesh: Arc<Mesh>,
    shapeset: Arc<dyn Shapeset>,
    elements: FxHashMap<ElementId, (i32, Vec<(ShapeFunction, f64)>)>,
}

impl Solution {
    /// Builds the solution from the global coefficient vector, where the DOFs of `space` start
    /// at `first_dof`.
    pub fn new(space: &dyn Space, coefficients: &[f64], first_dof: usize) -> eyre::Result<Self> {
        let mesh = space.mesh().clone();
        let mut list = AsmList::new();
        let mut elements = FxHashMap::default();
        for element in mesh.active_elements() {
            let id = element.id();
            space.element_assembly_list(id, &mut list, first_dof);
            let terms = list
                .entries()
                .iter()
                .map(|entry| {
                    let weight = match entry.dof {
                        Some(dof) => *coefficients.get(dof).ok_or_else(|| {
                            configuration_error(format!(
                                "coefficient vector of length {} has no entry for dof {}",
                                coefficients.len(),
                                dof
                            ))
                        })?,
                        None => 1.0,
                    };
                    Ok((entry.shape, weight * entry.coef))
                })
                .collect::<eyre::Result<Vec<_>>>()?;
            let order = (0..element.num_edges())
                .map(|k| space.edge_order(id, k))
                .fold(space.element_order(id), u32::max);
            elements.insert(id, (order as i32, terms));
        }
        Ok(Self {
            mesh,
            shapeset: space.shapeset().clone(),
            elements,
        })
    }
}

impl MeshFunction for Solution {
    fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    fn order(&self, element: ElementId) -> i32 {
        self.elements.get(&element).map_or(0, |(order, _)| *order)
    }

    fn evaluate(&self, element: ElementId, points: &[[f64; 2]], out: &mut Func<f64>) -> eyre::Result<()> {
        let (_, terms) = self
            .elements
            .get(&element)
            .ok_or_else(|| evaluation_error(format!("solution is not defined on element {}", element)))?;
        let refmap = RefMap::for_element(&self.mesh, element);
        let shape = refmap.shape();
        out.resize(points.len());
        for (k, &xi) in points.iter().enumerate() {
            let (inverse, _) = refmap.inverse_jacobian(&Point2::from(xi))?;
            let mut value = 0.0;
            let mut reference_gradient = Vector2::zeros();
            for &(function, weight) in terms {
                let [v, dxi, deta] = self.shapeset.eval(shape, function, xi);
                value += weight * v;
                reference_gradient += Vector2::new(dxi, deta) * weight;
            }
            let gradient = inverse.transpose() * reference_gradient;
            out.val[k] = value;
            out.dx[k] = gradient.x;
            out.dy[k] = gradient.y;
        }
        Ok(())
    }
}

type ExactFn = dyn Fn(f64, f64) -> (f64, f64, f64) + Send + Sync;

/// A function given in closed form, returning `(value, dx, dy)` at physical points.
#[derive(Clone)]
pub struct ExactFunction {
    mesh: Arc<Mesh>,
    order: i32,
    function: Arc<ExactFn>,
}

impl ExactFunction {
    /// `order` is the polynomial order reported to the order oracle.
    pub fn new(
        mesh: Arc<Mesh>,
        order: i32,
        function: impl Fn(f64, f64) -> (f64, f64, f64) + Send + Sync + 'static,
    ) -> Self {
        Self {
            mesh,
            order,
            function: Arc::new(function),
        }
    }

    pub fn constant(mesh: Arc<Mesh>, value: f64) -> Self {
        Self::new(mesh, 0, move |_, _| (value, 0.0, 0.0))
    }
}

impl Debug for ExactFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExactFunction")
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

impl MeshFunction for ExactFunction {
    fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    fn order(&self, _element: ElementId) -> i32 {
        self.order
    }

    fn evaluate(&self, element: ElementId, points: &[[f64; 2]], out: &mut Func<f64>) -> eyre::Result<()> {
        let refmap = RefMap::for_element(&self.mesh, element);
        out.resize(points.len());
        for (k, &xi) in points.iter().enumerate() {
            let x = refmap.map(&Point2::from(xi));
            let (value, dx, dy) = (self.function)(x.x, x.y);
            out.val[k] = value;
            out.dx[k] = dx;
            out.dy[k] = dy;
        }
        Ok(())
    }
}
