//! Discretizations of scalar fields on a mesh.
//!
//! A space assigns global degrees of freedom to the shape functions living on the active
//! elements of its mesh. The assembler only sees spaces through the [`Space`] trait: it asks
//! for the [`AsmList`] of an element and for the polynomial orders needed by the quadrature
//! order oracle.

use crate::mesh::{ElementId, Mesh};
use crate::shapeset::{ShapeFunction, Shapeset};
use std::fmt::Debug;
use std::sync::Arc;

mod h1;
mod l2;

pub use h1::{EssentialBc, H1Space};
pub use l2::L2Space;

/// Highest polynomial order supported by the spaces.
pub const MAX_ORDER: u32 = 10;

/// A shape function of an element together with its global degree of freedom.
///
/// `dof` is `None` for shape functions fixed by essential boundary conditions. For those,
/// `coef` is the lifting coefficient, i.e. the weight of the shape function in the
/// interpolant of the boundary data. Otherwise `coef` is `1` or `-1`, the latter for odd edge
/// functions whose local edge runs against the global edge direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AsmEntry {
    pub shape: ShapeFunction,
    pub dof: Option<usize>,
    pub coef: f64,
}

/// Assembly list of one element in one space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsmList {
    entries: Vec<AsmEntry>,
}

impl AsmList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn push(&mut self, shape: ShapeFunction, dof: Option<usize>, coef: f64) {
        self.entries.push(AsmEntry { shape, dof, coef });
    }

    pub fn entries(&self) -> &[AsmEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Global indices of the unconstrained entries.
    pub fn dofs(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().filter_map(|entry| entry.dof)
    }
}

pub trait Space: Send + Sync + Debug {
    fn mesh(&self) -> &Arc<Mesh>;

    fn shapeset(&self) -> &Arc<dyn Shapeset>;

    fn num_dofs(&self) -> usize;

    /// Generation of the DOF numbering. Changes whenever the numbering changes.
    fn seq(&self) -> u64;

    /// Polynomial order of an active element.
    fn element_order(&self, element: ElementId) -> u32;

    /// Polynomial order of the shape functions on an edge of an active element.
    fn edge_order(&self, element: ElementId, edge: usize) -> u32;

    /// Fills `list` with the shape functions of `element`, shifting global indices by `offset`.
    fn element_assembly_list(&self, element: ElementId, list: &mut AsmList, offset: usize);

    /// Fills `list` with the shape functions of `element` that do not vanish on `edge`.
    fn boundary_assembly_list(&self, element: ElementId, edge: usize, list: &mut AsmList, offset: usize);

    fn set_uniform_order(&mut self, order: u32) -> eyre::Result<()>;

    fn set_element_order(&mut self, element: ElementId, order: u32) -> eyre::Result<()>;
}

pub(crate) fn check_order(order: u32, min_order: u32) -> eyre::Result<()> {
    if order < min_order || order > MAX_ORDER {
        return Err(crate::error::configuration_error(format!(
            "polynomial order {} is outside the supported range {}..={}",
            order, min_order, MAX_ORDER
        )));
    }
    Ok(())
}
