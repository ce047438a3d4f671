//! Quadrature order selection.
//!
//! Forms are evaluated once in order mode, with every participating function replaced by a
//! single-point [`Func<Order>`] carrying its polynomial order. The resulting order is raised
//! by the order of the inverse reference map and clamped to the available rules.

use crate::function::{Func, Geom, MeshFunction, Order};
use crate::mesh::ElementId;
use crate::refmap::RefMap;
use crate::space::Space;
use crate::weakform::{FormContext, MatrixFormKernel, VectorFormKernel};
use hpfem_quadrature::limit_order;
use std::sync::Arc;

/// Orders of the functions available on one element or edge.
pub(crate) struct OrderInputs<'a> {
    pub refmap: &'a RefMap,
    pub fvm: bool,
    pub marker: i32,
    pub id: ElementId,
    pub edge: Option<usize>,
    /// Per space, the previous iterate's order, if assembling with a coefficient vector.
    pub u_ext: &'a [Func<Order>],
    /// External functions of the form, with the element each is evaluated on.
    pub ext: Vec<(&'a Arc<dyn MeshFunction>, ElementId)>,
}

/// Order of the shape functions of `space` on `element`, including its edges.
pub(crate) fn shape_function_order(space: &dyn Space, element: ElementId) -> i32 {
    let edges = space.mesh().element(element).num_edges();
    (0..edges)
        .map(|k| space.edge_order(element, k))
        .fold(space.element_order(element), u32::max) as i32
}

/// Single-point order functions for the previous iterate of every space.
pub(crate) fn previous_iterate_orders(spaces: &[Box<dyn Space>], elements: &[Option<ElementId>]) -> Vec<Func<Order>> {
    spaces
        .iter()
        .zip(elements)
        .map(|(space, element)| Func::order(element.map_or(0, |e| space.element_order(e) as i32)))
        .collect()
}

fn finish(inputs: &OrderInputs, order: Order) -> u32 {
    limit_order(order.get() + inputs.refmap.inv_ref_order(), inputs.refmap.shape())
}

fn ext_orders(inputs: &OrderInputs) -> Vec<Func<Order>> {
    inputs
        .ext
        .iter()
        .map(|(function, element)| Func::order(function.order(*element)))
        .collect()
}

pub(crate) fn matrix_form_order(
    kernel: &dyn MatrixFormKernel,
    u_order: i32,
    v_order: i32,
    inputs: &OrderInputs,
) -> eyre::Result<u32> {
    if inputs.fvm {
        return Ok(limit_order(inputs.refmap.inv_ref_order(), inputs.refmap.shape()));
    }
    let u = Func::order(u_order);
    let v = Func::order(v_order);
    let geom = Geom::order(inputs.marker, inputs.id, inputs.edge);
    let ext = ext_orders(inputs);
    let ctx = FormContext {
        wt: &[1.0],
        u_ext: inputs.u_ext,
        geom: &geom,
        ext: &ext,
    };
    let order = kernel.ord(&u, &v, &ctx)?;
    Ok(finish(inputs, order))
}

pub(crate) fn vector_form_order(kernel: &dyn VectorFormKernel, v_order: i32, inputs: &OrderInputs) -> eyre::Result<u32> {
    if inputs.fvm {
        return Ok(limit_order(inputs.refmap.inv_ref_order(), inputs.refmap.shape()));
    }
    let v = Func::order(v_order);
    let geom = Geom::order(inputs.marker, inputs.id, inputs.edge);
    let ext = ext_orders(inputs);
    let ctx = FormContext {
        wt: &[1.0],
        u_ext: inputs.u_ext,
        geom: &geom,
        ext: &ext,
    };
    let order = kernel.ord(&v, &ctx)?;
    Ok(finish(inputs, order))
}
