//! Strategies for property-based testing with `proptest`.
use crate::mesh::procedural::create_rectangular_mesh_description;
use crate::mesh::{Mesh, Refinement};
use ::proptest::prelude::*;
use hpfem_quadrature::ReferenceShape;

pub fn refinement() -> impl Strategy<Value = Refinement> {
    prop_oneof![
        Just(Refinement::Isotropic),
        Just(Refinement::Horizontal),
        Just(Refinement::Vertical)
    ]
}

pub fn reference_shape() -> impl Strategy<Value = ReferenceShape> {
    prop_oneof![Just(ReferenceShape::Triangle), Just(ReferenceShape::Quadrilateral)]
}

/// A sequence of element refinements that can be replayed on any mesh.
///
/// Each step selects an active element by its position among the active elements, modulo
/// their number, so that a plan applies to every non-empty mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementPlan {
    pub steps: Vec<(usize, Refinement)>,
}

impl RefinementPlan {
    pub fn apply(&self, mesh: &mut Mesh) -> eyre::Result<()> {
        for &(selector, refinement) in &self.steps {
            let active: Vec<_> = mesh.active_elements().map(|e| (e.id(), e.shape())).collect();
            if active.is_empty() {
                break;
            }
            let (id, shape) = active[selector % active.len()];
            let refinement = match shape {
                ReferenceShape::Triangle => Refinement::Isotropic,
                ReferenceShape::Quadrilateral => refinement,
            };
            mesh.refine_element(id, refinement)?;
        }
        Ok(())
    }
}

pub fn refinement_plan(max_steps: usize) -> impl Strategy<Value = RefinementPlan> {
    prop::collection::vec((0..usize::MAX, refinement()), 0..=max_steps).prop_map(|steps| RefinementPlan { steps })
}

/// Small rectangular meshes with at most `max_cells` cells per direction.
pub fn rectangular_mesh(max_cells: usize) -> impl Strategy<Value = Mesh> {
    let max_cells = max_cells.max(1);
    (1..=max_cells, 1..=max_cells, reference_shape()).prop_filter_map(
        "mesh construction failed",
        |(cells_x, cells_y, shape)| {
            let description =
                create_rectangular_mesh_description([0.0, 0.0], [1.0, 1.0], [cells_x, cells_y], shape);
            Mesh::from_description(&description).ok()
        },
    )
}

/// A mesh together with a refined copy of it.
pub fn refined_mesh_pair(max_cells: usize, max_steps: usize) -> impl Strategy<Value = (Mesh, Mesh)> {
    (rectangular_mesh(max_cells), refinement_plan(max_steps)).prop_filter_map(
        "refinement failed",
        |(base, plan)| {
            let mut refined = base.clone();
            plan.apply(&mut refined).ok()?;
            Some((base, refined))
        },
    )
}
