use crate::unit_tests::fixtures::{shared, unit_square};
use hpfem::error::{classify, AssemblyError};
use hpfem::mesh::{Mesh, Refinement};
use hpfem::proptest::refined_mesh_pair;
use hpfem::quadrature::ReferenceShape;
use hpfem::traverse::{State, Traverse};
use proptest::prelude::*;
use std::sync::Arc;

fn traverse(meshes: &[&Arc<Mesh>]) -> Vec<State> {
    Traverse::begin(meshes.iter().map(|&mesh| mesh.clone()).collect())
        .unwrap()
        .collect()
}

/// Area covered by the states, measured through the elements of mesh `m`.
fn covered_area(meshes: &[&Arc<Mesh>], states: &[State], m: usize) -> f64 {
    states
        .iter()
        .map(|state| {
            let element = state.elements[m].unwrap();
            meshes[m].area(element) * state.transforms[m].scale()
        })
        .sum()
}

#[test]
fn single_mesh_visits_every_active_element_once() {
    for shape in [ReferenceShape::Triangle, ReferenceShape::Quadrilateral] {
        let mut mesh = unit_square(2, shape);
        mesh.refine_element(0, Refinement::Isotropic).unwrap();
        let mesh = shared(mesh);
        let states = traverse(&[&mesh]);

        assert_eq!(states.len(), mesh.num_active_elements());
        let mut visited: Vec<_> = states.iter().map(|s| s.elements[0].unwrap()).collect();
        visited.sort_unstable();
        visited.dedup();
        assert_eq!(visited.len(), states.len());
        assert!(states.iter().all(|s| s.is_whole_element(0)));
        assert!(states.iter().enumerate().all(|(i, s)| s.id == i));
    }
}

#[test]
fn coarse_elements_are_split_by_finer_meshes() {
    let coarse = shared(unit_square(2, ReferenceShape::Quadrilateral));
    let mut fine = unit_square(2, ReferenceShape::Quadrilateral);
    fine.refine_all_elements(Refinement::Isotropic).unwrap();
    let fine = shared(fine);

    let states = traverse(&[&coarse, &fine]);
    assert_eq!(states.len(), 16);
    for state in &states {
        assert!((state.transforms[0].scale() - 0.25).abs() < 1e-15);
        assert!(state.is_whole_element(1));
        assert_eq!(coarse.element(state.elements[0].unwrap()).id(), state.base);
    }
}

#[test]
fn anisotropic_refinements_intersect() {
    let mut horizontal = unit_square(1, ReferenceShape::Quadrilateral);
    horizontal.refine_element(0, Refinement::Horizontal).unwrap();
    let mut vertical = unit_square(1, ReferenceShape::Quadrilateral);
    vertical.refine_element(0, Refinement::Vertical).unwrap();
    let (horizontal, vertical) = (shared(horizontal), shared(vertical));
    let meshes = [&horizontal, &vertical];

    let states = traverse(&meshes);
    assert_eq!(states.len(), 4);
    for state in &states {
        assert!((state.transforms[0].scale() - 0.5).abs() < 1e-15);
        assert!((state.transforms[1].scale() - 0.5).abs() < 1e-15);
        // Every quarter touches two sides of the square
        assert_eq!(state.bnd.iter().filter(|&&b| b).count(), 2);
    }
    assert!((covered_area(&meshes, &states, 0) - 1.0).abs() < 1e-14);
    assert!((covered_area(&meshes, &states, 1) - 1.0).abs() < 1e-14);
}

#[test]
fn region_edges_inherit_boundary_markers() {
    let mut mesh = unit_square(1, ReferenceShape::Quadrilateral);
    mesh.refine_element(0, Refinement::Isotropic).unwrap();
    let mesh = shared(mesh);
    let coarse = shared(unit_square(1, ReferenceShape::Quadrilateral));
    let bottom = mesh.boundary_markers().internal_marker("bottom").unwrap();

    let states = traverse(&[&coarse, &mesh]);
    let lower_left = states
        .iter()
        .find(|s| s.elements[1] == mesh.element(0).son(0))
        .unwrap();
    assert_eq!(lower_left.edge_markers[0], bottom);
    assert_eq!(lower_left.bnd, vec![true, false, false, true]);
}

#[test]
fn meshes_must_share_the_base_mesh() {
    let err = Traverse::begin(vec![]).unwrap_err();
    assert!(matches!(classify(&err), Some(AssemblyError::Configuration(_))));

    let a = shared(unit_square(2, ReferenceShape::Quadrilateral));
    let b = shared(unit_square(3, ReferenceShape::Quadrilateral));
    let err = Traverse::begin(vec![a, b]).unwrap_err();
    assert!(matches!(classify(&err), Some(AssemblyError::Configuration(_))));
}

proptest! {
    #[test]
    fn states_tile_the_domain((base, refined) in refined_mesh_pair(3, 6)) {
        let (base, refined) = (shared(base), shared(refined));
        let meshes = [&base, &refined];
        let states = traverse(&meshes);

        prop_assert!(states.len() >= refined.num_active_elements());
        for m in 0..2 {
            prop_assert!((covered_area(&meshes, &states, m) - 1.0).abs() < 1e-12);
        }
        // Every active element of the finer mesh is visited
        for element in refined.active_elements() {
            prop_assert!(states.iter().any(|s| s.elements[1] == Some(element.id())));
        }
    }
}
