use crate::unit_tests::fixtures::rectangle;
use hpfem::error::{classify, AssemblyError};
use hpfem::mesh::{Ctm, EdgeSegment, ElementId, Half, Mesh, Refinement};
use hpfem::neighbor::{ExtendedAsmList, MultimeshTree, NeighborKind, NeighborSearch, NeighborSegment, Side};
use hpfem::quadrature::ReferenceShape;
use hpfem::shapeset::ShapeFunction;
use hpfem::space::AsmList;
use nalgebra::Point2;
use Half::{First, Second};

fn segment(halves: &[Half]) -> EdgeSegment {
    EdgeSegment::from_halves(halves.to_vec())
}

/// Two unit squares side by side, the left one refined once.
fn hanging_node_mesh() -> Mesh {
    let mut mesh = rectangle([2.0, 1.0], [2, 1], ReferenceShape::Quadrilateral);
    mesh.refine_element(0, Refinement::Isotropic).unwrap();
    mesh
}

fn point_on_edge(mesh: &Mesh, element: ElementId, edge: usize, s: f64) -> Point2<f64> {
    let (a, b) = mesh.element(element).edge_vertices(edge);
    let (pa, pb) = (mesh.vertex(a), mesh.vertex(b));
    Point2::from(pa.coords * (0.5 * (1.0 - s)) + pb.coords * (0.5 * (1.0 + s)))
}

/// Checks that both sides of every segment describe the same physical points.
fn assert_segments_match(mesh: &Mesh, central: ElementId, edge: usize, segments: &[NeighborSegment]) {
    for s in segments {
        for g in [-1.0, -0.3, 0.5, 1.0] {
            let x = point_on_edge(mesh, central, edge, s.segment.map(g));
            let (neighbor_edge, t) = s.neighbor_parameter(g).unwrap();
            let y = point_on_edge(mesh, s.neighbor, neighbor_edge, t);
            assert!((x - y).norm() < 1e-14, "{} != {} on segment {:?}", x, y, s);
        }
    }
}

#[test]
fn tree_leaves_form_the_common_refinement() {
    let mut tree = MultimeshTree::new();
    assert_eq!(tree.leaves(), vec![EdgeSegment::whole()]);

    tree.insert(&segment(&[First, Second]));
    tree.insert(&segment(&[Second]));
    tree.insert(&EdgeSegment::whole());
    assert_eq!(
        tree.leaves(),
        vec![segment(&[First, First]), segment(&[First, Second]), segment(&[Second])]
    );
    assert_eq!(
        tree.leaves_under(&segment(&[First])).unwrap(),
        vec![segment(&[First, First]), segment(&[First, Second])]
    );
    assert_eq!(tree.leaves_under(&segment(&[Second])).unwrap(), vec![segment(&[Second])]);

    let err = tree.leaves_under(&segment(&[Second, First])).unwrap_err();
    assert!(matches!(classify(&err), Some(AssemblyError::Topology(_))));
}

#[test]
fn search_from_the_coarse_side() {
    let mesh = hanging_node_mesh();
    let upper_right = mesh.element(0).son(2).unwrap();
    let lower_right = mesh.element(0).son(1).unwrap();

    let search = NeighborSearch::for_region_edge(&mesh, 1, &Ctm::identity(), 3, false).unwrap();
    assert_eq!(search.central(), 1);
    assert_eq!(search.region_edge(), 3);
    assert_eq!(search.num_neighbors(), 2);
    let neighbors: Vec<_> = search.segments().iter().map(|s| s.neighbor).collect();
    assert_eq!(neighbors, vec![upper_right, lower_right]);
    assert_eq!(search.segments()[0].segment, segment(&[First]));
    assert_eq!(
        search.segments()[0].kind,
        NeighborKind::Across {
            edge: 1,
            segment: EdgeSegment::whole(),
            reversed: true
        }
    );
    assert_segments_match(&mesh, 1, 3, search.segments());
}

#[test]
fn search_from_the_fine_side() {
    let mesh = hanging_node_mesh();
    let lower_right = mesh.element(0).son(1).unwrap();

    let search = NeighborSearch::for_region_edge(&mesh, lower_right, &Ctm::identity(), 1, false).unwrap();
    assert_eq!(search.num_neighbors(), 1);
    let s = &search.segments()[0];
    assert_eq!(s.neighbor, 1);
    assert!(s.segment.is_whole());
    assert_eq!(
        s.kind,
        NeighborKind::Across {
            edge: 3,
            segment: segment(&[Second]),
            reversed: true
        }
    );
    assert_segments_match(&mesh, lower_right, 1, search.segments());
}

#[test]
fn search_from_a_sub_element_region() {
    let mesh = hanging_node_mesh();
    let upper_right = mesh.element(0).son(2).unwrap();

    // Upper left quarter of the coarse element: its left edge is the upper half of the
    // element's left edge
    let ctm = Ctm::son(ReferenceShape::Quadrilateral, 3);
    let search = NeighborSearch::for_region_edge(&mesh, 1, &ctm, 3, false).unwrap();
    assert_eq!(search.num_neighbors(), 1);
    assert_eq!(search.segments()[0].neighbor, upper_right);
    assert!(search.segments()[0].segment.is_whole());

    // Its right edge lies inside the element
    let search = NeighborSearch::for_region_edge(&mesh, 1, &ctm, 1, false).unwrap();
    assert_eq!(search.segments().len(), 1);
    assert_eq!(search.segments()[0].kind, NeighborKind::SameElement);
    assert_eq!(search.segments()[0].neighbor, 1);
    assert_eq!(search.segments()[0].neighbor_parameter(0.0), None);

    // Boundary edges have no neighbors
    let search = NeighborSearch::for_region_edge(&mesh, 1, &Ctm::identity(), 0, false).unwrap();
    assert_eq!(search.num_neighbors(), 0);
}

#[test]
fn segmentations_of_two_meshes_are_aligned() {
    let coarse = hanging_node_mesh();
    let mut fine = hanging_node_mesh();
    let upper_right = fine.element(0).son(2).unwrap();
    fine.refine_element(upper_right, Refinement::Isotropic).unwrap();

    let searches = [
        NeighborSearch::for_region_edge(&coarse, 1, &Ctm::identity(), 3, false).unwrap(),
        NeighborSearch::for_region_edge(&fine, 1, &Ctm::identity(), 3, false).unwrap(),
    ];
    assert_eq!(searches[0].num_neighbors(), 2);
    assert_eq!(searches[1].num_neighbors(), 3);

    let mut tree = MultimeshTree::new();
    for search in &searches {
        search.insert_into(&mut tree);
    }
    let aligned_coarse = searches[0].aligned(&tree).unwrap();
    let aligned_fine = searches[1].aligned(&tree).unwrap();
    assert_eq!(aligned_coarse.len(), 3);
    assert_eq!(aligned_fine.len(), 3);
    for (a, b) in aligned_coarse.iter().zip(&aligned_fine) {
        assert_eq!(a.segment, b.segment);
    }

    // The upper fine neighbor is seen twice from the coarse mesh, on halves of its edge
    assert_eq!(aligned_coarse[0].neighbor, upper_right);
    assert_eq!(aligned_coarse[1].neighbor, upper_right);
    assert_eq!(
        aligned_coarse[0].kind,
        NeighborKind::Across {
            edge: 1,
            segment: segment(&[Second]),
            reversed: true
        }
    );
    assert_segments_match(&coarse, 1, 3, &aligned_coarse);
    assert_segments_match(&fine, 1, 3, &aligned_fine);
}

#[test]
fn extended_lists_track_the_side_of_each_function() {
    let mut central = AsmList::new();
    central.push(ShapeFunction::Vertex(0), Some(0), 1.0);
    central.push(ShapeFunction::Vertex(1), None, 0.5);
    let mut neighbor = AsmList::new();
    neighbor.push(ShapeFunction::Vertex(2), Some(7), 1.0);

    let mut list = ExtendedAsmList::new();
    list.fill(&central, Some(&neighbor));
    let sides: Vec<_> = list.entries().iter().map(|e| e.side).collect();
    assert_eq!(sides, vec![Side::Central, Side::Central, Side::Neighbor]);
    assert_eq!(list.entries()[2].entry.dof, Some(7));

    list.fill(&central, None);
    assert_eq!(list.len(), 2);
    assert!(list.entries().iter().all(|e| e.side == Side::Both));
}
