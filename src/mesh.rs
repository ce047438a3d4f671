//! Refinable meshes of triangles and quadrilaterals.
//!
//! A [`Mesh`] is a forest of refinement trees rooted at the *base elements*. Only the leaves
//! (active elements) carry degrees of freedom, but inactive ancestors are kept so that several
//! meshes refined from the same base mesh can be traversed in sync.

use crate::error::{configuration_error, topology_error};
use hpfem_quadrature::ReferenceShape;
use nalgebra::Point2;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

mod markers;
mod neighbors;
pub mod procedural;
mod transform;

pub use markers::{MarkersConversion, INTERIOR_EDGE_MARKER};
pub use neighbors::EdgeNeighbor;
pub use transform::{
    reference_edge_parameter, reference_edge_point, reference_edge_tangent, reference_vertices, Ctm, EdgeSegment,
    Half, SonIndex,
};

pub type ElementId = usize;
pub type VertexId = usize;

/// Plain description of a base mesh, e.g. as read from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshDescription {
    pub vertices: Vec<[f64; 2]>,
    pub elements: Vec<ElementDescription>,
    pub boundaries: Vec<BoundaryDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDescription {
    /// Three or four vertex indices.
    pub vertices: Vec<usize>,
    pub marker: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryDescription {
    pub vertices: [usize; 2],
    pub marker: String,
}

/// How an element is split into sons.
///
/// Triangles only support [`Refinement::Isotropic`]. Quadrilaterals may also be split into
/// a lower and an upper half ([`Refinement::Horizontal`]) or into a left and a right half
/// ([`Refinement::Vertical`]).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Refinement {
    Isotropic,
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone)]
pub struct Element {
    id: ElementId,
    vertices: Vec<VertexId>,
    marker: i32,
    active: bool,
    parent: Option<ElementId>,
    son_index: Option<SonIndex>,
    sons: Vec<(SonIndex, ElementId)>,
    level: u32,
    base: ElementId,
}

impl Element {
    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn vertices(&self) -> &[VertexId] {
        &self.vertices
    }

    pub fn shape(&self) -> ReferenceShape {
        if self.vertices.len() == 3 {
            ReferenceShape::Triangle
        } else {
            ReferenceShape::Quadrilateral
        }
    }

    pub fn is_triangle(&self) -> bool {
        self.vertices.len() == 3
    }

    pub fn num_edges(&self) -> usize {
        self.vertices.len()
    }

    /// Internal element marker.
    pub fn marker(&self) -> i32 {
        self.marker
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    /// The transformation taking this element into its parent, if it has one.
    pub fn son_index(&self) -> Option<SonIndex> {
        self.son_index
    }

    pub fn sons(&self) -> &[(SonIndex, ElementId)] {
        &self.sons
    }

    pub fn son(&self, index: SonIndex) -> Option<ElementId> {
        self.sons
            .iter()
            .find(|(idx, _)| *idx == index)
            .map(|(_, son)| *son)
    }

    /// Refinement level, zero for base elements.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// The base element this element descends from.
    pub fn base(&self) -> ElementId {
        self.base
    }

    /// Vertices of local edge `k`, in counter-clockwise direction.
    pub fn edge_vertices(&self, k: usize) -> (VertexId, VertexId) {
        (self.vertices[k], self.vertices[(k + 1) % self.vertices.len()])
    }

    /// The local edge running from `a` to `b`, if any.
    pub fn local_edge(&self, a: VertexId, b: VertexId) -> Option<usize> {
        (0..self.num_edges()).find(|&k| self.edge_vertices(k) == (a, b))
    }
}

fn edge_key(a: VertexId, b: VertexId) -> (VertexId, VertexId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn signed_area(points: &[Point2<f64>]) -> f64 {
    let n = points.len();
    0.5 * (0..n)
        .map(|i| {
            let (p, q) = (points[i], points[(i + 1) % n]);
            p.x * q.y - q.x * p.y
        })
        .sum::<f64>()
}

#[derive(Debug, Clone)]
pub struct Mesh {
    vertices: Vec<Point2<f64>>,
    elements: Vec<Element>,
    num_base_elements: usize,
    // All elements, active or not, having exactly this edge
    edge_elements: FxHashMap<(VertexId, VertexId), Vec<ElementId>>,
    edge_markers: FxHashMap<(VertexId, VertexId), i32>,
    midpoints: FxHashMap<(VertexId, VertexId), VertexId>,
    midpoint_parents: FxHashMap<VertexId, (VertexId, VertexId)>,
    element_markers: MarkersConversion,
    boundary_markers: MarkersConversion,
    seq: u64,
}

impl Mesh {
    /// Builds a base mesh.
    ///
    /// Clockwise elements are reoriented. Every edge with a single adjacent element must be
    /// listed in `boundaries`, and only such edges may be listed there.
    pub fn from_description(description: &MeshDescription) -> eyre::Result<Self> {
        if description.elements.is_empty() {
            return Err(configuration_error("mesh has no elements"));
        }

        let vertices: Vec<_> = description
            .vertices
            .iter()
            .map(|&[x, y]| Point2::new(x, y))
            .collect();

        let mut mesh = Self {
            vertices,
            elements: Vec::with_capacity(description.elements.len()),
            num_base_elements: description.elements.len(),
            edge_elements: FxHashMap::default(),
            edge_markers: FxHashMap::default(),
            midpoints: FxHashMap::default(),
            midpoint_parents: FxHashMap::default(),
            element_markers: MarkersConversion::new(),
            boundary_markers: MarkersConversion::new(),
            seq: 1,
        };

        for (id, element) in description.elements.iter().enumerate() {
            let n = element.vertices.len();
            if n != 3 && n != 4 {
                return Err(configuration_error(format!(
                    "element {} has {} vertices, expected 3 or 4",
                    id, n
                )));
            }
            if let Some(&v) = element
                .vertices
                .iter()
                .find(|&&v| v >= mesh.vertices.len())
            {
                return Err(configuration_error(format!(
                    "element {} references vertex {} out of bounds",
                    id, v
                )));
            }
            let mut element_vertices = element.vertices.clone();
            let points: Vec<_> = element_vertices.iter().map(|&v| mesh.vertices[v]).collect();
            let area = signed_area(&points);
            if area.abs() < 1e-14 {
                return Err(configuration_error(format!("element {} is degenerate", id)));
            }
            if area < 0.0 {
                // Reverse the orientation while keeping vertex 0 first
                element_vertices[1..].reverse();
            }
            let marker = mesh.element_markers.insert(&element.marker);
            mesh.push_element(Element {
                id,
                vertices: element_vertices,
                marker,
                active: true,
                parent: None,
                son_index: None,
                sons: Vec::new(),
                level: 0,
                base: id,
            });
        }

        for boundary in &description.boundaries {
            let [a, b] = boundary.vertices;
            let key = edge_key(a, b);
            match mesh.edge_elements.get(&key).map(Vec::len) {
                Some(1) => {}
                Some(_) => {
                    return Err(topology_error(format!(
                        "boundary marker '{}' given for interior edge ({}, {})",
                        boundary.marker, a, b
                    )))
                }
                None => {
                    return Err(topology_error(format!(
                        "boundary marker '{}' given for non-existent edge ({}, {})",
                        boundary.marker, a, b
                    )))
                }
            }
            let marker = mesh.boundary_markers.insert(&boundary.marker);
            mesh.edge_markers.insert(key, marker);
        }

        for (key, adjacent) in &mesh.edge_elements {
            match adjacent.len() {
                1 if !mesh.edge_markers.contains_key(key) => {
                    return Err(topology_error(format!(
                        "boundary edge ({}, {}) has no marker",
                        key.0, key.1
                    )))
                }
                1 | 2 => {}
                n => {
                    return Err(topology_error(format!(
                        "edge ({}, {}) is shared by {} elements",
                        key.0, key.1, n
                    )))
                }
            }
        }

        Ok(mesh)
    }

    fn push_element(&mut self, element: Element) {
        for k in 0..element.num_edges() {
            let (a, b) = element.edge_vertices(k);
            self.edge_elements
                .entry(edge_key(a, b))
                .or_default()
                .push(element.id);
        }
        self.elements.push(element);
    }

    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    pub fn vertex(&self, id: VertexId) -> &Point2<f64> {
        &self.vertices[id]
    }

    /// Element by id.
    ///
    /// # Panics
    ///
    /// Panics if the id is out of bounds.
    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id]
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Total number of elements, including inactive ones.
    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn num_base_elements(&self) -> usize {
        self.num_base_elements
    }

    pub fn active_elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(|e| e.active)
    }

    pub fn num_active_elements(&self) -> usize {
        self.active_elements().count()
    }

    pub fn element_markers(&self) -> &MarkersConversion {
        &self.element_markers
    }

    pub fn boundary_markers(&self) -> &MarkersConversion {
        &self.boundary_markers
    }

    /// Generation counter, incremented by every refinement.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn element_points(&self, id: ElementId) -> Vec<Point2<f64>> {
        self.elements[id]
            .vertices
            .iter()
            .map(|&v| self.vertices[v])
            .collect()
    }

    pub fn centroid(&self, id: ElementId) -> Point2<f64> {
        let points = self.element_points(id);
        let n = points.len() as f64;
        let sum = points
            .iter()
            .fold(nalgebra::Vector2::zeros(), |acc, p| acc + p.coords);
        Point2::from(sum / n)
    }

    /// Largest distance between two vertices of the element.
    pub fn diameter(&self, id: ElementId) -> f64 {
        let points = self.element_points(id);
        let mut diameter: f64 = 0.0;
        for (i, p) in points.iter().enumerate() {
            for q in &points[i + 1..] {
                diameter = diameter.max((p - q).norm());
            }
        }
        diameter
    }

    pub fn area(&self, id: ElementId) -> f64 {
        signed_area(&self.element_points(id))
    }

    /// Marker of the edge between two vertices, [`INTERIOR_EDGE_MARKER`] for interior edges.
    pub fn edge_marker_between(&self, a: VertexId, b: VertexId) -> i32 {
        self.edge_markers
            .get(&edge_key(a, b))
            .copied()
            .unwrap_or(INTERIOR_EDGE_MARKER)
    }

    /// Marker of local edge `k` of element `id`.
    pub fn edge_marker(&self, id: ElementId, k: usize) -> i32 {
        let (a, b) = self.elements[id].edge_vertices(k);
        self.edge_marker_between(a, b)
    }

    pub fn is_boundary_edge(&self, id: ElementId, k: usize) -> bool {
        self.edge_marker(id, k) != INTERIOR_EDGE_MARKER
    }

    /// Elements (active or not) having the edge between `a` and `b`.
    pub fn elements_on_edge(&self, a: VertexId, b: VertexId) -> &[ElementId] {
        self.edge_elements
            .get(&edge_key(a, b))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn midpoint(&self, a: VertexId, b: VertexId) -> Option<VertexId> {
        self.midpoints.get(&edge_key(a, b)).copied()
    }

    /// The edge whose midpoint is `m`, if `m` was created by bisecting an edge.
    pub fn midpoint_parent(&self, m: VertexId) -> Option<(VertexId, VertexId)> {
        self.midpoint_parents.get(&m).copied()
    }

    fn ensure_midpoint(&mut self, a: VertexId, b: VertexId) -> VertexId {
        let key = edge_key(a, b);
        if let Some(&m) = self.midpoints.get(&key) {
            return m;
        }
        let m = self.vertices.len();
        self.vertices
            .push(Point2::from((self.vertices[a].coords + self.vertices[b].coords) * 0.5));
        self.midpoints.insert(key, m);
        self.midpoint_parents.insert(m, key);
        if let Some(&marker) = self.edge_markers.get(&key) {
            self.edge_markers.insert(edge_key(a, m), marker);
            self.edge_markers.insert(edge_key(m, b), marker);
        }
        m
    }

    /// Splits an active element into sons.
    pub fn refine_element(&mut self, id: ElementId, refinement: Refinement) -> eyre::Result<()> {
        let parent = self
            .elements
            .get(id)
            .ok_or_else(|| configuration_error(format!("element {} does not exist", id)))?
            .clone();
        if !parent.active {
            return Err(configuration_error(format!("element {} is already refined", id)));
        }
        let v = &parent.vertices;

        let sons: Vec<(SonIndex, Vec<VertexId>)> = match (parent.shape(), refinement) {
            (ReferenceShape::Triangle, Refinement::Isotropic) => {
                let m01 = self.ensure_midpoint(v[0], v[1]);
                let m12 = self.ensure_midpoint(v[1], v[2]);
                let m20 = self.ensure_midpoint(v[2], v[0]);
                vec![
                    (0, vec![v[0], m01, m20]),
                    (1, vec![m01, v[1], m12]),
                    (2, vec![m20, m12, v[2]]),
                    (3, vec![m12, m20, m01]),
                ]
            }
            (ReferenceShape::Triangle, _) => {
                return Err(configuration_error(format!(
                    "triangle {} can only be refined isotropically",
                    id
                )))
            }
            (ReferenceShape::Quadrilateral, Refinement::Isotropic) => {
                let m01 = self.ensure_midpoint(v[0], v[1]);
                let m12 = self.ensure_midpoint(v[1], v[2]);
                let m23 = self.ensure_midpoint(v[2], v[3]);
                let m30 = self.ensure_midpoint(v[3], v[0]);
                let center = self.vertices.len();
                let sum = v
                    .iter()
                    .fold(nalgebra::Vector2::zeros(), |acc, &i| acc + self.vertices[i].coords);
                self.vertices.push(Point2::from(sum * 0.25));
                vec![
                    (0, vec![v[0], m01, center, m30]),
                    (1, vec![m01, v[1], m12, center]),
                    (2, vec![center, m12, v[2], m23]),
                    (3, vec![m30, center, m23, v[3]]),
                ]
            }
            (ReferenceShape::Quadrilateral, Refinement::Horizontal) => {
                let m12 = self.ensure_midpoint(v[1], v[2]);
                let m30 = self.ensure_midpoint(v[3], v[0]);
                vec![(4, vec![v[0], v[1], m12, m30]), (5, vec![m30, m12, v[2], v[3]])]
            }
            (ReferenceShape::Quadrilateral, Refinement::Vertical) => {
                let m01 = self.ensure_midpoint(v[0], v[1]);
                let m23 = self.ensure_midpoint(v[2], v[3]);
                vec![(6, vec![v[0], m01, m23, v[3]]), (7, vec![m01, v[1], v[2], m23])]
            }
        };

        let mut son_ids = Vec::with_capacity(sons.len());
        for (son_index, vertices) in sons {
            let son_id = self.elements.len();
            self.push_element(Element {
                id: son_id,
                vertices,
                marker: parent.marker,
                active: true,
                parent: Some(id),
                son_index: Some(son_index),
                sons: Vec::new(),
                level: parent.level + 1,
                base: parent.base,
            });
            son_ids.push((son_index, son_id));
        }

        let element = &mut self.elements[id];
        element.active = false;
        element.sons = son_ids;
        self.seq += 1;
        Ok(())
    }

    /// Refines every active element once. Triangles are always refined isotropically.
    pub fn refine_all_elements(&mut self, refinement: Refinement) -> eyre::Result<()> {
        let active: Vec<_> = self.active_elements().map(|e| (e.id, e.shape())).collect();
        for (id, shape) in active {
            let refinement = match shape {
                ReferenceShape::Triangle => Refinement::Isotropic,
                ReferenceShape::Quadrilateral => refinement,
            };
            self.refine_element(id, refinement)?;
        }
        Ok(())
    }

    /// Whether `other` was refined from the same base mesh as `self`.
    pub fn same_base(&self, other: &Mesh) -> bool {
        if self.num_base_elements != other.num_base_elements {
            return false;
        }
        (0..self.num_base_elements).all(|id| {
            let (a, b) = (&self.elements[id], &other.elements[id]);
            a.vertices.len() == b.vertices.len()
                && a.vertices.iter().zip(&b.vertices).all(|(&va, &vb)| {
                    (self.vertices[va] - other.vertices[vb]).norm() < 1e-12
                })
        })
    }
}
