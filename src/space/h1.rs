use super::{check_order, AsmList, Space};
use crate::error::configuration_error;
use crate::mesh::{ElementId, Mesh, VertexId};
use crate::shapeset::{edge_kernel, H1Shapeset, ShapeFunction, Shapeset};
use hpfem_quadrature::edge_rule;
use log::debug;
use nalgebra::{DMatrix, DVector};
use rustc_hash::FxHashMap;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Prescribed values on all boundary edges carrying a given marker.
#[derive(Clone)]
pub struct EssentialBc {
    marker: String,
    value: Arc<dyn Fn(f64, f64) -> f64 + Send + Sync>,
}

impl EssentialBc {
    pub fn new(marker: impl Into<String>, value: impl Fn(f64, f64) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            marker: marker.into(),
            value: Arc::new(value),
        }
    }

    /// Homogeneous condition.
    pub fn zero(marker: impl Into<String>) -> Self {
        Self::new(marker, |_, _| 0.0)
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }
}

impl Debug for EssentialBc {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("EssentialBc")
            .field("marker", &self.marker)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
enum VertexDof {
    Free(usize),
    Fixed(f64),
}

#[derive(Debug, Clone, PartialEq)]
enum EdgeDofs {
    Free { first: usize, order: u32 },
    /// Coefficients of the edge functions of degree `2..=order` in the global edge direction.
    Fixed { coefficients: Vec<f64> },
}

fn edge_key(a: VertexId, b: VertexId) -> (VertexId, VertexId) {
    (a.min(b), a.max(b))
}

/// Continuous hierarchic space on a conforming mesh.
#[derive(Debug, Clone)]
pub struct H1Space {
    mesh: Arc<Mesh>,
    shapeset: Arc<dyn Shapeset>,
    essential: Vec<(i32, EssentialBc)>,
    orders: Vec<u32>,
    vertex_dofs: FxHashMap<VertexId, VertexDof>,
    edge_dofs: FxHashMap<(VertexId, VertexId), EdgeDofs>,
    bubble_dofs: FxHashMap<ElementId, usize>,
    num_dofs: usize,
    seq: u64,
}

impl H1Space {
    /// Creates a space of uniform order.
    ///
    /// Fails if the mesh has hanging nodes, if the order is out of range or if an essential
    /// condition refers to an unknown boundary marker.
    pub fn new(mesh: Arc<Mesh>, order: u32, essential: Vec<EssentialBc>) -> eyre::Result<Self> {
        check_order(order, 1)?;
        let essential = essential
            .into_iter()
            .map(|bc| {
                mesh.boundary_markers()
                    .internal_marker(bc.marker())
                    .map(|marker| (marker, bc.clone()))
                    .ok_or_else(|| configuration_error(format!("unknown boundary marker '{}'", bc.marker())))
            })
            .collect::<eyre::Result<Vec<_>>>()?;

        for element in mesh.active_elements() {
            for k in 0..element.num_edges() {
                let neighbors = mesh.edge_neighbors(element.id(), k)?;
                let hanging = neighbors
                    .iter()
                    .any(|n| !n.central_segment.is_whole() || !n.neighbor_segment.is_whole());
                if hanging {
                    return Err(configuration_error(format!(
                        "H1 space needs a conforming mesh, edge {} of element {} has a hanging node",
                        k,
                        element.id()
                    )));
                }
            }
        }

        let mut space = Self {
            orders: vec![order; mesh.num_elements()],
            mesh,
            shapeset: Arc::new(H1Shapeset),
            essential,
            vertex_dofs: FxHashMap::default(),
            edge_dofs: FxHashMap::default(),
            bubble_dofs: FxHashMap::default(),
            num_dofs: 0,
            seq: 0,
        };
        space.assign_dofs()?;
        Ok(space)
    }

    fn essential_value(&self, marker: i32) -> Option<&EssentialBc> {
        self.essential
            .iter()
            .find(|(m, _)| *m == marker)
            .map(|(_, bc)| bc)
    }

    fn assign_dofs(&mut self) -> eyre::Result<()> {
        let mesh = self.mesh.clone();
        self.vertex_dofs.clear();
        self.edge_dofs.clear();
        self.bubble_dofs.clear();

        // Vertices on essential edges are fixed to the boundary data
        let mut fixed_edges = FxHashMap::default();
        for element in mesh.active_elements() {
            for k in 0..element.num_edges() {
                if let Some(bc) = self.essential_value(mesh.edge_marker(element.id(), k)).cloned() {
                    let (a, b) = element.edge_vertices(k);
                    for v in [a, b] {
                        let p = mesh.vertex(v);
                        self.vertex_dofs
                            .entry(v)
                            .or_insert_with(|| VertexDof::Fixed((bc.value)(p.x, p.y)));
                    }
                    fixed_edges.insert(edge_key(a, b), bc);
                }
            }
        }

        let mut next = 0;
        for element in mesh.active_elements() {
            for &v in element.vertices() {
                self.vertex_dofs.entry(v).or_insert_with(|| {
                    next += 1;
                    VertexDof::Free(next - 1)
                });
            }
        }

        for element in mesh.active_elements() {
            for k in 0..element.num_edges() {
                let (a, b) = element.edge_vertices(k);
                let key = edge_key(a, b);
                if self.edge_dofs.contains_key(&key) {
                    continue;
                }
                let order = self.edge_order(element.id(), k);
                let dofs = match fixed_edges.get(&key) {
                    Some(bc) => EdgeDofs::Fixed {
                        coefficients: self.project_edge(key, order, bc)?,
                    },
                    None => {
                        let first = next;
                        next += order as usize - 1;
                        EdgeDofs::Free { first, order }
                    }
                };
                self.edge_dofs.insert(key, dofs);
            }
        }

        for element in mesh.active_elements() {
            let num_bubbles = H1Shapeset::bubble_functions(element.shape(), self.orders[element.id()]).len();
            self.bubble_dofs.insert(element.id(), next);
            next += num_bubbles;
        }

        self.num_dofs = next;
        debug!("H1 space: {} dofs on {} active elements", next, mesh.num_active_elements());
        Ok(())
    }

    /// Least-squares fit of the boundary data minus its linear interpolant by edge functions.
    fn project_edge(&self, (a, b): (VertexId, VertexId), order: u32, bc: &EssentialBc) -> eyre::Result<Vec<f64>> {
        let n = order as usize - 1;
        if n == 0 {
            return Ok(Vec::new());
        }
        let vertex_value = |v| match self.vertex_dofs.get(&v) {
            Some(VertexDof::Fixed(g)) => *g,
            _ => 0.0,
        };
        let (ga, gb) = (vertex_value(a), vertex_value(b));
        let (pa, pb) = (self.mesh.vertex(a), self.mesh.vertex(b));

        let mut gram = DMatrix::zeros(n, n);
        let mut rhs = DVector::zeros(n);
        let (weights, points) = edge_rule(2 * order + 8);
        for (w, [s]) in weights.iter().zip(points) {
            let x = pa.coords * (0.5 * (1.0 - s)) + pb.coords * (0.5 * (1.0 + s));
            let residual = (bc.value)(x.x, x.y) - ga * 0.5 * (1.0 - s) - gb * 0.5 * (1.0 + s);
            let traces: Vec<f64> = (2..=order as u8).map(|k| edge_kernel(s, k).0).collect();
            for i in 0..n {
                rhs[i] += w * residual * traces[i];
                for j in 0..n {
                    gram[(i, j)] += w * traces[i] * traces[j];
                }
            }
        }
        let coefficients = gram
            .cholesky()
            .ok_or_else(|| configuration_error("singular edge projection"))?
            .solve(&rhs);
        Ok(coefficients.iter().copied().collect())
    }

    fn push_vertex_function(&self, element: ElementId, local: usize, list: &mut AsmList, offset: usize) {
        let v = self.mesh.element(element).vertices()[local];
        let shape = ShapeFunction::Vertex(local as u8);
        match self.vertex_dofs[&v] {
            VertexDof::Free(dof) => list.push(shape, Some(dof + offset), 1.0),
            VertexDof::Fixed(value) => list.push(shape, None, value),
        }
    }

    fn push_edge_functions(&self, element: ElementId, edge: usize, list: &mut AsmList, offset: usize) {
        let (a, b) = self.mesh.element(element).edge_vertices(edge);
        let reversed = a > b;
        let sign = |degree: u8| if reversed && degree % 2 == 1 { -1.0 } else { 1.0 };
        match &self.edge_dofs[&edge_key(a, b)] {
            EdgeDofs::Free { first, order } => {
                for (n, degree) in (2..=*order as u8).enumerate() {
                    let shape = ShapeFunction::Edge {
                        edge: edge as u8,
                        degree,
                    };
                    list.push(shape, Some(first + n + offset), sign(degree));
                }
            }
            EdgeDofs::Fixed { coefficients } => {
                for (n, &c) in coefficients.iter().enumerate() {
                    let degree = n as u8 + 2;
                    let shape = ShapeFunction::Edge {
                        edge: edge as u8,
                        degree,
                    };
                    list.push(shape, None, sign(degree) * c);
                }
            }
        }
    }
}

impl Space for H1Space {
    fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    fn shapeset(&self) -> &Arc<dyn Shapeset> {
        &self.shapeset
    }

    fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    fn seq(&self) -> u64 {
        self.seq
    }

    fn element_order(&self, element: ElementId) -> u32 {
        self.orders[element]
    }

    /// The minimum of the orders of the elements sharing the edge.
    fn edge_order(&self, element: ElementId, edge: usize) -> u32 {
        let (a, b) = self.mesh.element(element).edge_vertices(edge);
        self.mesh
            .elements_on_edge(a, b)
            .iter()
            .filter(|&&e| self.mesh.element(e).is_active())
            .map(|&e| self.orders[e])
            .min()
            .unwrap_or(self.orders[element])
    }

    fn element_assembly_list(&self, element: ElementId, list: &mut AsmList, offset: usize) {
        list.clear();
        let el = self.mesh.element(element);
        for local in 0..el.num_edges() {
            self.push_vertex_function(element, local, list, offset);
        }
        for edge in 0..el.num_edges() {
            self.push_edge_functions(element, edge, list, offset);
        }
        let first = self.bubble_dofs[&element];
        for (n, shape) in H1Shapeset::bubble_functions(el.shape(), self.orders[element])
            .into_iter()
            .enumerate()
        {
            list.push(shape, Some(first + n + offset), 1.0);
        }
    }

    fn boundary_assembly_list(&self, element: ElementId, edge: usize, list: &mut AsmList, offset: usize) {
        list.clear();
        let n = self.mesh.element(element).num_edges();
        self.push_vertex_function(element, edge, list, offset);
        self.push_vertex_function(element, (edge + 1) % n, list, offset);
        self.push_edge_functions(element, edge, list, offset);
    }

    fn set_uniform_order(&mut self, order: u32) -> eyre::Result<()> {
        check_order(order, 1)?;
        self.orders.iter_mut().for_each(|o| *o = order);
        self.assign_dofs()?;
        self.seq += 1;
        Ok(())
    }

    fn set_element_order(&mut self, element: ElementId, order: u32) -> eyre::Result<()> {
        check_order(order, 1)?;
        if !self.mesh.elements().get(element).map_or(false, |e| e.is_active()) {
            return Err(configuration_error(format!("element {} is not an active element", element)));
        }
        self.orders[element] = order;
        self.assign_dofs()?;
        self.seq += 1;
        Ok(())
    }
}
