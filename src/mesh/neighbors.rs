//! Neighbor search across the edges of active elements.

use super::{EdgeSegment, ElementId, Half, Mesh, VertexId, INTERIOR_EDGE_MARKER};
use crate::error::topology_error;
use log::trace;

/// A neighbor of an active element across one of its edges.
///
/// The shared part of the edge is the `central_segment` of the central element's edge and,
/// at the same time, the `neighbor_segment` of the neighbor's edge `local_edge`. Both segments
/// are expressed in the direction of the respective element's own edge. At most one of the
/// two segments is a proper sub-segment: either the neighbor is finer (only the central
/// segment is proper), coarser (only the neighbor segment is) or of the same size (neither).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeNeighbor {
    pub element: ElementId,
    pub local_edge: usize,
    pub central_segment: EdgeSegment,
    pub neighbor_segment: EdgeSegment,
    /// Whether the neighbor's edge runs opposite to the central element's edge.
    pub reversed: bool,
}

impl Mesh {
    /// Finds all active neighbors across local edge `edge` of the active element `id`.
    ///
    /// Returns an empty list for boundary edges. Neighbors are listed in the direction of the
    /// central element's edge.
    pub fn edge_neighbors(&self, id: ElementId, edge: usize) -> eyre::Result<Vec<EdgeNeighbor>> {
        let (a, b) = self.element(id).edge_vertices(edge);
        if self.edge_marker_between(a, b) != INTERIOR_EDGE_MARKER {
            return Ok(Vec::new());
        }

        let mut neighbors = Vec::new();
        if self.opposite_elements(a, b, a, b).next().is_some() {
            self.collect_finer_neighbors(a, b, (a, b), EdgeSegment::whole(), &mut neighbors)?;
        } else {
            neighbors.push(self.coarser_neighbor(id, a, b)?);
        }
        trace!(
            "element {} edge {}: {} neighbor(s)",
            id,
            edge,
            neighbors.len()
        );
        Ok(neighbors)
    }

    /// Elements on the edge `(p, q)` lying on the right of the directed line `a -> b`.
    fn opposite_elements(
        &self,
        p: VertexId,
        q: VertexId,
        a: VertexId,
        b: VertexId,
    ) -> impl Iterator<Item = ElementId> + '_ {
        let (pa, pb) = (self.vertices[a], self.vertices[b]);
        let direction = pb - pa;
        self.elements_on_edge(p, q)
            .iter()
            .copied()
            .filter(move |&n| {
                let offset = self.centroid(n) - pa;
                direction.x * offset.y - direction.y * offset.x < 0.0
            })
    }

    fn collect_finer_neighbors(
        &self,
        p: VertexId,
        q: VertexId,
        line: (VertexId, VertexId),
        central_segment: EdgeSegment,
        neighbors: &mut Vec<EdgeNeighbor>,
    ) -> eyre::Result<()> {
        let active = self
            .opposite_elements(p, q, line.0, line.1)
            .find(|&n| self.element(n).is_active());
        if let Some(n) = active {
            neighbors.push(self.neighbor_entry(n, p, q, central_segment, EdgeSegment::whole())?);
            return Ok(());
        }
        let m = self.midpoint(p, q).ok_or_else(|| {
            topology_error(format!(
                "no active neighbor found across edge ({}, {})",
                p, q
            ))
        })?;
        self.collect_finer_neighbors(p, m, line, central_segment.extended(&[Half::First]), neighbors)?;
        self.collect_finer_neighbors(m, q, line, central_segment.extended(&[Half::Second]), neighbors)
    }

    fn coarser_neighbor(&self, id: ElementId, a: VertexId, b: VertexId) -> eyre::Result<EdgeNeighbor> {
        let not_found = || {
            topology_error(format!(
                "no neighbor found across edge ({}, {}) of element {}",
                a, b, id
            ))
        };

        // Position of (a, b) within the larger edge (p, q), in the direction a -> b
        let mut chain = Vec::new();
        let (mut p, mut q) = (a, b);
        loop {
            let parent_of_q = self
                .midpoint_parent(q)
                .and_then(|(x, y)| if x == p { Some(y) } else if y == p { Some(x) } else { None });
            let parent_of_p = self
                .midpoint_parent(p)
                .and_then(|(x, y)| if x == q { Some(y) } else if y == q { Some(x) } else { None });
            if let Some(end) = parent_of_q {
                chain.push(Half::First);
                q = end;
            } else if let Some(start) = parent_of_p {
                chain.push(Half::Second);
                p = start;
            } else {
                return Err(not_found());
            }

            let mut opposite = self.opposite_elements(p, q, a, b).peekable();
            if opposite.peek().is_some() {
                let n = opposite
                    .find(|&n| self.element(n).is_active())
                    .ok_or_else(not_found)?;
                chain.reverse();
                return self.neighbor_entry(n, p, q, EdgeSegment::whole(), EdgeSegment::from_halves(chain));
            }
        }
    }

    /// `position` locates the shared part on the neighbor's edge `(p, q)`, measured from `p`.
    fn neighbor_entry(
        &self,
        n: ElementId,
        p: VertexId,
        q: VertexId,
        central_segment: EdgeSegment,
        position: EdgeSegment,
    ) -> eyre::Result<EdgeNeighbor> {
        let element = self.element(n);
        let (local_edge, reversed) = if let Some(k) = element.local_edge(q, p) {
            (k, true)
        } else if let Some(k) = element.local_edge(p, q) {
            (k, false)
        } else {
            return Err(topology_error(format!(
                "element {} does not have edge ({}, {})",
                n, p, q
            )));
        };
        let neighbor_segment = if reversed { position.flipped() } else { position };
        Ok(EdgeNeighbor {
            element: n,
            local_edge,
            central_segment,
            neighbor_segment,
            reversed,
        })
    }
}
