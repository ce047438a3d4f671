//! Neighbor search for discontinuous Galerkin interface terms.
//!
//! For an edge of a traversal region, [`NeighborSearch`] lists the elements of one mesh on
//! the other side, each paired with the part of the region edge it covers. Since the meshes
//! of a multi-mesh problem may be refined differently, the segmentations of all meshes are
//! aligned through a [`MultimeshTree`] before integration, so that the `k`-th segment means
//! the same part of the edge for every mesh.

use crate::error::topology_error;
use crate::mesh::{Ctm, EdgeSegment, ElementId, Mesh};
use crate::space::{AsmEntry, AsmList};
use log::warn;

mod tree;

pub use tree::MultimeshTree;

/// How the neighbor of a segment is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NeighborKind {
    /// The region edge lies inside the central element, which is its own neighbor.
    SameElement,
    /// Across the central element's edge, onto local edge `edge` of the neighbor, covering
    /// `segment` of it (in the neighbor's edge direction).
    Across {
        edge: usize,
        segment: EdgeSegment,
        reversed: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborSegment {
    /// Part of the region edge, in the direction of the region edge.
    pub segment: EdgeSegment,
    pub neighbor: ElementId,
    pub kind: NeighborKind,
}

impl NeighborSegment {
    /// The neighbor's edge parameter at the local parameter `g` of the segment.
    pub fn neighbor_parameter(&self, g: f64) -> Option<(usize, f64)> {
        match &self.kind {
            NeighborKind::SameElement => None,
            NeighborKind::Across {
                edge,
                segment,
                reversed,
            } => {
                let g = if *reversed { -g } else { g };
                Some((*edge, segment.map(g)))
            }
        }
    }

    /// Restricts the segment to `rest` relative to itself.
    fn restricted(&self, rest: &EdgeSegment) -> Self {
        let kind = match &self.kind {
            NeighborKind::SameElement => NeighborKind::SameElement,
            NeighborKind::Across {
                edge,
                segment,
                reversed,
            } => {
                let rest = if *reversed { rest.flipped() } else { rest.clone() };
                NeighborKind::Across {
                    edge: *edge,
                    segment: segment.extended(rest.halves()),
                    reversed: *reversed,
                }
            }
        };
        Self {
            segment: self.segment.extended(rest.halves()),
            neighbor: self.neighbor,
            kind,
        }
    }
}

/// The neighbors of one mesh across one edge of a traversal region.
#[derive(Debug, Clone)]
pub struct NeighborSearch {
    central: ElementId,
    region_edge: usize,
    segments: Vec<NeighborSegment>,
}

impl NeighborSearch {
    /// Searches across edge `edge` of the region given by `ctm` within the active `element`.
    ///
    /// With `ignore_errors`, a failed search is logged and yields no neighbors instead of an
    /// error.
    pub fn for_region_edge(
        mesh: &Mesh,
        element: ElementId,
        ctm: &Ctm,
        edge: usize,
        ignore_errors: bool,
    ) -> eyre::Result<Self> {
        let shape = mesh.element(element).shape();
        let mut search = Self {
            central: element,
            region_edge: edge,
            segments: Vec::new(),
        };

        let (element_edge, a, b) = match ctm.edge_on_element(shape, edge) {
            Some(location) => location,
            None => {
                search.segments.push(NeighborSegment {
                    segment: EdgeSegment::whole(),
                    neighbor: element,
                    kind: NeighborKind::SameElement,
                });
                return Ok(search);
            }
        };

        let result = EdgeSegment::from_interval(a, b)
            .ok_or_else(|| {
                topology_error(format!(
                    "region edge {} of element {} does not cover a dyadic part of its edge",
                    edge, element
                ))
            })
            .and_then(|region| Ok((region, mesh.edge_neighbors(element, element_edge)?)));
        let (region, neighbors) = match result {
            Ok(found) => found,
            Err(err) if ignore_errors => {
                warn!("ignoring failed neighbor search across edge {} of element {}: {}", edge, element, err);
                return Ok(search);
            }
            Err(err) => return Err(err),
        };

        for n in neighbors {
            let kind = |segment| NeighborKind::Across {
                edge: n.local_edge,
                segment,
                reversed: n.reversed,
            };
            if let Some(rest) = n.central_segment.strip_prefix(&region) {
                // The neighbor covers part of the region edge
                search.segments.push(NeighborSegment {
                    segment: rest,
                    neighbor: n.element,
                    kind: kind(n.neighbor_segment.clone()),
                });
            } else if let Some(rest) = region.strip_prefix(&n.central_segment) {
                // The region edge is part of what the neighbor covers
                let rest = if n.reversed { rest.flipped() } else { rest };
                search.segments.push(NeighborSegment {
                    segment: EdgeSegment::whole(),
                    neighbor: n.element,
                    kind: kind(n.neighbor_segment.extended(rest.halves())),
                });
            }
        }
        search
            .segments
            .sort_by(|s1, s2| s1.segment.interval().0.total_cmp(&s2.segment.interval().0));
        Ok(search)
    }

    pub fn central(&self) -> ElementId {
        self.central
    }

    pub fn region_edge(&self) -> usize {
        self.region_edge
    }

    pub fn segments(&self) -> &[NeighborSegment] {
        &self.segments
    }

    pub fn num_neighbors(&self) -> usize {
        self.segments.len()
    }

    /// Inserts this search's segmentation into `tree`.
    pub fn insert_into(&self, tree: &mut MultimeshTree) {
        for segment in &self.segments {
            tree.insert(&segment.segment);
        }
    }

    /// Refines the segments to the leaves of `tree`.
    pub fn aligned(&self, tree: &MultimeshTree) -> eyre::Result<Vec<NeighborSegment>> {
        let mut aligned = Vec::new();
        for segment in &self.segments {
            for leaf in tree.leaves_under(&segment.segment)? {
                let rest = leaf.strip_prefix(&segment.segment).ok_or_else(|| {
                    topology_error(format!(
                        "multimesh tree leaf {:?} lies outside segment {:?}",
                        leaf.halves(),
                        segment.segment.halves()
                    ))
                })?;
                aligned.push(segment.restricted(&rest));
            }
        }
        Ok(aligned)
    }
}

/// Which side of an interface a shape function lives on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Side {
    Central,
    Neighbor,
    /// The function lives on both sides, as when the neighbor is the central element itself.
    Both,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedAsmEntry {
    pub entry: AsmEntry,
    pub side: Side,
}

/// Central and neighbor shape functions of one field on one interface segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtendedAsmList {
    entries: Vec<ExtendedAsmEntry>,
}

impl ExtendedAsmList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the list from the central list and the neighbor list. Without a neighbor list
    /// the central functions live on both sides.
    pub fn fill(&mut self, central: &AsmList, neighbor: Option<&AsmList>) {
        self.entries.clear();
        let central_side = if neighbor.is_some() { Side::Central } else { Side::Both };
        self.entries
            .extend(central.entries().iter().map(|&entry| ExtendedAsmEntry {
                entry,
                side: central_side,
            }));
        if let Some(neighbor) = neighbor {
            self.entries
                .extend(neighbor.entries().iter().map(|&entry| ExtendedAsmEntry {
                    entry,
                    side: Side::Neighbor,
                }));
        }
    }

    pub fn entries(&self) -> &[ExtendedAsmEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
