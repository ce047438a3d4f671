use crate::error::topology_error;
use crate::mesh::{EdgeSegment, Half};

#[derive(Debug, Clone, Default)]
struct Node {
    /// Children for the first and the second half.
    sons: [Option<usize>; 2],
}

/// Binary tree of edge bisections, used to align the neighbor segments of several meshes.
///
/// Inserting the segments of every mesh and reading back the leaves gives the coarsest
/// common refinement of all segmentations of an edge. Nodes live in an arena and are
/// addressed by index; the tree only lives for the assembly of one edge.
#[derive(Debug, Clone)]
pub struct MultimeshTree {
    nodes: Vec<Node>,
}

impl Default for MultimeshTree {
    fn default() -> Self {
        Self::new()
    }
}

fn slot(half: Half) -> usize {
    match half {
        Half::First => 0,
        Half::Second => 1,
    }
}

impl MultimeshTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
        }
    }

    pub fn insert(&mut self, segment: &EdgeSegment) {
        let mut node = 0;
        for &half in segment.halves() {
            node = match self.nodes[node].sons[slot(half)] {
                Some(son) => son,
                None => {
                    let son = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[node].sons[slot(half)] = Some(son);
                    son
                }
            };
        }
    }

    fn find(&self, segment: &EdgeSegment) -> eyre::Result<usize> {
        segment.halves().iter().try_fold(0, |node, &half| {
            self.nodes[node].sons[slot(half)].ok_or_else(|| {
                topology_error(format!(
                    "segment {:?} was not inserted into the multimesh tree",
                    segment.halves()
                ))
            })
        })
    }

    /// Leaves below `segment`, ordered along the edge.
    ///
    /// A node with a single son still counts as covering both halves: the missing half is a
    /// leaf of its own.
    pub fn leaves_under(&self, segment: &EdgeSegment) -> eyre::Result<Vec<EdgeSegment>> {
        let node = self.find(segment)?;
        let mut leaves = Vec::new();
        self.collect_leaves(node, segment.clone(), &mut leaves);
        Ok(leaves)
    }

    pub fn leaves(&self) -> Vec<EdgeSegment> {
        let mut leaves = Vec::new();
        self.collect_leaves(0, EdgeSegment::whole(), &mut leaves);
        leaves
    }

    fn collect_leaves(&self, node: usize, segment: EdgeSegment, leaves: &mut Vec<EdgeSegment>) {
        let sons = self.nodes[node].sons;
        if sons == [None, None] {
            leaves.push(segment);
            return;
        }
        for half in [Half::First, Half::Second] {
            let sub = segment.extended(&[half]);
            match sons[slot(half)] {
                Some(son) => self.collect_leaves(son, sub, leaves),
                None => leaves.push(sub),
            }
        }
    }
}
