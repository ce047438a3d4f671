//! The structure pass: registers every matrix entry that assembly may touch.

use super::DiscreteProblem;
use crate::neighbor::{NeighborKind, NeighborSearch};
use crate::space::AsmList;
use crate::traverse::Traverse;
use crate::weakform::{FormKind, ZERO_TOLERANCE};
use hpfem_sparse::{SparseMatrix, Vector};
use log::debug;
use std::sync::Arc;

/// Generations of the inputs the sparse structure was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Checkpoint {
    pub wf_seq: u64,
    pub space_seqs: Vec<u64>,
    pub force_diagonal_blocks: bool,
}

fn pre_add_all(matrix: &mut dyn SparseMatrix, rows: &AsmList, cols: &AsmList) {
    for row in rows.dofs() {
        for col in cols.dofs() {
            matrix.pre_add_ij(row, col);
        }
    }
}

impl DiscreteProblem {
    /// Blocks receiving contributions from DG matrix forms across interfaces.
    fn dg_blocks(&self) -> Vec<Vec<bool>> {
        let neq = self.wf.neq();
        let mut blocks = vec![vec![false; neq]; neq];
        for form in self.wf.matrix_forms() {
            if form.kind() == FormKind::Dg && form.scaling().abs() >= ZERO_TOLERANCE {
                blocks[form.i()][form.j()] = true;
            }
        }
        blocks
    }

    /// Makes the sparse structure of `matrix` current and prepares `rhs`.
    ///
    /// If nothing changed since the last build, the matrix is only zeroed. An rhs whose length
    /// differs from the number of DOFs is resized, any other rhs is zeroed.
    pub(crate) fn create_sparse_structure(
        &mut self,
        matrix: Option<&mut (dyn SparseMatrix + '_)>,
        rhs: Option<&mut (dyn Vector + '_)>,
        force_diagonal_blocks: bool,
    ) -> eyre::Result<()> {
        let ndof = self.num_dofs();
        let reusable = self.is_up_to_date()
            && self
                .checkpoint
                .as_ref()
                .map_or(false, |checkpoint| checkpoint.force_diagonal_blocks == force_diagonal_blocks);

        match matrix {
            Some(matrix) if reusable && matrix.size() == ndof => {
                debug!("reusing sparse structure of size {}", ndof);
                matrix.zero();
            }
            Some(matrix) => {
                self.build_structure(matrix, force_diagonal_blocks)?;
                self.checkpoint = Some(Checkpoint {
                    wf_seq: self.wf.seq(),
                    space_seqs: self.spaces.iter().map(|space| space.seq()).collect(),
                    force_diagonal_blocks,
                });
            }
            None => {}
        }

        if let Some(rhs) = rhs {
            if rhs.len() != ndof {
                rhs.alloc(ndof);
            } else {
                rhs.zero();
            }
        }
        Ok(())
    }

    fn build_structure(&self, matrix: &mut dyn SparseMatrix, force_diagonal_blocks: bool) -> eyre::Result<()> {
        let ndof = self.num_dofs();
        let neq = self.wf.neq();
        let first_dofs = self.first_dofs();
        matrix.free();
        matrix.prealloc(ndof);

        let blocks = self.wf.blocks(force_diagonal_blocks);
        let dg_blocks = self.wf.has_dg_matrix_forms().then(|| self.dg_blocks());
        let meshes = self.spaces.iter().map(|space| Arc::clone(space.mesh())).collect();
        let traverse = Traverse::begin(meshes)?;

        let mut lists = vec![AsmList::new(); neq];
        let mut neighbor_list = AsmList::new();
        let mut num_states = 0;
        for state in traverse {
            num_states += 1;
            for (s, space) in self.spaces.iter().enumerate() {
                match state.elements[s] {
                    Some(element) => space.element_assembly_list(element, &mut lists[s], first_dofs[s]),
                    None => lists[s].clear(),
                }
            }

            for m in 0..neq {
                for n in 0..neq {
                    if blocks[m][n] && state.elements[m].is_some() && state.elements[n].is_some() {
                        pre_add_all(matrix, &lists[m], &lists[n]);
                    }
                }
            }

            let dg_blocks = match &dg_blocks {
                Some(dg_blocks) => dg_blocks,
                None => continue,
            };
            for edge in 0..state.num_edges() {
                if state.bnd[edge] {
                    continue;
                }
                for (n, space) in self.spaces.iter().enumerate() {
                    let element = match state.elements[n] {
                        Some(element) => element,
                        None => continue,
                    };
                    let search =
                        NeighborSearch::for_region_edge(space.mesh(), element, &state.transforms[n], edge, true)?;
                    for segment in search.segments() {
                        if segment.kind == NeighborKind::SameElement {
                            continue;
                        }
                        space.element_assembly_list(segment.neighbor, &mut neighbor_list, first_dofs[n]);
                        for m in 0..neq {
                            if state.elements[m].is_none() {
                                continue;
                            }
                            if dg_blocks[m][n] {
                                pre_add_all(matrix, &lists[m], &neighbor_list);
                            }
                            if dg_blocks[n][m] {
                                pre_add_all(matrix, &neighbor_list, &lists[m]);
                            }
                        }
                    }
                }
            }
        }

        matrix.alloc()?;
        debug!(
            "built sparse structure of size {} from {} traversal states",
            ndof, num_states
        );
        Ok(())
    }
}
