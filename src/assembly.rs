//! Assembly of the discrete problem: the global matrix and right-hand side of a weak form
//! discretized on a set of spaces.
//!
//! A [`DiscreteProblem`] first makes sure the sparse structure of the matrix is current (see
//! [`DiscreteProblem::is_up_to_date`]), then runs one multi-mesh traversal over the meshes of
//! all spaces and external functions. Worker threads pull states from the shared traversal
//! and evaluate volumetric, boundary and DG interface forms on them, with one set of scratch
//! buffers per thread. Insertions into the matrix and the right-hand side are serialized by
//! one lock each.

use crate::error::configuration_error;
use crate::function::Solution;
use crate::mesh::Mesh;
use crate::space::Space;
use crate::traverse::{State, Traverse};
use crate::weakform::WeakForm;
use buffers::AssemblyBuffers;
use eyre::eyre;
use hpfem_sparse::{SparseMatrix, Vector};
use log::debug;
use nalgebra::DMatrix;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::sync::Arc;
use structure::Checkpoint;
use thread_local::ThreadLocal;

mod buffers;
mod dg;
mod local;
mod order;
mod structure;

/// Quadrature order of DG interface integrals unless configured otherwise.
pub const DEFAULT_DG_ORDER: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyOptions {
    /// Number of worker threads. Zero uses as many threads as the global rayon pool.
    pub num_threads: usize,
    /// Quadrature order of DG interface integrals.
    pub dg_order: u32,
    /// Finite-volume mode: every integral uses the order of the inverse reference map.
    pub fvm: bool,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            num_threads: 0,
            dg_order: DEFAULT_DG_ORDER,
            fvm: false,
        }
    }
}

impl AssemblyOptions {
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_dg_order(mut self, dg_order: u32) -> Self {
        self.dg_order = dg_order;
        self
    }

    pub fn with_fvm(mut self, fvm: bool) -> Self {
        self.fvm = fvm;
        self
    }
}

/// A weak form together with the spaces it is discretized on.
#[derive(Debug)]
pub struct DiscreteProblem {
    wf: WeakForm,
    spaces: Vec<Box<dyn Space>>,
    options: AssemblyOptions,
    checkpoint: Option<Checkpoint>,
    buffers: ThreadLocal<RefCell<AssemblyBuffers>>,
}

/// Read-only data of one assembly pass, shared by all workers.
pub(crate) struct Pass<'a> {
    pub wf: &'a WeakForm,
    pub spaces: &'a [Box<dyn Space>],
    pub first_dofs: &'a [usize],
    /// Space meshes followed by the meshes of external functions.
    pub meshes: &'a [Arc<Mesh>],
    /// Previous iterate, one solution per space.
    pub u_ext: Option<&'a [Solution]>,
    pub block_weights: Option<&'a DMatrix<f64>>,
    pub options: &'a AssemblyOptions,
    pub matrix: Option<Mutex<&'a mut dyn SparseMatrix>>,
    pub rhs: Option<Mutex<&'a mut dyn Vector>>,
}

impl<'a> Pass<'a> {
    fn assemble_state(&self, state: &State, buffers: &mut AssemblyBuffers) -> eyre::Result<()> {
        buffers.begin_state(self.spaces.len(), self.meshes.len());
        for (s, space) in self.spaces.iter().enumerate() {
            match state.elements[s] {
                Some(element) => space.element_assembly_list(element, &mut buffers.lists[s], self.first_dofs[s]),
                None => buffers.lists[s].clear(),
            }
        }
        self.assemble_volume_and_surface(state, buffers)?;
        if self.wf.has_dg_forms() {
            self.assemble_dg_edges(state, buffers)?;
        }
        Ok(())
    }

    /// Pulls states until the traversal is exhausted.
    ///
    /// After its first error, a worker keeps draining the traversal without doing any work,
    /// so that the other workers finish their states.
    fn work(
        &self,
        traverse: &Mutex<Traverse>,
        buffers: &ThreadLocal<RefCell<AssemblyBuffers>>,
        first_error: &Mutex<Option<eyre::Report>>,
    ) {
        let mut buffers = buffers.get_or_default().borrow_mut();
        let mut failed = false;
        loop {
            let state = traverse.lock().next();
            let state = match state {
                Some(state) => state,
                None => break,
            };
            if failed {
                continue;
            }
            if let Err(err) = self.assemble_state(&state, &mut buffers) {
                failed = true;
                let mut first_error = first_error.lock();
                if first_error.is_none() {
                    *first_error = Some(err);
                }
            }
        }
    }
}

impl DiscreteProblem {
    pub fn new(wf: WeakForm, spaces: Vec<Box<dyn Space>>) -> eyre::Result<Self> {
        Self::with_options(wf, spaces, AssemblyOptions::default())
    }

    pub fn with_options(wf: WeakForm, spaces: Vec<Box<dyn Space>>, options: AssemblyOptions) -> eyre::Result<Self> {
        if spaces.is_empty() {
            return Err(configuration_error("a discrete problem needs at least one space"));
        }
        if spaces.len() != wf.neq() {
            return Err(configuration_error(format!(
                "weak form has {} equations but {} spaces were given",
                wf.neq(),
                spaces.len()
            )));
        }
        Ok(Self {
            wf,
            spaces,
            options,
            checkpoint: None,
            buffers: ThreadLocal::new(),
        })
    }

    pub fn options(&self) -> &AssemblyOptions {
        &self.options
    }

    /// Switches to finite-volume mode.
    pub fn set_fvm(&mut self) {
        self.options.fvm = true;
    }

    pub fn weak_form(&self) -> &WeakForm {
        &self.wf
    }

    pub fn weak_form_mut(&mut self) -> &mut WeakForm {
        &mut self.wf
    }

    pub fn num_spaces(&self) -> usize {
        self.spaces.len()
    }

    pub fn space(&self, i: usize) -> &dyn Space {
        self.spaces[i].as_ref()
    }

    pub fn space_mut(&mut self, i: usize) -> &mut dyn Space {
        self.spaces[i].as_mut()
    }

    pub fn num_dofs(&self) -> usize {
        self.spaces.iter().map(|space| space.num_dofs()).sum()
    }

    /// Offset of the first global DOF of every space.
    pub fn first_dofs(&self) -> Vec<usize> {
        self.spaces
            .iter()
            .scan(0, |offset, space| {
                let first = *offset;
                *offset += space.num_dofs();
                Some(first)
            })
            .collect()
    }

    /// Whether the sparse structure built by the last assembly is still valid for the
    /// current spaces and weak form.
    pub fn is_up_to_date(&self) -> bool {
        match &self.checkpoint {
            Some(checkpoint) => {
                checkpoint.wf_seq == self.wf.seq()
                    && checkpoint.space_seqs.len() == self.spaces.len()
                    && checkpoint
                        .space_seqs
                        .iter()
                        .zip(&self.spaces)
                        .all(|(&seq, space)| seq == space.seq())
            }
            None => false,
        }
    }

    /// Forces the next assembly to rebuild the sparse structure.
    pub fn invalidate_matrix(&mut self) {
        self.checkpoint = None;
    }

    /// Space meshes followed by the distinct meshes of external functions.
    fn traversal_meshes(&self) -> Vec<Arc<Mesh>> {
        let mut meshes: Vec<Arc<Mesh>> = self.spaces.iter().map(|space| Arc::clone(space.mesh())).collect();
        for function in self.wf.ext_functions() {
            if !meshes.iter().any(|mesh| Arc::ptr_eq(mesh, function.mesh())) {
                meshes.push(Arc::clone(function.mesh()));
            }
        }
        meshes
    }

    fn num_threads(&self) -> usize {
        match self.options.num_threads {
            0 => rayon::current_num_threads(),
            n => n,
        }
    }

    /// Assembles the matrix and/or the right-hand side.
    ///
    /// With a coefficient vector, forms see the corresponding solution as the previous
    /// iterate. `block_weights`, if given, must be `neq x neq` and scales every block of the
    /// matrix; blocks with a negligible weight are skipped. With `force_diagonal_blocks`, the
    /// structure contains the diagonal blocks even where no form contributes.
    ///
    /// After a failed assembly, the contents of `matrix` and `rhs` are unspecified.
    pub fn assemble(
        &mut self,
        coeff_vec: Option<&[f64]>,
        mut matrix: Option<&mut dyn SparseMatrix>,
        mut rhs: Option<&mut dyn Vector>,
        force_diagonal_blocks: bool,
        block_weights: Option<&DMatrix<f64>>,
    ) -> eyre::Result<()> {
        let neq = self.wf.neq();
        if let Some(weights) = block_weights {
            if weights.nrows() != neq || weights.ncols() != neq {
                return Err(configuration_error(format!(
                    "block weights are {}x{} but the weak form has {} equations",
                    weights.nrows(),
                    weights.ncols(),
                    neq
                )));
            }
        }
        let ndof = self.num_dofs();
        if let Some(coeff_vec) = coeff_vec {
            if coeff_vec.len() != ndof {
                return Err(configuration_error(format!(
                    "coefficient vector has length {} but the problem has {} DOFs",
                    coeff_vec.len(),
                    ndof
                )));
            }
        }

        self.create_sparse_structure(matrix.as_deref_mut(), rhs.as_deref_mut(), force_diagonal_blocks)?;
        if matrix.is_none() && rhs.is_none() {
            return Ok(());
        }

        let first_dofs = self.first_dofs();
        let u_ext = match coeff_vec {
            Some(coeff_vec) => Some(
                self.spaces
                    .iter()
                    .zip(&first_dofs)
                    .map(|(space, &first_dof)| Solution::new(space.as_ref(), coeff_vec, first_dof))
                    .collect::<eyre::Result<Vec<_>>>()?,
            ),
            None => None,
        };
        let meshes = self.traversal_meshes();
        let traverse = Mutex::new(Traverse::begin(meshes.clone())?);
        let num_threads = self.num_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|err| eyre!("failed to start assembly threads: {}", err))?;
        debug!(
            "assembling {} DOFs on {} mesh(es) with {} thread(s)",
            ndof,
            meshes.len(),
            num_threads
        );

        let matrix = matrix.map(|matrix| {
            let matrix: &mut dyn SparseMatrix = matrix;
            Mutex::new(matrix)
        });
        let rhs = rhs.map(|rhs| {
            let rhs: &mut dyn Vector = rhs;
            Mutex::new(rhs)
        });
        let pass = Pass {
            wf: &self.wf,
            spaces: &self.spaces,
            first_dofs: &first_dofs,
            meshes: &meshes,
            u_ext: u_ext.as_deref(),
            block_weights,
            options: &self.options,
            matrix,
            rhs,
        };
        let first_error = Mutex::new(None);
        let buffers = &self.buffers;
        pool.scope(|scope| {
            for _ in 0..num_threads {
                scope.spawn(|_| pass.work(&traverse, buffers, &first_error));
            }
        });

        if let Some(matrix) = pass.matrix {
            matrix.into_inner().finish();
        }
        if let Some(rhs) = pass.rhs {
            rhs.into_inner().finish();
        }
        self.buffers.clear();

        match first_error.into_inner() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Assembles a linear problem.
    pub fn assemble_matrix_and_rhs(&mut self, matrix: &mut dyn SparseMatrix, rhs: &mut dyn Vector) -> eyre::Result<()> {
        self.assemble(None, Some(matrix), Some(rhs), false, None)
    }

    /// Assembles the Jacobian and the residual at the given coefficient vector.
    pub fn assemble_with_coefficients(
        &mut self,
        coeff_vec: &[f64],
        matrix: &mut dyn SparseMatrix,
        rhs: &mut dyn Vector,
    ) -> eyre::Result<()> {
        self.assemble(Some(coeff_vec), Some(matrix), Some(rhs), false, None)
    }

    /// Assembles only the right-hand side, e.g. a residual.
    pub fn assemble_rhs_only(&mut self, coeff_vec: Option<&[f64]>, rhs: &mut dyn Vector) -> eyre::Result<()> {
        self.assemble(coeff_vec, None, Some(rhs), false, None)
    }
}
