use crate::SparseMatrix;
use eyre::eyre;
use log::debug;
use nalgebra::{DMatrix, DMatrixView};
use nalgebra_sparse::pattern::SparsityPattern;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A square CSR matrix whose sparsity pattern is built by pre-registration.
///
/// The frozen pattern is shared through an [`Arc`], so it can be handed to solvers (see
/// [`CsrMatrix::to_nalgebra`]) without copying, and reuse of the structure between assembly
/// passes can be observed with [`Arc::ptr_eq`].
#[derive(Debug, Clone, Default)]
pub struct CsrMatrix {
    size: usize,
    // Provisional entries registered since the last call to `prealloc`
    registered: BTreeSet<(usize, usize)>,
    pattern: Option<Arc<SparsityPattern>>,
    values: Vec<f64>,
}

impl CsrMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// The frozen sparsity pattern, if [`SparseMatrix::alloc`] has been called.
    pub fn pattern(&self) -> Option<&Arc<SparsityPattern>> {
        self.pattern.as_ref()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Returns the stored value at `(row, col)`, or `None` if the entry is not in the pattern.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        let pattern = self.pattern.as_ref()?;
        if row >= pattern.major_dim() {
            return None;
        }
        let begin = pattern.major_offsets()[row];
        pattern
            .lane(row)
            .binary_search(&col)
            .ok()
            .map(|local_idx| self.values[begin + local_idx])
    }

    fn value_index(&self, row: usize, col: usize) -> eyre::Result<usize> {
        let pattern = self
            .pattern
            .as_ref()
            .ok_or_else(|| eyre!("matrix structure has not been allocated"))?;
        if row >= pattern.major_dim() {
            return Err(eyre!("row {} out of bounds for matrix of size {}", row, self.size));
        }
        let begin = pattern.major_offsets()[row];
        pattern
            .lane(row)
            .binary_search(&col)
            .map(|local_idx| begin + local_idx)
            .map_err(|_| eyre!("entry ({}, {}) is not part of the sparsity pattern", row, col))
    }

    /// Converts to a `nalgebra_sparse` CSR matrix, e.g. for handing to a solver.
    pub fn to_nalgebra(&self) -> eyre::Result<nalgebra_sparse::CsrMatrix<f64>> {
        let pattern = self
            .pattern
            .as_ref()
            .ok_or_else(|| eyre!("matrix structure has not been allocated"))?;
        nalgebra_sparse::CsrMatrix::try_from_pattern_and_values(pattern.as_ref().clone(), self.values.clone())
            .map_err(|err| eyre!("invalid CSR data: {}", err))
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.size, self.size);
        if let Some(pattern) = &self.pattern {
            for row in 0..pattern.major_dim() {
                let begin = pattern.major_offsets()[row];
                for (local_idx, &col) in pattern.lane(row).iter().enumerate() {
                    dense[(row, col)] = self.values[begin + local_idx];
                }
            }
        }
        dense
    }
}

impl SparseMatrix for CsrMatrix {
    fn size(&self) -> usize {
        self.size
    }

    fn prealloc(&mut self, n: usize) {
        self.free();
        self.size = n;
    }

    fn pre_add_ij(&mut self, row: usize, col: usize) {
        assert!(
            row < self.size && col < self.size,
            "entry ({}, {}) out of bounds for matrix of size {}",
            row,
            col,
            self.size
        );
        self.registered.insert((row, col));
    }

    fn alloc(&mut self) -> eyre::Result<()> {
        let num_rows = self.size;
        let entries = std::mem::take(&mut self.registered);
        let mut offsets = Vec::with_capacity(num_rows + 1);
        let mut column_indices = Vec::with_capacity(entries.len());

        offsets.push(0);
        for (i, j) in entries {
            // Loop to correctly handle consecutive empty rows
            while i + 1 > offsets.len() {
                offsets.push(column_indices.len());
            }
            column_indices.push(j);
        }
        while offsets.len() < num_rows + 1 {
            offsets.push(column_indices.len());
        }

        let nnz = column_indices.len();
        let pattern = SparsityPattern::try_from_offsets_and_indices(num_rows, num_rows, offsets, column_indices)
            .map_err(|err| eyre!("registered entries do not form a valid CSR pattern: {}", err))?;
        debug!("Allocated CSR structure of size {} with {} nonzeros", num_rows, nnz);
        self.pattern = Some(Arc::new(pattern));
        self.values = vec![0.0; nnz];
        Ok(())
    }

    fn free(&mut self) {
        self.registered.clear();
        self.pattern = None;
        self.values.clear();
        self.size = 0;
    }

    fn zero(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
    }

    fn add_block(&mut self, rows: &[usize], cols: &[usize], local: DMatrixView<f64>) -> eyre::Result<()> {
        if local.nrows() != rows.len() || local.ncols() != cols.len() {
            return Err(eyre!(
                "local block is {}x{} but {} rows and {} columns were given",
                local.nrows(),
                local.ncols(),
                rows.len(),
                cols.len()
            ));
        }
        for (a, &row) in rows.iter().enumerate() {
            for (b, &col) in cols.iter().enumerate() {
                let idx = self.value_index(row, col)?;
                self.values[idx] += local[(a, b)];
            }
        }
        Ok(())
    }

    fn add(&mut self, row: usize, col: usize, value: f64) -> eyre::Result<()> {
        let idx = self.value_index(row, col)?;
        self.values[idx] += value;
        Ok(())
    }
}
