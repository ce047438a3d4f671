use crate::{SparseMatrix, Vector};
use eyre::eyre;
use nalgebra::{DMatrix, DMatrixView, DVector};

impl Vector for DVector<f64> {
    fn len(&self) -> usize {
        self.nrows()
    }

    fn alloc(&mut self, n: usize) {
        *self = DVector::zeros(n);
    }

    fn zero(&mut self) {
        self.fill(0.0);
    }

    fn add(&mut self, idx: usize, value: f64) {
        self[idx] += value;
    }
}

/// Dense matrices accept every entry, so the structure pass only fixes the size.
impl SparseMatrix for DMatrix<f64> {
    fn size(&self) -> usize {
        self.nrows()
    }

    fn prealloc(&mut self, n: usize) {
        *self = DMatrix::zeros(n, n);
    }

    fn pre_add_ij(&mut self, _row: usize, _col: usize) {}

    fn alloc(&mut self) -> eyre::Result<()> {
        self.fill(0.0);
        Ok(())
    }

    fn free(&mut self) {
        *self = DMatrix::zeros(0, 0);
    }

    fn zero(&mut self) {
        self.fill(0.0);
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
                self[(row, col)] += local[(a, b)];
            }
        }
        Ok(())
    }

    fn add(&mut self, row: usize, col: usize, value: f64) -> eyre::Result<()> {
        self[(row, col)] += value;
        Ok(())
    }
}
