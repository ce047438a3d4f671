//! Global linear-algebra targets for finite element assembly.
//!
//! Assembly happens in two passes. The structure pass pre-registers every `(row, col)` pair
//! that may become nonzero and then calls [`SparseMatrix::alloc`], which freezes the
//! registered pairs into a fixed layout. The numeric pass zeroes the entries and adds dense
//! local blocks into the frozen layout.

mod csr;
mod dense;

pub use csr::CsrMatrix;

use nalgebra::DMatrixView;

/// A matrix that can be the target of global assembly.
pub trait SparseMatrix: Send {
    /// Number of rows (and columns) of the matrix.
    fn size(&self) -> usize;

    /// Discards any previous structure and resizes the matrix to `n x n`.
    fn prealloc(&mut self, n: usize);

    /// Registers `(row, col)` as a potential nonzero entry.
    fn pre_add_ij(&mut self, row: usize, col: usize);

    /// Freezes the registered entries into a fixed layout with all values zero.
    fn alloc(&mut self) -> eyre::Result<()>;

    /// Releases the structure and the values.
    fn free(&mut self);

    /// Sets all stored values to zero, keeping the structure.
    fn zero(&mut self);

    /// Adds the dense block `local` at the given global rows and columns.
    fn add_block(&mut self, rows: &[usize], cols: &[usize], local: DMatrixView<f64>) -> eyre::Result<()>;

    /// Adds a single value.
    fn add(&mut self, row: usize, col: usize, value: f64) -> eyre::Result<()>;

    /// Flushes buffered insertions, if any.
    fn finish(&mut self) {}
}

/// A vector that can be the target of global assembly.
pub trait Vector: Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resizes the vector to `n` entries, all zero.
    fn alloc(&mut self, n: usize);

    fn zero(&mut self);

    fn add(&mut self, idx: usize, value: f64);

    fn finish(&mut self) {}
}
