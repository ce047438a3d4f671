//! Assembly of discrete problems for 2D hp-FEM.
//!
//! Given a [`weakform::WeakForm`] and one [`space::Space`] per solution component, a
//! [`assembly::DiscreteProblem`] traverses all involved meshes in sync, builds the sparsity
//! structure of the global system and assembles the matrix and right-hand side in parallel.
//! Interface terms of discontinuous Galerkin forms are evaluated across non-conforming
//! element boundaries with the help of [`neighbor::NeighborSearch`].

pub mod assembly;
pub mod error;
pub mod function;
pub mod mesh;
pub mod neighbor;
pub mod refmap;
pub mod shapeset;
pub mod space;
pub mod traverse;
pub mod weakform;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub extern crate nalgebra;
pub use hpfem_quadrature as quadrature;
pub use hpfem_sparse as sparse;
