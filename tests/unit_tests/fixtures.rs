//! Meshes, forms and helpers shared by the unit tests.

use hpfem::assembly::{AssemblyOptions, DiscreteProblem};
use hpfem::function::integrals::{int_grad_u_grad_v, int_u_dvdx, int_u_v, int_v};
use hpfem::function::{DiscontinuousFunc, FormScalar, Func};
use hpfem::mesh::procedural::{create_rectangular_mesh_description, create_unit_square_mesh_description};
use hpfem::mesh::{ElementId, Mesh};
use hpfem::quadrature::ReferenceShape;
use hpfem::space::{AsmList, Space};
use hpfem::weakform::{DgFormContext, DgMatrixKernel, DgVectorKernel, FormContext, GenericMatrixIntegrand, GenericVectorIntegrand};
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

pub fn unit_square(cells_per_dim: usize, shape: ReferenceShape) -> Mesh {
    Mesh::from_description(&create_unit_square_mesh_description(cells_per_dim, shape)).unwrap()
}

pub fn rectangle(max: [f64; 2], cells: [usize; 2], shape: ReferenceShape) -> Mesh {
    Mesh::from_description(&create_rectangular_mesh_description([0.0, 0.0], max, cells, shape)).unwrap()
}

pub fn single_thread() -> AssemblyOptions {
    AssemblyOptions::default().with_num_threads(1)
}

/// Dofs of the shape functions of an element, in assembly list order.
pub fn element_dofs(space: &dyn Space, element: ElementId) -> Vec<usize> {
    let mut list = AsmList::new();
    space.element_assembly_list(element, &mut list, 0);
    list.dofs().collect()
}

pub fn assemble_dense(dp: &mut DiscreteProblem) -> (DMatrix<f64>, DVector<f64>) {
    let mut matrix = DMatrix::<f64>::zeros(0, 0);
    let mut rhs = DVector::<f64>::zeros(0);
    dp.assemble_matrix_and_rhs(&mut matrix, &mut rhs).unwrap();
    (matrix, rhs)
}

/// Coefficient vector representing the constant one in an H1 space without essential
/// conditions: vertex dofs come first and all other functions vanish at the vertices.
pub fn h1_constant_one(num_vertex_dofs: usize, ndof: usize) -> DVector<f64> {
    DVector::from_fn(ndof, |i, _| if i < num_vertex_dofs { 1.0 } else { 0.0 })
}

#[derive(Debug, Clone, Copy)]
pub struct Mass;

impl GenericMatrixIntegrand for Mass {
    fn integrate<T: FormScalar>(&self, u: &Func<T>, v: &Func<T>, ctx: &FormContext<T>) -> eyre::Result<T> {
        Ok(int_u_v(ctx.wt, u, v))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Laplace;

impl GenericMatrixIntegrand for Laplace {
    fn integrate<T: FormScalar>(&self, u: &Func<T>, v: &Func<T>, ctx: &FormContext<T>) -> eyre::Result<T> {
        Ok(int_grad_u_grad_v(ctx.wt, u, v))
    }
}

/// `∫ u dv/dx`, which is not symmetric in `u` and `v`.
#[derive(Debug, Clone, Copy)]
pub struct Advection;

impl GenericMatrixIntegrand for Advection {
    fn integrate<T: FormScalar>(&self, u: &Func<T>, v: &Func<T>, ctx: &FormContext<T>) -> eyre::Result<T> {
        Ok(int_u_dvdx(ctx.wt, u, v))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Source(pub f64);

impl GenericVectorIntegrand for Source {
    fn integrate<T: FormScalar>(&self, v: &Func<T>, ctx: &FormContext<T>) -> eyre::Result<T> {
        Ok(T::from_f64(self.0) * int_v(ctx.wt, v))
    }
}

/// `∫ [u][v]` over interior edges.
#[derive(Debug, Clone, Copy)]
pub struct JumpPenalty;

impl DgMatrixKernel for JumpPenalty {
    fn value(
        &self,
        u: &DiscontinuousFunc<f64>,
        v: &DiscontinuousFunc<f64>,
        ctx: &DgFormContext<f64>,
    ) -> eyre::Result<f64> {
        Ok(ctx
            .wt
            .iter()
            .enumerate()
            .map(|(k, w)| w * u.jump(k) * v.jump(k))
            .sum())
    }
}

/// `∫ v` over interior edges, from the side of `v`.
#[derive(Debug, Clone, Copy)]
pub struct EdgeLength;

impl DgVectorKernel for EdgeLength {
    fn value(&self, v: &DiscontinuousFunc<f64>, ctx: &DgFormContext<f64>) -> eyre::Result<f64> {
        Ok(ctx
            .wt
            .iter()
            .enumerate()
            .map(|(k, w)| w * v.val_central(k))
            .sum())
    }
}

pub fn shared(mesh: Mesh) -> Arc<Mesh> {
    Arc::new(mesh)
}

/// `∫ {u}{v}` over interior edges, which does not vanish for continuous functions.
#[derive(Debug, Clone, Copy)]
pub struct AverageProduct;

impl DgMatrixKernel for AverageProduct {
    fn value(
        &self,
        u: &DiscontinuousFunc<f64>,
        v: &DiscontinuousFunc<f64>,
        ctx: &DgFormContext<f64>,
    ) -> eyre::Result<f64> {
        Ok(ctx
            .wt
            .iter()
            .enumerate()
            .map(|(k, w)| w * u.average(k) * v.average(k))
            .sum())
    }
}

/// Symmetric interior penalty terms of the Laplacian,
/// `∫ -{∂u/∂n}[v] - {∂v/∂n}[u] + σ[u][v]`.
#[derive(Debug, Clone, Copy)]
pub struct InteriorPenalty {
    pub sigma: f64,
}

impl DgMatrixKernel for InteriorPenalty {
    fn value(
        &self,
        u: &DiscontinuousFunc<f64>,
        v: &DiscontinuousFunc<f64>,
        ctx: &DgFormContext<f64>,
    ) -> eyre::Result<f64> {
        let geom = ctx.geom;
        Ok(ctx
            .wt
            .iter()
            .enumerate()
            .map(|(k, w)| {
                let du_dn = u.dx_average(k) * geom.nx[k] + u.dy_average(k) * geom.ny[k];
                let dv_dn = v.dx_average(k) * geom.nx[k] + v.dy_average(k) * geom.ny[k];
                w * (-du_dn * v.jump(k) - dv_dn * u.jump(k) + self.sigma * u.jump(k) * v.jump(k))
            })
            .sum())
    }
}

/// `∫ σ[g]v` for the first external function `g`.
#[derive(Debug, Clone, Copy)]
pub struct PenalizedJump {
    pub sigma: f64,
}

impl DgVectorKernel for PenalizedJump {
    fn value(&self, v: &DiscontinuousFunc<f64>, ctx: &DgFormContext<f64>) -> eyre::Result<f64> {
        let g = &ctx.ext[0];
        Ok(ctx
            .wt
            .iter()
            .enumerate()
            .map(|(k, w)| w * self.sigma * g.jump(k) * v.val_central(k))
            .sum())
    }
}
