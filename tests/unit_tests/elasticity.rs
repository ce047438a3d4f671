//! Plane-strain linear elasticity as a two-field system.

use crate::unit_tests::fixtures::{h1_constant_one, shared, single_thread, unit_square, Source};
use hpfem::assembly::DiscreteProblem;
use hpfem::function::integrals::{int_dudx_dvdx, int_dudx_dvdy, int_dudy_dvdx, int_dudy_dvdy};
use hpfem::function::{FormScalar, Func};
use hpfem::mesh::Mesh;
use hpfem::quadrature::ReferenceShape;
use hpfem::shapeset::ShapeFunction;
use hpfem::space::{AsmList, EssentialBc, H1Space, Space};
use hpfem::weakform::{Area, FormContext, GenericMatrixIntegrand, MatrixForm, Symmetry, VectorForm, WeakForm};
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

const YOUNG: f64 = 200e9;
const POISSON: f64 = 0.3;
const DENSITY: f64 = 8000.0;
const GRAVITY: f64 = 9.81;
const TRACTION: f64 = 1e4;

fn lame() -> (f64, f64) {
    let lambda = YOUNG * POISSON / ((1.0 + POISSON) * (1.0 - 2.0 * POISSON));
    let mu = YOUNG / (2.0 * (1.0 + POISSON));
    (lambda, mu)
}

/// `a ∂u/∂x ∂v/∂x + b ∂u/∂y ∂v/∂y`.
#[derive(Debug, Clone, Copy)]
struct Diagonal {
    a: f64,
    b: f64,
}

impl GenericMatrixIntegrand for Diagonal {
    fn integrate<T: FormScalar>(&self, u: &Func<T>, v: &Func<T>, ctx: &FormContext<T>) -> eyre::Result<T> {
        Ok(T::from_f64(self.a) * int_dudx_dvdx(ctx.wt, u, v) + T::from_f64(self.b) * int_dudy_dvdy(ctx.wt, u, v))
    }
}

/// `λ ∂u/∂y ∂v/∂x + μ ∂u/∂x ∂v/∂y`, coupling the second displacement into the first equation.
#[derive(Debug, Clone, Copy)]
struct Coupling {
    lambda: f64,
    mu: f64,
}

impl GenericMatrixIntegrand for Coupling {
    fn integrate<T: FormScalar>(&self, u: &Func<T>, v: &Func<T>, ctx: &FormContext<T>) -> eyre::Result<T> {
        Ok(T::from_f64(self.lambda) * int_dudy_dvdx(ctx.wt, u, v) + T::from_f64(self.mu) * int_dudx_dvdy(ctx.wt, u, v))
    }
}

fn elasticity_form() -> WeakForm {
    let (lambda, mu) = lame();
    let mut wf = WeakForm::new(2);
    wf.add_matrix_form(
        MatrixForm::volumetric(0, 0, Diagonal { a: lambda + 2.0 * mu, b: mu }).with_symmetry(Symmetry::Sym),
    )
    .unwrap();
    wf.add_matrix_form(MatrixForm::volumetric(0, 1, Coupling { lambda, mu }).with_symmetry(Symmetry::Sym))
        .unwrap();
    wf.add_matrix_form(
        MatrixForm::volumetric(1, 1, Diagonal { a: mu, b: lambda + 2.0 * mu }).with_symmetry(Symmetry::Sym),
    )
    .unwrap();
    wf.add_vector_form(VectorForm::volumetric(1, Source(-DENSITY * GRAVITY))).unwrap();
    // Vertical load on the top edge
    wf.add_vector_form(
        VectorForm::surface(1, Source(TRACTION)).with_areas(vec![Area::Marker("top".to_string())]),
    )
    .unwrap();
    wf
}

fn problem(mesh: &Arc<Mesh>, order: u32, essential: impl Fn() -> Vec<EssentialBc>) -> DiscreteProblem {
    let spaces: Vec<Box<dyn Space>> = vec![
        Box::new(H1Space::new(mesh.clone(), order, essential()).unwrap()),
        Box::new(H1Space::new(mesh.clone(), order, essential()).unwrap()),
    ];
    DiscreteProblem::with_options(elasticity_form(), spaces, single_thread()).unwrap()
}

/// Coefficients of a linear function in an unconstrained H1 space.
fn interpolate_linear(space: &dyn Space, f: impl Fn(f64, f64) -> f64) -> DVector<f64> {
    let mesh = space.mesh();
    let mut coefficients = DVector::zeros(space.num_dofs());
    let mut list = AsmList::new();
    for element in mesh.active_elements() {
        space.element_assembly_list(element.id(), &mut list, 0);
        for entry in list.entries() {
            if let (ShapeFunction::Vertex(local), Some(dof)) = (entry.shape, entry.dof) {
                let p = mesh.vertex(element.vertices()[local as usize]);
                coefficients[dof] = f(p.x, p.y);
            }
        }
    }
    coefficients
}

fn stack(first: &DVector<f64>, second: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(first.len() + second.len(), first.iter().chain(second.iter()).copied())
}

#[test]
fn rigid_motions_are_in_the_kernel_up_to_order_ten() {
    for shape in [ReferenceShape::Triangle, ReferenceShape::Quadrilateral] {
        let mesh = shared(unit_square(2, shape));
        for p in 1..=10 {
            let mut dp = problem(&mesh, p, Vec::new);
            let mut matrix = DMatrix::<f64>::zeros(0, 0);
            let mut rhs = DVector::<f64>::zeros(0);
            dp.assemble_matrix_and_rhs(&mut matrix, &mut rhs).unwrap();
            assert!(util::is_exactly_symmetric(&matrix));

            let n = dp.space(0).num_dofs();
            let zero = DVector::zeros(n);
            let one = h1_constant_one(mesh.vertices().len(), n);
            let rotation = stack(
                &interpolate_linear(dp.space(0), |_, y| -y),
                &interpolate_linear(dp.space(1), |x, _| x),
            );
            let scale = matrix.amax();
            for motion in [stack(&one, &zero), stack(&zero, &one), rotation] {
                assert!((&matrix * motion).amax() < 1e-10 * scale);
            }

            // Gravity over the unit area and the traction along the unit-length top edge both
            // act on the second field only
            assert!(stack(&one, &zero).dot(&rhs).abs() < 1e-9);
            assert!((stack(&zero, &one).dot(&rhs) - (TRACTION - DENSITY * GRAVITY)).abs() < 1e-6);
        }
    }
}

#[test]
fn clamped_body_is_positive_definite() {
    let mesh = shared(unit_square(3, ReferenceShape::Quadrilateral));
    let mut dp = problem(&mesh, 3, || vec![EssentialBc::zero("bottom")]);
    let mut matrix = DMatrix::<f64>::zeros(0, 0);
    let mut rhs = DVector::<f64>::zeros(0);
    dp.assemble_matrix_and_rhs(&mut matrix, &mut rhs).unwrap();

    assert_eq!(rhs.len(), matrix.nrows());
    let scaled = &matrix / matrix.amax();
    assert!(scaled.cholesky().is_some());
}
