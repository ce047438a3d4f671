use crate::unit_tests::fixtures::{
    assemble_dense, h1_constant_one, shared, single_thread, unit_square, Advection, JumpPenalty, Laplace, Mass,
    Source,
};
use hpfem::assembly::{AssemblyOptions, DiscreteProblem, DEFAULT_DG_ORDER};
use hpfem::error::{classify, AssemblyError};
use hpfem::function::integrals::int_u_v;
use hpfem::function::{ExactFunction, FormScalar, Func, Order};
use hpfem::mesh::{Mesh, Refinement};
use hpfem::proptest::refined_mesh_pair;
use hpfem::quadrature::ReferenceShape;
use hpfem::sparse::CsrMatrix;
use hpfem::space::{H1Space, L2Space, Space};
use hpfem::weakform::{
    Area, FormContext, GenericVectorIntegrand, MatrixForm, MatrixFormKernel, Symmetry, VectorForm, WeakForm,
};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use proptest::prelude::*;
use std::sync::Arc;

fn h1(mesh: &Arc<Mesh>, order: u32) -> Box<dyn Space> {
    Box::new(H1Space::new(mesh.clone(), order, vec![]).unwrap())
}

fn poisson(mesh: &Arc<Mesh>, order: u32, symmetry: Symmetry) -> DiscreteProblem {
    let mut wf = WeakForm::new(1);
    wf.add_matrix_form(MatrixForm::volumetric(0, 0, Laplace).with_symmetry(symmetry))
        .unwrap();
    wf.add_vector_form(VectorForm::volumetric(0, Source(2.0))).unwrap();
    DiscreteProblem::with_options(wf, vec![h1(mesh, order)], single_thread()).unwrap()
}

/// Block `(i, j)` of a matrix assembled from several spaces.
fn block(matrix: &DMatrix<f64>, dp: &DiscreteProblem, i: usize, j: usize) -> DMatrix<f64> {
    let first = dp.first_dofs();
    let (ni, nj) = (dp.space(i).num_dofs(), dp.space(j).num_dofs());
    matrix.view((first[i], first[j]), (ni, nj)).into_owned()
}

#[derive(Debug, Clone, Copy)]
struct PreviousIterate;

impl GenericVectorIntegrand for PreviousIterate {
    fn integrate<T: FormScalar>(&self, v: &Func<T>, ctx: &FormContext<T>) -> eyre::Result<T> {
        Ok(int_u_v(ctx.wt, &ctx.u_ext[0], v))
    }
}

#[derive(Debug, Clone, Copy)]
struct External;

impl GenericVectorIntegrand for External {
    fn integrate<T: FormScalar>(&self, v: &Func<T>, ctx: &FormContext<T>) -> eyre::Result<T> {
        Ok(int_u_v(ctx.wt, &ctx.ext[0], v))
    }
}

/// Mass form that fails on one element.
#[derive(Debug, Clone, Copy)]
struct FailsOn(usize);

impl MatrixFormKernel for FailsOn {
    fn value(&self, u: &Func<f64>, v: &Func<f64>, ctx: &FormContext<f64>) -> eyre::Result<f64> {
        if ctx.geom.id == self.0 {
            return Err(eyre::eyre!("material law undefined on element {}", self.0));
        }
        Ok(int_u_v(ctx.wt, u, v))
    }

    fn ord(&self, u: &Func<Order>, v: &Func<Order>, ctx: &FormContext<Order>) -> eyre::Result<Order> {
        Ok(int_u_v(ctx.wt, u, v))
    }
}

#[test]
fn constants_are_integrated_exactly() {
    for shape in [ReferenceShape::Triangle, ReferenceShape::Quadrilateral] {
        let mesh = shared(unit_square(2, shape));
        let mut wf = WeakForm::new(1);
        wf.add_matrix_form(MatrixForm::volumetric(0, 0, Mass).with_symmetry(Symmetry::Sym))
            .unwrap();
        wf.add_vector_form(VectorForm::volumetric(0, Source(3.0))).unwrap();
        let mut dp = DiscreteProblem::new(wf, vec![h1(&mesh, 3)]).unwrap();
        let (matrix, rhs) = assemble_dense(&mut dp);

        let one = h1_constant_one(mesh.vertices().len(), dp.num_dofs());
        assert!((one.dot(&(&matrix * &one)) - 1.0).abs() < 1e-13);
        assert!((one.dot(&rhs) - 3.0).abs() < 1e-13);

        let mut dp = poisson(&mesh, 3, Symmetry::Sym);
        let (stiffness, _) = assemble_dense(&mut dp);
        assert!((&stiffness * &one).amax() < 1e-12);
    }
}

#[test]
fn symmetric_forms_are_mirrored_exactly() {
    let mut mesh = unit_square(2, ReferenceShape::Quadrilateral);
    mesh.refine_all_elements(Refinement::Horizontal).unwrap();
    let mesh = shared(mesh);

    let (sym, sym_rhs) = assemble_dense(&mut poisson(&mesh, 4, Symmetry::Sym));
    let (nonsym, nonsym_rhs) = assemble_dense(&mut poisson(&mesh, 4, Symmetry::NonSym));
    assert!(util::is_exactly_symmetric(&sym));
    assert_matrix_eq!(sym, nonsym, comp = abs, tol = 1e-13);
    assert_eq!(sym_rhs, nonsym_rhs);
}

#[test]
fn off_diagonal_symmetry_inserts_the_transposed_block() {
    let mesh = shared(unit_square(2, ReferenceShape::Triangle));
    for symmetry in [Symmetry::Sym, Symmetry::AntiSym] {
        let mut wf = WeakForm::new(2);
        wf.add_matrix_form(MatrixForm::volumetric(0, 0, Mass)).unwrap();
        wf.add_matrix_form(MatrixForm::volumetric(1, 1, Mass)).unwrap();
        wf.add_matrix_form(MatrixForm::volumetric(0, 1, Advection).with_symmetry(symmetry))
            .unwrap();
        let mut dp = DiscreteProblem::with_options(wf, vec![h1(&mesh, 2), h1(&mesh, 3)], single_thread()).unwrap();
        let (matrix, _) = assemble_dense(&mut dp);

        let upper = block(&matrix, &dp, 0, 1);
        let lower = block(&matrix, &dp, 1, 0);
        assert!(upper.amax() > 1e-3);
        match symmetry {
            Symmetry::AntiSym => assert_eq!(lower, -upper.transpose()),
            _ => assert_eq!(lower, upper.transpose()),
        }
    }
}

#[test]
fn block_weights_scale_matrix_blocks_only() {
    let mesh = shared(unit_square(2, ReferenceShape::Quadrilateral));
    let problem = || {
        let mut wf = WeakForm::new(2);
        wf.add_matrix_form(MatrixForm::volumetric(0, 0, Laplace)).unwrap();
        wf.add_matrix_form(MatrixForm::volumetric(0, 1, Mass)).unwrap();
        wf.add_matrix_form(MatrixForm::volumetric(1, 1, Mass)).unwrap();
        wf.add_vector_form(VectorForm::volumetric(1, Source(1.0))).unwrap();
        DiscreteProblem::new(wf, vec![h1(&mesh, 2), h1(&mesh, 2)]).unwrap()
    };

    let mut dp = problem();
    let (reference, reference_rhs) = assemble_dense(&mut dp);

    let weights = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 5.0, 2.0]);
    let mut weighted_dp = problem();
    let mut matrix = DMatrix::<f64>::zeros(0, 0);
    let mut rhs = DVector::<f64>::zeros(0);
    weighted_dp
        .assemble(None, Some(&mut matrix), Some(&mut rhs), false, Some(&weights))
        .unwrap();

    assert_matrix_eq!(block(&matrix, &dp, 0, 0), block(&reference, &dp, 0, 0), comp = abs, tol = 1e-14);
    assert_eq!(block(&matrix, &dp, 0, 1).amax(), 0.0);
    assert_matrix_eq!(block(&matrix, &dp, 1, 1), block(&reference, &dp, 1, 1) * 2.0, comp = abs, tol = 1e-14);
    assert_eq!(block(&matrix, &dp, 1, 0).amax(), 0.0);
    assert_matrix_eq!(rhs, reference_rhs, comp = abs, tol = 1e-15);
}

#[test]
fn structure_is_reused_until_something_changes() {
    let mesh = shared(unit_square(2, ReferenceShape::Quadrilateral));
    let mut dp = poisson(&mesh, 2, Symmetry::Sym);
    assert!(!dp.is_up_to_date());

    let mut matrix = CsrMatrix::new();
    let mut rhs = DVector::<f64>::zeros(0);
    dp.assemble_matrix_and_rhs(&mut matrix, &mut rhs).unwrap();
    assert!(dp.is_up_to_date());
    let pattern = matrix.pattern().unwrap().clone();
    let first = matrix.to_dense();

    dp.assemble_matrix_and_rhs(&mut matrix, &mut rhs).unwrap();
    assert!(Arc::ptr_eq(&pattern, matrix.pattern().unwrap()));
    // Values are zeroed before the second pass
    assert_eq!(matrix.to_dense(), first);

    dp.space_mut(0).set_uniform_order(3).unwrap();
    assert!(!dp.is_up_to_date());
    dp.assemble_matrix_and_rhs(&mut matrix, &mut rhs).unwrap();
    assert!(!Arc::ptr_eq(&pattern, matrix.pattern().unwrap()));
    assert_eq!(matrix.to_dense().nrows(), dp.num_dofs());
    assert_eq!(rhs.len(), dp.num_dofs());

    let pattern = matrix.pattern().unwrap().clone();
    dp.invalidate_matrix();
    dp.assemble_matrix_and_rhs(&mut matrix, &mut rhs).unwrap();
    assert!(!Arc::ptr_eq(&pattern, matrix.pattern().unwrap()));
}

#[test]
fn forms_with_negligible_scaling_do_not_grow_the_structure() {
    let mesh = shared(unit_square(2, ReferenceShape::Quadrilateral));
    let spaces = || -> Vec<Box<dyn Space>> {
        vec![
            Box::new(L2Space::new(mesh.clone(), 1).unwrap()),
            Box::new(L2Space::new(mesh.clone(), 1).unwrap()),
        ]
    };
    let diagonal = || {
        let mut wf = WeakForm::new(2);
        wf.add_matrix_form(MatrixForm::volumetric(0, 0, Mass)).unwrap();
        wf.add_matrix_form(MatrixForm::volumetric(1, 1, Mass)).unwrap();
        wf
    };
    let assemble = |wf: WeakForm| {
        let mut dp = DiscreteProblem::with_options(wf, spaces(), single_thread()).unwrap();
        let mut matrix = CsrMatrix::new();
        dp.assemble(None, Some(&mut matrix), None, false, None).unwrap();
        matrix
    };

    let reference = assemble(diagonal());
    for scaling in [0.0, 1e-13, -1e-13] {
        let mut wf = diagonal();
        wf.add_matrix_form(MatrixForm::volumetric(0, 1, Mass).with_scaling(scaling))
            .unwrap();
        wf.add_matrix_form(MatrixForm::dg(0, 0, JumpPenalty).with_scaling(scaling))
            .unwrap();
        let matrix = assemble(wf);
        assert_eq!(matrix.nnz(), reference.nnz());
        assert_eq!(matrix.to_dense(), reference.to_dense());
    }

    let mut wf = diagonal();
    wf.add_matrix_form(MatrixForm::volumetric(0, 1, Mass)).unwrap();
    assert!(assemble(wf).nnz() > reference.nnz());
    let mut wf = diagonal();
    wf.add_matrix_form(MatrixForm::dg(0, 0, JumpPenalty)).unwrap();
    assert!(assemble(wf).nnz() > reference.nnz());
}

#[test]
fn sparse_and_dense_targets_agree() {
    let mut mesh = unit_square(3, ReferenceShape::Triangle);
    mesh.refine_element(4, Refinement::Isotropic).unwrap();
    let mesh = shared(mesh);
    let mut l2 = L2Space::new(mesh.clone(), 2).unwrap();
    l2.set_element_order(2, 0).unwrap();

    let mut wf = WeakForm::new(1);
    wf.add_matrix_form(MatrixForm::volumetric(0, 0, Laplace)).unwrap();
    wf.add_matrix_form(MatrixForm::volumetric(0, 0, Mass).with_scaling(0.5))
        .unwrap();
    let mut dp = DiscreteProblem::new(wf, vec![Box::new(l2)]).unwrap();

    let (dense, _) = assemble_dense(&mut dp);
    let mut sparse = CsrMatrix::new();
    let mut rhs = DVector::<f64>::zeros(0);
    dp.assemble_matrix_and_rhs(&mut sparse, &mut rhs).unwrap();
    assert_matrix_eq!(sparse.to_dense(), dense, comp = abs, tol = 1e-13);
    // Every element couples only with itself
    let per_element: usize = mesh
        .active_elements()
        .map(|e| dp.space(0).element_order(e.id()))
        .map(|p| ((p + 1) * (p + 2) / 2).pow(2) as usize)
        .sum();
    assert_eq!(sparse.nnz(), per_element);
}

#[test]
fn coarse_and_fine_spaces_couple_through_common_regions() {
    let coarse = shared(unit_square(1, ReferenceShape::Quadrilateral));
    let mut fine = unit_square(1, ReferenceShape::Quadrilateral);
    fine.refine_all_elements(Refinement::Isotropic).unwrap();
    fine.refine_all_elements(Refinement::Vertical).unwrap();
    let fine = shared(fine);

    let mut wf = WeakForm::new(2);
    wf.add_matrix_form(MatrixForm::volumetric(0, 1, Mass)).unwrap();
    let spaces: Vec<Box<dyn Space>> = vec![
        Box::new(L2Space::new(coarse, 0).unwrap()),
        Box::new(L2Space::new(fine.clone(), 0).unwrap()),
    ];
    let mut dp = DiscreteProblem::new(wf, spaces).unwrap();
    let (matrix, _) = assemble_dense(&mut dp);

    let coupling = block(&matrix, &dp, 0, 1);
    assert_eq!(coupling.shape(), (1, 8));
    for value in coupling.iter() {
        assert!((value - 0.125).abs() < 1e-14);
    }
}

#[test]
fn forms_see_previous_iterate_and_external_functions() {
    let mesh = shared(unit_square(2, ReferenceShape::Quadrilateral));
    let mut fine = unit_square(2, ReferenceShape::Quadrilateral);
    fine.refine_all_elements(Refinement::Isotropic).unwrap();
    let x = Arc::new(ExactFunction::new(shared(fine), 1, |x, _| (x, 1.0, 0.0)));

    let mut wf = WeakForm::new(1);
    wf.add_vector_form(VectorForm::volumetric(0, PreviousIterate)).unwrap();
    wf.add_vector_form(VectorForm::volumetric(0, External).with_ext(x).with_scaling(10.0))
        .unwrap();
    let mut dp = DiscreteProblem::new(wf, vec![h1(&mesh, 2)]).unwrap();

    let one = h1_constant_one(mesh.vertices().len(), dp.num_dofs());
    let mut rhs = DVector::<f64>::zeros(0);
    dp.assemble_rhs_only(Some(one.as_slice()), &mut rhs).unwrap();
    // ∫ 1 + 10 ∫ x
    assert!((one.dot(&rhs) - 6.0).abs() < 1e-13);

    let err = dp.assemble_rhs_only(Some(&[1.0, 2.0]), &mut rhs).unwrap_err();
    assert!(matches!(classify(&err), Some(AssemblyError::Configuration(_))));
}

#[test]
fn area_restrictions() {
    let mesh = shared(unit_square(2, ReferenceShape::Quadrilateral));
    let rhs_sum = |form: VectorForm| {
        let mut wf = WeakForm::new(1);
        wf.add_vector_form(form).unwrap();
        let mut dp = DiscreteProblem::new(wf, vec![h1(&mesh, 1)]).unwrap();
        let mut rhs = DVector::<f64>::zeros(0);
        dp.assemble_rhs_only(None, &mut rhs).unwrap();
        rhs.sum()
    };
    let marker = |name: &str| vec![Area::Marker(name.to_string())];

    assert!((rhs_sum(VectorForm::volumetric(0, Source(1.0))) - 1.0).abs() < 1e-14);
    assert!((rhs_sum(VectorForm::volumetric(0, Source(1.0)).with_areas(marker("domain"))) - 1.0).abs() < 1e-14);
    assert_eq!(rhs_sum(VectorForm::volumetric(0, Source(1.0)).with_areas(marker("elsewhere"))), 0.0);

    // Boundary forms never see interior edges
    assert!((rhs_sum(VectorForm::surface(0, Source(1.0))) - 4.0).abs() < 1e-14);
    assert!((rhs_sum(VectorForm::surface(0, Source(1.0)).with_areas(marker("bottom"))) - 1.0).abs() < 1e-14);
    let both = vec![Area::Marker("left".to_string()), Area::Marker("top".to_string())];
    assert!((rhs_sum(VectorForm::surface(0, Source(1.0)).with_areas(both)) - 2.0).abs() < 1e-14);
    assert!((rhs_sum(VectorForm::surface(0, Source(1.0)).with_areas(vec![Area::DgBoundaryEdge])) - 4.0).abs() < 1e-14);
    assert_eq!(rhs_sum(VectorForm::surface(0, Source(1.0)).with_areas(vec![Area::DgInnerEdge])), 0.0);
    assert_eq!(rhs_sum(VectorForm::volumetric(0, Source(1.0)).with_scaling(0.0)), 0.0);
}

#[test]
fn boundary_mass_measures_the_boundary() {
    let mesh = shared(unit_square(3, ReferenceShape::Triangle));
    let mut wf = WeakForm::new(1);
    wf.add_matrix_form(
        MatrixForm::surface(0, 0, Mass)
            .with_symmetry(Symmetry::Sym)
            .with_areas(vec![Area::Marker("left".to_string())]),
    )
    .unwrap();
    let mut dp = DiscreteProblem::new(wf, vec![h1(&mesh, 3)]).unwrap();
    let (matrix, _) = assemble_dense(&mut dp);
    let one = h1_constant_one(mesh.vertices().len(), dp.num_dofs());
    assert!((one.dot(&(&matrix * &one)) - 1.0).abs() < 1e-13);
}

#[test]
fn configuration_errors() {
    let mesh = shared(unit_square(1, ReferenceShape::Quadrilateral));
    let mut wf = WeakForm::new(2);
    wf.add_matrix_form(MatrixForm::volumetric(0, 0, Mass)).unwrap();
    assert!(wf.add_matrix_form(MatrixForm::volumetric(0, 2, Mass)).is_err());

    let err = DiscreteProblem::new(wf.clone(), vec![h1(&mesh, 1)]).unwrap_err();
    assert!(matches!(classify(&err), Some(AssemblyError::Configuration(_))));
    let err = DiscreteProblem::new(WeakForm::new(0), vec![]).unwrap_err();
    assert!(matches!(classify(&err), Some(AssemblyError::Configuration(_))));

    let mut dp = DiscreteProblem::new(wf, vec![h1(&mesh, 1), h1(&mesh, 1)]).unwrap();
    let weights = DMatrix::repeat(3, 3, 1.0);
    let mut matrix = DMatrix::<f64>::zeros(0, 0);
    let err = dp
        .assemble(None, Some(&mut matrix), None, false, Some(&weights))
        .unwrap_err();
    assert!(matches!(classify(&err), Some(AssemblyError::Configuration(_))));
}

#[test]
fn form_errors_are_reported_unchanged() {
    let mesh = shared(unit_square(3, ReferenceShape::Quadrilateral));
    let mut wf = WeakForm::new(1);
    wf.add_matrix_form(MatrixForm::volumetric(0, 0, FailsOn(4))).unwrap();
    let options = AssemblyOptions::default().with_num_threads(3);
    let mut dp = DiscreteProblem::with_options(wf, vec![h1(&mesh, 2)], options).unwrap();

    let mut matrix = DMatrix::<f64>::zeros(0, 0);
    let mut rhs = DVector::<f64>::zeros(0);
    let err = dp.assemble_matrix_and_rhs(&mut matrix, &mut rhs).unwrap_err();
    assert!(classify(&err).is_none());
    assert_eq!(err.to_string(), "material law undefined on element 4");
}

#[test]
fn diagonal_blocks_can_be_forced() {
    let mesh = shared(unit_square(2, ReferenceShape::Quadrilateral));
    let mut wf = WeakForm::new(2);
    wf.add_matrix_form(MatrixForm::volumetric(0, 0, Mass)).unwrap();
    let mut dp = DiscreteProblem::new(wf, vec![h1(&mesh, 1), h1(&mesh, 1)]).unwrap();

    let mut matrix = CsrMatrix::new();
    dp.assemble(None, Some(&mut matrix), None, false, None).unwrap();
    let unforced = matrix.nnz();
    assert_eq!(matrix.get(12, 12), None);

    dp.assemble(None, Some(&mut matrix), None, true, None).unwrap();
    assert_eq!(matrix.nnz(), 2 * unforced);
    assert_eq!(matrix.get(12, 12), Some(0.0));
}

#[test]
fn options_from_json() {
    let options: AssemblyOptions = serde_json::from_str(r#"{ "num_threads": 2 }"#).unwrap();
    assert_eq!(options.num_threads, 2);
    assert_eq!(options.dg_order, DEFAULT_DG_ORDER);
    assert!(!options.fvm);
}

#[test]
fn finite_volume_mode_integrates_constants() {
    let mut mesh = unit_square(2, ReferenceShape::Quadrilateral);
    mesh.refine_element(3, Refinement::Vertical).unwrap();
    let mesh = shared(mesh);
    let mut wf = WeakForm::new(1);
    wf.add_matrix_form(MatrixForm::volumetric(0, 0, Mass)).unwrap();
    wf.add_vector_form(VectorForm::volumetric(0, Source(1.0))).unwrap();
    let mut dp = DiscreteProblem::new(wf, vec![Box::new(L2Space::new(mesh.clone(), 0).unwrap())]).unwrap();
    dp.set_fvm();
    assert!(dp.options().fvm);

    let (matrix, rhs) = assemble_dense(&mut dp);
    let areas = DVector::from_iterator(
        mesh.num_active_elements(),
        mesh.active_elements().map(|e| mesh.area(e.id())),
    );
    assert_matrix_eq!(matrix, DMatrix::from_diagonal(&areas), comp = abs, tol = 1e-14);
    assert_matrix_eq!(rhs, areas, comp = abs, tol = 1e-14);
}

fn multimesh_problem(base: &Arc<Mesh>, refined: &Arc<Mesh>, num_threads: usize) -> DiscreteProblem {
    let mut wf = WeakForm::new(2);
    wf.add_matrix_form(MatrixForm::volumetric(0, 0, Laplace).with_symmetry(Symmetry::Sym))
        .unwrap();
    wf.add_matrix_form(MatrixForm::volumetric(0, 1, Mass)).unwrap();
    wf.add_matrix_form(MatrixForm::volumetric(1, 1, Mass)).unwrap();
    wf.add_vector_form(VectorForm::volumetric(1, Source(1.0))).unwrap();
    let spaces: Vec<Box<dyn Space>> = vec![
        Box::new(L2Space::new(base.clone(), 2).unwrap()),
        Box::new(L2Space::new(refined.clone(), 1).unwrap()),
    ];
    let options = AssemblyOptions::default().with_num_threads(num_threads);
    DiscreteProblem::with_options(wf, spaces, options).unwrap()
}

fn base_dofs(mesh: &Mesh) -> usize {
    mesh.active_elements()
        .map(|e| match e.shape() {
            ReferenceShape::Triangle => 6,
            ReferenceShape::Quadrilateral => 9,
        })
        .sum()
}

fn refined_dofs(mesh: &Mesh) -> usize {
    mesh.active_elements()
        .map(|e| match e.shape() {
            ReferenceShape::Triangle => 3,
            ReferenceShape::Quadrilateral => 4,
        })
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn thread_count_does_not_change_the_result((base, refined) in refined_mesh_pair(3, 5)) {
        let (base, refined) = (shared(base), shared(refined));
        let (serial, serial_rhs) = assemble_dense(&mut multimesh_problem(&base, &refined, 1));
        let (parallel, parallel_rhs) = assemble_dense(&mut multimesh_problem(&base, &refined, 4));

        prop_assert!(util::max_relative_difference(&serial, &parallel) <= 1e-12);
        assert_matrix_eq!(serial_rhs, parallel_rhs, comp = abs, tol = 1e-14);
        prop_assert_eq!(serial.nrows(), base_dofs(&base) + refined_dofs(&refined));
    }
}
