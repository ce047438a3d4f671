//! Weak formulations as collections of matrix and vector forms.
//!
//! The kind of a form (volumetric, boundary or DG interface) is fixed when the form is
//! constructed. Kernels are shared read-only between all assembly threads, so they must be
//! `Send + Sync` and must not carry mutable state.

use crate::error::configuration_error;
use crate::function::{DiscontinuousFunc, FormScalar, Func, Geom, InterfaceGeom, MeshFunction, Order};
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Data shared by all shape functions of one volumetric or surface integral.
#[derive(Debug, Clone, Copy)]
pub struct FormContext<'a, T> {
    /// Integration weights multiplied by the Jacobian.
    pub wt: &'a [f64],
    /// Previous iterate, one function per space. Empty for linear assembly.
    pub u_ext: &'a [Func<T>],
    pub geom: &'a Geom<T>,
    /// The form's external functions, in registration order.
    pub ext: &'a [Func<T>],
}

/// Data shared by all shape functions of one DG interface integral.
#[derive(Debug, Clone, Copy)]
pub struct DgFormContext<'a, T> {
    pub wt: &'a [f64],
    pub u_ext: &'a [DiscontinuousFunc<T>],
    pub geom: &'a InterfaceGeom<T>,
    pub ext: &'a [DiscontinuousFunc<T>],
}

pub trait MatrixFormKernel: Send + Sync {
    fn value(&self, u: &Func<f64>, v: &Func<f64>, ctx: &FormContext<f64>) -> eyre::Result<f64>;

    fn ord(&self, u: &Func<Order>, v: &Func<Order>, ctx: &FormContext<Order>) -> eyre::Result<Order>;
}

pub trait VectorFormKernel: Send + Sync {
    fn value(&self, v: &Func<f64>, ctx: &FormContext<f64>) -> eyre::Result<f64>;

    fn ord(&self, v: &Func<Order>, ctx: &FormContext<Order>) -> eyre::Result<Order>;
}

/// DG kernels are always integrated with a fixed order, so they have no order callback.
pub trait DgMatrixKernel: Send + Sync {
    fn value(
        &self,
        u: &DiscontinuousFunc<f64>,
        v: &DiscontinuousFunc<f64>,
        ctx: &DgFormContext<f64>,
    ) -> eyre::Result<f64>;
}

pub trait DgVectorKernel: Send + Sync {
    fn value(&self, v: &DiscontinuousFunc<f64>, ctx: &DgFormContext<f64>) -> eyre::Result<f64>;
}

/// An integrand written once for both numeric and order evaluation.
pub trait GenericMatrixIntegrand: Send + Sync {
    fn integrate<T: FormScalar>(&self, u: &Func<T>, v: &Func<T>, ctx: &FormContext<T>) -> eyre::Result<T>;
}

pub trait GenericVectorIntegrand: Send + Sync {
    fn integrate<T: FormScalar>(&self, v: &Func<T>, ctx: &FormContext<T>) -> eyre::Result<T>;
}

impl<I: GenericMatrixIntegrand> MatrixFormKernel for I {
    fn value(&self, u: &Func<f64>, v: &Func<f64>, ctx: &FormContext<f64>) -> eyre::Result<f64> {
        self.integrate(u, v, ctx)
    }

    fn ord(&self, u: &Func<Order>, v: &Func<Order>, ctx: &FormContext<Order>) -> eyre::Result<Order> {
        self.integrate(u, v, ctx)
    }
}

impl<I: GenericVectorIntegrand> VectorFormKernel for I {
    fn value(&self, v: &Func<f64>, ctx: &FormContext<f64>) -> eyre::Result<f64> {
        self.integrate(v, ctx)
    }

    fn ord(&self, v: &Func<Order>, ctx: &FormContext<Order>) -> eyre::Result<Order> {
        self.integrate(v, ctx)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FormKind {
    Volumetric,
    /// Integral over boundary edges.
    Surface,
    /// Integral over interior edges, with access to both sides.
    Dg,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Symmetry {
    NonSym,
    /// For `i == j`, only the upper triangle is evaluated and mirrored. For `i != j`, the
    /// transposed block is also inserted at `(j, i)`.
    Sym,
    /// For `i != j`, the negated transposed block is also inserted at `(j, i)`.
    AntiSym,
}

/// Where a form is integrated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Area {
    Any,
    /// Element marker for volumetric forms, boundary marker for surface forms.
    Marker(String),
    DgInnerEdge,
    DgBoundaryEdge,
}

#[derive(Clone)]
pub(crate) enum MatrixKernel {
    Standard(Arc<dyn MatrixFormKernel>),
    Dg(Arc<dyn DgMatrixKernel>),
}

#[derive(Clone)]
pub(crate) enum VectorKernel {
    Standard(Arc<dyn VectorFormKernel>),
    Dg(Arc<dyn DgVectorKernel>),
}

/// A bilinear form contributing to block `(i, j)` of the matrix.
#[derive(Clone)]
pub struct MatrixForm {
    i: usize,
    j: usize,
    kind: FormKind,
    symmetry: Symmetry,
    areas: Vec<Area>,
    scaling: f64,
    ext: Vec<Arc<dyn MeshFunction>>,
    kernel: MatrixKernel,
}

impl MatrixForm {
    fn with_kernel(i: usize, j: usize, kind: FormKind, kernel: MatrixKernel) -> Self {
        let areas = match kind {
            FormKind::Dg => vec![Area::DgInnerEdge],
            _ => vec![Area::Any],
        };
        Self {
            i,
            j,
            kind,
            symmetry: Symmetry::NonSym,
            areas,
            scaling: 1.0,
            ext: Vec::new(),
            kernel,
        }
    }

    pub fn volumetric(i: usize, j: usize, kernel: impl MatrixFormKernel + 'static) -> Self {
        Self::with_kernel(i, j, FormKind::Volumetric, MatrixKernel::Standard(Arc::new(kernel)))
    }

    pub fn surface(i: usize, j: usize, kernel: impl MatrixFormKernel + 'static) -> Self {
        Self::with_kernel(i, j, FormKind::Surface, MatrixKernel::Standard(Arc::new(kernel)))
    }

    pub fn dg(i: usize, j: usize, kernel: impl DgMatrixKernel + 'static) -> Self {
        Self::with_kernel(i, j, FormKind::Dg, MatrixKernel::Dg(Arc::new(kernel)))
    }

    pub fn with_symmetry(mut self, symmetry: Symmetry) -> Self {
        self.symmetry = symmetry;
        self
    }

    pub fn with_areas(mut self, areas: Vec<Area>) -> Self {
        self.areas = areas;
        self
    }

    pub fn with_scaling(mut self, scaling: f64) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn with_ext(mut self, function: Arc<dyn MeshFunction>) -> Self {
        self.ext.push(function);
        self
    }

    pub fn i(&self) -> usize {
        self.i
    }

    pub fn j(&self) -> usize {
        self.j
    }

    pub fn kind(&self) -> FormKind {
        self.kind
    }

    pub fn symmetry(&self) -> Symmetry {
        self.symmetry
    }

    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    pub fn scaling(&self) -> f64 {
        self.scaling
    }

    pub fn ext(&self) -> &[Arc<dyn MeshFunction>] {
        &self.ext
    }

    pub(crate) fn kernel(&self) -> &MatrixKernel {
        &self.kernel
    }
}

impl Debug for MatrixForm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixForm")
            .field("i", &self.i)
            .field("j", &self.j)
            .field("kind", &self.kind)
            .field("symmetry", &self.symmetry)
            .field("areas", &self.areas)
            .field("scaling", &self.scaling)
            .field("ext", &self.ext.len())
            .finish_non_exhaustive()
    }
}

/// A linear form contributing to block `i` of the right-hand side.
#[derive(Clone)]
pub struct VectorForm {
    i: usize,
    kind: FormKind,
    areas: Vec<Area>,
    scaling: f64,
    ext: Vec<Arc<dyn MeshFunction>>,
    kernel: VectorKernel,
}

impl VectorForm {
    fn with_kernel(i: usize, kind: FormKind, kernel: VectorKernel) -> Self {
        let areas = match kind {
            FormKind::Dg => vec![Area::DgInnerEdge],
            _ => vec![Area::Any],
        };
        Self {
            i,
            kind,
            areas,
            scaling: 1.0,
            ext: Vec::new(),
            kernel,
        }
    }

    pub fn volumetric(i: usize, kernel: impl VectorFormKernel + 'static) -> Self {
        Self::with_kernel(i, FormKind::Volumetric, VectorKernel::Standard(Arc::new(kernel)))
    }

    pub fn surface(i: usize, kernel: impl VectorFormKernel + 'static) -> Self {
        Self::with_kernel(i, FormKind::Surface, VectorKernel::Standard(Arc::new(kernel)))
    }

    pub fn dg(i: usize, kernel: impl DgVectorKernel + 'static) -> Self {
        Self::with_kernel(i, FormKind::Dg, VectorKernel::Dg(Arc::new(kernel)))
    }

    pub fn with_areas(mut self, areas: Vec<Area>) -> Self {
        self.areas = areas;
        self
    }

    pub fn with_scaling(mut self, scaling: f64) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn with_ext(mut self, function: Arc<dyn MeshFunction>) -> Self {
        self.ext.push(function);
        self
    }

    pub fn i(&self) -> usize {
        self.i
    }

    pub fn kind(&self) -> FormKind {
        self.kind
    }

    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    pub fn scaling(&self) -> f64 {
        self.scaling
    }

    pub fn ext(&self) -> &[Arc<dyn MeshFunction>] {
        &self.ext
    }

    pub(crate) fn kernel(&self) -> &VectorKernel {
        &self.kernel
    }
}

impl Debug for VectorForm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorForm")
            .field("i", &self.i)
            .field("kind", &self.kind)
            .field("areas", &self.areas)
            .field("scaling", &self.scaling)
            .field("ext", &self.ext.len())
            .finish_non_exhaustive()
    }
}

/// Scaling factors below this magnitude are treated as zero.
pub const ZERO_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct WeakForm {
    neq: usize,
    matrix_forms: Vec<MatrixForm>,
    vector_forms: Vec<VectorForm>,
    seq: u64,
}

impl WeakForm {
    /// A weak form for a system of `neq` equations.
    pub fn new(neq: usize) -> Self {
        Self {
            neq,
            matrix_forms: Vec::new(),
            vector_forms: Vec::new(),
            seq: 0,
        }
    }

    pub fn neq(&self) -> usize {
        self.neq
    }

    /// Generation counter, bumped whenever a form is added or removed.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    fn check_index(&self, index: usize) -> eyre::Result<()> {
        if index >= self.neq {
            return Err(configuration_error(format!(
                "form index {} out of bounds for a weak form with {} equations",
                index, self.neq
            )));
        }
        Ok(())
    }

    pub fn add_matrix_form(&mut self, form: MatrixForm) -> eyre::Result<()> {
        self.check_index(form.i)?;
        self.check_index(form.j)?;
        if form.kind == FormKind::Dg && form.symmetry != Symmetry::NonSym {
            return Err(configuration_error("DG matrix forms cannot be declared (anti)symmetric"));
        }
        self.matrix_forms.push(form);
        self.seq += 1;
        Ok(())
    }

    pub fn add_vector_form(&mut self, form: VectorForm) -> eyre::Result<()> {
        self.check_index(form.i)?;
        self.vector_forms.push(form);
        self.seq += 1;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.matrix_forms.clear();
        self.vector_forms.clear();
        self.seq += 1;
    }

    pub fn matrix_forms(&self) -> &[MatrixForm] {
        &self.matrix_forms
    }

    pub fn vector_forms(&self) -> &[VectorForm] {
        &self.vector_forms
    }

    /// Which blocks `(i, j)` of the matrix receive contributions.
    ///
    /// Forms with a negligible scaling factor do not count. Symmetric and antisymmetric forms
    /// also mark their mirror block.
    pub fn blocks(&self, force_diagonal: bool) -> Vec<Vec<bool>> {
        let mut blocks = vec![vec![false; self.neq]; self.neq];
        for form in &self.matrix_forms {
            if form.scaling.abs() < ZERO_TOLERANCE {
                continue;
            }
            blocks[form.i][form.j] = true;
            if form.symmetry != Symmetry::NonSym {
                blocks[form.j][form.i] = true;
            }
        }
        if force_diagonal {
            for (i, row) in blocks.iter_mut().enumerate() {
                row[i] = true;
            }
        }
        blocks
    }

    /// The distinct external functions of all forms, in order of first appearance.
    pub fn ext_functions(&self) -> Vec<Arc<dyn MeshFunction>> {
        let mut functions: Vec<Arc<dyn MeshFunction>> = Vec::new();
        let all = self
            .matrix_forms
            .iter()
            .flat_map(|form| form.ext.iter())
            .chain(self.vector_forms.iter().flat_map(|form| form.ext.iter()));
        for function in all {
            if !functions.iter().any(|f| Arc::ptr_eq(f, function)) {
                functions.push(function.clone());
            }
        }
        functions
    }

    pub fn is_dg_matrix_form(form: &MatrixForm) -> bool {
        form.kind == FormKind::Dg
    }

    pub fn has_dg_matrix_forms(&self) -> bool {
        self.matrix_forms.iter().any(Self::is_dg_matrix_form)
    }

    pub fn has_dg_vector_forms(&self) -> bool {
        self.vector_forms
            .iter()
            .any(|form| form.kind == FormKind::Dg)
    }

    pub fn has_dg_forms(&self) -> bool {
        self.has_dg_matrix_forms() || self.has_dg_vector_forms()
    }
}
