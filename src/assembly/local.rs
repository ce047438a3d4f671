//! Volumetric and boundary contributions of one traversal state.

use super::buffers::{AssemblyBuffers, Integral, IntegralKey};
use super::order::{matrix_form_order, previous_iterate_orders, shape_function_order, vector_form_order, OrderInputs};
use super::Pass;
use crate::error::evaluation_error;
use crate::function::{Func, Geom, MeshFunction, Order};
use crate::mesh::{reference_edge_point, reference_edge_tangent, Ctm, ElementId, Mesh, INTERIOR_EDGE_MARKER};
use crate::refmap::RefMap;
use crate::shapeset::Shapeset;
use crate::space::AsmEntry;
use crate::traverse::State;
use crate::weakform::{
    Area, FormContext, FormKind, MatrixForm, MatrixFormKernel, MatrixKernel, Symmetry, VectorForm,
    VectorFormKernel, VectorKernel, ZERO_TOLERANCE,
};
use hpfem_quadrature::{edge_rule, volume_rule, ReferenceShape};
use itertools::izip;
use nalgebra::{DMatrix, Point2, Vector2};
use std::sync::Arc;

/// Quadrature points of one integral in the reference element of a traversal region.
#[derive(Debug, Clone)]
pub(crate) struct RegionQuadrature {
    shape: ReferenceShape,
    pub weights: Vec<f64>,
    pub points: Vec<[f64; 2]>,
    /// Points of the reference interval the edge points were generated from.
    pub params: Vec<f64>,
    /// Region edge and the length scale of the edge parameter, for edge integrals.
    edge: Option<(usize, f64)>,
}

impl RegionQuadrature {
    pub fn volume(shape: ReferenceShape, order: u32) -> eyre::Result<Self> {
        let (weights, points) = volume_rule(shape, order)
            .map_err(|err| evaluation_error(format!("no volume rule of order {} on {:?}: {}", order, shape, err)))?;
        Ok(Self {
            shape,
            weights,
            points,
            params: Vec::new(),
            edge: None,
        })
    }

    /// Points on the part `[a, b]` of region edge `edge`.
    pub fn edge(shape: ReferenceShape, edge: usize, (a, b): (f64, f64), order: u32) -> Self {
        let (weights, params) = edge_rule(order);
        let params: Vec<f64> = params.into_iter().map(|[g]| g).collect();
        let points = params
            .iter()
            .map(|g| reference_edge_point(shape, edge, a + 0.5 * (g + 1.0) * (b - a)))
            .collect();
        Self {
            shape,
            weights,
            points,
            params,
            edge: Some((edge, 0.5 * (b - a))),
        }
    }

    /// The points in the reference element of an element, given the region's transformation.
    pub fn element_points(&self, ctm: &Ctm) -> Vec<[f64; 2]> {
        self.points.iter().map(|&p| ctm.apply(p)).collect()
    }

    /// Weights and geometry at the points, computed with the map of `element`.
    ///
    /// Edge weights integrate to twice the physical length of the edge, which assemblers
    /// compensate with a factor of one half.
    pub fn integral(
        &self,
        mesh: &Mesh,
        refmap: &RefMap,
        element: ElementId,
        ctm: &Ctm,
        marker: i32,
    ) -> eyre::Result<Integral> {
        let n = self.weights.len();
        let mut geom = Geom {
            marker,
            id: element,
            diameter: mesh.diameter(element),
            area: mesh.area(element),
            edge: self.edge.map(|(edge, _)| edge),
            ..Geom::default()
        };
        let mut wt = Vec::with_capacity(n);
        for (&w, &p) in izip!(&self.weights, &self.points) {
            let xi = Point2::from(ctm.apply(p));
            let x = refmap.map(&xi);
            geom.x.push(x.x);
            geom.y.push(x.y);
            match self.edge {
                None => {
                    let (_, det) = refmap.inverse_jacobian(&xi)?;
                    wt.push(w * det * ctm.scale());
                }
                Some((edge, scale)) => {
                    let [tx, ty] = reference_edge_tangent(self.shape, edge);
                    let tangent = refmap.jacobian(&xi) * Vector2::new(ctm.m[0] * tx, ctm.m[1] * ty) * scale;
                    let length = tangent.norm();
                    if length <= 0.0 {
                        return Err(evaluation_error(format!(
                            "degenerate edge {} of element {}",
                            edge, element
                        )));
                    }
                    let normal = RefMap::outward_normal(&tangent);
                    wt.push(2.0 * w * length);
                    geom.nx.push(normal.x);
                    geom.ny.push(normal.y);
                    geom.tx.push(tangent.x / length);
                    geom.ty.push(tangent.y / length);
                }
            }
        }
        Ok(Integral { wt, geom })
    }
}

/// Values and physical derivatives of the shape functions of `entries` at reference points.
pub(crate) fn shape_functions(
    shapeset: &dyn Shapeset,
    refmap: &RefMap,
    entries: &[AsmEntry],
    points: &[[f64; 2]],
) -> eyre::Result<Vec<Func<f64>>> {
    let inverse_transposes = points
        .iter()
        .map(|&p| {
            refmap
                .inverse_jacobian(&Point2::from(p))
                .map(|(inverse, _)| inverse.transpose())
        })
        .collect::<eyre::Result<Vec<_>>>()?;
    let functions = entries
        .iter()
        .map(|entry| {
            let mut func = Func::zeros(points.len());
            for (q, (&p, inverse_transpose)) in points.iter().zip(&inverse_transposes).enumerate() {
                let [value, dxi, deta] = shapeset.eval(refmap.shape(), entry.shape, p);
                let gradient = inverse_transpose * Vector2::new(dxi, deta);
                func.val[q] = value;
                func.dx[q] = gradient.x;
                func.dy[q] = gradient.y;
            }
            func
        })
        .collect();
    Ok(functions)
}

/// Indices, global DOFs and coefficients of the entries that are assembled.
fn active_entries(entries: &[AsmEntry]) -> Vec<(usize, usize, f64)> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(k, entry)| match entry.dof {
            Some(dof) if entry.coef.abs() >= ZERO_TOLERANCE => Some((k, dof, entry.coef)),
            _ => None,
        })
        .collect()
}

/// Test and basis functions of a matrix form, with their assembly list entries.
pub(crate) struct LocalFunctions<'b, F> {
    pub entries: &'b [AsmEntry],
    pub functions: &'b [F],
}

/// Evaluates a matrix form on all pairs of active test and basis functions into `local`.
///
/// With `upper_only`, test and basis functions must coincide; only the upper triangle is
/// evaluated and the lower one is mirrored from it.
pub(crate) fn fill_matrix_block<F>(
    test: LocalFunctions<F>,
    basis: LocalFunctions<F>,
    upper_only: bool,
    factor: f64,
    local: &mut DMatrix<f64>,
    rows: &mut Vec<usize>,
    cols: &mut Vec<usize>,
    mut value: impl FnMut(&F, &F) -> eyre::Result<f64>,
) -> eyre::Result<()> {
    let test_active = active_entries(test.entries);
    let basis_active = active_entries(basis.entries);
    rows.clear();
    rows.extend(test_active.iter().map(|&(_, dof, _)| dof));
    cols.clear();
    cols.extend(basis_active.iter().map(|&(_, dof, _)| dof));
    local.resize_mut(rows.len(), cols.len(), 0.0);
    local.fill(0.0);

    for (a, &(t, _, test_coef)) in test_active.iter().enumerate() {
        for (b, &(s, _, basis_coef)) in basis_active.iter().enumerate() {
            if upper_only && b < a {
                continue;
            }
            let v = value(&basis.functions[s], &test.functions[t])?;
            local[(a, b)] = factor * v * test_coef * basis_coef;
        }
    }
    if upper_only {
        for a in 0..local.nrows() {
            for b in 0..a.min(local.ncols()) {
                local[(a, b)] = local[(b, a)];
            }
        }
    }
    Ok(())
}

impl<'a> Pass<'a> {
    /// Common applicability checks of matrix forms.
    pub(crate) fn matrix_form_applies(&self, form: &MatrixForm, state: &State) -> bool {
        if state.elements[form.i()].is_none() || state.elements[form.j()].is_none() {
            return false;
        }
        if form.scaling().abs() < ZERO_TOLERANCE {
            return false;
        }
        if let Some(weights) = self.block_weights {
            if weights[(form.i(), form.j())].abs() < ZERO_TOLERANCE {
                return false;
            }
        }
        true
    }

    pub(crate) fn vector_form_applies(&self, form: &VectorForm, state: &State) -> bool {
        state.elements[form.i()].is_some() && form.scaling().abs() >= ZERO_TOLERANCE
    }

    /// Whether a volumetric form restricted to `areas` applies to the region's elements on the
    /// meshes of `spaces`.
    fn volume_area_matches(&self, areas: &[Area], spaces: &[usize], state: &State) -> bool {
        areas.iter().any(|area| match area {
            Area::Any => true,
            Area::Marker(name) => spaces.iter().all(|&s| {
                let mesh = self.spaces[s].mesh();
                match state.elements[s] {
                    Some(e) => mesh.element_markers().internal_marker(name) == Some(mesh.element(e).marker()),
                    None => false,
                }
            }),
            Area::DgInnerEdge | Area::DgBoundaryEdge => false,
        })
    }

    /// Whether a boundary form restricted to `areas` applies to an edge with marker `marker`.
    fn surface_area_matches(&self, areas: &[Area], spaces: &[usize], marker: i32) -> bool {
        if marker == INTERIOR_EDGE_MARKER {
            return false;
        }
        areas.iter().any(|area| match area {
            Area::Any | Area::DgBoundaryEdge => true,
            Area::Marker(name) => spaces
                .iter()
                .all(|&s| self.spaces[s].mesh().boundary_markers().internal_marker(name) == Some(marker)),
            Area::DgInnerEdge => false,
        })
    }

    /// Index of the traversal mesh a mesh function is defined on.
    pub(crate) fn mesh_index(&self, function: &Arc<dyn MeshFunction>) -> eyre::Result<usize> {
        self.meshes
            .iter()
            .position(|mesh| Arc::ptr_eq(mesh, function.mesh()))
            .ok_or_else(|| evaluation_error("external function is defined on a mesh that is not traversed"))
    }

    pub(crate) fn element_on(&self, state: &State, mesh: usize) -> eyre::Result<ElementId> {
        state.elements[mesh].ok_or_else(|| {
            evaluation_error(format!("mesh {} has no element in traversal state {}", mesh, state.id))
        })
    }

    pub(crate) fn refmap<'b>(&self, buffers: &'b mut AssemblyBuffers, state: &State, mesh: usize) -> eyre::Result<&'b RefMap> {
        let element = self.element_on(state, mesh)?;
        let refmap = &mut buffers.refmaps[mesh];
        Ok(refmap.get_or_insert_with(|| RefMap::for_element(&self.meshes[mesh], element)))
    }

    /// Makes sure the integral and the shape functions of `space` for `quadrature` are cached.
    fn prepare(
        &self,
        buffers: &mut AssemblyBuffers,
        state: &State,
        space: usize,
        quadrature: &RegionQuadrature,
        key: IntegralKey,
    ) -> eyre::Result<()> {
        let element = self.element_on(state, space)?;
        let ctm = state.transforms[space];
        let marker = match key.edge {
            Some(edge) => state.edge_markers[edge],
            None => self.spaces[space].mesh().element(element).marker(),
        };
        let refmap = self.refmap(buffers, state, space)?.clone();
        if !buffers.integrals.contains_key(&key) {
            let integral = quadrature.integral(&self.meshes[space], &refmap, element, &ctm, marker)?;
            buffers.integrals.insert(key, integral);
        }
        if !buffers.functions.contains_key(&key) {
            let list = match key.edge {
                Some(_) => &buffers.edge_lists[space],
                None => &buffers.lists[space],
            };
            let points = quadrature.element_points(&ctm);
            let functions = shape_functions(self.spaces[space].shapeset().as_ref(), &refmap, list.entries(), &points)?;
            buffers.functions.insert(key, functions);
        }
        Ok(())
    }

    /// Previous iterate and external functions at the points of `quadrature`.
    fn evaluate_functions(
        &self,
        state: &State,
        quadrature: &RegionQuadrature,
        ext: &[Arc<dyn MeshFunction>],
    ) -> eyre::Result<(Vec<Func<f64>>, Vec<Func<f64>>)> {
        let mut u_ext = Vec::new();
        if let Some(solutions) = self.u_ext {
            for (s, solution) in solutions.iter().enumerate() {
                let mut func = Func::default();
                let points = quadrature.element_points(&state.transforms[s]);
                solution.evaluate(self.element_on(state, s)?, &points, &mut func)?;
                u_ext.push(func);
            }
        }
        let mut ext_values = Vec::with_capacity(ext.len());
        for function in ext {
            let m = self.mesh_index(function)?;
            let mut func = Func::default();
            let points = quadrature.element_points(&state.transforms[m]);
            function.evaluate(self.element_on(state, m)?, &points, &mut func)?;
            ext_values.push(func);
        }
        Ok((u_ext, ext_values))
    }

    fn order_inputs<'b>(
        &'b self,
        state: &State,
        refmap: &'b RefMap,
        u_ext: &'b [Func<Order>],
        ext: &'b [Arc<dyn MeshFunction>],
        space: usize,
        edge: Option<usize>,
    ) -> eyre::Result<OrderInputs<'b>> {
        let element = self.element_on(state, space)?;
        let marker = match edge {
            Some(edge) => state.edge_markers[edge],
            None => self.spaces[space].mesh().element(element).marker(),
        };
        let ext = ext
            .iter()
            .map(|function| Ok((function, self.element_on(state, self.mesh_index(function)?)?)))
            .collect::<eyre::Result<Vec<_>>>()?;
        Ok(OrderInputs {
            refmap,
            fvm: self.options.fvm,
            marker,
            id: element,
            edge,
            u_ext,
            ext,
        })
    }

    fn quadrature(state: &State, order: u32, edge: Option<usize>) -> eyre::Result<RegionQuadrature> {
        match edge {
            None => RegionQuadrature::volume(state.shape, order),
            Some(edge) => Ok(RegionQuadrature::edge(state.shape, edge, (-1.0, 1.0), order)),
        }
    }

    /// Assembles a volumetric (`edge == None`) or boundary matrix form.
    fn assemble_matrix_form(
        &self,
        form: &MatrixForm,
        kernel: &dyn MatrixFormKernel,
        state: &State,
        edge: Option<usize>,
        buffers: &mut AssemblyBuffers,
    ) -> eyre::Result<()> {
        let (i, j) = (form.i(), form.j());
        let (e_i, e_j) = (self.element_on(state, i)?, self.element_on(state, j)?);
        let refmap = self.refmap(buffers, state, i)?.clone();
        let u_ext_orders = match self.u_ext {
            Some(_) => previous_iterate_orders(self.spaces, &state.elements),
            None => Vec::new(),
        };
        let inputs = self.order_inputs(state, &refmap, &u_ext_orders, form.ext(), i, edge)?;
        let order = matrix_form_order(
            kernel,
            shape_function_order(self.spaces[j].as_ref(), e_j),
            shape_function_order(self.spaces[i].as_ref(), e_i),
            &inputs,
        )?;

        let quadrature = Self::quadrature(state, order, edge)?;
        let key_i = IntegralKey { mesh: i, order, edge };
        let key_j = IntegralKey { mesh: j, order, edge };
        self.prepare(buffers, state, i, &quadrature, key_i)?;
        self.prepare(buffers, state, j, &quadrature, key_j)?;
        let (u_ext, ext) = self.evaluate_functions(state, &quadrature, form.ext())?;

        let AssemblyBuffers {
            lists,
            edge_lists,
            integrals,
            functions,
            local,
            rows,
            cols,
            ..
        } = buffers;
        let lists = if edge.is_some() { edge_lists } else { lists };
        let integral = &integrals[&key_i];
        let ctx = FormContext {
            wt: &integral.wt,
            u_ext: &u_ext,
            geom: &integral.geom,
            ext: &ext,
        };
        let surface_factor = if edge.is_some() { 0.5 } else { 1.0 };
        let factor = self.block_weight(form) * surface_factor * form.scaling();
        let upper_only = i == j && form.symmetry() == Symmetry::Sym;
        fill_matrix_block(
            LocalFunctions {
                entries: lists[i].entries(),
                functions: &functions[&key_i],
            },
            LocalFunctions {
                entries: lists[j].entries(),
                functions: &functions[&key_j],
            },
            upper_only,
            factor,
            local,
            rows,
            cols,
            |u, v| kernel.value(u, v, &ctx),
        )?;
        self.insert_matrix_block(form, local, rows, cols)
    }

    pub(crate) fn block_weight(&self, form: &MatrixForm) -> f64 {
        self.block_weights
            .map_or(1.0, |weights| weights[(form.i(), form.j())])
    }

    /// Adds a local block of form `form`, and its (negated) transpose for forms declared
    /// symmetric or antisymmetric across different fields.
    pub(crate) fn insert_matrix_block(
        &self,
        form: &MatrixForm,
        local: &DMatrix<f64>,
        rows: &[usize],
        cols: &[usize],
    ) -> eyre::Result<()> {
        let matrix = match &self.matrix {
            Some(matrix) => matrix,
            None => return Ok(()),
        };
        if rows.is_empty() || cols.is_empty() {
            return Ok(());
        }
        let mut matrix = matrix.lock();
        matrix.add_block(rows, cols, local.as_view())?;
        if form.i() != form.j() {
            let sign = match form.symmetry() {
                Symmetry::NonSym => return Ok(()),
                Symmetry::Sym => 1.0,
                Symmetry::AntiSym => -1.0,
            };
            let transposed = local.transpose() * sign;
            matrix.add_block(cols, rows, transposed.as_view())?;
        }
        Ok(())
    }

    /// Assembles a volumetric (`edge == None`) or boundary vector form.
    fn assemble_vector_form(
        &self,
        form: &VectorForm,
        kernel: &dyn VectorFormKernel,
        state: &State,
        edge: Option<usize>,
        buffers: &mut AssemblyBuffers,
    ) -> eyre::Result<()> {
        let rhs = match &self.rhs {
            Some(rhs) => rhs,
            None => return Ok(()),
        };
        let i = form.i();
        let e_i = self.element_on(state, i)?;
        let refmap = self.refmap(buffers, state, i)?.clone();
        let u_ext_orders = match self.u_ext {
            Some(_) => previous_iterate_orders(self.spaces, &state.elements),
            None => Vec::new(),
        };
        let inputs = self.order_inputs(state, &refmap, &u_ext_orders, form.ext(), i, edge)?;
        let order = vector_form_order(kernel, shape_function_order(self.spaces[i].as_ref(), e_i), &inputs)?;

        let quadrature = Self::quadrature(state, order, edge)?;
        let key = IntegralKey { mesh: i, order, edge };
        self.prepare(buffers, state, i, &quadrature, key)?;
        let (u_ext, ext) = self.evaluate_functions(state, &quadrature, form.ext())?;

        let list = match edge {
            Some(_) => &buffers.edge_lists[i],
            None => &buffers.lists[i],
        };
        let integral = &buffers.integrals[&key];
        let functions = &buffers.functions[&key];
        let ctx = FormContext {
            wt: &integral.wt,
            u_ext: &u_ext,
            geom: &integral.geom,
            ext: &ext,
        };
        let surface_factor = if edge.is_some() { 0.5 } else { 1.0 };
        let factor = surface_factor * form.scaling();
        let mut values = Vec::new();
        for (t, dof, coef) in active_entries(list.entries()) {
            let value = kernel.value(&functions[t], &ctx)?;
            values.push((dof, factor * value * coef));
        }
        let mut rhs = rhs.lock();
        for (dof, value) in values {
            rhs.add(dof, value);
        }
        Ok(())
    }

    /// Volumetric forms of all fields present in `state`, then boundary forms on its
    /// boundary edges.
    pub(crate) fn assemble_volume_and_surface(&self, state: &State, buffers: &mut AssemblyBuffers) -> eyre::Result<()> {
        for form in self.wf.matrix_forms() {
            if form.kind() != FormKind::Volumetric || !self.matrix_form_applies(form, state) {
                continue;
            }
            if !self.volume_area_matches(form.areas(), &[form.i(), form.j()], state) {
                continue;
            }
            if let MatrixKernel::Standard(kernel) = form.kernel() {
                self.assemble_matrix_form(form, kernel.as_ref(), state, None, buffers)?;
            }
        }
        for form in self.wf.vector_forms() {
            if form.kind() != FormKind::Volumetric || !self.vector_form_applies(form, state) {
                continue;
            }
            if !self.volume_area_matches(form.areas(), &[form.i()], state) {
                continue;
            }
            if let VectorKernel::Standard(kernel) = form.kernel() {
                self.assemble_vector_form(form, kernel.as_ref(), state, None, buffers)?;
            }
        }

        for edge in 0..state.num_edges() {
            if !state.bnd[edge] {
                continue;
            }
            let marker = state.edge_markers[edge];
            buffers.begin_edge();
            self.fill_edge_lists(state, edge, buffers);
            for form in self.wf.matrix_forms() {
                if form.kind() != FormKind::Surface || !self.matrix_form_applies(form, state) {
                    continue;
                }
                if !self.surface_area_matches(form.areas(), &[form.i(), form.j()], marker) {
                    continue;
                }
                if let MatrixKernel::Standard(kernel) = form.kernel() {
                    self.assemble_matrix_form(form, kernel.as_ref(), state, Some(edge), buffers)?;
                }
            }
            for form in self.wf.vector_forms() {
                if form.kind() != FormKind::Surface || !self.vector_form_applies(form, state) {
                    continue;
                }
                if !self.surface_area_matches(form.areas(), &[form.i()], marker) {
                    continue;
                }
                if let VectorKernel::Standard(kernel) = form.kernel() {
                    self.assemble_vector_form(form, kernel.as_ref(), state, Some(edge), buffers)?;
                }
            }
        }
        Ok(())
    }

    /// Assembly lists of the shape functions not vanishing on region edge `edge`.
    fn fill_edge_lists(&self, state: &State, edge: usize, buffers: &mut AssemblyBuffers) {
        for (s, space) in self.spaces.iter().enumerate() {
            let list = &mut buffers.edge_lists[s];
            list.clear();
            let element = match state.elements[s] {
                Some(element) => element,
                None => continue,
            };
            let shape = space.mesh().element(element).shape();
            match state.transforms[s].edge_on_element(shape, edge) {
                Some((element_edge, _, _)) => {
                    space.boundary_assembly_list(element, element_edge, list, self.first_dofs[s])
                }
                None => space.element_assembly_list(element, list, self.first_dofs[s]),
            }
        }
    }
}
