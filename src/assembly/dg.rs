//! Interface terms of discontinuous Galerkin forms.
//!
//! For every interior edge of a traversal region, each mesh's neighbors across the edge are
//! searched and the segmentations are aligned through a [`MultimeshTree`]. Forms are then
//! integrated on every aligned segment with a fixed quadrature order.

use super::buffers::AssemblyBuffers;
use super::local::{fill_matrix_block, shape_functions, LocalFunctions, RegionQuadrature};
use super::Pass;
use crate::error::topology_error;
use crate::function::{DiscontinuousFunc, Func, InterfaceGeom, MeshFunction};
use crate::mesh::{reference_edge_point, ElementId};
use crate::neighbor::{ExtendedAsmList, MultimeshTree, NeighborKind, NeighborSearch, NeighborSegment, Side};
use crate::refmap::RefMap;
use crate::space::{AsmEntry, AsmList};
use crate::traverse::State;
use crate::weakform::{Area, DgFormContext, FormKind, MatrixKernel, VectorKernel, ZERO_TOLERANCE};
use log::trace;
use std::sync::Arc;

/// Normal components below this are treated as zero when deciding segment ownership.
const NORMAL_TOLERANCE: f64 = 1e-10;

/// Whether an interface segment with outward normal `(nx, ny)` is assembled from this side.
///
/// Exactly one of the two sides of a segment sees a normal satisfying this.
fn owns_segment(nx: f64, ny: f64) -> bool {
    nx > NORMAL_TOLERANCE || (nx.abs() <= NORMAL_TOLERANCE && ny > 0.0)
}

fn dg_area_matches(areas: &[Area]) -> bool {
    areas
        .iter()
        .any(|area| matches!(area, Area::Any | Area::DgInnerEdge))
}

/// Central and neighbor element of one mesh on one segment, with the reference points of
/// the segment's quadrature points in both.
struct SegmentSide {
    central: ElementId,
    neighbor: ElementId,
    same_element: bool,
    central_points: Vec<[f64; 2]>,
    neighbor_points: Vec<[f64; 2]>,
}

/// Shape functions of one space on one segment.
struct SegmentFunctions {
    entries: Vec<AsmEntry>,
    /// Test and basis functions for matrix forms.
    both_sides: Vec<DiscontinuousFunc<f64>>,
    /// Test functions for vector forms, which only see the central side.
    central_side: Vec<DiscontinuousFunc<f64>>,
}

impl<'a> Pass<'a> {
    pub(crate) fn assemble_dg_edges(&self, state: &State, buffers: &mut AssemblyBuffers) -> eyre::Result<()> {
        for edge in 0..state.num_edges() {
            if !state.bnd[edge] {
                self.assemble_dg_edge(state, edge, buffers)?;
            }
        }
        Ok(())
    }

    fn assemble_dg_edge(&self, state: &State, edge: usize, buffers: &mut AssemblyBuffers) -> eyre::Result<()> {
        let mut searches = Vec::with_capacity(self.meshes.len());
        for (m, mesh) in self.meshes.iter().enumerate() {
            let element = self.element_on(state, m)?;
            searches.push(NeighborSearch::for_region_edge(
                mesh,
                element,
                &state.transforms[m],
                edge,
                true,
            )?);
        }

        // Only the meshes of the spaces decide whether the edge is an interface. External
        // functions may live on finer meshes without adding interfaces of their own.
        let inside_every_element = searches[..self.spaces.len()].iter().all(|search| {
            search
                .segments()
                .iter()
                .all(|segment| segment.kind == NeighborKind::SameElement)
        });
        if inside_every_element || searches.iter().all(|search| search.num_neighbors() == 0) {
            return Ok(());
        }
        if let Some(m) = searches.iter().position(|search| search.num_neighbors() == 0) {
            return Err(topology_error(format!(
                "mesh {} has no neighbor across edge {} of element {} in traversal state {}",
                m,
                edge,
                searches[m].central(),
                state.id
            )));
        }

        let mut tree = MultimeshTree::new();
        for search in &searches {
            search.insert_into(&mut tree);
        }
        let aligned = searches
            .iter()
            .map(|search| search.aligned(&tree))
            .collect::<eyre::Result<Vec<_>>>()?;
        let num_segments = aligned[0].len();
        if let Some(m) = aligned.iter().position(|segments| segments.len() != num_segments) {
            return Err(topology_error(format!(
                "mesh {} reports {} interface segments across edge {} of element {}, mesh 0 reports {}",
                m,
                aligned[m].len(),
                edge,
                searches[m].central(),
                num_segments
            )));
        }
        trace!(
            "traversal state {} edge {}: {} interface segment(s)",
            state.id,
            edge,
            num_segments
        );

        for k in 0..num_segments {
            let segments: Vec<&NeighborSegment> = aligned.iter().map(|segments| &segments[k]).collect();
            self.assemble_dg_segment(state, edge, &segments, buffers)?;
        }
        Ok(())
    }

    fn segment_side(
        &self,
        state: &State,
        m: usize,
        quadrature: &RegionQuadrature,
        segment: &NeighborSegment,
    ) -> eyre::Result<SegmentSide> {
        let central = self.element_on(state, m)?;
        let central_points = quadrature.element_points(&state.transforms[m]);
        let side = match &segment.kind {
            NeighborKind::SameElement => SegmentSide {
                central,
                neighbor: central,
                same_element: true,
                neighbor_points: central_points.clone(),
                central_points,
            },
            NeighborKind::Across {
                edge,
                segment: neighbor_segment,
                reversed,
            } => {
                let shape = self.meshes[m].element(segment.neighbor).shape();
                let neighbor_points = quadrature
                    .params
                    .iter()
                    .map(|&g| {
                        let g = if *reversed { -g } else { g };
                        reference_edge_point(shape, *edge, neighbor_segment.map(g))
                    })
                    .collect();
                SegmentSide {
                    central,
                    neighbor: segment.neighbor,
                    same_element: false,
                    central_points,
                    neighbor_points,
                }
            }
        };
        Ok(side)
    }

    fn segment_functions(
        &self,
        s: usize,
        side: &SegmentSide,
        central_refmap: &RefMap,
    ) -> eyre::Result<SegmentFunctions> {
        let space = self.spaces[s].as_ref();
        let shapeset = space.shapeset().as_ref();
        let mut central_list = AsmList::new();
        space.element_assembly_list(side.central, &mut central_list, self.first_dofs[s]);
        let central = shape_functions(shapeset, central_refmap, central_list.entries(), &side.central_points)?;

        let mut extended = ExtendedAsmList::new();
        let neighbor = if side.same_element {
            extended.fill(&central_list, None);
            Vec::new()
        } else {
            let mut neighbor_list = AsmList::new();
            space.element_assembly_list(side.neighbor, &mut neighbor_list, self.first_dofs[s]);
            extended.fill(&central_list, Some(&neighbor_list));
            let refmap = RefMap::for_element(space.mesh(), side.neighbor);
            shape_functions(shapeset, &refmap, neighbor_list.entries(), &side.neighbor_points)?
        };

        let mut functions = SegmentFunctions {
            entries: Vec::with_capacity(extended.len()),
            both_sides: Vec::with_capacity(extended.len()),
            central_side: Vec::with_capacity(extended.len()),
        };
        let (mut c, mut n) = (0, 0);
        for entry in extended.entries() {
            let (both_sides, central_side) = match entry.side {
                Side::Central | Side::Both => {
                    let func = central[c].clone();
                    c += 1;
                    let both_sides = if entry.side == Side::Both {
                        DiscontinuousFunc::both(func.clone(), func.clone())
                    } else {
                        DiscontinuousFunc::central(func.clone())
                    };
                    (both_sides, DiscontinuousFunc::central(func))
                }
                Side::Neighbor => {
                    let func = neighbor[n].clone();
                    n += 1;
                    (DiscontinuousFunc::neighbor(func), DiscontinuousFunc::default())
                }
            };
            functions.entries.push(entry.entry);
            functions.both_sides.push(both_sides);
            functions.central_side.push(central_side);
        }
        Ok(functions)
    }

    fn evaluate_on_both_sides(
        function: &dyn MeshFunction,
        side: &SegmentSide,
    ) -> eyre::Result<DiscontinuousFunc<f64>> {
        let mut central = Func::default();
        function.evaluate(side.central, &side.central_points, &mut central)?;
        let mut neighbor = Func::default();
        function.evaluate(side.neighbor, &side.neighbor_points, &mut neighbor)?;
        Ok(DiscontinuousFunc::both(central, neighbor))
    }

    fn evaluate_ext_on_both_sides(
        &self,
        ext: &[Arc<dyn MeshFunction>],
        sides: &[SegmentSide],
    ) -> eyre::Result<Vec<DiscontinuousFunc<f64>>> {
        ext.iter()
            .map(|function| {
                let m = self.mesh_index(function)?;
                Self::evaluate_on_both_sides(function.as_ref(), &sides[m])
            })
            .collect()
    }

    fn assemble_dg_segment(
        &self,
        state: &State,
        edge: usize,
        segments: &[&NeighborSegment],
        buffers: &mut AssemblyBuffers,
    ) -> eyre::Result<()> {
        let interval = segments[0].segment.interval();
        let quadrature = RegionQuadrature::edge(state.shape, edge, interval, self.options.dg_order);
        let sides = segments
            .iter()
            .enumerate()
            .map(|(m, segment)| self.segment_side(state, m, &quadrature, segment))
            .collect::<eyre::Result<Vec<_>>>()?;

        let marker = state.edge_markers[edge];
        let mut geometries = Vec::with_capacity(self.spaces.len());
        let mut functions = Vec::with_capacity(self.spaces.len());
        for (s, side) in sides.iter().enumerate().take(self.spaces.len()) {
            let refmap = self.refmap(buffers, state, s)?.clone();
            let integral = quadrature.integral(&self.meshes[s], &refmap, side.central, &state.transforms[s], marker)?;
            let neighbor = self.meshes[s].element(side.neighbor);
            geometries.push((
                integral.wt,
                InterfaceGeom {
                    geom: integral.geom,
                    neighbor_marker: neighbor.marker(),
                    neighbor_id: side.neighbor,
                    neighbor_diameter: self.meshes[s].diameter(side.neighbor),
                },
            ));
            functions.push(self.segment_functions(s, side, &refmap)?);
        }

        let u_ext = match self.u_ext {
            Some(solutions) => solutions
                .iter()
                .zip(&sides)
                .map(|(solution, side)| Self::evaluate_on_both_sides(solution, side))
                .collect::<eyre::Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let (nx, ny) = {
            let geom = &geometries[0].1;
            (geom.nx[0], geom.ny[0])
        };
        if self.matrix.is_some() && owns_segment(nx, ny) {
            self.assemble_dg_matrix_forms(state, &sides, &geometries, &functions, &u_ext, buffers)?;
        }
        if self.rhs.is_some() {
            self.assemble_dg_vector_forms(state, &sides, &geometries, &functions, &u_ext)?;
        }
        Ok(())
    }

    fn assemble_dg_matrix_forms(
        &self,
        state: &State,
        sides: &[SegmentSide],
        geometries: &[(Vec<f64>, InterfaceGeom<f64>)],
        functions: &[SegmentFunctions],
        u_ext: &[DiscontinuousFunc<f64>],
        buffers: &mut AssemblyBuffers,
    ) -> eyre::Result<()> {
        for form in self.wf.matrix_forms() {
            if form.kind() != FormKind::Dg || !self.matrix_form_applies(form, state) {
                continue;
            }
            if !dg_area_matches(form.areas()) {
                continue;
            }
            let kernel = match form.kernel() {
                MatrixKernel::Dg(kernel) => kernel,
                MatrixKernel::Standard(_) => continue,
            };
            let (i, j) = (form.i(), form.j());
            if sides[i].same_element && sides[j].same_element {
                continue;
            }
            let ext = self.evaluate_ext_on_both_sides(form.ext(), sides)?;
            let (wt, geom) = &geometries[i];
            let ctx = DgFormContext {
                wt,
                u_ext,
                geom,
                ext: &ext,
            };
            let factor = self.block_weight(form) * 0.5 * form.scaling();
            let AssemblyBuffers { local, rows, cols, .. } = &mut *buffers;
            fill_matrix_block(
                LocalFunctions {
                    entries: &functions[i].entries,
                    functions: &functions[i].both_sides,
                },
                LocalFunctions {
                    entries: &functions[j].entries,
                    functions: &functions[j].both_sides,
                },
                false,
                factor,
                local,
                rows,
                cols,
                |u, v| kernel.value(u, v, &ctx),
            )?;
            self.insert_matrix_block(form, local, rows, cols)?;
        }
        Ok(())
    }

    fn assemble_dg_vector_forms(
        &self,
        state: &State,
        sides: &[SegmentSide],
        geometries: &[(Vec<f64>, InterfaceGeom<f64>)],
        functions: &[SegmentFunctions],
        u_ext: &[DiscontinuousFunc<f64>],
    ) -> eyre::Result<()> {
        let rhs = match &self.rhs {
            Some(rhs) => rhs,
            None => return Ok(()),
        };
        for form in self.wf.vector_forms() {
            if form.kind() != FormKind::Dg || !self.vector_form_applies(form, state) {
                continue;
            }
            if !dg_area_matches(form.areas()) {
                continue;
            }
            let kernel = match form.kernel() {
                VectorKernel::Dg(kernel) => kernel,
                VectorKernel::Standard(_) => continue,
            };
            let i = form.i();
            if sides[i].same_element {
                continue;
            }
            let ext = self.evaluate_ext_on_both_sides(form.ext(), sides)?;
            let (wt, geom) = &geometries[i];
            let ctx = DgFormContext {
                wt,
                u_ext,
                geom,
                ext: &ext,
            };
            let factor = 0.5 * form.scaling();
            let mut values = Vec::new();
            for (entry, v) in functions[i].entries.iter().zip(&functions[i].central_side) {
                if v.central.is_none() {
                    continue;
                }
                let dof = match entry.dof {
                    Some(dof) if entry.coef.abs() >= ZERO_TOLERANCE => dof,
                    _ => continue,
                };
                values.push((dof, factor * kernel.value(v, &ctx)? * entry.coef));
            }
            let mut rhs = rhs.lock();
            for (dof, value) in values {
                rhs.add(dof, value);
            }
        }
        Ok(())
    }
}
