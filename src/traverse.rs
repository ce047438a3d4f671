//! Synchronized traversal of several meshes refined from the same base mesh.
//!
//! Every [`State`] describes a region of the domain together with, for each mesh, the active
//! element containing it and the transformation from the region's reference element into
//! that element's reference element. The region is always the intersection of the elements,
//! so the traversal is driven by the finest mesh at each location, and the regions of all
//! states tile the domain exactly once.

use crate::error::configuration_error;
use crate::mesh::{Ctm, ElementId, Mesh, SonIndex, INTERIOR_EDGE_MARKER};
use hpfem_quadrature::ReferenceShape;
use log::debug;
use std::sync::Arc;

/// One step of a multi-mesh traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    /// Position of the state in the enumeration.
    pub id: usize,
    pub base: ElementId,
    pub shape: ReferenceShape,
    /// Per mesh, the active element covering the region.
    pub elements: Vec<Option<ElementId>>,
    /// Per mesh, the map from the region's reference element into the element's.
    pub transforms: Vec<Ctm>,
    /// Marker of the first element present.
    pub element_marker: i32,
    /// Per region edge, the boundary marker, or [`INTERIOR_EDGE_MARKER`].
    pub edge_markers: Vec<i32>,
    /// Per region edge, whether it lies on the domain boundary.
    pub bnd: Vec<bool>,
}

impl State {
    pub fn num_edges(&self) -> usize {
        self.shape.num_vertices()
    }

    /// Whether the region coincides with the element of mesh `m`.
    pub fn is_whole_element(&self, m: usize) -> bool {
        self.transforms[m].is_identity()
    }
}

/// Reference-element size of a quadrilateral region in dyadic units.
const ONE: u32 = 1 << 30;

#[derive(Debug, Clone, PartialEq)]
enum Region {
    /// `[x0, y0, x1, y1]` within `[0, ONE]^2`, the base element's reference square.
    Rect([u32; 4]),
    /// Son indices leading from the base triangle to the region.
    Chain(Vec<SonIndex>),
}

impl Region {
    fn son(&self, son: SonIndex) -> Region {
        match self {
            Region::Rect([x0, y0, x1, y1]) => {
                let (xm, ym) = ((x0 + x1) / 2, (y0 + y1) / 2);
                let (x0, y0, x1, y1) = (*x0, *y0, *x1, *y1);
                Region::Rect(match son {
                    0 => [x0, y0, xm, ym],
                    1 => [xm, y0, x1, ym],
                    2 => [xm, ym, x1, y1],
                    3 => [x0, ym, xm, y1],
                    4 => [x0, y0, x1, ym],
                    5 => [x0, ym, x1, y1],
                    6 => [x0, y0, xm, y1],
                    _ => [xm, y0, x1, y1],
                })
            }
            Region::Chain(chain) => {
                let mut chain = chain.clone();
                chain.push(son);
                Region::Chain(chain)
            }
        }
    }

    fn contains(&self, other: &Region) -> bool {
        match (self, other) {
            (Region::Rect([x0, y0, x1, y1]), Region::Rect([a0, b0, a1, b1])) => {
                x0 <= a0 && a1 <= x1 && y0 <= b0 && b1 <= y1
            }
            (Region::Chain(outer), Region::Chain(inner)) => inner.starts_with(outer),
            _ => false,
        }
    }

    /// The map from the reference element of `self` into the reference element of `outer`.
    fn transform_into(&self, outer: &Region) -> Ctm {
        match (self, outer) {
            (Region::Rect([x0, y0, x1, y1]), Region::Rect([ex0, ey0, ex1, ey1])) => {
                let (wx, wy) = ((ex1 - ex0) as f64, (ey1 - ey0) as f64);
                Ctm {
                    m: [(x1 - x0) as f64 / wx, (y1 - y0) as f64 / wy],
                    t: [
                        (*x0 as f64 + *x1 as f64 - *ex0 as f64 - *ex1 as f64) / wx,
                        (*y0 as f64 + *y1 as f64 - *ey0 as f64 - *ey1 as f64) / wy,
                    ],
                }
            }
            (Region::Chain(inner), Region::Chain(outer)) => inner[outer.len()..]
                .iter()
                .fold(Ctm::identity(), |ctm, &son| ctm.then(&Ctm::son(ReferenceShape::Triangle, son))),
            _ => Ctm::identity(),
        }
    }
}

#[derive(Debug, Clone)]
struct Frame {
    base: ElementId,
    region: Region,
    /// Per mesh, the current element and its region.
    elements: Vec<(ElementId, Region)>,
}

/// Iterator over the states of a multi-mesh traversal.
///
/// Several workers may pull states from one traversal behind a lock; the enumeration order
/// does not depend on how the states are distributed.
#[derive(Debug)]
pub struct Traverse {
    meshes: Vec<Arc<Mesh>>,
    stack: Vec<Frame>,
    next_id: usize,
}

impl Traverse {
    /// Starts a traversal of the given meshes, which must share the same base mesh.
    pub fn begin(meshes: Vec<Arc<Mesh>>) -> eyre::Result<Self> {
        let first = meshes
            .first()
            .ok_or_else(|| configuration_error("traversal needs at least one mesh"))?;
        if first.num_base_elements() == 0 {
            return Err(configuration_error("cannot traverse a mesh without elements"));
        }
        if let Some(m) = meshes.iter().position(|mesh| !mesh.same_base(first)) {
            return Err(configuration_error(format!(
                "mesh {} of the traversal does not share the base mesh of mesh 0",
                m
            )));
        }

        let stack = (0..first.num_base_elements())
            .rev()
            .map(|base| {
                let region = match first.element(base).shape() {
                    ReferenceShape::Triangle => Region::Chain(Vec::new()),
                    ReferenceShape::Quadrilateral => Region::Rect([0, 0, ONE, ONE]),
                };
                Frame {
                    base,
                    elements: vec![(base, region.clone()); meshes.len()],
                    region,
                }
            })
            .collect();
        debug!("traversal of {} mesh(es) started", meshes.len());

        Ok(Self {
            meshes,
            stack,
            next_id: 0,
        })
    }

    pub fn meshes(&self) -> &[Arc<Mesh>] {
        &self.meshes
    }

    /// Moves every mesh's element down to the smallest element still containing the region.
    fn descend(&self, frame: &mut Frame) {
        for (mesh, (element, element_region)) in self.meshes.iter().zip(frame.elements.iter_mut()) {
            loop {
                let current = mesh.element(*element);
                if current.is_active() {
                    break;
                }
                let son = current.sons().iter().find_map(|&(index, son)| {
                    let son_region = element_region.son(index);
                    son_region
                        .contains(&frame.region)
                        .then_some((son, son_region))
                });
                match son {
                    Some((son, son_region)) => {
                        *element = son;
                        *element_region = son_region;
                    }
                    None => break,
                }
            }
        }
    }

    /// Sons of the region needed to separate the sons of inactive elements.
    fn split(&self, frame: &Frame) -> Option<Vec<SonIndex>> {
        let (mut cut_x, mut cut_y) = (false, false);
        for (mesh, (element, element_region)) in self.meshes.iter().zip(&frame.elements) {
            let element = mesh.element(*element);
            if element.is_active() {
                continue;
            }
            match (&frame.region, element_region) {
                (Region::Chain(_), _) => return Some(vec![0, 1, 2, 3]),
                (Region::Rect([x0, y0, x1, y1]), Region::Rect([ex0, ey0, ex1, ey1])) => {
                    let (xm, ym) = ((ex0 + ex1) / 2, (ey0 + ey1) / 2);
                    for &(index, _) in element.sons() {
                        match index {
                            0..=3 => {
                                cut_x |= *x0 < xm && xm < *x1;
                                cut_y |= *y0 < ym && ym < *y1;
                            }
                            4 | 5 => cut_y |= *y0 < ym && ym < *y1,
                            _ => cut_x |= *x0 < xm && xm < *x1,
                        }
                    }
                }
                _ => {}
            }
        }
        match (cut_x, cut_y) {
            (true, true) => Some(vec![0, 1, 2, 3]),
            (false, true) => Some(vec![4, 5]),
            (true, false) => Some(vec![6, 7]),
            (false, false) => None,
        }
    }

    fn emit(&mut self, frame: Frame) -> State {
        let first = &self.meshes[0];
        let shape = first.element(frame.base).shape();
        let transforms: Vec<Ctm> = frame
            .elements
            .iter()
            .map(|(_, element_region)| frame.region.transform_into(element_region))
            .collect();
        let elements: Vec<Option<ElementId>> = frame.elements.iter().map(|(e, _)| Some(*e)).collect();

        let (e0, _) = frame.elements[0];
        let edge_markers: Vec<i32> = (0..shape.num_vertices())
            .map(|k| match transforms[0].edge_on_element(shape, k) {
                Some((edge, _, _)) => first.edge_marker(e0, edge),
                None => INTERIOR_EDGE_MARKER,
            })
            .collect();
        let bnd = edge_markers
            .iter()
            .map(|&marker| marker != INTERIOR_EDGE_MARKER)
            .collect();

        let id = self.next_id;
        self.next_id += 1;
        State {
            id,
            base: frame.base,
            shape,
            element_marker: first.element(e0).marker(),
            elements,
            transforms,
            edge_markers,
            bnd,
        }
    }
}

impl Iterator for Traverse {
    type Item = State;

    fn next(&mut self) -> Option<State> {
        while let Some(mut frame) = self.stack.pop() {
            self.descend(&mut frame);
            match self.split(&frame) {
                None => return Some(self.emit(frame)),
                Some(sons) => {
                    for &son in sons.iter().rev() {
                        self.stack.push(Frame {
                            base: frame.base,
                            region: frame.region.son(son),
                            elements: frame.elements.clone(),
                        });
                    }
                }
            }
        }
        None
    }
}
