use crate::function::{Func, Geom};
use crate::refmap::RefMap;
use crate::space::AsmList;
use nalgebra::DMatrix;
use rustc_hash::FxHashMap;

/// Integration weights and geometry of one integral, seen from one mesh.
#[derive(Debug, Clone, Default)]
pub(crate) struct Integral {
    pub wt: Vec<f64>,
    pub geom: Geom<f64>,
}

/// Identifies an integral over the current region (`edge == None`) or one of its edges.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct IntegralKey {
    pub mesh: usize,
    pub order: u32,
    pub edge: Option<usize>,
}

/// Scratch data of one worker thread.
///
/// Everything cached here is only valid for the state passed to the last call of
/// [`AssemblyBuffers::begin_state`].
#[derive(Debug)]
pub(crate) struct AssemblyBuffers {
    /// Per space, the assembly list of the element covering the region.
    pub lists: Vec<AsmList>,
    /// Per space, the assembly list restricted to the edge being integrated.
    pub edge_lists: Vec<AsmList>,
    /// Per traversal mesh, the reference map of the element covering the region.
    pub refmaps: Vec<Option<RefMap>>,
    pub integrals: FxHashMap<IntegralKey, Integral>,
    /// Shape functions of `lists` or `edge_lists` (for edge integrals), keyed by space.
    pub functions: FxHashMap<IntegralKey, Vec<Func<f64>>>,
    pub local: DMatrix<f64>,
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
}

impl Default for AssemblyBuffers {
    fn default() -> Self {
        Self {
            lists: Vec::new(),
            edge_lists: Vec::new(),
            refmaps: Vec::new(),
            integrals: FxHashMap::default(),
            functions: FxHashMap::default(),
            local: DMatrix::zeros(0, 0),
            rows: Vec::new(),
            cols: Vec::new(),
        }
    }
}

impl AssemblyBuffers {
    pub fn begin_state(&mut self, num_spaces: usize, num_meshes: usize) {
        self.lists.resize_with(num_spaces, AsmList::new);
        self.edge_lists.resize_with(num_spaces, AsmList::new);
        self.refmaps.clear();
        self.refmaps.resize(num_meshes, None);
        self.integrals.clear();
        self.functions.clear();
    }

    /// Forgets the shape functions of edge integrals, whose lists are about to change.
    pub fn begin_edge(&mut self) {
        self.functions.retain(|key, _| key.edge.is_none());
    }
}
