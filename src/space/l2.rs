use super::{check_order, AsmList, Space};
use crate::error::configuration_error;
use crate::mesh::{ElementId, Mesh};
use crate::shapeset::{L2Shapeset, Shapeset};
use log::debug;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Discontinuous space of Legendre products. Allows arbitrary hanging nodes.
#[derive(Debug, Clone)]
pub struct L2Space {
    mesh: Arc<Mesh>,
    shapeset: Arc<dyn Shapeset>,
    orders: Vec<u32>,
    first_dofs: FxHashMap<ElementId, usize>,
    num_dofs: usize,
    seq: u64,
}

impl L2Space {
    pub fn new(mesh: Arc<Mesh>, order: u32) -> eyre::Result<Self> {
        check_order(order, 0)?;
        let mut space = Self {
            orders: vec![order; mesh.num_elements()],
            mesh,
            shapeset: Arc::new(L2Shapeset),
            first_dofs: FxHashMap::default(),
            num_dofs: 0,
            seq: 0,
        };
        space.assign_dofs();
        Ok(space)
    }

    fn assign_dofs(&mut self) {
        self.first_dofs.clear();
        let mut next = 0;
        for element in self.mesh.active_elements() {
            self.first_dofs.insert(element.id(), next);
            next += L2Shapeset::functions(element.shape(), self.orders[element.id()]).len();
        }
        self.num_dofs = next;
        debug!("L2 space: {} dofs", next);
    }
}

impl Space for L2Space {
    fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    fn shapeset(&self) -> &Arc<dyn Shapeset> {
        &self.shapeset
    }

    fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    fn seq(&self) -> u64 {
        self.seq
    }

    fn element_order(&self, element: ElementId) -> u32 {
        self.orders[element]
    }

    fn edge_order(&self, element: ElementId, _edge: usize) -> u32 {
        self.orders[element]
    }

    fn element_assembly_list(&self, element: ElementId, list: &mut AsmList, offset: usize) {
        list.clear();
        let first = self.first_dofs[&element];
        let shape = self.mesh.element(element).shape();
        for (n, function) in L2Shapeset::functions(shape, self.orders[element])
            .into_iter()
            .enumerate()
        {
            list.push(function, Some(first + n + offset), 1.0);
        }
    }

    fn boundary_assembly_list(&self, element: ElementId, _edge: usize, list: &mut AsmList, offset: usize) {
        self.element_assembly_list(element, list, offset);
    }

    fn set_uniform_order(&mut self, order: u32) -> eyre::Result<()> {
        check_order(order, 0)?;
        self.orders.iter_mut().for_each(|o| *o = order);
        self.assign_dofs();
        self.seq += 1;
        Ok(())
    }

    fn set_element_order(&mut self, element: ElementId, order: u32) -> eyre::Result<()> {
        check_order(order, 0)?;
        if !self.mesh.elements().get(element).map_or(false, |e| e.is_active()) {
            return Err(configuration_error(format!("element {} is not an active element", element)));
        }
        self.orders[element] = order;
        self.assign_dofs();
        self.seq += 1;
        Ok(())
    }
}
