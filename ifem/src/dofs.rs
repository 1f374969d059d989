//! Degree of freedom numbering.

use crate::fe::q1;
use crate::mesh::{CellId, Mesh};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DofLayout {
    /// Dofs live on mesh vertices and are shared between cells: `vertex * nc + c`.
    Continuous,
    /// Every cell owns a private copy of its vertex dofs: `(cell * nv + v) * nc + c`.
    Discontinuous,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DofHandler {
    pub n_components: usize,
    pub layout: DofLayout,
    dofs_per_vertex_set: usize,
    n_dofs: usize,
}

impl DofHandler {
    pub fn new(mesh: &Mesh, n_components: usize, layout: DofLayout) -> Self {
        let nv = q1::vertices_per_cell(mesh.dim());
        let n_dofs = match layout {
            DofLayout::Continuous => mesh.n_vertices() * n_components,
            DofLayout::Discontinuous => mesh.n_cells() * nv * n_components,
        };
        DofHandler {
            n_components,
            layout,
            dofs_per_vertex_set: nv,
            n_dofs,
        }
    }

    pub fn n_dofs(&self) -> usize {
        self.n_dofs
    }

    /// Global dofs of a cell in local order (vertex-major, then component).
    pub fn cell_dofs(&self, mesh: &Mesh, cell: CellId) -> Vec<usize> {
        let nc = self.n_components;
        let vertices = &mesh.cell(cell).vertices;
        let mut dofs = Vec::with_capacity(vertices.len() * nc);
        for (v, &vertex) in vertices.iter().enumerate() {
            for c in 0..nc {
                dofs.push(match self.layout {
                    DofLayout::Continuous => vertex * nc + c,
                    DofLayout::Discontinuous => (cell * self.dofs_per_vertex_set + v) * nc + c,
                });
            }
        }
        dofs
    }

    /// Dof of component `c` at a mesh vertex. Only meaningful for continuous layouts.
    pub fn vertex_dof(&self, vertex: usize, c: usize) -> usize {
        debug_assert_eq!(self.layout, DofLayout::Continuous);
        vertex * self.n_components + c
    }

    /// Gathers the local values of `global` on `cell`.
    pub fn cell_values(&self, mesh: &Mesh, cell: CellId, global: &[f64]) -> Vec<f64> {
        self.cell_dofs(mesh, cell).into_iter().map(|d| global[d]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering() {
        let mesh = Mesh::hyper_rectangle(&[0.0, 0.0], &[2.0, 1.0], &[2, 1]);
        let cg = DofHandler::new(&mesh, 2, DofLayout::Continuous);
        assert_eq!(cg.n_dofs(), 12);
        assert_eq!(cg.cell_dofs(&mesh, 1), vec![2, 3, 4, 5, 8, 9, 10, 11]);
        let dg = DofHandler::new(&mesh, 1, DofLayout::Discontinuous);
        assert_eq!(dg.n_dofs(), 8);
        assert_eq!(dg.cell_dofs(&mesh, 1), vec![4, 5, 6, 7]);
    }
}
