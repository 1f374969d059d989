//! Per fluid cell cache of the solid cells last found around its support points.

use crate::cell_data::CellDataStorage;
use crate::locator::{locate, GridInterpolator};
use crate::mesh::{CellId, Mesh, Ownership, Point};
use crate::{Error, Result};

/// One solid cell hint per support point of every non-artificial fluid cell.
#[derive(Clone, Debug, Default)]
pub struct CellHints {
    hints: CellDataStorage<CellId>,
}

impl CellHints {
    /// Seeds every slot with the first solid cell.
    pub fn new(fluid_mesh: &Mesh, rank: usize, n_support_points: usize) -> Self {
        let mut hints = CellDataStorage::new();
        for (cell, ownership) in fluid_mesh.ownership(rank).into_iter().enumerate() {
            if ownership != Ownership::Artificial {
                hints.initialize(cell, n_support_points, 0);
            }
        }
        CellHints { hints }
    }

    pub fn get(&self, fluid_cell: CellId) -> Option<&[CellId]> {
        self.hints.get(fluid_cell)
    }

    pub fn n_cells(&self) -> usize {
        self.hints.n_cells()
    }

    /// Locates `q` in `solid_mesh` starting from the hint of `(fluid_cell, slot)` and
    /// updates the hint. Cells without hints search from the first solid cell.
    pub fn locate<'m>(
        &mut self,
        solid_mesh: &'m Mesh,
        fluid_cell: CellId,
        slot: usize,
        q: &Point,
    ) -> Result<GridInterpolator<'m>> {
        let mut scratch = 0;
        let hint = self
            .hints
            .get_mut(fluid_cell)
            .and_then(|hints| hints.get_mut(slot))
            .unwrap_or(&mut scratch);
        locate(solid_mesh, q, hint)
            .map(|location| GridInterpolator::new(solid_mesh, location))
            .ok_or_else(|| Error::PointNotFound {
                point: q.iter().copied().collect(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artificial_cells_have_no_hints() {
        let mut fluid = Mesh::hyper_rectangle(&[0.0, 0.0], &[1.0, 1.0], &[4, 1]);
        fluid.set_subdomain_ids(|cell, _| if cell < 2 { 0 } else { 1 });
        let hints = CellHints::new(&fluid, 0, 8);
        // Cells 0 and 1 are owned, 2 is a ghost and 3 is artificial.
        assert_eq!(hints.n_cells(), 3);
        assert_eq!(hints.get(0), Some(&[0; 8][..]));
        assert!(hints.get(3).is_none());
    }

    #[test]
    fn hint_follows_the_last_hit() {
        let solid = Mesh::hyper_rectangle(&[0.0, 0.0], &[1.0, 1.0], &[4, 4]);
        let fluid = Mesh::hyper_rectangle(&[0.0, 0.0], &[1.0, 1.0], &[1, 1]);
        let mut hints = CellHints::new(&fluid, 0, 8);
        let q = Point::from_vec(vec![0.9, 0.9]);
        let found = hints.locate(&solid, 0, 3, &q).unwrap();
        assert!(solid.point_inside(found.cell(), &q));
        assert_eq!(hints.get(0).unwrap()[3], found.cell());
        assert_eq!(hints.get(0).unwrap()[2], 0);

        let missing = hints.locate(&solid, 0, 3, &Point::from_vec(vec![2.0, 0.5]));
        match missing {
            Err(Error::PointNotFound { point }) => assert_eq!(point, vec![2.0, 0.5]),
            other => panic!("unexpected result {:?}", other.map(|i| i.cell())),
        }
    }
}
