//! Refinement of the fluid mesh around the solid.

use rayon::prelude::*;

use crate::mesh::{Mesh, RefinementFlags};

/// Fluid cells whose centre is closer than this to a solid cell centre are refined.
pub const REFINEMENT_PROXIMITY: f64 = 0.1;

/// Flags fluid cells near `solid` for refinement and all others for coarsening.
///
/// Refinement stops at `max_level` and coarsening at `min_level`.
pub fn refinement_flags(fluid: &Mesh, solid: &Mesh, min_level: u32, max_level: u32) -> RefinementFlags {
    let solid_centers: Vec<_> = (0..solid.n_cells()).map(|cell| solid.center(cell)).collect();
    let near: Vec<bool> = (0..fluid.n_cells())
        .into_par_iter()
        .map(|cell| {
            let center = fluid.center(cell);
            solid_centers
                .iter()
                .map(|s| (&center - s).norm())
                .fold(f64::INFINITY, f64::min)
                < REFINEMENT_PROXIMITY
        })
        .collect();

    let mut flags = RefinementFlags::new(fluid.n_cells());
    for (cell, &near) in near.iter().enumerate() {
        let level = fluid.cell(cell).level;
        flags.refine[cell] = near && level < max_level;
        flags.coarsen[cell] = !near && level > min_level;
    }
    flags
}
