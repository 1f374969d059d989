//! Shared fixtures for unit and integration tests.

use std::path::PathBuf;

use crate::params::{NeumannBcType, Parameters, SimulationType, SolidType};

/*
 * Setup code
 */

/// A fresh, empty directory under the system temp dir unique to `name` and this process.
pub fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ifem-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let _ = std::fs::create_dir_all(&dir);
    dir
}

/// A soft Neo-Hookean block on a 2D unit box, fixed on its left side and pulled to the right.
pub fn solid_params() -> Parameters {
    let mut params = Parameters {
        dimension: 2,
        simulation_type: SimulationType::Solid,
        end_time: 0.05,
        time_step: 0.01,
        output_interval: 1.0,
        save_interval: 1.0,
        refinement_interval: 1.0,
        global_refinements: [0, 1],
        solid_type: SolidType::NeoHookean,
        c: vec![vec![10.0, 1000.0]],
        solid_rho: 1.0,
        solid_neumann_bc_type: NeumannBcType::Traction,
        solid_lower: vec![0.0, 0.0],
        solid_upper: vec![1.0, 1.0],
        solid_subdivisions: vec![2, 2],
        ..Parameters::default()
    };
    params.solid_dirichlet_bcs.insert(0, 3);
    params.solid_neumann_bcs.insert(1, vec![1.0, 0.0]);
    params.fill_geometry_defaults();
    params
}

/// A small 2D fluid channel with a solid block in its middle.
pub fn fsi_params() -> Parameters {
    let mut params = Parameters {
        dimension: 2,
        simulation_type: SimulationType::FSI,
        end_time: 0.02,
        time_step: 0.01,
        output_interval: 1.0,
        save_interval: 1.0,
        refinement_interval: 1.0,
        global_refinements: [1, 0],
        solid_type: SolidType::LinearElastic,
        youngs_modulus: vec![1.0e3],
        nu: vec![0.3],
        solid_rho: 1.0,
        fluid_rho: 1.0,
        viscosity: 1.0e-2,
        solid_neumann_bc_type: NeumannBcType::FSI,
        fluid_lower: vec![0.0, 0.0],
        fluid_upper: vec![1.0, 1.0],
        fluid_subdivisions: vec![4, 4],
        solid_lower: vec![0.375, 0.375],
        solid_upper: vec![0.625, 0.625],
        solid_subdivisions: vec![2, 2],
        ..Parameters::default()
    };
    for id in 0..4 {
        params.fluid_dirichlet_bcs.insert(id, vec![0.0, 0.0]);
    }
    params.fill_geometry_defaults();
    params
}
