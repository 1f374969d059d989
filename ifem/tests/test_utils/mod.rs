pub use ifem::test_utils::*;

use ifem::fluid::FluidSolver;
use ifem::{Parameters, PenaltyFluid, SolidSolver};

/// Solid and fluid ready for coupling, with fresh dofs and zero fields.
#[allow(dead_code)]
pub fn coupled_solvers(params: &Parameters) -> (SolidSolver, PenaltyFluid) {
    let mut solid = SolidSolver::from_params(params.clone()).unwrap();
    solid.setup_dofs().unwrap();
    solid.initialize_system().unwrap();
    let mut fluid = PenaltyFluid::from_params(params.clone());
    fluid.setup_dofs().unwrap();
    fluid.make_constraints().unwrap();
    fluid.initialize_system().unwrap();
    (solid, fluid)
}

/// Sets every velocity dof of the fluid to `velocity`.
#[allow(dead_code)]
pub fn set_fluid_velocity(fluid: &mut PenaltyFluid, velocity: &[f64]) {
    let fields = fluid.fields_mut();
    let nc = fields.fe.n_components;
    for (dof, v) in fields.present_solution.iter_mut().enumerate() {
        if let Some(&target) = velocity.get(dof % nc) {
            *v = target;
        }
    }
}

pub fn init_logger() {
    let _ = env_logger::Builder::from_env("IFEM_LOG")
        .is_test(true)
        .try_init();
}
