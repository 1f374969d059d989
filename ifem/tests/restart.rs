mod test_utils;

use approx::*;
use ifem::fluid::FluidSolver;
use ifem::{io, Error, Fsi, Parameters, PenaltyFluid, SolidSolver};
pub use test_utils::*;

fn falling_block(name: &str) -> Parameters {
    let mut params = fsi_params();
    params.solid_rho = 2.0;
    params.gravity = vec![0.0, -1.0];
    params.save_interval = 0.01;
    params.output_dir = temp_dir(name);
    params
}

fn run_coupled(params: &Parameters) -> Result<(SolidSolver, PenaltyFluid), Error> {
    let mut solid = SolidSolver::from_params(params.clone())?;
    let mut fluid = PenaltyFluid::from_params(params.clone());
    Fsi::new(&mut solid, &mut fluid, params.clone()).run()?;
    Ok((solid, fluid))
}

#[test]
fn restart_continues_the_same_trajectory() {
    init_logger();
    let mut params = falling_block("restart-split");
    params.end_time = 0.01;
    let (solid, _) = run_coupled(&params).unwrap();
    assert_eq!(solid.time.timestep(), 1);
    assert!(io::checkpoint_path(&params.output_dir, "solid", 1).exists());
    assert!(io::checkpoint_path(&params.output_dir, "fluid", 1).exists());

    params.end_time = 0.02;
    let (restarted_solid, restarted_fluid) = run_coupled(&params).unwrap();
    assert_eq!(restarted_solid.time.timestep(), 2);

    let direct = falling_block("restart-direct");
    let (solid, fluid) = run_coupled(&Parameters {
        end_time: 0.02,
        ..direct
    })
    .unwrap();

    assert!(solid.fields.current.displacement.iter().any(|u| u.abs() > 0.0));

    for (a, b) in restarted_solid
        .fields
        .current
        .displacement
        .iter()
        .zip(solid.fields.current.displacement.iter())
    {
        assert_relative_eq!(a, b, epsilon = 1e-12, max_relative = 1e-9);
    }
    for (a, b) in restarted_solid
        .fields
        .current
        .acceleration
        .iter()
        .zip(solid.fields.current.acceleration.iter())
    {
        assert_relative_eq!(a, b, epsilon = 1e-10, max_relative = 1e-9);
    }
    let (a, b) = (restarted_fluid.fields(), fluid.fields());
    assert_eq!(a.present_solution.len(), b.present_solution.len());
    for (a, b) in a.present_solution.iter().zip(b.present_solution.iter()) {
        assert_relative_eq!(a, b, epsilon = 1e-10, max_relative = 1e-9);
    }
}

#[test]
fn finished_runs_do_nothing_on_restart() {
    init_logger();
    let params = falling_block("restart-finished");
    let (solid, _) = run_coupled(&params).unwrap();
    let (again, _) = run_coupled(&params).unwrap();
    assert_eq!(again.time.timestep(), solid.time.timestep());
    assert_eq!(again.fields, solid.fields);
}

#[test]
fn mismatched_checkpoints_abort() {
    init_logger();
    let mut params = falling_block("restart-mismatch");
    params.end_time = 0.01;
    run_coupled(&params).unwrap();
    std::fs::remove_file(io::checkpoint_path(&params.output_dir, "fluid", 1)).unwrap();
    match run_coupled(&params) {
        Err(Error::CheckpointMismatch { solid, fluid }) => {
            assert_relative_eq!(solid, 0.01);
            assert_eq!(fluid, 0.0);
        }
        other => panic!("expected a checkpoint mismatch, got {:?}", other.err()),
    }
}
