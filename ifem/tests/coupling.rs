mod test_utils;

use approx::*;
use ifem::comm::SingleProcess;
use ifem::fe::q1;
use ifem::fluid::FluidSolver;
use ifem::fsi::{transfer, CellHints, Fsi, SolidGeometry};
use ifem::locator::locate;
use ifem::mesh::{CellSpec, Mesh, Point};
use ifem::Error;
use rand::prelude::*;
pub use test_utils::*;

fn pt(x: f64, y: f64) -> Point {
    Point::from_vec(vec![x, y])
}

fn in_solid_region(x: &Point) -> bool {
    (0..2).all(|d| x[d] >= 0.375 - 1e-12 && x[d] <= 0.625 + 1e-12)
}

/// The unit square without its upper right quarter.
fn l_shape() -> Mesh {
    let square = Mesh::hyper_rectangle(&[0.0, 0.0], &[1.0, 1.0], &[2, 2]);
    let specs = square
        .cells()
        .iter()
        .enumerate()
        .filter(|(cell, _)| *cell != 3)
        .map(|(_, c)| CellSpec {
            vertices: c.vertices.clone(),
            boundary_ids: vec![None; 4],
            material_id: 0,
            subdomain_id: 0,
            level: 0,
        })
        .collect();
    Mesh::from_cells(2, square.vertices().to_vec(), specs)
}

#[test]
fn point_in_solid_matches_cells() {
    init_logger();
    let mesh = l_shape();
    let geometry = SolidGeometry::new(&mesh);
    assert_eq!(geometry.boundaries.len(), 8);
    let oracle = |p: &Point| (0..mesh.n_cells()).any(|cell| mesh.point_inside(cell, p));

    // Lattice points hit vertices, horizontal edges and grazing rays.
    for i in 0..=8 {
        for j in 0..=8 {
            let p = pt(i as f64 / 8.0, j as f64 / 8.0);
            assert_eq!(geometry.point_in_solid(&mesh, &p), oracle(&p), "at {:?}", p.as_slice());
        }
    }

    let mut rng = StdRng::from_seed([42; 32]);
    for _ in 0..500 {
        let p = pt(rng.gen(), rng.gen());
        assert_eq!(geometry.point_in_solid(&mesh, &p), oracle(&p), "at {:?}", p.as_slice());
    }
    assert!(!geometry.point_in_solid(&mesh, &pt(0.75, 0.75)));
    assert!(geometry.point_in_solid(&mesh, &pt(0.5, 0.5)));
}

#[test]
fn nearby_queries_hit_the_hint() {
    let mesh = Mesh::hyper_rectangle(&[0.0, 0.0], &[1.0, 1.0], &[6, 5]);
    let mut rng = StdRng::from_seed([9; 32]);
    let mut hint = 0;
    for _ in 0..100 {
        let q = pt(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0));
        let first = locate(&mesh, &q, &mut hint).unwrap();
        assert_eq!(hint, first.cell);
        let nearby = pt(q[0] + 1e-11, q[1] - 1e-11);
        let second = locate(&mesh, &nearby, &mut hint).unwrap();
        assert_eq!(second.neighbor_walks, 0);
        assert_eq!(second.cell, first.cell);
    }
}

#[test]
fn zero_fluid_stress_gives_zero_traction() {
    init_logger();
    let params = fsi_params();
    let (mut solid, mut fluid) = coupled_solvers(&params);
    let mut fsi = Fsi::new(&mut solid, &mut fluid, params);
    fsi.collect_solid_boundaries().unwrap();
    fsi.find_solid_bc().unwrap();
    let solid = fsi.solid();
    for cell in 0..solid.mesh.n_cells() {
        for p in solid.cell_property.get(cell).unwrap() {
            assert_eq!(p.fsi_traction, Point::zeros(2));
        }
    }
}

#[test]
fn fluid_pressure_pushes_on_the_solid() {
    init_logger();
    let params = fsi_params();
    let (mut solid, mut fluid) = coupled_solvers(&params);
    {
        let fields = fluid.fields_mut();
        let nc = fields.fe.n_components;
        for dof in (2..fields.present_solution.len()).step_by(nc) {
            fields.present_solution[dof] = 2.0;
        }
    }
    let reference = solid.mesh.vertices().to_vec();
    let mut fsi = Fsi::new(&mut solid, &mut fluid, params);
    fsi.collect_solid_boundaries().unwrap();
    fsi.find_solid_bc().unwrap();

    let solid = fsi.solid();
    assert_eq!(solid.mesh.vertices(), reference.as_slice());
    let n_face_q = solid.face_quadrature.size();
    for cell in 0..solid.mesh.n_cells() {
        let property = solid.cell_property.get(cell).unwrap();
        for face in 0..q1::faces_per_cell(2) {
            let expected = if solid.mesh.at_boundary(cell, face) {
                q1::unit_normal(2, face) * -2.0
            } else {
                Point::zeros(2)
            };
            for q in 0..n_face_q {
                let traction = &property[face * n_face_q + q].fsi_traction;
                assert_relative_eq!(traction[0], expected[0], epsilon = 1e-12);
                assert_relative_eq!(traction[1], expected[1], epsilon = 1e-12);
            }
        }
    }
}

#[test]
fn interior_constraints_follow_the_solid() {
    init_logger();
    let mut params = fsi_params();
    params.solid_rho = 2.0;
    params.gravity = vec![0.0, -1.0];
    let (mut solid, mut fluid) = coupled_solvers(&params);
    let solid_velocity = [0.3, -0.2];
    for (dof, v) in solid.fields.current.velocity.iter_mut().enumerate() {
        *v = solid_velocity[dof % 2];
    }
    set_fluid_velocity(&mut fluid, &[0.1, 0.05]);

    {
        let mut fsi = Fsi::new(&mut solid, &mut fluid, params.clone());
        fsi.collect_solid_boundaries().unwrap();
        fsi.setup_cell_hints();
        // Nine fluid vertices lie in or on the solid.
        assert_eq!(fsi.find_fluid_bc().unwrap(), 18);

        let fields = fsi.fluid().fields();
        for (vertex, x) in fields.mesh.vertices().iter().enumerate() {
            for c in 0..2 {
                let dof = fields.dof_handler.vertex_dof(vertex, c);
                if in_solid_region(x) {
                    let delta = fields.nonzero_constraints.inhomogeneity(dof).unwrap();
                    assert_relative_eq!(delta + fields.present_solution[dof], solid_velocity[c], epsilon = 1e-12);
                    assert_eq!(fields.zero_constraints.inhomogeneity(dof), Some(0.0));
                } else if !fields.zero_constraints.is_constrained(dof) {
                    assert!(!fields.nonzero_constraints.is_constrained(dof));
                }
            }
        }

        let mut n_inside = 0;
        for cell in 0..fields.mesh.n_cells() {
            for p in fields.cell_property.get(cell).unwrap() {
                if p.indicator {
                    n_inside += 1;
                    assert_relative_eq!(p.fsi_acceleration[0], 0.0, epsilon = 1e-12);
                    assert_relative_eq!(p.fsi_acceleration[1], -1.0, epsilon = 1e-12);
                    assert_relative_eq!(p.fsi_stress.norm(), 0.0, epsilon = 1e-12);
                } else {
                    assert_eq!(p.fsi_acceleration, Point::zeros(2));
                }
            }
        }
        // Four fluid cells with four quadrature points each are covered by the solid.
        assert_eq!(n_inside, 16);
    }

    fluid.run_one_step(true).unwrap();
    let fields = fluid.fields();
    for (vertex, x) in fields.mesh.vertices().iter().enumerate() {
        if in_solid_region(x) {
            for c in 0..2 {
                let v = fields.present_solution[fields.dof_handler.vertex_dof(vertex, c)];
                assert_relative_eq!(v, solid_velocity[c], epsilon = 1e-6);
            }
        }
    }
}

#[test]
fn external_constraints_win_over_interior_ones() {
    init_logger();
    let mut params = fsi_params();
    // A solid touching the lower fluid wall.
    params.solid_lower = vec![0.375, 0.0];
    params.solid_upper = vec![0.625, 0.25];
    let (mut solid, mut fluid) = coupled_solvers(&params);
    for v in solid.fields.current.velocity.iter_mut() {
        *v = 1.0;
    }
    let mut fsi = Fsi::new(&mut solid, &mut fluid, params);
    fsi.collect_solid_boundaries().unwrap();
    fsi.setup_cell_hints();
    fsi.find_fluid_bc().unwrap();
    let fields = fsi.fluid().fields();
    for (vertex, x) in fields.mesh.vertices().iter().enumerate() {
        if x[1] == 0.0 && x[0] >= 0.375 && x[0] <= 0.625 {
            let dof = fields.dof_handler.vertex_dof(vertex, 0);
            assert_eq!(fields.nonzero_constraints.inhomogeneity(dof), Some(0.0));
        } else if x[1] == 0.125 && x[0] == 0.5 {
            let dof = fields.dof_handler.vertex_dof(vertex, 0);
            assert_eq!(fields.nonzero_constraints.inhomogeneity(dof), Some(1.0));
        }
    }
}

#[test]
fn staggered_steps_at_rest_stay_at_rest() {
    init_logger();
    let mut params = fsi_params();
    params.output_dir = temp_dir("fsi-rest");
    let (mut solid, mut fluid) = (
        ifem::SolidSolver::from_params(params.clone()).unwrap(),
        ifem::PenaltyFluid::from_params(params.clone()),
    );
    let reference = solid.mesh.vertices().to_vec();
    {
        let mut fsi = Fsi::new(&mut solid, &mut fluid, params);
        fsi.run().unwrap();
        assert_eq!(fsi.time().timestep(), 2);
    }
    assert_eq!(solid.time.timestep(), 2);
    assert_eq!(solid.mesh.vertices(), reference.as_slice());
    let current = &solid.fields.current;
    for field in [&current.displacement, &current.velocity, &current.acceleration] {
        for x in field.iter() {
            assert_relative_eq!(*x, 0.0, epsilon = 1e-12);
        }
    }
    for x in fluid.fields().present_solution.iter() {
        assert_relative_eq!(*x, 0.0, epsilon = 1e-12);
    }
}

/// Shifts every solid vertex by an amount that does not round trip through addition.
fn shift_solid(solid: &mut ifem::SolidSolver, shift: [f64; 2]) {
    for vertex in 0..solid.mesh.n_vertices() {
        for (d, s) in shift.iter().enumerate() {
            let dof = solid.dof_handler.vertex_dof(vertex, d);
            solid.fields.current.displacement[dof] = *s;
        }
    }
}

#[test]
fn failed_fluid_transfer_restores_the_solid() {
    init_logger();
    let params = fsi_params();
    let (mut solid, mut fluid) = coupled_solvers(&params);

    // The geometry still describes the full block while its upper right cell is gone, so
    // the fluid vertex at (0.625, 0.625) is inside the solid but in none of its cells.
    let geometry = SolidGeometry::new(&solid.mesh);
    let specs = solid
        .mesh
        .cells()
        .iter()
        .enumerate()
        .filter(|(cell, _)| {
            let center = solid.mesh.center(*cell);
            !(center[0] > 0.5 && center[1] > 0.5)
        })
        .map(|(_, c)| CellSpec {
            vertices: c.vertices.clone(),
            boundary_ids: c.boundary_ids.clone(),
            material_id: c.material_id,
            subdomain_id: c.subdomain_id,
            level: c.level,
        })
        .collect();
    solid.mesh = Mesh::from_cells(2, solid.mesh.vertices().to_vec(), specs);
    assert_eq!(solid.mesh.n_cells(), 3);
    shift_solid(&mut solid, [0.01 / 3.0, 0.01 / 7.0]);
    let reference = solid.mesh.vertices().to_vec();

    let fields = fluid.fields_mut();
    let mut hints = CellHints::new(&fields.mesh, 0, fields.fe.dofs_per_cell());
    match transfer::find_fluid_bc(fields, &mut solid, &geometry, &mut hints, &params) {
        Err(Error::PointNotFound { .. }) => {}
        other => panic!("expected a point outside the solid cells, got {:?}", other),
    }
    assert_eq!(solid.mesh.vertices(), reference.as_slice());
}

#[test]
fn failed_solid_transfer_restores_the_solid() {
    init_logger();
    let params = fsi_params();
    let (mut solid, fluid) = coupled_solvers(&params);
    // Mirroring the block about x = 0.5 turns every cell inside out.
    for vertex in 0..solid.mesh.n_vertices() {
        let x = solid.mesh.vertex(vertex)[0];
        let dof = solid.dof_handler.vertex_dof(vertex, 0);
        solid.fields.current.displacement[dof] = 1.0 - 2.0 * x + 0.01 / 3.0;
    }
    let reference = solid.mesh.vertices().to_vec();

    match transfer::find_solid_bc(&mut solid, fluid.fields(), params.viscosity, &SingleProcess) {
        Err(Error::DegenerateCell { .. }) => {}
        other => panic!("expected an inverted cell, got {:?}", other),
    }
    assert_eq!(solid.mesh.vertices(), reference.as_slice());
}
