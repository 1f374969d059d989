//! Point sampled exchange between the fluid and the solid.

use crate::comm::Communicator;
use crate::constraints::{AffineConstraints, MergeConflictBehavior};
use crate::fe::{q1, FeFaceValues, FeValues};
use crate::fluid::{FluidCellProperty, FluidFields};
use crate::locator::{locate, GridInterpolator};
use crate::mesh::{Ownership, Point};
use crate::params::Parameters;
use crate::solid::material::Tensor2;
use crate::solid::SolidSolver;
use crate::{Error, Result};

use super::geometry::SolidGeometry;
use super::hints::CellHints;
use super::mover::DeformedConfiguration;

/// Reference coordinates closer than this to 0 or 1 lie on the boundary of the unit cell.
const UNIT_CELL_TOLERANCE: f64 = 1e-5;

/// Newtonian fluid stress `-p I + 2 μ sym(∇v)`.
pub fn fluid_stress(pressure: f64, velocity_gradient: &Tensor2, viscosity: f64) -> Tensor2 {
    let dim = velocity_gradient.nrows();
    let sym = (velocity_gradient + velocity_gradient.transpose()) * 0.5;
    Tensor2::identity(dim, dim) * -pressure + sym * (2.0 * viscosity)
}

/// Samples the fluid stress at `x` on the locally owned fluid cells and sums the samples
/// over all ranks. Points outside the fluid mesh see zero stress.
pub fn sample_fluid_stress(
    fluid: &FluidFields,
    viscosity: f64,
    comm: &dyn Communicator,
    x: &Point,
    hint: &mut usize,
) -> Tensor2 {
    let dim = fluid.dim();
    let nc = fluid.fe.n_components;
    // Value of every component followed by the gradient of every component.
    let mut sample = vec![0.0; nc + nc * dim];
    if let Some(location) = locate(&fluid.mesh, x, hint) {
        if fluid.mesh.cell(location.cell).subdomain_id == fluid.rank {
            let interpolator = GridInterpolator::new(&fluid.mesh, location);
            let value = interpolator.point_value(&fluid.dof_handler, &fluid.present_solution);
            let gradient = interpolator.point_gradient(&fluid.dof_handler, &fluid.present_solution);
            sample[..nc].copy_from_slice(&value);
            for (c, g) in gradient.iter().enumerate() {
                sample[nc + c * dim..nc + (c + 1) * dim].copy_from_slice(g.as_slice());
            }
        }
    }
    comm.sum(&mut sample);
    let grad_v = Tensor2::from_fn(dim, dim, |i, j| sample[nc + i * dim + j]);
    fluid_stress(sample[dim], &grad_v, viscosity)
}

/// Stores the fluid traction `σ n` at every boundary face quadrature point of the solid.
///
/// Quadrature points are placed on the deformed solid, normals are taken from the
/// reference configuration.
pub fn find_solid_bc(
    solid: &mut SolidSolver,
    fluid: &FluidFields,
    viscosity: f64,
    comm: &dyn Communicator,
) -> Result<()> {
    let dim = solid.mesh.dim();
    let n_face_q = solid.face_quadrature.size();
    let mut face_values = FeFaceValues::new(dim, solid.face_quadrature.clone());

    let mut faces = Vec::new();
    for cell in 0..solid.mesh.n_cells() {
        for face in 0..q1::faces_per_cell(dim) {
            if solid.mesh.at_boundary(cell, face) {
                face_values.reinit(&solid.mesh, cell, face)?;
                let normals: Vec<Point> = (0..n_face_q)
                    .map(|q| face_values.normal_vector(q).clone())
                    .collect();
                faces.push((cell, face, normals));
            }
        }
    }

    let deformed = DeformedConfiguration::new(
        &mut solid.mesh,
        &solid.dof_handler,
        &solid.fields.current.displacement,
    )?;
    let mut hint = 0;
    for (cell, face, normals) in faces {
        face_values.reinit(&deformed, cell, face)?;
        let property = match solid.cell_property.get_mut(cell) {
            Some(property) => property,
            None => continue,
        };
        for (q, normal) in normals.iter().enumerate() {
            let stress = sample_fluid_stress(fluid, viscosity, comm, face_values.quadrature_point(q), &mut hint);
            property[face * n_face_q + q].fsi_traction = stress * normal;
        }
    }
    Ok(())
}

/// Interior Dirichlet constraints and forcing injected into the fluid.
///
/// Velocity dofs whose support point lies in the deformed solid are constrained to move
/// to the solid velocity. Quadrature points of owned fluid cells inside the solid get
/// the indicator, the FSI acceleration and the FSI stress. The new constraints are
/// merged into the fluid's sets, where existing lines win. Returns the number of
/// interior constraints.
pub fn find_fluid_bc(
    fluid: &mut FluidFields,
    solid: &mut SolidSolver,
    geometry: &SolidGeometry,
    hints: &mut CellHints,
    params: &Parameters,
) -> Result<usize> {
    let deformed = DeformedConfiguration::new(
        &mut solid.mesh,
        &solid.dof_handler,
        &solid.fields.current.displacement,
    )?;
    let velocity = &solid.fields.current.velocity;
    let acceleration = &solid.fields.current.acceleration;

    let FluidFields {
        mesh,
        fe,
        dof_handler,
        volume_quadrature,
        present_solution,
        cell_property,
        nonzero_constraints,
        zero_constraints,
        rank,
        ..
    } = fluid;
    let dim = mesh.dim();
    let unit_points = fe.unit_support_points();
    let density_difference = params.solid_rho - params.fluid_rho;
    let gravity = Point::from_fn(dim, |d, _| params.gravity.get(d).copied().unwrap_or(0.0));

    let mut inner_nonzero = AffineConstraints::new();
    let mut inner_zero = AffineConstraints::new();
    let mut dof_touched = vec![false; dof_handler.n_dofs()];
    let mut fe_values = FeValues::new(dim, volume_quadrature.clone());
    let mut solid_hint = 0;

    for (cell, ownership) in mesh.ownership(*rank).into_iter().enumerate() {
        if ownership == Ownership::Artificial {
            continue;
        }
        let dofs = dof_handler.cell_dofs(mesh, cell);
        for (i, unit_point) in unit_points.iter().enumerate() {
            let dof = dofs[i];
            if dof_touched[dof] {
                continue;
            }
            let (component, vertex) = fe.system_to_component_index(i);
            if component == dim {
                continue;
            }
            let on_cell_boundary = unit_point
                .iter()
                .any(|&xi| xi < UNIT_CELL_TOLERANCE || xi > 1.0 - UNIT_CELL_TOLERANCE);
            if !on_cell_boundary {
                continue;
            }
            dof_touched[dof] = true;
            let x = mesh.vertex(mesh.cell(cell).vertices[vertex]);
            if !geometry.point_in_solid(&deformed, x) {
                continue;
            }
            let interpolator = hints.locate(&deformed, cell, i, x)?;
            let v_s = interpolator.point_value(&solid.dof_handler, velocity);
            // The fluid solves for an increment.
            inner_nonzero.set_inhomogeneity(dof, v_s[component] - present_solution[dof]);
            inner_zero.add_line(dof);
        }

        if ownership != Ownership::LocallyOwned {
            continue;
        }
        let property = match cell_property.get_mut(cell) {
            Some(property) => property,
            None => continue,
        };
        fe_values.reinit(mesh, cell)?;
        let local = dof_handler.cell_values(mesh, cell, present_solution);
        for (q, p) in property.iter_mut().enumerate() {
            let xq = fe_values.quadrature_point(q);
            *p = FluidCellProperty::zeros(dim);
            p.indicator = geometry.point_in_solid(&deformed, xq);
            if !p.indicator {
                continue;
            }
            let location = locate(&deformed, xq, &mut solid_hint).ok_or_else(|| Error::PointNotFound {
                point: xq.iter().copied().collect(),
            })?;
            let interpolator = GridInterpolator::new(&deformed, location);
            let a_s = interpolator.point_value(&solid.dof_handler, acceleration);
            p.fsi_acceleration = Point::from_fn(dim, |i, _| density_difference * (gravity[i] - a_s[i]));

            let sigma_s = Tensor2::from_fn(dim, dim, |i, j| {
                interpolator.point_value(&solid.dg_dof_handler, solid.stress.component(i, j))[0]
            });
            let pressure = fe_values.component_value(&local, fe, dim, q);
            let grad_v = fe_values.vector_gradient(&local, fe, q);
            p.fsi_stress = fluid_stress(pressure, &grad_v, params.viscosity) - sigma_s;
        }
    }

    inner_nonzero.close();
    inner_zero.close();
    nonzero_constraints.merge(&inner_nonzero, MergeConflictBehavior::LeftObjectWins);
    zero_constraints.merge(&inner_zero, MergeConflictBehavior::LeftObjectWins);
    Ok(inner_zero.n_constraints())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn stress_of_a_shear_flow() {
        // v = (y, 0)
        let grad = Tensor2::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]);
        let sigma = fluid_stress(2.0, &grad, 0.5);
        assert_relative_eq!(sigma[(0, 0)], -2.0);
        assert_relative_eq!(sigma[(1, 1)], -2.0);
        assert_relative_eq!(sigma[(0, 1)], 0.5);
        assert_relative_eq!(sigma[(1, 0)], 0.5);
    }
}
