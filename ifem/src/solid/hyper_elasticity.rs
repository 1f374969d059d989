//! Total Lagrangian hyperelasticity with a Neo-Hookean material.

use crate::cell_data::CellDataStorage;
use crate::fe::{q1, FeFaceValues, FeValues};
use crate::matrix::TripletMatrix;
use crate::mesh::{CellId, Point};
use crate::params::Parameters;
use crate::{Error, Result};

use super::material::{NeoHookean, Tensor2, Tensor4};
use super::{LinearSystem, NodalTensorField, SolidContext, SolidModel};

/// Deformation dependent state of one quadrature point.
#[derive(Clone, Debug, PartialEq)]
pub struct PointHistory {
    pub f_inv: Tensor2,
    /// Kirchhoff stress.
    pub tau: Tensor2,
    pub jc: Tensor4,
    pub det_f: f64,
    pub dpsi_vol_dj: f64,
    pub d2psi_vol_dj2: f64,
}

impl PointHistory {
    fn new(material: &NeoHookean, f: &Tensor2) -> Option<Self> {
        let response = material.evaluate(f)?;
        Some(PointHistory {
            f_inv: f.clone().try_inverse()?,
            tau: response.tau,
            jc: response.jc,
            det_f: response.det_f,
            dpsi_vol_dj: response.dpsi_vol_dj,
            d2psi_vol_dj2: response.d2psi_vol_dj2,
        })
    }

    /// Deformation gradient `F`.
    pub fn deformation_gradient(&self) -> Option<Tensor2> {
        self.f_inv.clone().try_inverse()
    }

    /// Cauchy stress `τ / J`.
    pub fn cauchy_stress(&self) -> Tensor2 {
        &self.tau / self.det_f
    }
}

#[derive(Clone, Debug)]
pub struct HyperElasticity {
    materials: Vec<NeoHookean>,
    history: CellDataStorage<PointHistory>,
}

impl HyperElasticity {
    /// Reads `C = [C1, kappa]` of every solid part.
    pub fn new(params: &Parameters) -> Result<Self> {
        let materials = (0..params.n_solid_parts)
            .map(|part| match params.c.get(part).map(Vec::as_slice) {
                Some([c1, kappa, ..]) => Ok(NeoHookean::new(*c1, *kappa)),
                _ => Err(Error::InvalidParameter {
                    name: "C".to_string(),
                    reason: format!("expected C1 and kappa for solid part {}", part),
                }),
            })
            .collect::<Result<_>>()?;
        Ok(HyperElasticity {
            materials,
            history: CellDataStorage::new(),
        })
    }

    pub fn history(&self, cell: CellId) -> Option<&[PointHistory]> {
        self.history.get(cell)
    }

    fn material(&self, ctx: &SolidContext, cell: CellId) -> Result<&NeoHookean> {
        Ok(&self.materials[ctx.material_index(cell)?])
    }
}

impl SolidModel for HyperElasticity {
    fn is_linear(&self) -> bool {
        false
    }

    fn setup(&mut self, ctx: &SolidContext) -> Result<()> {
        let dim = ctx.mesh.dim();
        let identity = Tensor2::identity(dim, dim);
        self.history.clear();
        for cell in ctx.owned_cells() {
            let material = self.material(ctx, cell)?;
            let rest = PointHistory::new(material, &identity).ok_or(Error::DegenerateCell { cell })?;
            self.history
                .initialize(cell, ctx.volume_quadrature.size(), rest);
        }
        Ok(())
    }

    fn assemble(&mut self, ctx: &SolidContext, system: &mut LinearSystem, initial: bool) -> Result<()> {
        let dim = ctx.mesh.dim();
        let fe = ctx.fe;
        let dofs_per_cell = fe.dofs_per_cell();
        let nv = q1::vertices_per_cell(dim);
        let n_dofs = ctx.dof_handler.n_dofs();
        let rho = ctx.params.solid_rho;
        let beta_dt2 = ctx.newmark.beta * ctx.dt * ctx.dt;
        let gravity = ctx.gravity();

        let mut matrix = TripletMatrix::new(n_dofs);
        let mut rhs = vec![0.0; n_dofs];
        let mut fe_values = FeValues::new(dim, ctx.volume_quadrature.clone());
        let mut face_values = FeFaceValues::new(dim, ctx.face_quadrature.clone());

        for cell in ctx.owned_cells() {
            let history = match self.history.get(cell) {
                Some(history) => history,
                None => continue,
            };
            fe_values.reinit(ctx.mesh, cell)?;
            let mut local_matrix = na::DMatrix::<f64>::zeros(dofs_per_cell, dofs_per_cell);
            let mut local_rhs = na::DVector::zeros(dofs_per_cell);

            for (q, h) in history.iter().enumerate() {
                let jxw = fe_values.jxw(q);
                // Gradients with respect to the current configuration.
                let grads: Vec<Point> = (0..nv)
                    .map(|v| h.f_inv.tr_mul(fe_values.shape_grad(v, q)))
                    .collect();
                for i in 0..dofs_per_cell {
                    let (ci, vi) = fe.system_to_component_index(i);
                    let ni = fe_values.shape_value(vi, q);
                    let gi = &grads[vi];

                    let internal: f64 = (0..dim).map(|b| gi[b] * h.tau[(ci, b)]).sum();
                    local_rhs[i] += (rho * ni * gravity[ci] - internal) * jxw;

                    for j in 0..dofs_per_cell {
                        let (cj, vj) = fe.system_to_component_index(j);
                        let mass = if ci == cj {
                            rho * ni * fe_values.shape_value(vj, q)
                        } else {
                            0.0
                        };
                        if initial {
                            local_matrix[(i, j)] += mass * jxw;
                            continue;
                        }
                        let gj = &grads[vj];
                        let mut k = mass / beta_dt2;
                        for b in 0..dim {
                            for l in 0..dim {
                                k += gi[b] * h.jc[(ci * dim + b, cj * dim + l)] * gj[l];
                            }
                        }
                        if ci == cj {
                            // Geometric stiffness.
                            k += gi.dot(&(&h.tau * gj));
                        }
                        local_matrix[(i, j)] += k * jxw;
                    }
                }
            }

            ctx.add_neumann_terms(cell, &mut face_values, &mut local_rhs)?;
            let dofs = ctx.dof_handler.cell_dofs(ctx.mesh, cell);
            ctx.constraints
                .distribute_local_to_global(&local_matrix, &local_rhs, &dofs, &mut matrix, &mut rhs);
        }

        if initial {
            system.mass_matrix = matrix.into_csr();
        } else {
            system.system_matrix = matrix.into_csr();
        }
        system.system_rhs = rhs;
        Ok(())
    }

    /// Recomputes `F = I + ∇u` and the material response at every quadrature point.
    fn update_history(&mut self, ctx: &SolidContext, displacement: &[f64]) -> Result<()> {
        let dim = ctx.mesh.dim();
        let identity = Tensor2::identity(dim, dim);
        let mut fe_values = FeValues::new(dim, ctx.volume_quadrature.clone());
        for cell in ctx.owned_cells() {
            let material = *self.material(ctx, cell)?;
            let history = match self.history.get_mut(cell) {
                Some(history) => history,
                None => continue,
            };
            fe_values.reinit(ctx.mesh, cell)?;
            let local = ctx.dof_handler.cell_values(ctx.mesh, cell, displacement);
            for (q, h) in history.iter_mut().enumerate() {
                let f = &identity + fe_values.vector_gradient(&local, ctx.fe, q);
                *h = PointHistory::new(&material, &f).ok_or(Error::DegenerateCell { cell })?;
            }
        }
        Ok(())
    }

    /// Stores `F` as the strain and `τ / J` as the stress.
    fn update_strain_and_stress(
        &self,
        ctx: &SolidContext,
        displacement: &[f64],
        strain: &mut NodalTensorField,
        stress: &mut NodalTensorField,
    ) -> Result<()> {
        let dim = ctx.mesh.dim();
        let identity = Tensor2::identity(dim, dim);
        ctx.project_to_nodes(displacement, strain, stress, |cell, fe_values, local, q| {
            let f = &identity + fe_values.vector_gradient(local, ctx.fe, q);
            let material = &self.materials[ctx.material_index(cell)?];
            let h = PointHistory::new(material, &f).ok_or(Error::DegenerateCell { cell })?;
            Ok((f, h.cauchy_stress()))
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::solid::SolidSolver;
    use crate::test_utils::solid_params;
    use approx::assert_relative_eq;

    #[test]
    fn rest_state_has_no_internal_force() {
        let mut params = solid_params();
        params.solid_neumann_bcs.clear();
        let mut solid = SolidSolver::from_params(params).unwrap();
        solid.setup_dofs().unwrap();
        solid.initialize_system().unwrap();
        solid.assemble_system(false).unwrap();
        for r in solid.system.system_rhs.iter() {
            assert_relative_eq!(*r, 0.0, epsilon = 1e-12);
        }
        let n = solid.dof_handler.n_dofs();
        // The effective matrix is symmetric at rest.
        for i in 0..n {
            for j in 0..n {
                assert_relative_eq!(
                    solid.system.system_matrix.get(i, j),
                    solid.system.system_matrix.get(j, i),
                    epsilon = 1e-8,
                    max_relative = 1e-10
                );
            }
        }
    }

    #[test]
    fn initial_mass_matches_volume() {
        let mut params = solid_params();
        params.solid_dirichlet_bcs.clear();
        params.solid_rho = 2.0;
        let mut solid = SolidSolver::from_params(params).unwrap();
        solid.setup_dofs().unwrap();
        solid.initialize_system().unwrap();
        solid.assemble_system(true).unwrap();
        // Sum of the x-x mass entries equals rho times the area.
        let n = solid.dof_handler.n_dofs();
        let ones: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 1.0 } else { 0.0 }).collect();
        let mut out = vec![0.0; n];
        solid.system.mass_matrix.vmult(&ones, &mut out);
        let total: f64 = out.iter().sum();
        assert_relative_eq!(total, 2.0, epsilon = 1e-12);
        // Traction of 1 on the unit long right side.
        let force: f64 = solid.system.system_rhs.iter().step_by(2).sum();
        assert_relative_eq!(force, 1.0, epsilon = 1e-12);
    }
}
