//! Small strain isotropic linear elasticity.

use crate::fe::{FeFaceValues, FeValues};
use crate::matrix::TripletMatrix;
use crate::params::Parameters;
use crate::{Error, Result};

use super::material::{double_contract, LinearElastic, Tensor2};
use super::{LinearSystem, NodalTensorField, SolidContext, SolidModel};

#[derive(Clone, Debug)]
pub struct LinearElasticity {
    materials: Vec<LinearElastic>,
}

impl LinearElasticity {
    /// Reads `E` and `nu` of every solid part.
    pub fn new(params: &Parameters) -> Result<Self> {
        let materials = (0..params.n_solid_parts)
            .map(|part| {
                match (params.youngs_modulus.get(part), params.nu.get(part)) {
                    (Some(&e), Some(&nu)) => Ok(LinearElastic::new(e, nu)),
                    _ => Err(Error::InvalidParameter {
                        name: "E".to_string(),
                        reason: format!("expected E and nu for solid part {}", part),
                    }),
                }
            })
            .collect::<Result<_>>()?;
        Ok(LinearElasticity { materials })
    }
}

impl SolidModel for LinearElasticity {
    fn is_linear(&self) -> bool {
        true
    }

    fn setup(&mut self, _ctx: &SolidContext) -> Result<()> {
        Ok(())
    }

    /// Assembles `M` when `initial` is set, otherwise `M + β dt² K` and `K`.
    fn assemble(&mut self, ctx: &SolidContext, system: &mut LinearSystem, initial: bool) -> Result<()> {
        let dim = ctx.mesh.dim();
        let fe = ctx.fe;
        let dofs_per_cell = fe.dofs_per_cell();
        let n_dofs = ctx.dof_handler.n_dofs();
        let rho = ctx.params.solid_rho;
        let beta_dt2 = ctx.newmark.beta * ctx.dt * ctx.dt;
        let gravity = ctx.gravity();

        let mut matrix = TripletMatrix::new(n_dofs);
        let mut stiffness = TripletMatrix::new(n_dofs);
        let mut rhs = vec![0.0; n_dofs];
        let mut fe_values = FeValues::new(dim, ctx.volume_quadrature.clone());
        let mut face_values = FeFaceValues::new(dim, ctx.face_quadrature.clone());

        for cell in ctx.owned_cells() {
            let elasticity = self.materials[ctx.material_index(cell)?].elasticity(dim);
            fe_values.reinit(ctx.mesh, cell)?;
            let mut local_mass = na::DMatrix::<f64>::zeros(dofs_per_cell, dofs_per_cell);
            let mut local_stiffness = na::DMatrix::<f64>::zeros(dofs_per_cell, dofs_per_cell);
            let mut local_rhs = na::DVector::zeros(dofs_per_cell);

            for q in 0..fe_values.n_quadrature_points() {
                let jxw = fe_values.jxw(q);
                for i in 0..dofs_per_cell {
                    let (ci, vi) = fe.system_to_component_index(i);
                    let ni = fe_values.shape_value(vi, q);
                    let gi = fe_values.shape_grad(vi, q);
                    local_rhs[i] += rho * ni * gravity[ci] * jxw;
                    for j in 0..dofs_per_cell {
                        let (cj, vj) = fe.system_to_component_index(j);
                        if ci == cj {
                            local_mass[(i, j)] += rho * ni * fe_values.shape_value(vj, q) * jxw;
                        }
                        let gj = fe_values.shape_grad(vj, q);
                        let mut k = 0.0;
                        for b in 0..dim {
                            for l in 0..dim {
                                k += gi[b] * elasticity[(ci * dim + b, cj * dim + l)] * gj[l];
                            }
                        }
                        local_stiffness[(i, j)] += k * jxw;
                    }
                }
            }

            ctx.add_neumann_terms(cell, &mut face_values, &mut local_rhs)?;
            let dofs = ctx.dof_handler.cell_dofs(ctx.mesh, cell);
            if initial {
                ctx.constraints
                    .distribute_local_to_global(&local_mass, &local_rhs, &dofs, &mut matrix, &mut rhs);
            } else {
                let local_system = &local_mass + &local_stiffness * beta_dt2;
                ctx.constraints
                    .distribute_local_to_global(&local_system, &local_rhs, &dofs, &mut matrix, &mut rhs);
                ctx.constraints
                    .distribute_local_matrix(&local_stiffness, &dofs, &mut stiffness);
            }
        }

        if initial {
            system.mass_matrix = matrix.into_csr();
        } else {
            system.system_matrix = matrix.into_csr();
            system.stiffness_matrix = stiffness.into_csr();
        }
        system.system_rhs = rhs;
        Ok(())
    }

    /// Stores the small strain and `C : ε`.
    fn update_strain_and_stress(
        &self,
        ctx: &SolidContext,
        displacement: &[f64],
        strain: &mut NodalTensorField,
        stress: &mut NodalTensorField,
    ) -> Result<()> {
        let dim = ctx.mesh.dim();
        ctx.project_to_nodes(displacement, strain, stress, |cell, fe_values, local, q| {
            let grad = fe_values.vector_gradient(local, ctx.fe, q);
            let eps: Tensor2 = (&grad + grad.transpose()) * 0.5;
            let elasticity = self.materials[ctx.material_index(cell)?].elasticity(dim);
            let sigma = double_contract(&elasticity, &eps);
            Ok((eps, sigma))
        })
    }
}
