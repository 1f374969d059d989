//! Slightly compressible Stokes flow with a penalty pressure.
//!
//! Every step solves for the velocity increment `δ` of a backward Euler step,
//!
//! ```text
//! (ρ/dt M + K) δ = f - K v_n,    K = 2μ (∇ˢ·, ∇ˢ·) + κ (div ·, div ·),
//! ```
//!
//! and recovers the pressure `p = -κ div v` by a lumped projection. Pressure rows of the
//! system only carry a positive diagonal.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::cell_data::CellDataStorage;
use crate::constraints::{AffineConstraints, MergeConflictBehavior};
use crate::dofs::{DofHandler, DofLayout};
use crate::fe::{q1, FeSystem, FeValues, Quadrature};
use crate::io::{self, FieldData, OutputSeries};
use crate::linsolve;
use crate::locator::{locate, GridInterpolator};
use crate::matrix::TripletMatrix;
use crate::mesh::{Mesh, MeshChange, Point, RefinementFlags};
use crate::params::{Parameters, SimulationType};
use crate::time::Time;
use crate::{Error, Result};

use super::{FluidCellProperty, FluidFields, FluidSolver, CHECKPOINT_PREFIX};

#[derive(Serialize, Deserialize)]
struct FluidCheckpoint {
    timestep: u32,
    time: f64,
    /// Locally refined meshes cannot be rebuilt from the parameters.
    mesh: Mesh,
    solution: Vec<f64>,
}

#[derive(Debug)]
pub struct PenaltyFluid {
    pub fields: FluidFields,
    pub time: Time,
    pub params: Parameters,
    output: OutputSeries,
}

impl PenaltyFluid {
    pub fn new(mesh: Mesh, params: Parameters) -> Self {
        let dim = mesh.dim();
        let fe = FeSystem::new(dim, dim + 1);
        PenaltyFluid {
            fields: FluidFields {
                dof_handler: DofHandler::new(&mesh, dim + 1, DofLayout::Continuous),
                fe,
                volume_quadrature: Quadrature::gauss(dim, 2),
                present_solution: Vec::new(),
                solution_increment: Vec::new(),
                cell_property: CellDataStorage::new(),
                nonzero_constraints: AffineConstraints::new(),
                zero_constraints: AffineConstraints::new(),
                rank: 0,
                mesh,
            },
            time: Time::from_params(&params),
            output: OutputSeries::new("fluid"),
            params,
        }
    }

    /// Builds the fluid box described by `params` and refines it `global_refinements[0]` times.
    pub fn from_params(params: Parameters) -> Self {
        let mut mesh = Mesh::hyper_rectangle(
            &params.fluid_lower,
            &params.fluid_upper,
            &params.fluid_subdivisions,
        );
        mesh.refine_global(params.global_refinements[0]);
        Self::new(mesh, params)
    }

    fn assemble(&self, apply_nonzero_constraints: bool) -> Result<(TripletMatrix, Vec<f64>)> {
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
        } = &self.fields;
        let constraints = if apply_nonzero_constraints {
            nonzero_constraints
        } else {
            zero_constraints
        };
        let dim = mesh.dim();
        let nc = fe.n_components;
        let dofs_per_cell = fe.dofs_per_cell();
        let n_dofs = dof_handler.n_dofs();
        let rho = self.params.fluid_rho;
        let mu = self.params.viscosity;
        let kappa = self.params.fluid_penalty;
        let dt = self.time.delta_t();
        let gravity = Point::from_fn(dim, |d, _| self.params.gravity.get(d).copied().unwrap_or(0.0));

        let mut matrix = TripletMatrix::new(n_dofs);
        let mut rhs = vec![0.0; n_dofs];
        let mut fe_values = FeValues::new(dim, volume_quadrature.clone());

        for cell in (0..mesh.n_cells()).filter(|&c| mesh.cell(c).subdomain_id == *rank) {
            fe_values.reinit(mesh, cell)?;
            let dofs = dof_handler.cell_dofs(mesh, cell);
            let local_solution: Vec<f64> = dofs.iter().map(|&d| present_solution[d]).collect();
            let properties = cell_property.get(cell);
            let mut local_matrix = na::DMatrix::<f64>::zeros(dofs_per_cell, dofs_per_cell);
            let mut local_stiffness = na::DMatrix::<f64>::zeros(dofs_per_cell, dofs_per_cell);
            let mut local_rhs = na::DVector::zeros(dofs_per_cell);

            for q in 0..fe_values.n_quadrature_points() {
                let jxw = fe_values.jxw(q);
                let property = properties
                    .and_then(|p| p.get(q))
                    .filter(|p| p.indicator);
                for i in 0..dofs_per_cell {
                    let (ci, vi) = fe.system_to_component_index(i);
                    if ci == dim {
                        continue;
                    }
                    let ni = fe_values.shape_value(vi, q);
                    let gi = fe_values.shape_grad(vi, q);
                    local_rhs[i] += rho * gravity[ci] * ni * jxw;
                    if let Some(p) = property {
                        let stress_term: f64 = (0..dim).map(|b| p.fsi_stress[(ci, b)] * gi[b]).sum();
                        local_rhs[i] += (p.fsi_acceleration[ci] * ni + stress_term) * jxw;
                    }
                    for j in 0..dofs_per_cell {
                        let (cj, vj) = fe.system_to_component_index(j);
                        if cj == dim {
                            continue;
                        }
                        let nj = fe_values.shape_value(vj, q);
                        let gj = fe_values.shape_grad(vj, q);
                        // 2μ ∇ˢφ_i : ∇ˢφ_j for φ_i = N_i e_ci
                        let mut viscous = if ci == cj { gi.dot(gj) } else { 0.0 };
                        viscous += gi[cj] * gj[ci];
                        let k = mu * viscous + kappa * gi[ci] * gj[cj];
                        let mass = if ci == cj { rho / dt * ni * nj } else { 0.0 };
                        local_stiffness[(i, j)] += k * jxw;
                        local_matrix[(i, j)] += (mass + k) * jxw;
                    }
                }
            }
            // Every cell adds 1/nv to the pressure diagonal of its vertices.
            let weight = 1.0 / q1::vertices_per_cell(dim) as f64;
            for i in (0..dofs_per_cell).filter(|&i| i % nc == dim) {
                local_matrix[(i, i)] = weight;
            }
            local_rhs -= &local_stiffness * na::DVector::from_vec(local_solution);
            constraints.distribute_local_to_global(&local_matrix, &local_rhs, &dofs, &mut matrix, &mut rhs);
        }
        Ok((matrix, rhs))
    }

    /// Ties the given components at hanging vertices to the mean of their masters.
    fn hanging_vertex_constraints(&self, components: std::ops::Range<usize>) -> AffineConstraints {
        let fields = &self.fields;
        let mut constraints = AffineConstraints::new();
        for h in fields.mesh.hanging_vertices() {
            let weight = 1.0 / h.masters.len() as f64;
            for c in components.clone() {
                let entries: Vec<_> = h
                    .masters
                    .iter()
                    .map(|&m| (fields.dof_handler.vertex_dof(m, c), weight))
                    .collect();
                constraints.add_entries(fields.dof_handler.vertex_dof(h.vertex, c), &entries);
            }
        }
        constraints.close();
        constraints
    }

    /// Sets the pressure to the lumped projection of `-κ div v`.
    fn update_pressure(&mut self) -> Result<()> {
        let FluidFields {
            mesh,
            fe,
            dof_handler,
            volume_quadrature,
            present_solution,
            ..
        } = &mut self.fields;
        let dim = mesh.dim();
        let nc = fe.n_components;
        let kappa = self.params.fluid_penalty;
        let mut fe_values = FeValues::new(dim, volume_quadrature.clone());
        let mut weighted = vec![0.0; mesh.n_vertices()];
        let mut lumped = vec![0.0; mesh.n_vertices()];
        for cell in 0..mesh.n_cells() {
            fe_values.reinit(mesh, cell)?;
            let local = dof_handler.cell_values(mesh, cell, present_solution);
            for q in 0..fe_values.n_quadrature_points() {
                let divergence: f64 = (0..dim)
                    .map(|c| fe_values.component_gradient(&local, fe, c, q)[c])
                    .sum();
                for (v, &vertex) in mesh.cell(cell).vertices.iter().enumerate() {
                    let n = fe_values.shape_value(v, q) * fe_values.jxw(q);
                    weighted[vertex] -= kappa * divergence * n;
                    lumped[vertex] += n;
                }
            }
        }
        for vertex in 0..mesh.n_vertices() {
            if lumped[vertex] > 0.0 {
                present_solution[vertex * nc + dim] = weighted[vertex] / lumped[vertex];
            }
        }
        let hanging = self.hanging_vertex_constraints(dim..dim + 1);
        hanging.distribute(&mut self.fields.present_solution);
        Ok(())
    }

    /// Creates zeroed quadrature point data on every locally owned cell.
    fn initialize_cell_property(&mut self) {
        let fields = &mut self.fields;
        let dim = fields.mesh.dim();
        let n_q = fields.volume_quadrature.size();
        fields.cell_property.clear();
        for cell in 0..fields.mesh.n_cells() {
            if fields.mesh.cell(cell).subdomain_id == fields.rank {
                fields
                    .cell_property
                    .initialize(cell, n_q, FluidCellProperty::zeros(dim));
            }
        }
    }

    /// Runs a stand-alone fluid simulation to the end time.
    pub fn run(&mut self) -> Result<()> {
        if !self.load_checkpoint()? {
            self.setup_dofs()?;
            self.make_constraints()?;
            self.initialize_system()?;
            self.output_results(0)?;
        }
        while self.time.running() {
            self.make_constraints()?;
            self.run_one_step(true)?;
        }
        Ok(())
    }
}

impl FluidSolver for PenaltyFluid {
    fn fields(&self) -> &FluidFields {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut FluidFields {
        &mut self.fields
    }

    fn time(&self) -> &Time {
        &self.time
    }

    fn setup_dofs(&mut self) -> Result<()> {
        let fields = &mut self.fields;
        let dim = fields.mesh.dim();
        fields.dof_handler = DofHandler::new(&fields.mesh, dim + 1, DofLayout::Continuous);
        info!("Number of active fluid cells: {}", fields.mesh.n_cells());
        info!(
            "Number of fluid degrees of freedom: {}",
            fields.dof_handler.n_dofs()
        );
        Ok(())
    }

    /// Prescribes `fluid_dirichlet_bcs` on the velocity increment and keeps the velocity
    /// continuous at hanging vertices.
    fn make_constraints(&mut self) -> Result<()> {
        let dim = self.fields.mesh.dim();
        let hanging = self.hanging_vertex_constraints(0..dim);
        let fields = &mut self.fields;
        fields.nonzero_constraints.clear();
        fields.zero_constraints.clear();
        for cell in 0..fields.mesh.n_cells() {
            for face in 0..q1::faces_per_cell(dim) {
                let value = match fields
                    .mesh
                    .boundary_id(cell, face)
                    .and_then(|id| self.params.fluid_dirichlet_bcs.get(&id))
                {
                    Some(value) => value,
                    None => continue,
                };
                for vertex in fields.mesh.face_vertices(cell, face) {
                    for c in 0..dim {
                        let dof = fields.dof_handler.vertex_dof(vertex, c);
                        let target = value.get(c).copied().unwrap_or(0.0);
                        let current = fields.present_solution.get(dof).copied().unwrap_or(0.0);
                        fields.nonzero_constraints.set_inhomogeneity(dof, target - current);
                        fields.zero_constraints.add_line(dof);
                    }
                }
            }
        }
        // Boundary values win over the mean at hanging vertices on the boundary.
        fields
            .nonzero_constraints
            .merge(&hanging, MergeConflictBehavior::LeftObjectWins);
        fields
            .zero_constraints
            .merge(&hanging, MergeConflictBehavior::LeftObjectWins);
        Ok(())
    }

    fn initialize_system(&mut self) -> Result<()> {
        let n_dofs = self.fields.dof_handler.n_dofs();
        self.fields.present_solution = vec![0.0; n_dofs];
        self.fields.solution_increment = vec![0.0; n_dofs];
        self.initialize_cell_property();
        Ok(())
    }

    fn run_one_step(&mut self, apply_nonzero_constraints: bool) -> Result<()> {
        let n_dofs = self.fields.dof_handler.n_dofs();
        if self.fields.present_solution.len() != n_dofs {
            return Err(Error::SizeMismatch {
                expected: n_dofs,
                actual: self.fields.present_solution.len(),
            });
        }
        self.time.increment();
        info!(
            "Fluid time step {} at t = {:.6e}",
            self.time.timestep(),
            self.time.current()
        );

        let (matrix, rhs) = self.assemble(apply_nonzero_constraints)?;
        let matrix = matrix.into_csr();
        let mut increment = vec![0.0; n_dofs];
        let result = linsolve::solve_sparse(
            &matrix,
            &mut increment,
            &rhs,
            self.params.linear_solver_tolerance,
        )?;
        debug!("{}", result);
        if apply_nonzero_constraints {
            self.fields.nonzero_constraints.distribute(&mut increment);
        } else {
            self.fields.zero_constraints.distribute(&mut increment);
        }

        let nc = self.fields.fe.n_components;
        let dim = self.fields.dim();
        for (dof, (v, dv)) in self
            .fields
            .present_solution
            .iter_mut()
            .zip(increment.iter())
            .enumerate()
        {
            if dof % nc != dim {
                *v += dv;
            }
        }
        self.fields.solution_increment = increment;
        self.update_pressure()?;

        if self.time.time_to_output() {
            self.output_results(self.time.timestep())?;
        }
        if self.params.simulation_type == SimulationType::Fluid && self.time.time_to_save() {
            self.save_checkpoint(self.time.timestep())?;
        }
        Ok(())
    }

    fn save_checkpoint(&self, step: u32) -> Result<()> {
        let checkpoint = FluidCheckpoint {
            timestep: self.time.timestep(),
            time: self.time.current(),
            mesh: self.fields.mesh.clone(),
            solution: self.fields.present_solution.clone(),
        };
        let path = io::save_checkpoint(&self.params.output_dir, CHECKPOINT_PREFIX, step, &checkpoint)?;
        info!("Saved fluid checkpoint {}", path.display());
        Ok(())
    }

    fn load_checkpoint(&mut self) -> Result<bool> {
        let checkpoint: FluidCheckpoint =
            match io::load_latest_checkpoint(&self.params.output_dir, CHECKPOINT_PREFIX)? {
                Some(checkpoint) => checkpoint,
                None => return Ok(false),
            };
        self.fields.mesh = checkpoint.mesh;
        self.setup_dofs()?;
        self.initialize_system()?;
        let n_dofs = self.fields.dof_handler.n_dofs();
        if checkpoint.solution.len() != n_dofs {
            return Err(Error::SizeMismatch {
                expected: n_dofs,
                actual: checkpoint.solution.len(),
            });
        }
        self.fields.present_solution = checkpoint.solution;
        self.time.restore(checkpoint.timestep, checkpoint.time);
        self.make_constraints()?;
        Ok(true)
    }

    /// Interpolates the old solution at the vertices of the new mesh.
    ///
    /// Hanging vertices of the new mesh take the mean of their masters instead.
    fn refine_and_transfer(&mut self, flags: &RefinementFlags) -> Result<MeshChange> {
        let old_mesh = self.fields.mesh.clone();
        let old_dofs = self.fields.dof_handler.clone();
        let old_solution = std::mem::take(&mut self.fields.present_solution);

        let change = self.fields.mesh.execute_coarsening_and_refinement(flags);
        if change == MeshChange::Unchanged {
            self.fields.present_solution = old_solution;
            return Ok(change);
        }
        self.setup_dofs()?;
        self.initialize_system()?;

        let nc = self.fields.fe.n_components;
        let mut hint = 0;
        for vertex in 0..self.fields.mesh.n_vertices() {
            let x = self.fields.mesh.vertex(vertex);
            let location = locate(&old_mesh, x, &mut hint).ok_or_else(|| Error::PointNotFound {
                point: x.iter().copied().collect(),
            })?;
            let value = GridInterpolator::new(&old_mesh, location).point_value(&old_dofs, &old_solution);
            self.fields.present_solution[vertex * nc..(vertex + 1) * nc].copy_from_slice(&value);
        }
        let hanging = self.hanging_vertex_constraints(0..nc);
        hanging.distribute(&mut self.fields.present_solution);
        self.make_constraints()?;
        info!(
            "Fluid mesh {:?}: {} cells, {} levels",
            change,
            self.fields.mesh.n_cells(),
            self.fields.mesh.n_levels()
        );
        Ok(change)
    }

    fn output_results(&mut self, step: u32) -> Result<()> {
        let fields = &self.fields;
        let dim = fields.dim();
        let nc = fields.fe.n_components;
        let velocity: Vec<f64> = fields
            .present_solution
            .iter()
            .enumerate()
            .filter(|(dof, _)| dof % nc != dim)
            .map(|(_, &v)| v)
            .collect();
        let pressure: Vec<f64> = fields
            .present_solution
            .iter()
            .skip(dim)
            .step_by(nc)
            .copied()
            .collect();
        let indicator: Vec<f64> = (0..fields.mesh.n_cells())
            .map(|cell| {
                fields.cell_property.get(cell).map_or(0.0, |p| {
                    p.iter().filter(|p| p.indicator).count() as f64 / p.len().max(1) as f64
                })
            })
            .collect();
        let path = self.output.write(
            &self.params.output_dir,
            step,
            self.time.current(),
            &fields.mesh,
            vec![
                FieldData::new("velocity", dim as u32, velocity),
                FieldData::new("pressure", 1, pressure),
            ],
            vec![FieldData::new("indicator", 1, indicator)],
        )?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}
