//! Lagrangian solid solvers advanced in time with Newmark-β.
//!
//! [`SolidSolver`] owns the mesh, the degrees of freedom and the kinematic state and
//! runs the time stepping. The constitutive model is a [`SolidModel`] strategy that only
//! knows how to assemble the system and evaluate strain and stress.

pub mod hyper_elasticity;
pub mod linear_elasticity;
pub mod material;
pub mod newmark;

pub use hyper_elasticity::HyperElasticity;
pub use linear_elasticity::LinearElasticity;
pub use newmark::{Kinematics, Newmark};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::cell_data::CellDataStorage;
use crate::constraints::AffineConstraints;
use crate::dofs::{DofHandler, DofLayout};
use crate::fe::{self, q1, FeFaceValues, FeSystem, FeValues, Quadrature};
use crate::io::{self, FieldData, OutputSeries};
use crate::linsolve::{self, SolveResult};
use crate::matrix::SparseMatrix;
use crate::mesh::{CellId, Mesh, Point};
use crate::params::{NeumannBcType, Parameters, SimulationType, SolidType};
use crate::time::Time;
use crate::{Error, Result};

use material::Tensor2;

pub const CHECKPOINT_PREFIX: &str = "solid";

/// Current and previous displacement, velocity and acceleration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SolidFields {
    pub current: Kinematics,
    pub previous: Kinematics,
}

impl SolidFields {
    pub fn zeros(n_dofs: usize) -> Self {
        SolidFields {
            current: Kinematics::zeros(n_dofs),
            previous: Kinematics::zeros(n_dofs),
        }
    }

    /// Accepts the current state as the starting point of the next step.
    pub fn commit(&mut self) {
        self.previous.clone_from(&self.current);
    }
}

/// Data attached to the boundary face quadrature points of a solid cell.
#[derive(Clone, Debug, PartialEq)]
pub struct SolidCellProperty {
    /// Traction exerted by the fluid, indexed by `face * n_face_q_points + q`.
    pub fsi_traction: Point,
}

/// A second order tensor field stored as `dim²` discontinuous Q1 scalar fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodalTensorField {
    dim: usize,
    components: Vec<Vec<f64>>,
}

impl NodalTensorField {
    pub fn zeros(dim: usize, n_dofs: usize) -> Self {
        NodalTensorField {
            dim,
            components: vec![vec![0.0; n_dofs]; dim * dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn n_dofs(&self) -> usize {
        self.components.first().map_or(0, Vec::len)
    }

    pub fn component(&self, i: usize, j: usize) -> &[f64] {
        &self.components[i * self.dim + j]
    }

    pub fn component_mut(&mut self, i: usize, j: usize) -> &mut [f64] {
        &mut self.components[i * self.dim + j]
    }
}

/// Global matrices and right-hand side of the solid.
#[derive(Clone, Debug)]
pub struct LinearSystem {
    pub system_matrix: SparseMatrix,
    pub mass_matrix: SparseMatrix,
    /// Only used by linear models.
    pub stiffness_matrix: SparseMatrix,
    pub system_rhs: Vec<f64>,
}

impl LinearSystem {
    pub fn zeros(n_dofs: usize) -> Self {
        LinearSystem {
            system_matrix: SparseMatrix::zeros(n_dofs),
            mass_matrix: SparseMatrix::zeros(n_dofs),
            stiffness_matrix: SparseMatrix::zeros(n_dofs),
            system_rhs: vec![0.0; n_dofs],
        }
    }
}

/// Read-only view of the solver state handed to a [`SolidModel`].
pub struct SolidContext<'a> {
    pub mesh: &'a Mesh,
    pub fe: &'a FeSystem,
    pub dof_handler: &'a DofHandler,
    pub dg_dof_handler: &'a DofHandler,
    pub constraints: &'a AffineConstraints,
    pub params: &'a Parameters,
    pub cell_property: &'a CellDataStorage<SolidCellProperty>,
    pub volume_quadrature: &'a Quadrature,
    pub face_quadrature: &'a Quadrature,
    pub newmark: Newmark,
    pub dt: f64,
    pub rank: usize,
}

impl<'a> SolidContext<'a> {
    pub fn owned_cells(&self) -> impl Iterator<Item = CellId> + 'a {
        let (mesh, rank) = (self.mesh, self.rank);
        (0..mesh.n_cells()).filter(move |&c| mesh.cell(c).subdomain_id == rank)
    }

    pub fn gravity(&self) -> Point {
        let dim = self.mesh.dim();
        Point::from_fn(dim, |d, _| self.params.gravity.get(d).copied().unwrap_or(0.0))
    }

    /// Index of the material of `cell` into the per part parameter tables.
    pub fn material_index(&self, cell: CellId) -> Result<usize> {
        let n_parts = self.params.n_solid_parts;
        if n_parts == 1 {
            return Ok(0);
        }
        let id = self.mesh.cell(cell).material_id as usize;
        if id < n_parts {
            Ok(id)
        } else {
            Err(Error::InvalidParameter {
                name: "n_solid_parts".to_string(),
                reason: format!("cell {} has material id {}", cell, id),
            })
        }
    }

    /// Adds the boundary loads acting on `cell` to its local right-hand side.
    ///
    /// In coupled runs every boundary face carries the traction left by the fluid.
    /// Otherwise only faces with prescribed Neumann data contribute.
    pub fn add_neumann_terms(
        &self,
        cell: CellId,
        face_values: &mut FeFaceValues,
        local_rhs: &mut na::DVector<f64>,
    ) -> Result<()> {
        let dim = self.mesh.dim();
        let fsi = self.params.simulation_type == SimulationType::FSI;
        let n_face_q = self.face_quadrature.size();
        for face in 0..q1::faces_per_cell(dim) {
            if !self.mesh.at_boundary(cell, face) {
                continue;
            }
            let prescribed = self
                .mesh
                .boundary_id(cell, face)
                .and_then(|id| self.params.solid_neumann_bcs.get(&id));
            if !fsi && prescribed.is_none() {
                // Traction free.
                continue;
            }
            face_values.reinit(self.mesh, cell, face)?;
            for q in 0..n_face_q {
                let traction = match (fsi, self.params.solid_neumann_bc_type, prescribed) {
                    (true, _, _) => self
                        .cell_property
                        .get(cell)
                        .map(|p| p[face * n_face_q + q].fsi_traction.clone())
                        .unwrap_or_else(|| Point::zeros(dim)),
                    (false, NeumannBcType::Traction, Some(value)) => {
                        Point::from_fn(dim, |d, _| value.get(d).copied().unwrap_or(0.0))
                    }
                    // Pressure acts along the normal of the reference configuration.
                    (false, NeumannBcType::Pressure, Some(value)) => {
                        face_values.normal_vector(q) * value.first().copied().unwrap_or(0.0)
                    }
                    _ => continue,
                };
                for i in 0..self.fe.dofs_per_cell() {
                    let (c, v) = self.fe.system_to_component_index(i);
                    local_rhs[i] += face_values.shape_value(v, q) * traction[c] * face_values.jxw(q);
                }
            }
        }
        Ok(())
    }

    /// Projects quadrature point strain and stress of every owned cell onto the nodes.
    ///
    /// `at_point(cell, fe_values, local_displacement, q)` returns `(strain, stress)`.
    pub fn project_to_nodes<G>(
        &self,
        displacement: &[f64],
        strain: &mut NodalTensorField,
        stress: &mut NodalTensorField,
        mut at_point: G,
    ) -> Result<()>
    where
        G: FnMut(CellId, &FeValues, &[f64], usize) -> Result<(Tensor2, Tensor2)>,
    {
        let dim = self.mesh.dim();
        let projection = fe::projection_from_quadrature_points(dim, self.volume_quadrature);
        let mut fe_values = FeValues::new(dim, self.volume_quadrature.clone());
        let n_q = self.volume_quadrature.size();
        for cell in self.owned_cells() {
            fe_values.reinit(self.mesh, cell)?;
            let local = self.dof_handler.cell_values(self.mesh, cell, displacement);
            let mut strain_q = vec![na::DVector::zeros(n_q); dim * dim];
            let mut stress_q = vec![na::DVector::zeros(n_q); dim * dim];
            for q in 0..n_q {
                let (e, s) = at_point(cell, &fe_values, &local, q)?;
                for i in 0..dim {
                    for j in 0..dim {
                        strain_q[i * dim + j][q] = e[(i, j)];
                        stress_q[i * dim + j][q] = s[(i, j)];
                    }
                }
            }
            let dg_dofs = self.dg_dof_handler.cell_dofs(self.mesh, cell);
            for i in 0..dim {
                for j in 0..dim {
                    let nodal_strain = &projection * &strain_q[i * dim + j];
                    let nodal_stress = &projection * &stress_q[i * dim + j];
                    for (a, &dof) in dg_dofs.iter().enumerate() {
                        strain.component_mut(i, j)[dof] = nodal_strain[a];
                        stress.component_mut(i, j)[dof] = nodal_stress[a];
                    }
                }
            }
        }
        Ok(())
    }
}

/// Constitutive strategy plugged into [`SolidSolver`].
pub trait SolidModel: std::fmt::Debug {
    /// Linear models are advanced with one solve per step, nonlinear ones with Newton.
    fn is_linear(&self) -> bool;

    /// Creates per cell data once the degrees of freedom are known.
    fn setup(&mut self, ctx: &SolidContext) -> Result<()>;

    /// Assembles the mass matrix and the external force when `initial` is set, otherwise
    /// the effective system matrix and right-hand side at the current state.
    fn assemble(&mut self, ctx: &SolidContext, system: &mut LinearSystem, initial: bool) -> Result<()>;

    /// Refreshes state that depends on the displacement, e.g. quadrature point history.
    fn update_history(&mut self, _ctx: &SolidContext, _displacement: &[f64]) -> Result<()> {
        Ok(())
    }

    /// Recomputes the nodal strain and Cauchy stress fields.
    fn update_strain_and_stress(
        &self,
        ctx: &SolidContext,
        displacement: &[f64],
        strain: &mut NodalTensorField,
        stress: &mut NodalTensorField,
    ) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct SolidCheckpoint {
    timestep: u32,
    time: f64,
    n_dofs: usize,
    fields: SolidFields,
}

#[derive(Debug)]
pub struct SolidSolver {
    pub mesh: Mesh,
    pub fe: FeSystem,
    /// Continuous vector valued dofs, `vertex * dim + component`.
    pub dof_handler: DofHandler,
    /// Discontinuous scalar dofs of the nodal strain and stress.
    pub dg_dof_handler: DofHandler,
    pub volume_quadrature: Quadrature,
    pub face_quadrature: Quadrature,
    pub constraints: AffineConstraints,
    pub system: LinearSystem,
    pub fields: SolidFields,
    pub strain: NodalTensorField,
    pub stress: NodalTensorField,
    pub cell_property: CellDataStorage<SolidCellProperty>,
    pub time: Time,
    pub params: Parameters,
    newmark: Newmark,
    model: Box<dyn SolidModel>,
    output: OutputSeries,
    /// Set when the linear system matrices are stale.
    needs_assembly: bool,
    rank: usize,
}

impl SolidSolver {
    /// Creates a solver for `mesh` with the constitutive model chosen by `params`.
    pub fn new(mesh: Mesh, params: Parameters) -> Result<Self> {
        let model: Box<dyn SolidModel> = match params.solid_type {
            SolidType::NeoHookean => Box::new(HyperElasticity::new(&params)?),
            SolidType::LinearElastic => Box::new(LinearElasticity::new(&params)?),
        };
        Ok(Self::with_model(mesh, params, model))
    }

    /// Builds the solid box described by `params` and refines it `global_refinements[1]` times.
    pub fn from_params(params: Parameters) -> Result<Self> {
        let mut mesh = Mesh::hyper_rectangle(
            &params.solid_lower,
            &params.solid_upper,
            &params.solid_subdivisions,
        );
        mesh.refine_global(params.global_refinements[1]);
        Self::new(mesh, params)
    }

    pub fn with_model(mesh: Mesh, params: Parameters, model: Box<dyn SolidModel>) -> Self {
        let dim = mesh.dim();
        SolidSolver {
            fe: FeSystem::new(dim, dim),
            dof_handler: DofHandler::new(&mesh, dim, DofLayout::Continuous),
            dg_dof_handler: DofHandler::new(&mesh, 1, DofLayout::Discontinuous),
            volume_quadrature: Quadrature::gauss(dim, 2),
            face_quadrature: Quadrature::gauss(dim - 1, 2),
            constraints: AffineConstraints::new(),
            system: LinearSystem::zeros(0),
            fields: SolidFields::default(),
            strain: NodalTensorField::default(),
            stress: NodalTensorField::default(),
            cell_property: CellDataStorage::new(),
            time: Time::from_params(&params),
            newmark: Newmark::new(params.damping),
            model,
            output: OutputSeries::new("solid"),
            needs_assembly: true,
            rank: 0,
            params,
            mesh,
        }
    }

    pub fn newmark(&self) -> Newmark {
        self.newmark
    }

    pub fn is_linear(&self) -> bool {
        self.model.is_linear()
    }

    /// Splits the solver into the model, a read-only context and the mutable system.
    fn parts(&mut self) -> (&mut dyn SolidModel, SolidContext<'_>, &mut LinearSystem) {
        let SolidSolver {
            mesh,
            fe,
            dof_handler,
            dg_dof_handler,
            volume_quadrature,
            face_quadrature,
            constraints,
            system,
            cell_property,
            time,
            params,
            newmark,
            model,
            rank,
            ..
        } = self;
        let ctx = SolidContext {
            mesh,
            fe,
            dof_handler,
            dg_dof_handler,
            constraints,
            params,
            cell_property,
            volume_quadrature,
            face_quadrature,
            newmark: *newmark,
            dt: time.delta_t(),
            rank: *rank,
        };
        (model.as_mut(), ctx, system)
    }

    /// Numbers the dofs and builds the Dirichlet constraints.
    ///
    /// `solid_dirichlet_bcs` maps a boundary id to a component mask whose bit `d` fixes
    /// displacement component `d`.
    pub fn setup_dofs(&mut self) -> Result<()> {
        let dim = self.mesh.dim();
        self.dof_handler = DofHandler::new(&self.mesh, dim, DofLayout::Continuous);
        self.dg_dof_handler = DofHandler::new(&self.mesh, 1, DofLayout::Discontinuous);

        self.constraints.clear();
        for cell in 0..self.mesh.n_cells() {
            for face in 0..q1::faces_per_cell(dim) {
                let mask = match self
                    .mesh
                    .boundary_id(cell, face)
                    .and_then(|id| self.params.solid_dirichlet_bcs.get(&id))
                {
                    Some(&mask) => mask,
                    None => continue,
                };
                for vertex in self.mesh.face_vertices(cell, face) {
                    for d in (0..dim).filter(|d| mask & (1 << d) != 0) {
                        self.constraints.add_line(self.dof_handler.vertex_dof(vertex, d));
                    }
                }
            }
        }
        self.constraints.close();

        info!("Number of active solid cells: {}", self.mesh.n_cells());
        info!(
            "Number of solid degrees of freedom: {}",
            self.dof_handler.n_dofs()
        );
        Ok(())
    }

    /// Allocates the system, zeroes the fields and creates per cell data.
    pub fn initialize_system(&mut self) -> Result<()> {
        let dim = self.mesh.dim();
        let n_dofs = self.dof_handler.n_dofs();
        self.system = LinearSystem::zeros(n_dofs);
        self.fields = SolidFields::zeros(n_dofs);
        self.strain = NodalTensorField::zeros(dim, self.dg_dof_handler.n_dofs());
        self.stress = NodalTensorField::zeros(dim, self.dg_dof_handler.n_dofs());

        let n_face_data = q1::faces_per_cell(dim) * self.face_quadrature.size();
        self.cell_property.clear();
        for cell in 0..self.mesh.n_cells() {
            self.cell_property.initialize(
                cell,
                n_face_data,
                SolidCellProperty {
                    fsi_traction: Point::zeros(dim),
                },
            );
        }
        self.needs_assembly = true;

        let (model, ctx, _) = self.parts();
        model.setup(&ctx)
    }

    pub fn assemble_system(&mut self, initial: bool) -> Result<()> {
        let (model, ctx, system) = self.parts();
        model.assemble(&ctx, system, initial)
    }

    /// Solves `system_matrix x = b`.
    pub fn solve(&self, x: &mut [f64], b: &[f64]) -> Result<SolveResult> {
        linsolve::solve_sparse(
            &self.system.system_matrix,
            x,
            b,
            self.params.linear_solver_tolerance,
        )
    }

    fn update_history(&mut self) -> Result<()> {
        let displacement = std::mem::take(&mut self.fields.current.displacement);
        let result = {
            let (model, ctx, _) = self.parts();
            model.update_history(&ctx, &displacement)
        };
        self.fields.current.displacement = displacement;
        result
    }

    pub fn update_strain_and_stress(&mut self) -> Result<()> {
        let mut strain = std::mem::take(&mut self.strain);
        let mut stress = std::mem::take(&mut self.stress);
        let displacement = std::mem::take(&mut self.fields.current.displacement);
        let result = {
            let (model, ctx, _) = self.parts();
            model.update_strain_and_stress(&ctx, &displacement, &mut strain, &mut stress)
        };
        self.fields.current.displacement = displacement;
        self.strain = strain;
        self.stress = stress;
        result
    }

    /// Advances the solid by one time step.
    ///
    /// The first step additionally solves `M a = f` for the initial acceleration.
    pub fn run_one_step(&mut self, first_step: bool) -> Result<()> {
        let tol = self.params.linear_solver_tolerance;
        if first_step {
            self.assemble_system(true)?;
            let (a0, result) = self.newmark.initial_acceleration(
                &self.system.mass_matrix,
                &self.system.system_rhs,
                tol,
            )?;
            debug!("Initial acceleration: {}", result);
            self.fields.previous.acceleration = a0;
            self.output_results(self.time.timestep())?;
        }

        self.time.increment();
        info!(
            "Solid time step {} at t = {:.6e}",
            self.time.timestep(),
            self.time.current()
        );

        if self.model.is_linear() {
            self.linear_step(first_step)?;
        } else {
            self.newton_step()?;
        }
        self.fields.commit();
        self.update_strain_and_stress()?;

        if self.time.time_to_output() {
            self.output_results(self.time.timestep())?;
        }
        if self.params.simulation_type == SimulationType::Solid && self.time.time_to_save() {
            self.save_checkpoint(self.time.timestep())?;
        }
        Ok(())
    }

    fn linear_step(&mut self, first_step: bool) -> Result<()> {
        let coupled = self.params.simulation_type == SimulationType::FSI;
        if first_step || coupled || self.needs_assembly {
            self.assemble_system(false)?;
            self.needs_assembly = false;
        }
        let (next, result) = self.newmark.linear_step(
            self.time.delta_t(),
            &self.system.system_matrix,
            &self.system.stiffness_matrix,
            &self.system.system_rhs,
            &self.fields.previous,
            self.params.linear_solver_tolerance,
        )?;
        debug!("{}", result);
        self.fields.current = next;
        Ok(())
    }

    /// Norm of `v` over the unconstrained dofs.
    fn unconstrained_norm(&self, v: &[f64]) -> f64 {
        let mut v = v.to_vec();
        self.constraints.set_zero(&mut v);
        v.iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    fn newton_step(&mut self) -> Result<()> {
        let dt = self.time.delta_t();
        let newmark = self.newmark;
        let predicted = newmark.predict(dt, &self.fields.previous);
        let n_dofs = self.dof_handler.n_dofs();
        let mut newton_update = vec![0.0; n_dofs];
        let mut mass_times_acceleration = vec![0.0; n_dofs];

        let (mut error_residual, mut initial_error_residual, mut normalized_error_residual) =
            (1.0, 1.0, 1.0);
        let (mut error_update, mut initial_error_update, mut normalized_error_update) =
            (1.0, 1.0, 1.0);
        let mut iteration = 0;

        while (normalized_error_update > self.params.tol_d
            || normalized_error_residual > self.params.tol_f)
            && error_residual > 1e-12
            && error_update > 1e-12
        {
            if iteration >= self.params.solid_max_iterations {
                return Err(Error::NewtonConvergence {
                    iterations: iteration,
                });
            }

            let current = &mut self.fields.current;
            current.acceleration = newmark.acceleration(dt, &current.displacement, &predicted);
            current.velocity = newmark.velocity(dt, &self.fields.previous, &current.acceleration);

            self.assemble_system(false)?;
            self.system
                .mass_matrix
                .vmult(&self.fields.current.acceleration, &mut mass_times_acceleration);
            for (r, ma) in self
                .system
                .system_rhs
                .iter_mut()
                .zip(mass_times_acceleration.iter())
            {
                *r -= ma;
            }

            let result = self.solve(&mut newton_update, &self.system.system_rhs)?;

            error_residual = self.unconstrained_norm(&self.system.system_rhs);
            error_update = self.unconstrained_norm(&newton_update);
            if iteration == 0 {
                initial_error_residual = error_residual;
                initial_error_update = error_update;
            }
            normalized_error_residual = error_residual / initial_error_residual;
            normalized_error_update = error_update / initial_error_update;

            for (u, du) in self
                .fields
                .current
                .displacement
                .iter_mut()
                .zip(newton_update.iter())
            {
                *u += du;
            }
            self.update_history()?;

            debug!(
                "Newton iteration = {}, {}, res_F = {:.3e}, res_U = {:.3e}",
                iteration, result, error_residual, error_update
            );
            iteration += 1;
        }

        let current = &mut self.fields.current;
        current.acceleration = newmark.acceleration(dt, &current.displacement, &predicted);
        current.velocity = newmark.velocity(dt, &self.fields.previous, &current.acceleration);
        debug!(
            "Relative errors: displacement {:.3e}, force {:.3e}",
            normalized_error_update, normalized_error_residual
        );
        Ok(())
    }

    pub fn output_results(&mut self, step: u32) -> Result<()> {
        let dim = self.mesh.dim();
        let nv = q1::vertices_per_cell(dim);
        let mut cell_stress = Vec::with_capacity(self.mesh.n_cells() * dim * dim);
        for cell in 0..self.mesh.n_cells() {
            let dofs = self.dg_dof_handler.cell_dofs(&self.mesh, cell);
            for i in 0..dim {
                for j in 0..dim {
                    let component = self.stress.component(i, j);
                    let sum: f64 = dofs.iter().map(|&d| component.get(d).copied().unwrap_or(0.0)).sum();
                    cell_stress.push(sum / nv as f64);
                }
            }
        }
        let current = &self.fields.current;
        let path = self.output.write(
            &self.params.output_dir,
            step,
            self.time.current(),
            &self.mesh,
            vec![
                FieldData::new("displacement", dim as u32, current.displacement.clone()),
                FieldData::new("velocity", dim as u32, current.velocity.clone()),
                FieldData::new("acceleration", dim as u32, current.acceleration.clone()),
            ],
            vec![FieldData::new("stress", (dim * dim) as u32, cell_stress)],
        )?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    pub fn save_checkpoint(&self, step: u32) -> Result<()> {
        let checkpoint = SolidCheckpoint {
            timestep: self.time.timestep(),
            time: self.time.current(),
            n_dofs: self.dof_handler.n_dofs(),
            fields: self.fields.clone(),
        };
        let path = io::save_checkpoint(&self.params.output_dir, CHECKPOINT_PREFIX, step, &checkpoint)?;
        info!("Saved solid checkpoint {}", path.display());
        Ok(())
    }

    /// Restores the latest checkpoint in the output directory.
    ///
    /// Sets up the dofs and the system as a side effect. Returns false if there is no
    /// checkpoint to load.
    pub fn load_checkpoint(&mut self) -> Result<bool> {
        let checkpoint: SolidCheckpoint =
            match io::load_latest_checkpoint(&self.params.output_dir, CHECKPOINT_PREFIX)? {
                Some(checkpoint) => checkpoint,
                None => return Ok(false),
            };
        self.setup_dofs()?;
        self.initialize_system()?;
        let n_dofs = self.dof_handler.n_dofs();
        for len in [
            checkpoint.n_dofs,
            checkpoint.fields.current.len(),
            checkpoint.fields.previous.len(),
        ] {
            if len != n_dofs {
                return Err(Error::SizeMismatch {
                    expected: n_dofs,
                    actual: len,
                });
            }
        }
        self.time.restore(checkpoint.timestep, checkpoint.time);
        self.fields = checkpoint.fields;
        self.update_history()?;
        self.update_strain_and_stress()?;
        Ok(true)
    }

    /// Runs a stand-alone solid simulation to the end time.
    pub fn run(&mut self) -> Result<()> {
        let restarted = self.load_checkpoint()?;
        if restarted {
            self.assemble_system(true)?;
        } else {
            self.setup_dofs()?;
            self.initialize_system()?;
        }
        let mut first_step = !restarted;
        while self.time.running() {
            self.run_one_step(first_step)?;
            first_step = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{solid_params, temp_dir};
    use approx::assert_relative_eq;

    #[test]
    fn dirichlet_masks() {
        let mut params = solid_params();
        params.solid_dirichlet_bcs.clear();
        // Bottom side: fix y only.
        params.solid_dirichlet_bcs.insert(2, 2);
        let mut solid = SolidSolver::from_params(params).unwrap();
        solid.setup_dofs().unwrap();
        let n_bottom_vertices = solid
            .mesh
            .vertices()
            .iter()
            .filter(|x| x[1] == 0.0)
            .count();
        assert_eq!(solid.constraints.n_constraints(), n_bottom_vertices);
        for (dof, g) in solid.constraints.iter() {
            assert_eq!(dof % 2, 1);
            assert_eq!(g, 0.0);
        }
    }

    #[test]
    fn block_at_rest_stays_at_rest() {
        let mut params = solid_params();
        params.solid_neumann_bcs.clear();
        params.output_dir = temp_dir("solid-rest");
        params.end_time = 0.02;
        let mut solid = SolidSolver::from_params(params).unwrap();
        solid.run().unwrap();
        assert_eq!(solid.time.timestep(), 2);
        for x in solid.fields.current.displacement.iter() {
            assert_relative_eq!(*x, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn pulled_block_moves_along_the_load() {
        let mut params = solid_params();
        params.output_dir = temp_dir("solid-pull");
        let mut solid = SolidSolver::from_params(params).unwrap();
        solid.run().unwrap();
        let dim = 2;
        let right: Vec<usize> = (0..solid.mesh.n_vertices())
            .filter(|&v| (solid.mesh.vertex(v)[0] - 1.0).abs() < 1e-12)
            .collect();
        for &v in right.iter() {
            assert!(solid.fields.current.displacement[v * dim] > 0.0);
        }
        // The clamped side does not move.
        for (dof, _) in solid.constraints.iter() {
            assert_eq!(solid.fields.current.displacement[dof], 0.0);
        }
        // Newmark consistency of the committed state.
        assert_eq!(solid.fields.current, solid.fields.previous);
    }
}
