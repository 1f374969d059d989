//! Staggered coupling of an Eulerian fluid with an immersed Lagrangian solid.
//!
//! The solid is loaded by the fluid traction on its boundary. The fluid sees the solid
//! through interior Dirichlet constraints on the velocity of the dofs it covers and
//! through a body force at the quadrature points inside it. Both exchanges are point
//! samples taken with the solid mesh in its deformed configuration.

pub mod geometry;
pub mod hints;
pub mod mover;
pub mod refine;
pub mod transfer;

pub use geometry::{SolidBox, SolidGeometry};
pub use hints::CellHints;
pub use mover::DeformedConfiguration;

use log::info;

use crate::comm::{Communicator, SingleProcess};
use crate::fluid::FluidSolver;
use crate::mesh::{MeshChange, Ownership, Point};
use crate::params::Parameters;
use crate::solid::SolidSolver;
use crate::time::Time;
use crate::{Error, Result};

/// The coupler. Both solvers are owned by the caller.
pub struct Fsi<'a> {
    solid: &'a mut SolidSolver,
    fluid: &'a mut dyn FluidSolver,
    params: Parameters,
    time: Time,
    geometry: SolidGeometry,
    hints: CellHints,
    comm: Box<dyn Communicator + 'a>,
}

impl<'a> Fsi<'a> {
    pub fn new(solid: &'a mut SolidSolver, fluid: &'a mut dyn FluidSolver, params: Parameters) -> Self {
        Fsi {
            time: Time::from_params(&params),
            solid,
            fluid,
            params,
            geometry: SolidGeometry::default(),
            hints: CellHints::default(),
            comm: Box::new(SingleProcess),
        }
    }

    pub fn with_communicator(mut self, comm: impl Communicator + 'a) -> Self {
        self.comm = Box::new(comm);
        self
    }

    pub fn time(&self) -> &Time {
        &self.time
    }

    pub fn geometry(&self) -> &SolidGeometry {
        &self.geometry
    }

    pub fn hints(&self) -> &CellHints {
        &self.hints
    }

    pub fn solid(&self) -> &SolidSolver {
        &*self.solid
    }

    pub fn fluid(&self) -> &dyn FluidSolver {
        &*self.fluid
    }

    /// Records the boundary segments of the solid and its bounding box.
    pub fn collect_solid_boundaries(&mut self) -> Result<()> {
        self.geometry = SolidGeometry::new(&self.solid.mesh);
        self.update_solid_box()
    }

    /// Resets every hint of every non-artificial fluid cell to the first solid cell.
    pub fn setup_cell_hints(&mut self) {
        let fields = self.fluid.fields();
        self.hints = CellHints::new(&fields.mesh, fields.rank, fields.fe.dofs_per_cell());
    }

    /// Recomputes the bounding box of the deformed solid.
    pub fn update_solid_box(&mut self) -> Result<()> {
        let solid = &mut *self.solid;
        let deformed = DeformedConfiguration::new(
            &mut solid.mesh,
            &solid.dof_handler,
            &solid.fields.current.displacement,
        )?;
        self.geometry.update_box(&deformed);
        Ok(())
    }

    /// Whether `p` lies in the deformed solid.
    pub fn point_in_solid(&mut self, p: &Point) -> Result<bool> {
        let solid = &mut *self.solid;
        let deformed = DeformedConfiguration::new(
            &mut solid.mesh,
            &solid.dof_handler,
            &solid.fields.current.displacement,
        )?;
        Ok(self.geometry.point_in_solid(&deformed, p))
    }

    pub fn find_solid_bc(&mut self) -> Result<()> {
        transfer::find_solid_bc(
            self.solid,
            self.fluid.fields(),
            self.params.viscosity,
            &*self.comm,
        )
    }

    pub fn find_fluid_bc(&mut self) -> Result<usize> {
        let n_constraints = transfer::find_fluid_bc(
            self.fluid.fields_mut(),
            self.solid,
            &self.geometry,
            &mut self.hints,
            &self.params,
        )?;
        log::debug!("Interior fluid constraints: {}", n_constraints);
        Ok(n_constraints)
    }

    /// Marks all quadrature points of an owned fluid cell as inside the solid when all of
    /// the cell vertices are. Not part of the coupling loop.
    pub fn update_indicator(&mut self) -> Result<()> {
        let solid = &mut *self.solid;
        let deformed = DeformedConfiguration::new(
            &mut solid.mesh,
            &solid.dof_handler,
            &solid.fields.current.displacement,
        )?;
        let fields = self.fluid.fields_mut();
        for (cell, ownership) in fields.mesh.ownership(fields.rank).into_iter().enumerate() {
            if ownership != Ownership::LocallyOwned {
                continue;
            }
            let is_solid = fields
                .mesh
                .cell(cell)
                .vertices
                .iter()
                .all(|&v| self.geometry.point_in_solid(&deformed, fields.mesh.vertex(v)));
            if let Some(property) = fields.cell_property.get_mut(cell) {
                property.iter_mut().for_each(|p| p.indicator = is_solid);
            }
        }
        Ok(())
    }

    /// Refines the fluid around the deformed solid, coarsens it elsewhere and rebuilds the
    /// cell hints if the mesh changed.
    pub fn refine_mesh(&mut self, min_level: u32, max_level: u32) -> Result<MeshChange> {
        let flags = {
            let solid = &mut *self.solid;
            let deformed = DeformedConfiguration::new(
                &mut solid.mesh,
                &solid.dof_handler,
                &solid.fields.current.displacement,
            )?;
            refine::refinement_flags(&self.fluid.fields().mesh, &deformed, min_level, max_level)
        };
        let change = self.fluid.refine_and_transfer(&flags)?;
        if change != MeshChange::Unchanged {
            self.setup_cell_hints();
        }
        Ok(change)
    }

    /// Restores both solvers from their latest checkpoints.
    ///
    /// Returns true if both were restored. Restoring only one of them, or two
    /// checkpoints at different times, is an error.
    fn load_checkpoints(&mut self) -> Result<bool> {
        let solid_loaded = self.solid.load_checkpoint()?;
        let fluid_loaded = self.fluid.load_checkpoint()?;
        let solid_time = self.solid.time.current();
        let fluid_time = self.fluid.time().current();
        if solid_loaded != fluid_loaded || (solid_time - fluid_time).abs() > 1e-12 {
            return Err(Error::CheckpointMismatch {
                solid: solid_time,
                fluid: fluid_time,
            });
        }
        if solid_loaded {
            while self.time.timestep() < self.solid.time.timestep() {
                self.time.increment();
            }
        }
        Ok(solid_loaded)
    }

    /// Runs the coupled simulation to the end time.
    pub fn run(&mut self) -> Result<()> {
        info!("Running on {} rank(s)", self.comm.n_ranks());
        let restarted = self.load_checkpoints()?;
        if !restarted {
            self.solid.setup_dofs()?;
            self.solid.initialize_system()?;
            self.fluid.setup_dofs()?;
            self.fluid.make_constraints()?;
            self.fluid.initialize_system()?;
        }

        self.collect_solid_boundaries()?;
        self.setup_cell_hints();
        info!(
            "Number of fluid active cells and dofs: [{}, {}]",
            self.fluid.fields().mesh.n_cells(),
            self.fluid.fields().dof_handler.n_dofs()
        );
        info!(
            "Number of solid active cells and dofs: [{}, {}]",
            self.solid.mesh.n_cells(),
            self.solid.dof_handler.n_dofs()
        );

        let g0 = self.params.global_refinements[0];
        if self.params.refinement_interval < self.params.end_time {
            self.refine_mesh(g0, g0 + 3)?;
        }

        let mut first_step = !restarted;
        let mut reassemble = restarted;
        while self.time.running() {
            self.find_solid_bc()?;
            if reassemble {
                self.solid.assemble_system(true)?;
                reassemble = false;
            }
            self.solid.run_one_step(first_step)?;
            self.update_solid_box()?;

            self.fluid.make_constraints()?;
            if !first_step {
                let fields = self.fluid.fields_mut();
                fields.nonzero_constraints.clear();
                fields.nonzero_constraints.copy_from(&fields.zero_constraints);
            }
            self.find_fluid_bc()?;
            self.fluid.run_one_step(true)?;

            first_step = false;
            self.time.increment();
            info!(
                "FSI time step {} at t = {:.6e}",
                self.time.timestep(),
                self.time.current()
            );
            if self.time.time_to_refine() {
                self.refine_mesh(g0, g0 + 3)?;
            }
            if self.time.time_to_save() {
                self.solid.save_checkpoint(self.time.timestep())?;
                self.fluid.save_checkpoint(self.time.timestep())?;
            }
        }
        Ok(())
    }
}
