//! Eulerian fluid solvers.
//!
//! The coupler talks to a fluid through [`FluidSolver`]: it reads the mesh and the
//! solution, writes the per quadrature point forcing and injects constraints.
//! [`PenaltyFluid`] is the bundled implementation.

pub mod penalty;

pub use penalty::PenaltyFluid;

use crate::cell_data::CellDataStorage;
use crate::constraints::AffineConstraints;
use crate::dofs::DofHandler;
use crate::fe::{FeSystem, Quadrature};
use crate::mesh::{Mesh, MeshChange, Point, RefinementFlags};
use crate::time::Time;
use crate::Result;

pub const CHECKPOINT_PREFIX: &str = "fluid";

/// Forcing exchanged with the solid at one fluid quadrature point.
#[derive(Clone, Debug, PartialEq)]
pub struct FluidCellProperty {
    /// Whether the point lies inside the solid.
    pub indicator: bool,
    pub fsi_acceleration: Point,
    pub fsi_stress: na::DMatrix<f64>,
}

impl FluidCellProperty {
    pub fn zeros(dim: usize) -> Self {
        FluidCellProperty {
            indicator: false,
            fsi_acceleration: Point::zeros(dim),
            fsi_stress: na::DMatrix::zeros(dim, dim),
        }
    }
}

/// Fluid state visible to the coupler.
///
/// The solution has `dim + 1` components per vertex: the velocity followed by the
/// pressure.
#[derive(Clone, Debug)]
pub struct FluidFields {
    pub mesh: Mesh,
    pub fe: FeSystem,
    pub dof_handler: DofHandler,
    pub volume_quadrature: Quadrature,
    pub present_solution: Vec<f64>,
    /// Velocity increment of the last step.
    pub solution_increment: Vec<f64>,
    /// Only locally owned cells carry data.
    pub cell_property: CellDataStorage<FluidCellProperty>,
    /// Constraints on the increment that move constrained velocities to their targets.
    pub nonzero_constraints: AffineConstraints,
    /// Homogeneous counterpart of `nonzero_constraints`.
    pub zero_constraints: AffineConstraints,
    pub rank: usize,
}

impl FluidFields {
    pub fn dim(&self) -> usize {
        self.mesh.dim()
    }

    /// Component index of the pressure.
    pub fn pressure_component(&self) -> usize {
        self.mesh.dim()
    }
}

pub trait FluidSolver {
    fn fields(&self) -> &FluidFields;
    fn fields_mut(&mut self) -> &mut FluidFields;
    fn time(&self) -> &Time;

    fn setup_dofs(&mut self) -> Result<()>;
    /// Rebuilds both constraint sets from the external boundary conditions alone.
    fn make_constraints(&mut self) -> Result<()>;
    /// Sizes the solution vectors and per cell data for the current dofs.
    fn initialize_system(&mut self) -> Result<()>;
    /// Advances one step, honouring the non-zero constraints if asked to, the zero ones otherwise.
    fn run_one_step(&mut self, apply_nonzero_constraints: bool) -> Result<()>;

    fn save_checkpoint(&self, step: u32) -> Result<()>;
    /// Restores the latest checkpoint, setting up the dofs and system on success.
    fn load_checkpoint(&mut self) -> Result<bool>;

    /// Executes refinement flags and carries the solution over to the new mesh.
    fn refine_and_transfer(&mut self, flags: &RefinementFlags) -> Result<MeshChange>;
    fn output_results(&mut self, step: u32) -> Result<()>;
}
