pub mod cell_data;
pub mod comm;
pub mod constraints;
pub mod dofs;
pub mod fe;
pub mod fluid;
pub mod fsi;
pub mod io;
pub mod linsolve;
pub mod locator;
pub mod matrix;
pub mod mesh;
pub mod params;
pub mod solid;
pub mod time;

// TODO: This should be feature gated, but integration tests need it without extra flags.
pub mod test_utils;

pub use self::fluid::{FluidSolver, PenaltyFluid};
pub use self::fsi::Fsi;
pub use self::mesh::{CellId, Mesh, Point};
pub use self::params::Parameters;
pub use self::solid::SolidSolver;
pub use self::time::Time;

use thiserror::Error;

/// Floating point type used by the iterative solvers.
pub trait Real: na::RealField + num_traits::Float + Copy {}
impl<T> Real for T where T: na::RealField + num_traits::Float + Copy {}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Size mismatch error: expected {expected}, found {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("Invalid parameter {name:?}: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("Missing parameter: {name:?}")]
    MissingParameter { name: String },
    #[error("Unsupported material: {name:?}")]
    UnsupportedMaterial { name: String },
    #[error(
        "Solid and fluid restart files have different times ({solid} vs {fluid}). \
         Check and remove inconsistent restart files!"
    )]
    CheckpointMismatch { solid: f64, fluid: f64 },
    #[error("Cannot find point in solid: {}", format_point(.point))]
    PointNotFound { point: Vec<f64> },
    #[error("Degenerate cell detected: {cell}")]
    DegenerateCell { cell: CellId },
    #[error("Too many Newton iterations: {iterations}")]
    NewtonConvergence { iterations: u32 },
    #[error("Linear solve failed: {:?} after {} iterations (residual {:e})", .result.status, .result.iterations, .result.residual)]
    LinearSolve { result: linsolve::SolveResult },
    #[error("Failed to write output: {message}")]
    Output { message: String },
    #[error("File I/O Error")]
    FileIOError {
        #[from]
        source: std::io::Error,
    },
    #[error("Checkpoint serialization error")]
    Checkpoint {
        #[from]
        source: bincode::Error,
    },
    #[error("Config parse error")]
    ConfigParse {
        #[from]
        source: ron::error::SpannedError,
    },
}

fn format_point(p: &[f64]) -> String {
    p.iter()
        .map(|x| format!("{}", x))
        .collect::<Vec<_>>()
        .join(" ")
}
