mod cg;

pub use cg::*;

use thiserror::Error;

use crate::matrix::SparseMatrix;

#[derive(Copy, Clone, Debug, PartialEq, Error)]
pub enum Status {
    #[error("Success")]
    Success,
    #[error("Maximum number of linear solver iterations exceeded")]
    MaximumIterationsExceeded,
    #[error("NaN detected")]
    NanDetected,
    #[error("Matrix is not positive definite")]
    Indefinite,
}

impl Default for Status {
    fn default() -> Self {
        Status::Success
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct SolveResult {
    /// Number of iterations of an iterative solver.
    pub iterations: u32,
    /// Absolute residual 2-norm.
    pub residual: f64,
    /// Relative residual 2-norm.
    ///
    /// Residual divided by the norm of the right-hand-side.
    pub error: f64,
    /// Final status of the linear solve.
    pub status: Status,
}

impl SolveResult {
    /// Converts a failed solve into an error.
    pub fn into_result(self) -> crate::Result<SolveResult> {
        match self.status {
            Status::Success => Ok(self),
            _ => Err(crate::Error::LinearSolve { result: self }),
        }
    }
}

impl std::fmt::Display for SolveResult {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "CG iterations: {:>3}, CG residual: {:.3e}",
            self.iterations, self.residual
        )
    }
}

/// Solves `A x = b` for a sparse symmetric positive definite `A` with Jacobi preconditioned
/// conjugate gradients starting from `x = 0`.
///
/// Failure to reach `|r| <= tol |b|` is reported as [`crate::Error::LinearSolve`].
pub fn solve_sparse(
    matrix: &SparseMatrix,
    x: &mut [f64],
    b: &[f64],
    tol: f64,
) -> crate::Result<SolveResult> {
    let n = matrix.size();
    if x.len() != n || b.len() != n {
        return Err(crate::Error::SizeMismatch {
            expected: n,
            actual: if x.len() != n { x.len() } else { b.len() },
        });
    }
    x.iter_mut().for_each(|xi| *xi = 0.0);
    let diag = matrix.diagonal();
    let max_iter = (2 * n).max(100) as u32;
    let mut cg = ConjugateGradient::new(n, max_iter, tol);
    let result = cg.solve(|x, out| matrix.vmult(x, out), &diag, x, b);
    log::debug!("{}", result);
    result.into_result()
}
