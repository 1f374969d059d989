//! Collective operations used by the coupler.
//!
//! Every rank holds a replicated solid mesh and the cells of the fluid mesh it owns. The
//! coupler only needs a global sum to combine pointwise samples that are found on exactly
//! one rank.

pub trait Communicator {
    fn rank(&self) -> usize;
    fn n_ranks(&self) -> usize;
    /// Sums `values` element-wise across all ranks, in place.
    fn sum(&self, values: &mut [f64]);
}

/// Communicator for a run on a single rank.
#[derive(Copy, Clone, Debug, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }
    fn n_ranks(&self) -> usize {
        1
    }
    fn sum(&self, _values: &mut [f64]) {}
}
