//! Newmark-β time integration of `M a + f_int(u) = f_ext`.

use serde::{Deserialize, Serialize};

use crate::linsolve::{self, SolveResult};
use crate::matrix::SparseMatrix;
use crate::Result;

/// Displacement, velocity and acceleration at one time level.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Kinematics {
    pub displacement: Vec<f64>,
    pub velocity: Vec<f64>,
    pub acceleration: Vec<f64>,
}

impl Kinematics {
    pub fn zeros(n: usize) -> Self {
        Kinematics {
            displacement: vec![0.0; n],
            velocity: vec![0.0; n],
            acceleration: vec![0.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.displacement.len()
    }

    pub fn is_empty(&self) -> bool {
        self.displacement.is_empty()
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Newmark {
    pub gamma: f64,
    pub beta: f64,
}

impl Newmark {
    /// `gamma = 0.5 + damping`, `beta = gamma / 2`.
    pub fn new(damping: f64) -> Self {
        let gamma = 0.5 + damping;
        Newmark {
            gamma,
            beta: gamma / 2.0,
        }
    }

    /// `u_pred = u + dt v + dt² (1/2 - β) a`
    pub fn predict(&self, dt: f64, prev: &Kinematics) -> Vec<f64> {
        let c = dt * dt * (0.5 - self.beta);
        prev.displacement
            .iter()
            .zip(prev.velocity.iter())
            .zip(prev.acceleration.iter())
            .map(|((&u, &v), &a)| u + dt * v + c * a)
            .collect()
    }

    /// Inverts the displacement update: `a = (u - u_pred) / (β dt²)`.
    pub fn acceleration(&self, dt: f64, displacement: &[f64], predicted: &[f64]) -> Vec<f64> {
        let c = 1.0 / (self.beta * dt * dt);
        displacement
            .iter()
            .zip(predicted.iter())
            .map(|(&u, &p)| c * (u - p))
            .collect()
    }

    /// `v = v_prev + dt ((1 - γ) a_prev + γ a)`
    pub fn velocity(&self, dt: f64, prev: &Kinematics, acceleration: &[f64]) -> Vec<f64> {
        prev.velocity
            .iter()
            .zip(prev.acceleration.iter())
            .zip(acceleration.iter())
            .map(|((&v, &ap), &a)| v + dt * ((1.0 - self.gamma) * ap + self.gamma * a))
            .collect()
    }

    /// `u = u_prev + dt v_prev + dt² ((1/2 - β) a_prev + β a)`
    pub fn displacement(&self, dt: f64, prev: &Kinematics, acceleration: &[f64]) -> Vec<f64> {
        self.predict(dt, prev)
            .into_iter()
            .zip(acceleration.iter())
            .map(|(p, &a)| p + dt * dt * self.beta * a)
            .collect()
    }

    /// Solves `M a_0 = f` for the acceleration consistent with the initial state.
    pub fn initial_acceleration(
        &self,
        mass: &SparseMatrix,
        rhs: &[f64],
        tol: f64,
    ) -> Result<(Vec<f64>, SolveResult)> {
        let mut a = vec![0.0; rhs.len()];
        let result = linsolve::solve_sparse(mass, &mut a, rhs, tol)?;
        Ok((a, result))
    }

    /// One step of a linear system: solves `(M + β dt² K) a = f - K u_pred` and updates the
    /// velocity and displacement explicitly.
    pub fn linear_step(
        &self,
        dt: f64,
        system: &SparseMatrix,
        stiffness: &SparseMatrix,
        rhs: &[f64],
        prev: &Kinematics,
        tol: f64,
    ) -> Result<(Kinematics, SolveResult)> {
        let predicted = self.predict(dt, prev);
        let mut ku = vec![0.0; predicted.len()];
        stiffness.vmult(&predicted, &mut ku);
        let b: Vec<f64> = rhs.iter().zip(ku.iter()).map(|(f, k)| f - k).collect();

        let mut acceleration = vec![0.0; b.len()];
        let result = linsolve::solve_sparse(system, &mut acceleration, &b, tol)?;

        let next = Kinematics {
            velocity: self.velocity(dt, prev, &acceleration),
            displacement: self.displacement(dt, prev, &acceleration),
            acceleration,
        };
        Ok((next, result))
    }
}
