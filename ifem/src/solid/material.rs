//! Constitutive laws.
//!
//! Second order tensors are `dim x dim` matrices. Fourth order tensors are stored as
//! `dim² x dim²` matrices with entry `(i * dim + j, k * dim + l)` holding `C_ijkl`.

use serde::{Deserialize, Serialize};

pub type Tensor2 = na::DMatrix<f64>;
pub type Tensor4 = na::DMatrix<f64>;

/// `I ⊗ I`
pub fn outer_identity(dim: usize) -> Tensor4 {
    Tensor4::from_fn(dim * dim, dim * dim, |ij, kl| {
        let (i, j) = (ij / dim, ij % dim);
        let (k, l) = (kl / dim, kl % dim);
        if i == j && k == l {
            1.0
        } else {
            0.0
        }
    })
}

/// Symmetric fourth order identity `(δ_ik δ_jl + δ_il δ_jk) / 2`.
pub fn symmetric_identity(dim: usize) -> Tensor4 {
    let delta = |a: usize, b: usize| if a == b { 1.0 } else { 0.0 };
    Tensor4::from_fn(dim * dim, dim * dim, |ij, kl| {
        let (i, j) = (ij / dim, ij % dim);
        let (k, l) = (kl / dim, kl % dim);
        0.5 * (delta(i, k) * delta(j, l) + delta(i, l) * delta(j, k))
    })
}

/// Deviatoric projector `𝕀 - I ⊗ I / dim`.
pub fn deviatoric_projector(dim: usize) -> Tensor4 {
    symmetric_identity(dim) - outer_identity(dim) / dim as f64
}

/// `A ⊗ B`
pub fn outer_product(a: &Tensor2, b: &Tensor2) -> Tensor4 {
    let dim = a.nrows();
    Tensor4::from_fn(dim * dim, dim * dim, |ij, kl| {
        a[(ij / dim, ij % dim)] * b[(kl / dim, kl % dim)]
    })
}

/// `C : A`
pub fn double_contract(c: &Tensor4, a: &Tensor2) -> Tensor2 {
    let dim = a.nrows();
    Tensor2::from_fn(dim, dim, |i, j| {
        let row = i * dim + j;
        (0..dim * dim)
            .map(|kl| c[(row, kl)] * a[(kl / dim, kl % dim)])
            .sum()
    })
}

fn deviator(a: &Tensor2) -> Tensor2 {
    let dim = a.nrows();
    a - Tensor2::identity(dim, dim) * (a.trace() / dim as f64)
}

/// Stress and tangent of a hyperelastic law at one deformation gradient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HyperelasticResponse {
    pub det_f: f64,
    /// Kirchhoff stress.
    pub tau: Tensor2,
    /// Spatial tangent `J c`.
    pub jc: Tensor4,
    pub dpsi_vol_dj: f64,
    pub d2psi_vol_dj2: f64,
}

/// Compressible Neo-Hookean material with isochoric / volumetric split:
/// `Ψ = C1 (tr b̄ - dim) + κ/4 (J² - 1 - 2 ln J)`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeoHookean {
    pub c1: f64,
    pub kappa: f64,
}

impl NeoHookean {
    pub fn new(c1: f64, kappa: f64) -> Self {
        NeoHookean { c1, kappa }
    }

    /// Shear modulus `μ = 2 C1`.
    pub fn mu(&self) -> f64 {
        2.0 * self.c1
    }

    pub fn dpsi_vol_dj(&self, det_f: f64) -> f64 {
        self.kappa / 2.0 * (det_f - 1.0 / det_f)
    }

    pub fn d2psi_vol_dj2(&self, det_f: f64) -> f64 {
        self.kappa / 2.0 * (1.0 + 1.0 / (det_f * det_f))
    }

    /// Evaluates the Kirchhoff stress and the spatial tangent at `f`.
    ///
    /// Returns `None` when `det F <= 0`.
    pub fn evaluate(&self, f: &Tensor2) -> Option<HyperelasticResponse> {
        let dim = f.nrows();
        let det_f = f.determinant();
        if det_f <= 0.0 {
            return None;
        }
        let identity = Tensor2::identity(dim, dim);
        let b_bar = f * f.transpose() * det_f.powf(-2.0 / dim as f64);

        let tau_bar = &b_bar * (2.0 * self.c1);
        let tau_iso = deviator(&tau_bar);
        let p = self.dpsi_vol_dj(det_f);
        let tau_vol = &identity * (p * det_f);
        let tau = &tau_iso + tau_vol;

        let i_x_i = outer_identity(dim);
        let sym = symmetric_identity(dim);
        let proj = deviatoric_projector(dim);
        let dp_dj = self.d2psi_vol_dj2(det_f);

        let jc_vol = &i_x_i * ((p + det_f * dp_dj) * det_f) - &sym * (2.0 * p * det_f);
        let jc_iso = &proj * (2.0 / dim as f64 * tau_bar.trace())
            - (outer_product(&tau_iso, &identity) + outer_product(&identity, &tau_iso))
                * (2.0 / dim as f64);

        Some(HyperelasticResponse {
            det_f,
            tau,
            jc: jc_vol + jc_iso,
            dpsi_vol_dj: p,
            d2psi_vol_dj2: dp_dj,
        })
    }
}

/// Isotropic linear elasticity `σ = λ tr(ε) I + 2 μ ε`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearElastic {
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
}

impl LinearElastic {
    pub fn new(youngs_modulus: f64, poisson_ratio: f64) -> Self {
        LinearElastic {
            youngs_modulus,
            poisson_ratio,
        }
    }

    pub fn lambda(&self) -> f64 {
        let (e, nu) = (self.youngs_modulus, self.poisson_ratio);
        e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu))
    }

    pub fn mu(&self) -> f64 {
        self.youngs_modulus / (2.0 * (1.0 + self.poisson_ratio))
    }

    pub fn elasticity(&self, dim: usize) -> Tensor4 {
        outer_identity(dim) * self.lambda() + symmetric_identity(dim) * (2.0 * self.mu())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    #[test]
    fn neo_hookean_at_rest() {
        let material = NeoHookean::new(1.5, 40.0);
        for dim in 2..=3 {
            let response = material.evaluate(&Tensor2::identity(dim, dim)).unwrap();
            assert_relative_eq!(response.det_f, 1.0);
            assert_relative_eq!(response.tau, Tensor2::zeros(dim, dim), epsilon = 1e-12);
            let expected = deviatoric_projector(dim) * (2.0 * material.mu())
                + outer_identity(dim) * material.kappa;
            assert_relative_eq!(response.jc, expected, epsilon = 1e-10);
        }
    }

    #[test]
    fn neo_hookean_tangent_has_minor_symmetry() {
        let mut rng = StdRng::from_seed([3; 32]);
        let material = NeoHookean::new(2.0, 100.0);
        let f = Tensor2::identity(3, 3) + Tensor2::from_fn(3, 3, |_, _| rng.gen_range(-0.1..0.1));
        let response = material.evaluate(&f).unwrap();
        let jc = &response.jc;
        for i in 0..3 {
            for j in 0..3 {
                for k in 0..3 {
                    for l in 0..3 {
                        let a = jc[(i * 3 + j, k * 3 + l)];
                        assert_relative_eq!(a, jc[(j * 3 + i, k * 3 + l)], epsilon = 1e-10);
                        assert_relative_eq!(a, jc[(i * 3 + j, l * 3 + k)], epsilon = 1e-10);
                    }
                }
            }
        }
        assert_relative_eq!(response.tau, response.tau.transpose(), epsilon = 1e-10);
    }

    #[test]
    fn inverted_element_is_rejected() {
        let material = NeoHookean::new(1.0, 1.0);
        let f = na::DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, 1.0]);
        assert!(material.evaluate(&f).is_none());
    }

    #[test]
    fn linear_elastic_moduli() {
        let material = LinearElastic::new(1.0, 0.0);
        assert_relative_eq!(material.lambda(), 0.0);
        assert_relative_eq!(material.mu(), 0.5);
        let strain = na::DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.5, -2.0]);
        let stress = double_contract(&material.elasticity(2), &strain);
        assert_relative_eq!(stress, strain, epsilon = 1e-14);
    }
}
