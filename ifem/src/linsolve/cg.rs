use crate::Real;

use super::{SolveResult, Status};

/// Jacobi preconditioned conjugate gradient method.
///
/// Solves `Ax = b` for a symmetric positive definite `A` given only through its action on
/// a vector and its diagonal.
/// https://en.wikipedia.org/wiki/Conjugate_gradient_method#The_preconditioned_conjugate_gradient_method
pub struct ConjugateGradient<T: Real> {
    max_iter: u32,
    tol: f64,
    r: na::DVector<T>,
    z: na::DVector<T>,
    p: na::DVector<T>,
    ap: na::DVector<T>,
}

impl<T> ConjugateGradient<T>
where
    T: Real,
{
    pub fn new(size: usize, max_iter: u32, tol: f64) -> Self {
        let r = na::DVector::zeros(size);
        ConjugateGradient {
            max_iter: max_iter.max(1),
            tol: f64::EPSILON.max(tol),
            z: r.clone(),
            p: r.clone(),
            ap: r.clone(),
            r,
        }
    }

    /// Solves `Ax = b` where the product `Ax` is provided by `matvec` and `diag` holds the
    /// diagonal of `A`.
    ///
    /// `x` holds the initial guess on entry. Iteration stops once `|r| <= tol |b|`.
    pub fn solve<F>(&mut self, mut matvec: F, diag: &[T], x: &mut [T], b: &[T]) -> SolveResult
    where
        F: FnMut(&[T], &mut [T]),
    {
        let ConjugateGradient {
            max_iter,
            tol,
            ref mut r,
            ref mut z,
            ref mut p,
            ref mut ap,
        } = *self;

        debug_assert_eq!(b.len(), x.len());
        debug_assert_eq!(r.len(), x.len());
        debug_assert_eq!(diag.len(), x.len());

        let mut x: na::DVectorViewMut<T> = x.into();
        let b = na::DVectorView::from_slice(b, b.len());
        let b_norm = b.norm().to_f64().unwrap_or(f64::NAN);

        let precondition = |r: &na::DVector<T>, z: &mut na::DVector<T>| {
            for ((zi, &ri), &di) in z.iter_mut().zip(r.iter()).zip(diag.iter()) {
                *zi = if di > T::zero() { ri / di } else { ri };
            }
        };

        // r0 = b - A x0
        matvec(x.as_slice(), ap.as_mut_slice());
        r.copy_from(&b);
        r.axpy(-T::one(), ap, T::one());

        let result = |iterations: u32, r: &na::DVector<T>, status: Status| {
            let residual = r.norm().to_f64().unwrap_or(f64::NAN);
            SolveResult {
                iterations,
                residual,
                error: if b_norm > 0.0 { residual / b_norm } else { residual },
                status,
            }
        };

        let threshold = tol * b_norm;
        if r.norm().to_f64().unwrap_or(f64::NAN) <= threshold {
            return result(0, r, Status::Success);
        }

        precondition(r, z);
        p.copy_from(z);
        let mut rz = r.dot(z);

        let mut iterations = 0;
        loop {
            matvec(p.as_slice(), ap.as_mut_slice());
            let pap = p.dot(ap);
            if pap.is_nan() {
                return result(iterations, r, Status::NanDetected);
            }
            if pap <= T::zero() {
                return result(iterations, r, Status::Indefinite);
            }

            // α = rᵀz / pᵀAp
            let alpha = rz / pap;

            // x = x + α p
            x.axpy(alpha, p, T::one());

            // r = r - α Ap
            r.axpy(-alpha, ap, T::one());

            iterations += 1;

            let r_norm = r.norm().to_f64().unwrap_or(f64::NAN);
            if r_norm.is_nan() {
                return result(iterations, r, Status::NanDetected);
            } else if r_norm <= threshold {
                return result(iterations, r, Status::Success);
            } else if iterations >= max_iter {
                return result(iterations, r, Status::MaximumIterationsExceeded);
            }

            precondition(r, z);
            let rz_new = r.dot(z);
            let beta = rz_new / rz;
            rz = rz_new;

            // p = z + βp
            p.axpy(T::one(), z, beta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn cg_simple() {
        // Test that CG works with a simple symmetric positive definite 2x2 system.
        let mtx = vec![4.0, 1.0, 1.0, 3.0];
        let b = vec![1.0, 2.0];
        let mut x: Vec<f64> = vec![0.0, 0.0];

        let mut cg = ConjugateGradient::new(2, 100, 1e-12);
        let result = cg.solve(
            |x, out| {
                out[0] = mtx[0] * x[0] + mtx[1] * x[1];
                out[1] = mtx[2] * x[0] + mtx[3] * x[1];
            },
            &[4.0, 3.0],
            x.as_mut_slice(),
            &b,
        );

        assert_eq!(result.status, Status::Success);
        assert!(result.iterations <= 2);
        assert!((x[0] - 1.0 / 11.0).abs() < 1e-10, "actual: {}", x[0]);
        assert!((x[1] - 7.0 / 11.0).abs() < 1e-10, "actual: {}", x[1]);
    }

    #[test]
    fn zero_rhs() {
        let mut x = vec![0.0; 3];
        let mut cg = ConjugateGradient::new(3, 10, 1e-10);
        let result = cg.solve(|x, out| out.copy_from_slice(x), &[1.0; 3], &mut x, &[0.0; 3]);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.status, Status::Success);
    }
}
