//! Multilinear mapping between the reference cell and a physical cell.

use super::q1;
use crate::mesh::Point;

/// Tolerance on reference coordinates when deciding whether a point lies in a cell.
pub const INSIDE_TOLERANCE: f64 = 1e-10;

const MAX_NEWTON_ITERATIONS: usize = 20;

pub fn map_to_real(vertices: &[Point], xi: &Point) -> Point {
    vertices
        .iter()
        .enumerate()
        .fold(Point::zeros(xi.len()), |acc, (v, x)| acc + x * q1::value(v, xi))
}

/// Jacobian `J[(i, j)] = dx_i / dxi_j`.
pub fn jacobian(vertices: &[Point], xi: &Point) -> na::DMatrix<f64> {
    let dim = xi.len();
    let mut jac = na::DMatrix::zeros(dim, dim);
    for (v, x) in vertices.iter().enumerate() {
        jac += x * q1::gradient(v, xi).transpose();
    }
    jac
}

/// Inverts the mapping with Newton's method started from the cell center.
///
/// Returns `None` if the iteration meets a singular Jacobian or does not converge.
pub fn map_to_unit(vertices: &[Point], x: &Point) -> Option<Point> {
    let dim = x.len();
    let mut xi = Point::from_element(dim, 0.5);
    for _ in 0..MAX_NEWTON_ITERATIONS {
        let residual = map_to_real(vertices, &xi) - x;
        let delta = jacobian(vertices, &xi).lu().solve(&residual)?;
        xi -= &delta;
        if delta.norm() < 1e-12 {
            return Some(xi);
        }
    }
    None
}

pub fn is_inside_unit_cell(xi: &Point) -> bool {
    xi.iter()
        .all(|&c| c >= -INSIDE_TOLERANCE && c <= 1.0 + INSIDE_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn skewed_quad() -> Vec<Point> {
        vec![
            Point::from_vec(vec![0.0, 0.0]),
            Point::from_vec(vec![2.0, 0.1]),
            Point::from_vec(vec![0.2, 1.0]),
            Point::from_vec(vec![2.5, 1.5]),
        ]
    }

    #[test]
    fn inverse_mapping() {
        let verts = skewed_quad();
        let xi = Point::from_vec(vec![0.3, 0.7]);
        let x = map_to_real(&verts, &xi);
        let back = map_to_unit(&verts, &x).unwrap();
        assert_relative_eq!(back, xi, epsilon = 1e-10);
        assert!(is_inside_unit_cell(&back));
    }

    #[test]
    fn jacobian_of_scaled_square() {
        let verts: Vec<_> = (0..4)
            .map(|v| q1::unit_vertex(2, v) * 3.0)
            .collect();
        let jac = jacobian(&verts, &Point::from_vec(vec![0.1, 0.9]));
        assert_relative_eq!(jac, na::DMatrix::identity(2, 2) * 3.0, epsilon = 1e-14);
    }
}
