//! Multilinear Lagrange shape functions on the reference cell `[0,1]^dim`.
//!
//! Vertices are numbered lexicographically: bit `d` of a vertex index is its coordinate in
//! direction `d`. Face `f` is normal to axis `f / 2` and lies on side `f % 2`.

use crate::mesh::Point;

pub fn vertices_per_cell(dim: usize) -> usize {
    1 << dim
}

pub fn faces_per_cell(dim: usize) -> usize {
    2 * dim
}

#[inline]
fn bit(v: usize, d: usize) -> usize {
    (v >> d) & 1
}

pub fn unit_vertex(dim: usize, v: usize) -> Point {
    Point::from_fn(dim, |d, _| bit(v, d) as f64)
}

/// Local vertices of face `face`, in increasing order.
pub fn face_vertices(dim: usize, face: usize) -> Vec<usize> {
    let (axis, side) = (face / 2, face % 2);
    (0..vertices_per_cell(dim))
        .filter(|&v| bit(v, axis) == side)
        .collect()
}

/// Outward unit normal of a reference face.
pub fn unit_normal(dim: usize, face: usize) -> Point {
    let mut n = Point::zeros(dim);
    n[face / 2] = if face % 2 == 0 { -1.0 } else { 1.0 };
    n
}

pub fn value(v: usize, xi: &Point) -> f64 {
    (0..xi.len())
        .map(|d| if bit(v, d) == 1 { xi[d] } else { 1.0 - xi[d] })
        .product()
}

pub fn gradient(v: usize, xi: &Point) -> Point {
    let dim = xi.len();
    Point::from_fn(dim, |k, _| {
        (0..dim)
            .map(|d| {
                let on = bit(v, d) == 1;
                if d == k {
                    if on {
                        1.0
                    } else {
                        -1.0
                    }
                } else if on {
                    xi[d]
                } else {
                    1.0 - xi[d]
                }
            })
            .product()
    })
}
