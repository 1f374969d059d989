//! Finite element infrastructure for Q1 quadrilaterals and hexahedra.

pub mod mapping;
pub mod q1;
pub mod quadrature;

pub use quadrature::Quadrature;

use crate::mesh::{CellId, Mesh, Point};
use crate::{Error, Result};

/// A vector valued Q1 element with `n_components` components per vertex.
///
/// Local degrees of freedom are ordered vertex-major: local dof `i` is component
/// `i % n_components` of the shape function attached to vertex `i / n_components`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FeSystem {
    pub dim: usize,
    pub n_components: usize,
}

impl FeSystem {
    pub fn new(dim: usize, n_components: usize) -> Self {
        FeSystem { dim, n_components }
    }

    pub fn dofs_per_cell(&self) -> usize {
        q1::vertices_per_cell(self.dim) * self.n_components
    }

    /// Returns `(component, shape function index)` of local dof `i`.
    pub fn system_to_component_index(&self, i: usize) -> (usize, usize) {
        (i % self.n_components, i / self.n_components)
    }

    /// Reference coordinates of the support point of each local dof.
    pub fn unit_support_points(&self) -> Vec<Point> {
        (0..self.dofs_per_cell())
            .map(|i| q1::unit_vertex(self.dim, self.system_to_component_index(i).1))
            .collect()
    }
}

/// Matrix `P` mapping values at quadrature points to the nodal values of the Q1 field
/// closest to them in the reference cell L2 sense: `P = M^-1 B` with
/// `M_ab = sum_q N_a N_b w_q` and `B_aq = N_a(x_q) w_q`.
pub fn projection_from_quadrature_points(dim: usize, quadrature: &Quadrature) -> na::DMatrix<f64> {
    let nv = q1::vertices_per_cell(dim);
    let nq = quadrature.size();
    let b = na::DMatrix::from_fn(nv, nq, |a, q| {
        q1::value(a, quadrature.point(q)) * quadrature.weight(q)
    });
    let n = na::DMatrix::from_fn(nv, nq, |a, q| q1::value(a, quadrature.point(q)));
    let mass = &b * n.transpose();
    mass.lu().solve(&b).unwrap_or_else(|| na::DMatrix::zeros(nv, nq))
}

/// Shape function values and gradients on a physical cell at a set of reference points.
#[derive(Clone, Debug)]
pub struct FeValues {
    dim: usize,
    quadrature: Quadrature,
    values: Vec<Vec<f64>>,
    ref_gradients: Vec<Vec<Point>>,
    gradients: Vec<Vec<Point>>,
    points: Vec<Point>,
    jxw: Vec<f64>,
}

impl FeValues {
    pub fn new(dim: usize, quadrature: Quadrature) -> Self {
        let nv = q1::vertices_per_cell(dim);
        let values = quadrature
            .points()
            .iter()
            .map(|xi| (0..nv).map(|v| q1::value(v, xi)).collect())
            .collect();
        let ref_gradients: Vec<Vec<Point>> = quadrature
            .points()
            .iter()
            .map(|xi| (0..nv).map(|v| q1::gradient(v, xi)).collect())
            .collect();
        let n_q = quadrature.size();
        FeValues {
            dim,
            values,
            gradients: ref_gradients.clone(),
            ref_gradients,
            points: vec![Point::zeros(dim); n_q],
            jxw: vec![0.0; n_q],
            quadrature,
        }
    }

    /// Computes physical gradients, quadrature points and weights on `cell`.
    pub fn reinit(&mut self, mesh: &Mesh, cell: CellId) -> Result<()> {
        let vertices = mesh.cell_vertices(cell);
        for q in 0..self.quadrature.size() {
            let xi = self.quadrature.point(q);
            let jac = mapping::jacobian(&vertices, xi);
            let det = jac.determinant();
            let inv = jac
                .try_inverse()
                .filter(|_| det > 0.0)
                .ok_or(Error::DegenerateCell { cell })?;
            self.jxw[q] = det * self.quadrature.weight(q);
            self.points[q] = mapping::map_to_real(&vertices, xi);
            for (g, rg) in self.gradients[q].iter_mut().zip(self.ref_gradients[q].iter()) {
                *g = inv.tr_mul(rg);
            }
        }
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn n_quadrature_points(&self) -> usize {
        self.quadrature.size()
    }

    pub fn shape_value(&self, v: usize, q: usize) -> f64 {
        self.values[q][v]
    }

    pub fn shape_grad(&self, v: usize, q: usize) -> &Point {
        &self.gradients[q][v]
    }

    pub fn jxw(&self, q: usize) -> f64 {
        self.jxw[q]
    }

    pub fn quadrature_point(&self, q: usize) -> &Point {
        &self.points[q]
    }

    pub fn quadrature_points(&self) -> &[Point] {
        &self.points
    }

    /// Component `component` of a vector field given by its local dof values.
    pub fn component_value(&self, local: &[f64], fe: &FeSystem, component: usize, q: usize) -> f64 {
        (0..self.values[q].len())
            .map(|v| local[v * fe.n_components + component] * self.values[q][v])
            .sum()
    }

    /// Gradient of component `component` of a vector field given by its local dof values.
    pub fn component_gradient(
        &self,
        local: &[f64],
        fe: &FeSystem,
        component: usize,
        q: usize,
    ) -> Point {
        self.gradients[q]
            .iter()
            .enumerate()
            .fold(Point::zeros(self.dim), |acc, (v, g)| {
                acc + g * local[v * fe.n_components + component]
            })
    }

    /// The first `dim` components of a vector field at quadrature point `q`.
    pub fn vector_value(&self, local: &[f64], fe: &FeSystem, q: usize) -> Point {
        Point::from_fn(self.dim, |c, _| self.component_value(local, fe, c, q))
    }

    /// Gradient `G[(i, j)] = du_i / dx_j` of the first `dim` components.
    pub fn vector_gradient(&self, local: &[f64], fe: &FeSystem, q: usize) -> na::DMatrix<f64> {
        let mut grad = na::DMatrix::zeros(self.dim, self.dim);
        for i in 0..self.dim {
            let gi = self.component_gradient(local, fe, i, q);
            grad.row_mut(i).copy_from(&gi.transpose());
        }
        grad
    }
}

/// Shape function values, quadrature points, normals and surface weights on cell faces.
#[derive(Clone, Debug)]
pub struct FeFaceValues {
    dim: usize,
    face_quadrature: Quadrature,
    values: Vec<Vec<f64>>,
    points: Vec<Point>,
    normals: Vec<Point>,
    jxw: Vec<f64>,
    face: usize,
}

impl FeFaceValues {
    /// `face_quadrature` is a `dim - 1` dimensional rule.
    pub fn new(dim: usize, face_quadrature: Quadrature) -> Self {
        let n_q = face_quadrature.size();
        FeFaceValues {
            dim,
            face_quadrature,
            values: Vec::new(),
            points: vec![Point::zeros(dim); n_q],
            normals: vec![Point::zeros(dim); n_q],
            jxw: vec![0.0; n_q],
            face: usize::MAX,
        }
    }

    pub fn reinit(&mut self, mesh: &Mesh, cell: CellId, face: usize) -> Result<()> {
        let vertices = mesh.cell_vertices(cell);
        let rule = Quadrature::on_face(&self.face_quadrature, self.dim, face);
        let nv = q1::vertices_per_cell(self.dim);
        if self.face != face {
            self.values = rule
                .points()
                .iter()
                .map(|xi| (0..nv).map(|v| q1::value(v, xi)).collect())
                .collect();
            self.face = face;
        }
        let unit_normal = q1::unit_normal(self.dim, face);
        for q in 0..rule.size() {
            let xi = rule.point(q);
            let jac = mapping::jacobian(&vertices, xi);
            let det = jac.determinant();
            let inv = jac
                .try_inverse()
                .filter(|_| det > 0.0)
                .ok_or(Error::DegenerateCell { cell })?;
            // Nanson's formula: n da = det(J) J^-T N dA.
            let scaled = inv.tr_mul(&unit_normal);
            let norm = scaled.norm();
            self.normals[q] = scaled / norm;
            self.jxw[q] = det * norm * rule.weight(q);
            self.points[q] = mapping::map_to_real(&vertices, xi);
        }
        Ok(())
    }

    pub fn n_quadrature_points(&self) -> usize {
        self.face_quadrature.size()
    }

    pub fn shape_value(&self, v: usize, q: usize) -> f64 {
        self.values[q][v]
    }

    pub fn jxw(&self, q: usize) -> f64 {
        self.jxw[q]
    }

    pub fn quadrature_point(&self, q: usize) -> &Point {
        &self.points[q]
    }

    pub fn normal_vector(&self, q: usize) -> &Point {
        &self.normals[q]
    }
}
