//! Cross-mesh point location and interpolation.

use std::collections::VecDeque;

use crate::dofs::DofHandler;
use crate::fe::q1;
use crate::mesh::{CellId, Mesh, Point};

/// Face-neighbour rings searched around a stale hint before scanning the whole mesh.
pub const MAX_WALK_DEPTH: usize = 2;

/// Outcome of a successful [`locate`] query.
#[derive(Clone, Debug, PartialEq)]
pub struct Located {
    pub cell: CellId,
    /// Reference coordinates of the query point in `cell`.
    pub unit_point: Point,
    /// Number of cells tested before the hit, zero when the hint was correct.
    pub neighbor_walks: usize,
}

/// Finds the cell containing `q`, starting from `hint`.
///
/// The hint is tested first, then its face neighbours breadth first up to
/// [`MAX_WALK_DEPTH`] rings, then every cell. On success `hint` is updated to the
/// containing cell. A stale hint never produces a wrong cell, only a slower search.
pub fn locate(mesh: &Mesh, q: &Point, hint: &mut CellId) -> Option<Located> {
    let start = if *hint < mesh.n_cells() { *hint } else { 0 };
    let found = |cell: CellId, walks: usize| {
        if !mesh.point_inside(cell, q) {
            return None;
        }
        mesh.reference_coordinates(cell, q).map(|unit_point| Located {
            cell,
            unit_point,
            neighbor_walks: walks,
        })
    };

    if let Some(hit) = found(start, 0) {
        *hint = start;
        return Some(hit);
    }

    let mut visited = vec![false; mesh.n_cells()];
    visited[start] = true;
    let mut queue: VecDeque<(CellId, usize)> = VecDeque::new();
    queue.push_back((start, 0));
    let mut walks = 0;
    while let Some((cell, depth)) = queue.pop_front() {
        if depth == MAX_WALK_DEPTH {
            continue;
        }
        for &neighbor in mesh.cell(cell).neighbors.iter().flatten() {
            if visited[neighbor] {
                continue;
            }
            visited[neighbor] = true;
            walks += 1;
            if let Some(hit) = found(neighbor, walks) {
                *hint = neighbor;
                return Some(hit);
            }
            queue.push_back((neighbor, depth + 1));
        }
    }

    for cell in 0..mesh.n_cells() {
        if visited[cell] {
            continue;
        }
        walks += 1;
        if let Some(hit) = found(cell, walks) {
            *hint = cell;
            return Some(hit);
        }
    }
    None
}

/// Evaluates finite element fields at a located point.
#[derive(Clone, Debug)]
pub struct GridInterpolator<'a> {
    mesh: &'a Mesh,
    location: Located,
}

impl<'a> GridInterpolator<'a> {
    pub fn new(mesh: &'a Mesh, location: Located) -> Self {
        GridInterpolator { mesh, location }
    }

    /// Locates `q` by scanning the mesh from the first cell.
    pub fn find(mesh: &'a Mesh, q: &Point) -> Option<Self> {
        let mut hint = 0;
        locate(mesh, q, &mut hint).map(|location| GridInterpolator::new(mesh, location))
    }

    pub fn cell(&self) -> CellId {
        self.location.cell
    }

    /// All components of `field` at the point.
    pub fn point_value(&self, dofs: &DofHandler, field: &[f64]) -> Vec<f64> {
        let nc = dofs.n_components;
        let local = dofs.cell_values(self.mesh, self.location.cell, field);
        let xi = &self.location.unit_point;
        let mut value = vec![0.0; nc];
        for v in 0..q1::vertices_per_cell(self.mesh.dim()) {
            let n = q1::value(v, xi);
            for (c, out) in value.iter_mut().enumerate() {
                *out += n * local[v * nc + c];
            }
        }
        value
    }

    /// Physical gradient of every component of `field` at the point.
    pub fn point_gradient(&self, dofs: &DofHandler, field: &[f64]) -> Vec<Point> {
        let dim = self.mesh.dim();
        let nc = dofs.n_components;
        let local = dofs.cell_values(self.mesh, self.location.cell, field);
        let xi = &self.location.unit_point;
        let vertices = self.mesh.cell_vertices(self.location.cell);
        let inv_t = crate::fe::mapping::jacobian(&vertices, xi)
            .try_inverse()
            .map(|inv| inv.transpose());
        let mut gradient = vec![Point::zeros(dim); nc];
        let inv_t = match inv_t {
            Some(inv_t) => inv_t,
            None => return gradient,
        };
        for v in 0..q1::vertices_per_cell(dim) {
            let g = &inv_t * q1::gradient(v, xi);
            for (c, out) in gradient.iter_mut().enumerate() {
                *out += &g * local[v * nc + c];
            }
        }
        gradient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dofs::DofLayout;
    use approx::assert_relative_eq;

    #[test]
    fn hint_fast_path() {
        let mut mesh = Mesh::hyper_rectangle(&[0.0, 0.0], &[1.0, 1.0], &[4, 4]);
        mesh.refine_global(1);
        let mut hint = 0;
        let q = Point::from_vec(vec![0.81, 0.63]);
        let first = locate(&mesh, &q, &mut hint).unwrap();
        assert_eq!(first.cell, hint);
        assert!(mesh.point_inside(hint, &q));
        let nearby = Point::from_vec(vec![0.8101, 0.6299]);
        let second = locate(&mesh, &nearby, &mut hint).unwrap();
        assert_eq!(second.neighbor_walks, 0);
        assert_eq!(second.cell, first.cell);
    }

    #[test]
    fn stale_hint_walks_neighbors() {
        let mesh = Mesh::hyper_rectangle(&[0.0, 0.0], &[1.0, 1.0], &[8, 8]);
        let mut hint = 0;
        let q = Point::from_vec(vec![0.2, 0.05]);
        let hit = locate(&mesh, &q, &mut hint).unwrap();
        assert_eq!(hit.cell, 1);
        assert_eq!(hit.neighbor_walks, 1);
        // Far away point falls back to the full scan.
        let far = Point::from_vec(vec![0.95, 0.95]);
        let hit = locate(&mesh, &far, &mut hint).unwrap();
        assert_eq!(hit.cell, 63);
        assert!(locate(&mesh, &Point::from_vec(vec![1.5, 0.5]), &mut hint).is_none());
        assert_eq!(hint, 63);
    }

    #[test]
    fn interpolates_linear_field() {
        let mesh = Mesh::hyper_rectangle(&[0.0, 0.0], &[2.0, 1.0], &[3, 2]);
        let dofs = DofHandler::new(&mesh, 2, DofLayout::Continuous);
        let field: Vec<f64> = mesh
            .vertices()
            .iter()
            .flat_map(|x| vec![1.0 + x[0] - 2.0 * x[1], 0.5 * x[1]])
            .collect();
        let q = Point::from_vec(vec![1.3, 0.7]);
        let interp = GridInterpolator::find(&mesh, &q).unwrap();
        let value = interp.point_value(&dofs, &field);
        assert_relative_eq!(value[0], 1.0 + 1.3 - 1.4, epsilon = 1e-12);
        assert_relative_eq!(value[1], 0.35, epsilon = 1e-12);
        let grad = interp.point_gradient(&dofs, &field);
        assert_relative_eq!(grad[0], Point::from_vec(vec![1.0, -2.0]), epsilon = 1e-12);
        assert_relative_eq!(grad[1], Point::from_vec(vec![0.0, 0.5]), epsilon = 1e-12);
    }
}
