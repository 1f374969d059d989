//! Containment queries against the deformed solid.

use crate::fe::q1;
use crate::mesh::{Mesh, Point};

/// Axis aligned bounding box stored as `[min_0, max_0, min_1, max_1, ...]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SolidBox(pub Vec<f64>);

impl SolidBox {
    /// Box around every vertex of `mesh`.
    pub fn from_mesh(mesh: &Mesh) -> Self {
        let dim = mesh.dim();
        let mut extents = vec![0.0; 2 * dim];
        let mut vertices = mesh.vertices().iter();
        if let Some(first) = vertices.next() {
            for i in 0..dim {
                extents[2 * i] = first[i];
                extents[2 * i + 1] = first[i];
            }
        }
        for x in vertices {
            for i in 0..dim {
                extents[2 * i] = extents[2 * i].min(x[i]);
                extents[2 * i + 1] = extents[2 * i + 1].max(x[i]);
            }
        }
        SolidBox(extents)
    }

    pub fn min(&self, axis: usize) -> f64 {
        self.0[2 * axis]
    }

    pub fn max(&self, axis: usize) -> f64 {
        self.0[2 * axis + 1]
    }

    pub fn contains(&self, p: &Point) -> bool {
        (0..self.0.len() / 2).all(|i| p[i] >= self.min(i) && p[i] <= self.max(i))
    }
}

/// Bounding box and boundary segments of the solid.
#[derive(Clone, Debug, Default)]
pub struct SolidGeometry {
    pub solid_box: SolidBox,
    /// Vertex pairs of the boundary faces, 2D only.
    pub boundaries: Vec<[usize; 2]>,
}

impl SolidGeometry {
    /// Collects the boundary segments of a 2D mesh; 3D queries walk the cells instead.
    pub fn new(mesh: &Mesh) -> Self {
        let mut boundaries = Vec::new();
        if mesh.dim() == 2 {
            for cell in 0..mesh.n_cells() {
                for face in 0..q1::faces_per_cell(2) {
                    if mesh.at_boundary(cell, face) {
                        if let [a, b] = mesh.face_vertices(cell, face)[..] {
                            boundaries.push([a, b]);
                        }
                    }
                }
            }
        }
        SolidGeometry {
            solid_box: SolidBox::from_mesh(mesh),
            boundaries,
        }
    }

    pub fn update_box(&mut self, mesh: &Mesh) {
        self.solid_box = SolidBox::from_mesh(mesh);
    }

    /// Returns true if `p` lies inside or on the boundary of the solid described by `mesh`.
    ///
    /// In 2D a horizontal ray is cast from `p` towards `+x` and crossings with the
    /// boundary segments are counted. A segment is crossed when exactly one of its end
    /// points lies above the ray, so a vertex touched by the ray counts once if the
    /// boundary passes through it and zero or two times if it only grazes the ray.
    pub fn point_in_solid(&self, mesh: &Mesh, p: &Point) -> bool {
        if !self.solid_box.contains(p) {
            return false;
        }
        if mesh.dim() != 2 {
            return (0..mesh.n_cells()).any(|cell| mesh.point_inside(cell, p));
        }

        let (px, py) = (p[0], p[1]);
        let mut cross = 0;
        for &[a, b] in self.boundaries.iter() {
            let (p1, p2) = (mesh.vertex(a), mesh.vertex(b));
            if p1[1] == py && p2[1] == py {
                if p1[0].min(p2[0]) <= px && px <= p1[0].max(p2[0]) {
                    return true;
                }
                continue;
            }
            if (p1[1] == py && p1[0] == px) || (p2[1] == py && p2[0] == px) {
                // Vertex coincidence.
                return true;
            }
            if (p1[1] > py) != (p2[1] > py) {
                let x = p2[0] + (p1[0] - p2[0]) * (py - p2[1]) / (p1[1] - p2[1]);
                if x > px {
                    cross += 1;
                } else if x == px {
                    return true;
                }
            }
        }
        cross % 2 == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dofs::{DofHandler, DofLayout};
    use crate::fsi::mover::DeformedConfiguration;
    use rand::prelude::*;

    fn unit_square() -> (Mesh, SolidGeometry) {
        let mesh = Mesh::hyper_rectangle(&[0.0, 0.0], &[1.0, 1.0], &[1, 1]);
        let geometry = SolidGeometry::new(&mesh);
        (mesh, geometry)
    }

    fn pt(x: f64, y: f64) -> Point {
        Point::from_vec(vec![x, y])
    }

    #[test]
    fn unit_square_containment() {
        let (mesh, geometry) = unit_square();
        assert_eq!(geometry.boundaries.len(), 4);
        assert!(geometry.point_in_solid(&mesh, &pt(0.5, 0.5)));
        assert!(!geometry.point_in_solid(&mesh, &pt(1.5, 0.5)));
        assert!(geometry.point_in_solid(&mesh, &pt(0.0, 0.5)));
        assert!(geometry.point_in_solid(&mesh, &pt(0.5, 1.0)));
        assert!(!geometry.point_in_solid(&mesh, &pt(-1e-12, 0.5)));
        assert!(geometry.point_in_solid(&mesh, &pt(1.0, 1.0)));
    }

    #[test]
    fn ray_along_a_segment() {
        let (mesh, geometry) = unit_square();
        assert!(geometry.point_in_solid(&mesh, &pt(0.5, 0.0)));
        assert!(geometry.point_in_solid(&mesh, &pt(0.0, 0.0)));
    }

    #[test]
    fn ray_through_inner_vertices() {
        // Points level with the vertices between boundary segments.
        let mesh = Mesh::hyper_rectangle(&[0.0, 0.0], &[1.0, 1.0], &[2, 2]);
        let geometry = SolidGeometry::new(&mesh);
        assert_eq!(geometry.boundaries.len(), 8);
        assert!(geometry.point_in_solid(&mesh, &pt(0.25, 0.5)));
        assert!(geometry.point_in_solid(&mesh, &pt(0.5, 0.5)));
        assert!(geometry.point_in_solid(&mesh, &pt(1.0, 0.5)));
    }

    #[test]
    fn translated_box() {
        let (mut mesh, mut geometry) = unit_square();
        let dofs = DofHandler::new(&mesh, 2, DofLayout::Continuous);
        let displacement: Vec<f64> = (0..dofs.n_dofs())
            .map(|i| if i % 2 == 0 { 0.25 } else { -0.1 })
            .collect();
        {
            let deformed = DeformedConfiguration::new(&mut mesh, &dofs, &displacement).unwrap();
            geometry.update_box(&deformed);
            assert!(geometry.point_in_solid(&deformed, &pt(1.2, 0.85)));
            assert!(!geometry.point_in_solid(&deformed, &pt(0.2, 0.5)));
        }
        let expected = [0.25, 1.25, -0.1, 0.9];
        for (a, b) in geometry.solid_box.0.iter().zip(expected.iter()) {
            approx::assert_relative_eq!(*a, *b, epsilon = 1e-15);
        }
    }

    #[test]
    fn grazing_vertices_keep_the_parity() {
        // A 3x1 strip with its top vertex at x = 1 pushed down, so the top boundary has a
        // local minimum there.
        let mut mesh = Mesh::hyper_rectangle(&[0.0, 0.0], &[3.0, 1.0], &[3, 1]);
        let mut geometry = SolidGeometry::new(&mesh);
        let dofs = DofHandler::new(&mesh, 2, DofLayout::Continuous);
        let notch = (0..mesh.n_vertices())
            .find(|&v| mesh.vertex(v) == &pt(1.0, 1.0))
            .unwrap();
        let mut displacement = vec![0.0; dofs.n_dofs()];
        displacement[dofs.vertex_dof(notch, 1)] = -0.4;
        let deformed = DeformedConfiguration::new(&mut mesh, &dofs, &displacement).unwrap();
        geometry.update_box(&deformed);
        let oracle = |p: &Point| (0..deformed.n_cells()).any(|c| deformed.point_inside(c, p));

        // Rays level with the notch touch it without crossing the boundary.
        let notch_y = deformed.vertex(notch)[1];
        for i in 0..30 {
            let p = pt(0.05 + i as f64 * 0.1, notch_y);
            assert!(oracle(&p));
            assert!(geometry.point_in_solid(&deformed, &p), "at {:?}", p.as_slice());
        }
        assert!(geometry.point_in_solid(&deformed, &pt(1.0, notch_y)));
        assert!(!geometry.point_in_solid(&deformed, &pt(1.0, 0.8)));

        let mut rng = StdRng::from_seed([7; 32]);
        for _ in 0..500 {
            let p = pt(rng.gen_range(0.0..3.0), rng.gen_range(0.0..1.0));
            assert_eq!(geometry.point_in_solid(&deformed, &p), oracle(&p), "at {:?}", p.as_slice());
        }
    }

    #[test]
    fn three_dimensional_cells() {
        let mesh = Mesh::hyper_rectangle(&[0.0; 3], &[1.0; 3], &[1, 1, 1]);
        let geometry = SolidGeometry::new(&mesh);
        assert!(geometry.boundaries.is_empty());
        assert!(geometry.point_in_solid(&mesh, &Point::from_vec(vec![0.5, 0.5, 0.5])));
        assert!(!geometry.point_in_solid(&mesh, &Point::from_vec(vec![0.5, 1.5, 0.5])));
    }
}
