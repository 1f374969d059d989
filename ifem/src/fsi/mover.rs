//! Switching the solid mesh between its reference and deformed configuration.

use std::ops::Deref;

use crate::dofs::DofHandler;
use crate::mesh::{Mesh, Point};
use crate::{Error, Result};

/// The solid mesh moved by the current displacement.
///
/// Creating the guard adds the nodal displacement to every vertex once. Dropping it puts
/// back the reference coordinates it saved, bit for bit, on every exit path.
#[derive(Debug)]
pub struct DeformedConfiguration<'a> {
    mesh: &'a mut Mesh,
    reference: Vec<Point>,
}

impl<'a> DeformedConfiguration<'a> {
    pub fn new(mesh: &'a mut Mesh, dofs: &DofHandler, displacement: &[f64]) -> Result<Self> {
        if displacement.len() != dofs.n_dofs() {
            return Err(Error::SizeMismatch {
                expected: dofs.n_dofs(),
                actual: displacement.len(),
            });
        }
        let dim = mesh.dim();
        let reference = mesh.vertices().to_vec();
        let mut vertex_touched = vec![false; mesh.n_vertices()];
        for cell in 0..mesh.n_cells() {
            let cell_dofs = dofs.cell_dofs(mesh, cell);
            let vertices = mesh.cell(cell).vertices.clone();
            for (v, vertex) in vertices.into_iter().enumerate() {
                if vertex_touched[vertex] {
                    continue;
                }
                vertex_touched[vertex] = true;
                let x = mesh.vertex_mut(vertex);
                for d in 0..dim {
                    x[d] += displacement[cell_dofs[v * dofs.n_components + d]];
                }
            }
        }
        Ok(DeformedConfiguration { mesh, reference })
    }

    pub fn mesh(&self) -> &Mesh {
        &*self.mesh
    }
}

impl Deref for DeformedConfiguration<'_> {
    type Target = Mesh;
    fn deref(&self) -> &Mesh {
        &*self.mesh
    }
}

impl Drop for DeformedConfiguration<'_> {
    fn drop(&mut self) {
        self.mesh.replace_vertices(std::mem::take(&mut self.reference));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dofs::DofLayout;
    use rand::prelude::*;

    #[test]
    fn displacement_moves_every_vertex_once() {
        let mut mesh = Mesh::hyper_rectangle(&[0.0, 0.0], &[1.0, 1.0], &[2, 2]);
        let dofs = DofHandler::new(&mesh, 2, DofLayout::Continuous);
        let displacement: Vec<f64> = (0..dofs.n_dofs())
            .map(|i| if i % 2 == 0 { 0.25 } else { -0.1 })
            .collect();
        let reference = mesh.vertices().to_vec();
        {
            let deformed = DeformedConfiguration::new(&mut mesh, &dofs, &displacement).unwrap();
            for (x, x0) in deformed.vertices().iter().zip(reference.iter()) {
                assert_eq!(x[0], x0[0] + 0.25);
                assert_eq!(x[1], x0[1] - 0.1);
            }
        }
        assert_eq!(mesh.vertices(), reference.as_slice());
    }

    #[test]
    fn restore_is_exact() {
        let mut rng = StdRng::from_seed([7; 32]);
        let mut mesh = Mesh::hyper_rectangle(&[0.0, 0.0], &[1.0, 1.0], &[3, 4]);
        let dofs = DofHandler::new(&mesh, 2, DofLayout::Continuous);
        let reference = mesh.vertices().to_vec();
        for _ in 0..10 {
            let displacement: Vec<f64> = (0..dofs.n_dofs()).map(|_| rng.gen_range(-0.3..0.3)).collect();
            let _deformed = DeformedConfiguration::new(&mut mesh, &dofs, &displacement).unwrap();
        }
        assert_eq!(mesh.vertices(), reference.as_slice());
    }

    #[test]
    fn wrong_size_leaves_mesh_untouched() {
        let mut mesh = Mesh::hyper_rectangle(&[0.0, 0.0], &[1.0, 1.0], &[1, 1]);
        let dofs = DofHandler::new(&mesh, 2, DofLayout::Continuous);
        let reference = mesh.vertices().to_vec();
        assert!(DeformedConfiguration::new(&mut mesh, &dofs, &[1.0]).is_err());
        assert_eq!(mesh.vertices(), reference.as_slice());
    }
}
