//! Quadrilateral and hexahedral meshes with local refinement.
//!
//! Cells store their vertices in lexicographic order (see [`crate::fe::q1`]). Face
//! neighbours are recovered by matching face vertex sets. Refinement splits only flagged
//! cells and keeps neighbouring levels within one of each other, so the only
//! non-conforming vertices are edge and face midpoints of a coarser cell (see
//! [`Mesh::hanging_vertices`]). Split cells are remembered so that complete sibling groups
//! can be merged again.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fe::{mapping, q1};

type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;

pub type Point = na::DVector<f64>;
pub type CellId = usize;
pub type BoundaryId = u32;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub vertices: Vec<usize>,
    /// Face neighbours, `None` on the boundary.
    ///
    /// Across a refinement level change the fine side points to the coarse cell and the
    /// coarse side to one of the fine cells.
    pub neighbors: Vec<Option<CellId>>,
    /// Boundary id of each face, `None` for interior faces.
    pub boundary_ids: Vec<Option<BoundaryId>>,
    pub material_id: u32,
    pub subdomain_id: usize,
    pub level: u32,
    /// The split cell this one was created from.
    pub parent: Option<usize>,
}

/// Input to [`Mesh::from_cells`].
#[derive(Clone, Debug)]
pub struct CellSpec {
    pub vertices: Vec<usize>,
    /// Boundary ids used for faces that turn out to be on the boundary.
    pub boundary_ids: Vec<Option<BoundaryId>>,
    pub material_id: u32,
    pub subdomain_id: usize,
    pub level: u32,
}

/// A vertex on an edge or face of a cell that is not one of the cell corners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HangingVertex {
    pub vertex: usize,
    /// Corners of the coarse edge or face. The vertex sits at their mean.
    pub masters: Vec<usize>,
}

/// How a cell relates to the current rank.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ownership {
    LocallyOwned,
    /// Not owned, but shares at least one vertex with an owned cell.
    Ghost,
    Artificial,
}

/// Per cell refinement and coarsening requests.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RefinementFlags {
    pub refine: Vec<bool>,
    pub coarsen: Vec<bool>,
}

impl RefinementFlags {
    pub fn new(n_cells: usize) -> Self {
        RefinementFlags {
            refine: vec![false; n_cells],
            coarsen: vec![false; n_cells],
        }
    }
}

/// What happened when refinement flags were executed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MeshChange {
    /// At least one cell was split. Sibling groups may have been merged as well.
    Refined,
    Coarsened,
    Unchanged,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mesh {
    dim: usize,
    vertices: Vec<Point>,
    cells: Vec<Cell>,
    /// Split cells, referenced by [`Cell::parent`].
    parents: HashMap<usize, Cell>,
    next_parent: usize,
    /// Vertices created by refinement keyed by the sorted corners they are the mean of.
    midpoints: HashMap<Vec<usize>, usize>,
}

impl Mesh {
    pub fn from_cells(dim: usize, vertices: Vec<Point>, specs: Vec<CellSpec>) -> Mesh {
        let n_faces = q1::faces_per_cell(dim);
        let cells = specs
            .iter()
            .map(|spec| Cell {
                vertices: spec.vertices.clone(),
                neighbors: vec![None; n_faces],
                boundary_ids: vec![None; n_faces],
                material_id: spec.material_id,
                subdomain_id: spec.subdomain_id,
                level: spec.level,
                parent: None,
            })
            .collect();
        let mut mesh = Mesh {
            dim,
            vertices,
            cells,
            parents: HashMap::default(),
            next_parent: 0,
            midpoints: HashMap::default(),
        };
        for (cell, face) in mesh.connect_faces().into_values() {
            mesh.cells[cell].boundary_ids[face] = Some(specs[cell].boundary_ids[face].unwrap_or(0));
        }
        mesh
    }

    /// An axis aligned box split into `subdivisions[d]` cells along each axis.
    ///
    /// Boundary faces at the lower end of axis `d` get id `2d`, those at the upper end
    /// get `2d + 1`.
    pub fn hyper_rectangle(lower: &[f64], upper: &[f64], subdivisions: &[usize]) -> Mesh {
        let dim = lower.len();
        let n_points: Vec<usize> = subdivisions.iter().map(|&n| n + 1).collect();
        let n_vertices: usize = n_points.iter().product();
        let vertices = (0..n_vertices)
            .map(|k| {
                let idx = unravel(k, &n_points);
                Point::from_fn(dim, |d, _| {
                    lower[d] + (upper[d] - lower[d]) * idx[d] as f64 / subdivisions[d] as f64
                })
            })
            .collect();

        let n_cells: usize = subdivisions.iter().product();
        let specs = (0..n_cells)
            .map(|k| {
                let idx = unravel(k, subdivisions);
                let vertices = (0..q1::vertices_per_cell(dim))
                    .map(|v| {
                        let corner: Vec<usize> = (0..dim).map(|d| idx[d] + ((v >> d) & 1)).collect();
                        ravel(&corner, &n_points)
                    })
                    .collect();
                let boundary_ids = (0..q1::faces_per_cell(dim))
                    .map(|f| {
                        let (d, side) = (f / 2, f % 2);
                        let at_end = if side == 0 {
                            idx[d] == 0
                        } else {
                            idx[d] + 1 == subdivisions[d]
                        };
                        at_end.then(|| f as BoundaryId)
                    })
                    .collect();
                CellSpec {
                    vertices,
                    boundary_ids,
                    material_id: 0,
                    subdomain_id: 0,
                    level: 0,
                }
            })
            .collect();
        Mesh::from_cells(dim, vertices, specs)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn n_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn vertex(&self, i: usize) -> &Point {
        &self.vertices[i]
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn vertex_mut(&mut self, i: usize) -> &mut Point {
        &mut self.vertices[i]
    }

    /// Swaps in a new set of vertex coordinates, returning the old one.
    pub fn replace_vertices(&mut self, vertices: Vec<Point>) -> Vec<Point> {
        debug_assert_eq!(vertices.len(), self.vertices.len());
        std::mem::replace(&mut self.vertices, vertices)
    }

    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id]
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell_vertices(&self, id: CellId) -> Vec<Point> {
        self.cells[id]
            .vertices
            .iter()
            .map(|&v| self.vertices[v].clone())
            .collect()
    }

    /// Average of the cell vertices.
    pub fn center(&self, id: CellId) -> Point {
        let cell = &self.cells[id];
        let sum = cell
            .vertices
            .iter()
            .fold(Point::zeros(self.dim), |acc, &v| acc + &self.vertices[v]);
        sum / cell.vertices.len() as f64
    }

    pub fn at_boundary(&self, id: CellId, face: usize) -> bool {
        self.cells[id].neighbors[face].is_none()
    }

    pub fn boundary_id(&self, id: CellId, face: usize) -> Option<BoundaryId> {
        self.cells[id].boundary_ids[face]
    }

    /// Global vertex indices of a cell face in the local face order.
    pub fn face_vertices(&self, id: CellId, face: usize) -> Vec<usize> {
        q1::face_vertices(self.dim, face)
            .into_iter()
            .map(|v| self.cells[id].vertices[v])
            .collect()
    }

    /// Bounding box check followed by an inverse mapping of `p` into the reference cell.
    pub fn point_inside(&self, id: CellId, p: &Point) -> bool {
        let cell = &self.cells[id];
        for d in 0..self.dim {
            let (lo, hi) = cell.vertices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(self.vertices[v][d]), hi.max(self.vertices[v][d]))
            });
            let tol = mapping::INSIDE_TOLERANCE * (hi - lo).max(1.0);
            if p[d] < lo - tol || p[d] > hi + tol {
                return false;
            }
        }
        self.reference_coordinates(id, p)
            .map_or(false, |xi| mapping::is_inside_unit_cell(&xi))
    }

    pub fn reference_coordinates(&self, id: CellId, p: &Point) -> Option<Point> {
        mapping::map_to_unit(&self.cell_vertices(id), p)
    }

    /// Number of refinement levels, one more than the finest cell level.
    pub fn n_levels(&self) -> u32 {
        self.cells.iter().map(|c| c.level).max().map_or(0, |l| l + 1)
    }

    pub fn set_material_ids(&mut self, f: impl Fn(&Point) -> u32) {
        for id in 0..self.cells.len() {
            let c = self.center(id);
            self.cells[id].material_id = f(&c);
        }
    }

    /// Assigns each cell to a rank.
    pub fn set_subdomain_ids(&mut self, f: impl Fn(CellId, &Point) -> usize) {
        for id in 0..self.cells.len() {
            let c = self.center(id);
            self.cells[id].subdomain_id = f(id, &c);
        }
    }

    /// Classifies every cell relative to `rank`.
    pub fn ownership(&self, rank: usize) -> Vec<Ownership> {
        let mut owned_vertex = vec![false; self.vertices.len()];
        for cell in self.cells.iter().filter(|c| c.subdomain_id == rank) {
            for &v in cell.vertices.iter() {
                owned_vertex[v] = true;
            }
        }
        self.cells
            .iter()
            .map(|c| {
                if c.subdomain_id == rank {
                    Ownership::LocallyOwned
                } else if c.vertices.iter().any(|&v| owned_vertex[v]) {
                    Ownership::Ghost
                } else {
                    Ownership::Artificial
                }
            })
            .collect()
    }

    /// Vertices lying on an edge or face of some cell without being one of its corners.
    ///
    /// A continuous field takes the mean of the masters at each of them. Masters may hang
    /// themselves where the level changes twice in a row.
    pub fn hanging_vertices(&self) -> Vec<HangingVertex> {
        let extents = vec![3; self.dim];
        let mut found: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for cell in self.cells.iter() {
            for k in 0..3usize.pow(self.dim as u32) {
                let support = support(&cell.vertices, &unravel(k, &extents));
                if support.len() < 2 {
                    continue;
                }
                if let Some(&vertex) = self.midpoints.get(&support) {
                    found.entry(vertex).or_insert(support);
                }
            }
        }
        found
            .into_iter()
            .map(|(vertex, masters)| HangingVertex { vertex, masters })
            .collect()
    }

    pub fn refine_global(&mut self, times: u32) {
        for _ in 0..times {
            self.refine_cells(vec![true; self.cells.len()]);
        }
    }

    /// Merges every sibling group. Returns false if there was nothing to merge.
    pub fn coarsen_global(&mut self) -> bool {
        let n = self.cells.len();
        self.coarsen_cells(&vec![true; n], &vec![false; n]).0
    }

    /// Merges sibling groups flagged for coarsening, then splits cells flagged for refinement.
    ///
    /// A group is merged only if all of its children are flagged for coarsening and none is
    /// flagged for refinement. More cells than flagged may be split so that cells sharing
    /// an edge differ by at most one level. Missing flags count as unset.
    pub fn execute_coarsening_and_refinement(&mut self, flags: &RefinementFlags) -> MeshChange {
        let n = self.cells.len();
        let padded = |v: &[bool]| -> Vec<bool> { (0..n).map(|c| v.get(c).copied().unwrap_or(false)).collect() };
        let (coarsened, refine) = self.coarsen_cells(&padded(flags.coarsen.as_slice()), &padded(flags.refine.as_slice()));
        if self.refine_cells(refine) {
            MeshChange::Refined
        } else if coarsened {
            MeshChange::Coarsened
        } else {
            MeshChange::Unchanged
        }
    }

    /// Splits the marked cells, then keeps splitting cells whose would-be children have an
    /// edge that is already split. Returns false if nothing was marked.
    fn refine_cells(&mut self, mut marked: Vec<bool>) -> bool {
        marked.resize(self.cells.len(), false);
        let mut refined = false;
        while marked.iter().any(|&m| m) {
            refined = true;
            let old = std::mem::take(&mut self.cells);
            for (cell, split) in old.into_iter().zip(marked) {
                if split {
                    let children = self.split(cell);
                    self.cells.extend(children);
                } else {
                    self.cells.push(cell);
                }
            }
            marked = self.unbalanced_cells();
        }
        if refined {
            self.update_topology();
        }
        refined
    }

    /// Replaces `cell` by its `2^dim` children.
    ///
    /// A new vertex sits at a reference coordinate in `{0, 1/2, 1}^dim` of the cell and is
    /// identified by the set of corners it depends on, so neighbours agree on shared edge
    /// and face midpoints no matter which of them is split first.
    fn split(&mut self, cell: Cell) -> Vec<Cell> {
        let dim = self.dim;
        let nv = q1::vertices_per_cell(dim);
        let extents = vec![3; dim];
        let mut local = Vec::with_capacity(3usize.pow(dim as u32));
        for k in 0..3usize.pow(dim as u32) {
            let support = support(&cell.vertices, &unravel(k, &extents));
            if support.len() == 1 {
                local.push(support[0]);
                continue;
            }
            let vertices = &mut self.vertices;
            let n = vertices.len();
            let id = *self.midpoints.entry(support).or_insert_with_key(|support| {
                let sum = support
                    .iter()
                    .fold(Point::zeros(dim), |acc, &v| acc + &vertices[v]);
                vertices.push(sum / support.len() as f64);
                n
            });
            local.push(id);
        }

        let id = self.next_parent;
        self.next_parent += 1;
        let children = (0..nv)
            .map(|child| {
                let vertices = (0..nv)
                    .map(|w| {
                        let t: Vec<usize> = (0..dim).map(|d| ((child >> d) & 1) + ((w >> d) & 1)).collect();
                        local[ravel(&t, &extents)]
                    })
                    .collect();
                let boundary_ids = (0..q1::faces_per_cell(dim))
                    .map(|f| {
                        let (d, side) = (f / 2, f % 2);
                        if (child >> d) & 1 == side {
                            cell.boundary_ids[f]
                        } else {
                            None
                        }
                    })
                    .collect();
                Cell {
                    vertices,
                    neighbors: vec![None; q1::faces_per_cell(dim)],
                    boundary_ids,
                    material_id: cell.material_id,
                    subdomain_id: cell.subdomain_id,
                    level: cell.level + 1,
                    parent: Some(id),
                }
            })
            .collect();
        self.parents.insert(id, cell);
        children
    }

    /// Cells with a neighbour more than one level finer.
    ///
    /// Such a neighbour has split an edge between two points of the cell's `3^dim`
    /// subdivision lattice.
    fn unbalanced_cells(&self) -> Vec<bool> {
        let dim = self.dim;
        let extents = vec![3; dim];
        let n_sub = 3usize.pow(dim as u32);
        self.cells
            .iter()
            .map(|cell| {
                let lattice: Vec<Option<usize>> = (0..n_sub)
                    .map(|k| {
                        let support = support(&cell.vertices, &unravel(k, &extents));
                        if support.len() == 1 {
                            Some(support[0])
                        } else {
                            self.midpoints.get(&support).copied()
                        }
                    })
                    .collect();
                (0..n_sub).any(|k| {
                    let t = unravel(k, &extents);
                    (0..dim).filter(|&d| t[d] < 2).any(|d| {
                        match (lattice[k], lattice[k + 3usize.pow(d as u32)]) {
                            (Some(a), Some(b)) => self.midpoints.contains_key(&edge_key(a, b)),
                            _ => false,
                        }
                    })
                })
            })
            .collect()
    }

    /// Merges complete sibling groups whose children are all marked in `coarsen`, none is
    /// marked in `refine` and none has an edge split by a finer neighbour.
    ///
    /// Returns whether anything was merged together with `refine` carried over to the new
    /// cell numbering.
    fn coarsen_cells(&mut self, coarsen: &[bool], refine: &[bool]) -> (bool, Vec<bool>) {
        let nv = q1::vertices_per_cell(self.dim);
        let edges = cell_edges(self.dim);
        let mut groups: HashMap<usize, Vec<CellId>> = HashMap::default();
        for (id, cell) in self.cells.iter().enumerate() {
            if let Some(parent) = cell.parent {
                groups.entry(parent).or_default().push(id);
            }
        }
        groups.retain(|_, children| {
            children.len() == nv
                && children.iter().all(|&c| {
                    let vertices = &self.cells[c].vertices;
                    coarsen[c]
                        && !refine[c]
                        && edges
                            .iter()
                            .all(|&(a, b)| !self.midpoints.contains_key(&edge_key(vertices[a], vertices[b])))
                })
        });
        if groups.is_empty() {
            return (false, refine.to_vec());
        }

        let old = std::mem::take(&mut self.cells);
        let mut carried = Vec::with_capacity(old.len());
        for (id, cell) in old.into_iter().enumerate() {
            match cell.parent.filter(|p| groups.contains_key(p)) {
                Some(p) => {
                    // The first child of a group brings the parent back.
                    if let Some(mut parent) = self.parents.remove(&p) {
                        parent.material_id = cell.material_id;
                        parent.subdomain_id = cell.subdomain_id;
                        self.cells.push(parent);
                        carried.push(false);
                    }
                }
                None => {
                    self.cells.push(cell);
                    carried.push(refine[id]);
                }
            }
        }
        self.compact_vertices();
        self.update_topology();
        (true, carried)
    }

    /// Drops vertices no cell uses any more and renumbers the rest in order.
    fn compact_vertices(&mut self) {
        let mut new_index: Vec<Option<usize>> = vec![None; self.vertices.len()];
        for cell in self.cells.iter() {
            for &v in cell.vertices.iter() {
                new_index[v] = Some(0);
            }
        }
        let mut next = 0;
        for slot in new_index.iter_mut().filter(|slot| slot.is_some()) {
            *slot = Some(next);
            next += 1;
        }
        if next == self.vertices.len() {
            return;
        }

        let old = std::mem::take(&mut self.vertices);
        self.vertices = old
            .into_iter()
            .zip(new_index.iter())
            .filter_map(|(x, i)| i.map(|_| x))
            .collect();
        let renumber = |vertices: &mut Vec<usize>| {
            for v in vertices.iter_mut() {
                if let Some(i) = new_index[*v] {
                    *v = i;
                }
            }
        };
        for cell in self.cells.iter_mut().chain(self.parents.values_mut()) {
            renumber(&mut cell.vertices);
        }
        // Renumbering keeps the order, so keys stay sorted.
        let midpoints = std::mem::take(&mut self.midpoints);
        self.midpoints = midpoints
            .into_iter()
            .filter_map(|(key, v)| {
                let key = key.iter().map(|&k| new_index[k]).collect::<Option<Vec<_>>>()?;
                Some((key, new_index[v]?))
            })
            .collect();
    }

    /// Matches faces with identical vertex sets and returns the ones left open.
    fn connect_faces(&mut self) -> HashMap<Vec<usize>, (CellId, usize)> {
        let n_faces = q1::faces_per_cell(self.dim);
        for cell in self.cells.iter_mut() {
            cell.neighbors = vec![None; n_faces];
        }
        let mut open_faces: HashMap<Vec<usize>, (CellId, usize)> = HashMap::default();
        for cell_id in 0..self.cells.len() {
            for f in 0..n_faces {
                let key = face_key(self.dim, &self.cells[cell_id].vertices, f);
                if let Some((other, other_face)) = open_faces.remove(&key) {
                    self.cells[cell_id].neighbors[f] = Some(other);
                    self.cells[other].neighbors[other_face] = Some(cell_id);
                } else {
                    open_faces.insert(key, (cell_id, f));
                }
            }
        }
        open_faces
    }

    /// Rebuilds face neighbours after the cell list changed.
    ///
    /// An open interior face of a child lies on the same face of its parent, which a
    /// coarser neighbour shares.
    fn update_topology(&mut self) {
        let open_faces = self.connect_faces();
        for &(cell, face) in open_faces.values() {
            if self.cells[cell].boundary_ids[face].is_some() {
                continue;
            }
            let coarse_key = match self.cells[cell].parent.and_then(|p| self.parents.get(&p)) {
                Some(parent) => face_key(self.dim, &parent.vertices, face),
                None => continue,
            };
            if let Some(&(other, other_face)) = open_faces.get(&coarse_key) {
                self.cells[cell].neighbors[face] = Some(other);
                if self.cells[other].neighbors[other_face].is_none() {
                    self.cells[other].neighbors[other_face] = Some(cell);
                }
            }
        }
    }
}

/// Sorted corners of `corners` averaged by the point at `t` in `{0, 1, 2}^dim`.
fn support(corners: &[usize], t: &[usize]) -> Vec<usize> {
    let dim = t.len();
    let mut support: Vec<usize> = (0..corners.len())
        .filter(|&v| (0..dim).all(|d| t[d] == 1 || ((v >> d) & 1) * 2 == t[d]))
        .map(|v| corners[v])
        .collect();
    support.sort_unstable();
    support
}

fn edge_key(a: usize, b: usize) -> Vec<usize> {
    vec![a.min(b), a.max(b)]
}

fn face_key(dim: usize, vertices: &[usize], face: usize) -> Vec<usize> {
    let mut key: Vec<usize> = q1::face_vertices(dim, face)
        .into_iter()
        .map(|v| vertices[v])
        .collect();
    key.sort_unstable();
    key
}

/// Local corner pairs of the reference cell edges.
fn cell_edges(dim: usize) -> Vec<(usize, usize)> {
    (0..dim)
        .flat_map(|d| {
            (0..q1::vertices_per_cell(dim))
                .filter(move |v| (v >> d) & 1 == 0)
                .map(move |v| (v, v | (1 << d)))
        })
        .collect()
}

/// Lexicographic multi-index of `k` with the first index running fastest.
fn unravel(mut k: usize, extents: &[usize]) -> Vec<usize> {
    extents
        .iter()
        .map(|&n| {
            let i = k % n;
            k /= n;
            i
        })
        .collect()
}

fn ravel(idx: &[usize], extents: &[usize]) -> usize {
    idx.iter()
        .zip(extents.iter())
        .rev()
        .fold(0, |acc, (&i, &n)| acc * n + i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn unit_square_topology() {
        let mesh = Mesh::hyper_rectangle(&[0.0, 0.0], &[1.0, 1.0], &[2, 2]);
        assert_eq!(mesh.n_cells(), 4);
        assert_eq!(mesh.n_vertices(), 9);
        // Cell 0 is the lower left cell: right neighbour is 1, top neighbour is 2.
        assert_eq!(mesh.cell(0).neighbors, vec![None, Some(1), None, Some(2)]);
        assert_eq!(mesh.cell(0).boundary_ids, vec![Some(0), None, Some(2), None]);
        assert_eq!(mesh.cell(3).boundary_ids, vec![None, Some(1), None, Some(3)]);
        assert_relative_eq!(mesh.center(3), Point::from_vec(vec![0.75, 0.75]));
    }

    #[test]
    fn refinement_is_conforming() {
        let mut mesh = Mesh::hyper_rectangle(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0], &[2, 1, 1]);
        mesh.refine_global(1);
        assert_eq!(mesh.n_cells(), 16);
        // (4+1) x (2+1) x (2+1) grid points.
        assert_eq!(mesh.n_vertices(), 45);
        assert_eq!(mesh.n_levels(), 2);
        let n_boundary_faces: usize = (0..mesh.n_cells())
            .map(|c| (0..6).filter(|&f| mesh.at_boundary(c, f)).count())
            .sum();
        // 2 * (4*2 + 4*2 + 2*2) boundary faces.
        assert_eq!(n_boundary_faces, 40);
        for c in 0..mesh.n_cells() {
            for f in 0..6 {
                if let Some(id) = mesh.boundary_id(c, f) {
                    assert_eq!(id, f as u32);
                }
            }
        }
        assert!(mesh.hanging_vertices().is_empty());
        assert!(mesh.coarsen_global());
        assert_eq!(mesh.n_cells(), 2);
        assert_eq!(mesh.n_vertices(), 12);
        assert!(!mesh.coarsen_global());
    }

    fn assert_hanging_vertices_are_midpoints(mesh: &Mesh) {
        for h in mesh.hanging_vertices() {
            let mean = h
                .masters
                .iter()
                .fold(Point::zeros(mesh.dim()), |acc, &v| acc + mesh.vertex(v))
                / h.masters.len() as f64;
            assert_relative_eq!(*mesh.vertex(h.vertex), mean, epsilon = 1e-14);
        }
    }

    fn cell_at(mesh: &Mesh, p: &[f64]) -> CellId {
        let p = Point::from_vec(p.to_vec());
        (0..mesh.n_cells())
            .find(|&c| mesh.point_inside(c, &p))
            .expect("point outside the mesh")
    }

    #[test]
    fn local_refinement_leaves_hanging_vertices() {
        let mut mesh = Mesh::hyper_rectangle(&[0.0, 0.0], &[1.0, 1.0], &[2, 2]);
        let mut flags = RefinementFlags::new(4);
        flags.refine[0] = true;
        assert_eq!(mesh.execute_coarsening_and_refinement(&flags), MeshChange::Refined);
        assert_eq!(mesh.n_cells(), 7);
        assert_eq!(mesh.n_vertices(), 14);
        assert_eq!(mesh.n_levels(), 2);

        // Midpoints of the right and top edges of the refined cell.
        let hanging = mesh.hanging_vertices();
        assert_eq!(hanging.len(), 2);
        assert!(hanging.iter().all(|h| h.masters.len() == 2));
        assert_hanging_vertices_are_midpoints(&mesh);

        // Faces across the level change are interior faces.
        let coarse = cell_at(&mesh, &[0.75, 0.25]);
        assert_eq!(mesh.cell(coarse).level, 0);
        assert!(!mesh.at_boundary(coarse, 0));
        let fine = cell_at(&mesh, &[0.375, 0.125]);
        assert_eq!(mesh.cell(fine).neighbors[1], Some(coarse));
        let n_boundary_faces: usize = (0..mesh.n_cells())
            .map(|c| (0..4).filter(|&f| mesh.at_boundary(c, f)).count())
            .sum();
        assert_eq!(n_boundary_faces, 10);
    }

    #[test]
    fn neighbours_differ_by_at_most_one_level() {
        let mut mesh = Mesh::hyper_rectangle(&[0.0, 0.0], &[1.0, 1.0], &[2, 2]);
        let mut flags = RefinementFlags::new(4);
        flags.refine[0] = true;
        mesh.execute_coarsening_and_refinement(&flags);

        // The fine cell touching the coarse right neighbour.
        let mut flags = RefinementFlags::new(mesh.n_cells());
        flags.refine[cell_at(&mesh, &[0.375, 0.125])] = true;
        mesh.execute_coarsening_and_refinement(&flags);

        assert_eq!(mesh.n_levels(), 3);
        assert_eq!(mesh.cell(cell_at(&mesh, &[0.7, 0.2])).level, 1);
        assert_eq!(mesh.cell(cell_at(&mesh, &[0.1, 0.9])).level, 0);
        assert_eq!(mesh.cell(cell_at(&mesh, &[0.9, 0.9])).level, 0);
        for c in 0..mesh.n_cells() {
            for n in mesh.cell(c).neighbors.iter().flatten() {
                let (a, b) = (mesh.cell(c).level, mesh.cell(*n).level);
                assert!(a.max(b) - a.min(b) <= 1);
            }
        }
        assert_hanging_vertices_are_midpoints(&mesh);
    }

    #[test]
    fn coarsening_merges_complete_sibling_groups() {
        let mut mesh = Mesh::hyper_rectangle(&[0.0, 0.0], &[1.0, 1.0], &[2, 2]);
        mesh.refine_global(1);
        assert_eq!(mesh.n_vertices(), 25);

        // All children of the lower left cell plus a single child of another one.
        let lower_left = mesh.cell(cell_at(&mesh, &[0.1, 0.1])).parent;
        let mut flags = RefinementFlags::new(mesh.n_cells());
        for c in 0..mesh.n_cells() {
            flags.coarsen[c] = mesh.cell(c).parent == lower_left;
        }
        flags.coarsen[cell_at(&mesh, &[0.9, 0.9])] = true;
        assert_eq!(mesh.execute_coarsening_and_refinement(&flags), MeshChange::Coarsened);
        assert_eq!(mesh.n_cells(), 13);
        // The centre and the two boundary midpoints of the merged cell are gone.
        assert_eq!(mesh.n_vertices(), 22);
        assert_eq!(mesh.hanging_vertices().len(), 2);
        assert_hanging_vertices_are_midpoints(&mesh);
        assert_eq!(mesh.cell(cell_at(&mesh, &[0.25, 0.25])).level, 0);

        // A group with a cell flagged for refinement is kept.
        let mut flags = RefinementFlags {
            refine: vec![false; mesh.n_cells()],
            coarsen: vec![true; mesh.n_cells()],
        };
        flags.refine[cell_at(&mesh, &[0.9, 0.9])] = true;
        assert_eq!(mesh.execute_coarsening_and_refinement(&flags), MeshChange::Refined);
        assert_eq!(mesh.cell(cell_at(&mesh, &[0.9, 0.9])).level, 2);
        assert_eq!(mesh.cell(cell_at(&mesh, &[0.1, 0.9])).level, 0);

        let n = mesh.n_cells();
        let flags = RefinementFlags {
            refine: vec![false; n],
            coarsen: vec![true; n],
        };
        mesh.execute_coarsening_and_refinement(&flags);
        mesh.execute_coarsening_and_refinement(&RefinementFlags {
            refine: vec![false; mesh.n_cells()],
            coarsen: vec![true; mesh.n_cells()],
        });
        assert_eq!(mesh.n_cells(), 4);
        assert_eq!(mesh.n_vertices(), 9);
        assert!(mesh.hanging_vertices().is_empty());
    }

    #[test]
    fn point_location() {
        let mut mesh = Mesh::hyper_rectangle(&[0.0, 0.0], &[1.0, 1.0], &[1, 1]);
        mesh.refine_global(1);
        let p = Point::from_vec(vec![0.25, 0.75]);
        let inside: Vec<_> = (0..mesh.n_cells()).filter(|&c| mesh.point_inside(c, &p)).collect();
        assert_eq!(inside.len(), 1);
        assert_relative_eq!(mesh.center(inside[0]), p);
        // Shared vertex is inside all four cells.
        let mid = Point::from_vec(vec![0.5, 0.5]);
        assert!((0..4).all(|c| mesh.point_inside(c, &mid)));
    }

    #[test]
    fn ghost_and_artificial_cells() {
        let mut mesh = Mesh::hyper_rectangle(&[0.0, 0.0], &[3.0, 1.0], &[3, 1]);
        mesh.set_subdomain_ids(|id, _| if id == 0 { 0 } else { 1 });
        assert_eq!(
            mesh.ownership(0),
            vec![Ownership::LocallyOwned, Ownership::Ghost, Ownership::Artificial]
        );
    }
}
