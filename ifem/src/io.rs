//! Result output and checkpoint persistence.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use vtkio::model::*;

use crate::mesh::Mesh;
use crate::{Error, Result};

/// A named nodal or cellwise field with `n_components` values per entity.
#[derive(Clone, Debug)]
pub struct FieldData<'a> {
    pub name: &'a str,
    pub n_components: u32,
    pub values: Vec<f64>,
}

impl<'a> FieldData<'a> {
    pub fn new(name: &'a str, n_components: u32, values: Vec<f64>) -> Self {
        FieldData {
            name,
            n_components,
            values,
        }
    }

    fn into_attribute(self) -> Attribute {
        Attribute::DataArray(DataArray {
            name: self.name.to_string(),
            elem: ElementType::Generic(self.n_components),
            data: IOBuffer::F64(self.values),
        })
    }
}

/// VTK vertex order of a lexicographically numbered Q1 cell.
fn vtk_connectivity(dim: usize) -> &'static [usize] {
    if dim == 2 {
        &[0, 1, 3, 2]
    } else {
        &[0, 1, 3, 2, 4, 5, 7, 6]
    }
}

/// Writes `mesh` and its fields as a VTK unstructured grid XML file.
pub fn write_vtu(
    path: impl AsRef<Path>,
    mesh: &Mesh,
    point_data: Vec<FieldData>,
    cell_data: Vec<FieldData>,
) -> Result<()> {
    let dim = mesh.dim();
    let mut points = Vec::with_capacity(mesh.n_vertices() * 3);
    for x in mesh.vertices() {
        for d in 0..3 {
            points.push(if d < dim { x[d] } else { 0.0 });
        }
    }

    let order = vtk_connectivity(dim);
    let mut connectivity = Vec::with_capacity(mesh.n_cells() * order.len());
    let mut offsets = Vec::with_capacity(mesh.n_cells());
    for cell in mesh.cells() {
        connectivity.extend(order.iter().map(|&v| cell.vertices[v] as u64));
        offsets.push(connectivity.len() as u64);
    }
    let cell_type = if dim == 2 {
        CellType::Quad
    } else {
        CellType::Hexahedron
    };

    let vtk = Vtk {
        version: Version { major: 1, minor: 0 },
        title: String::new(),
        byte_order: ByteOrder::LittleEndian,
        file_path: None,
        data: DataSet::inline(UnstructuredGridPiece {
            points: IOBuffer::F64(points),
            cells: Cells {
                cell_verts: VertexNumbers::XML {
                    connectivity,
                    offsets,
                },
                types: vec![cell_type; mesh.n_cells()],
            },
            data: Attributes {
                point: point_data.into_iter().map(FieldData::into_attribute).collect(),
                cell: cell_data.into_iter().map(FieldData::into_attribute).collect(),
            },
        }),
    };

    vtk.export(path.as_ref()).map_err(|e| Error::Output {
        message: format!("{}: {:?}", path.as_ref().display(), e),
    })
}

/// Writes a ParaView collection indexing a time series of output files.
pub fn write_pvd(path: impl AsRef<Path>, times_and_names: &[(f64, String)]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "<?xml version=\"1.0\"?>")?;
    writeln!(out, "<VTKFile type=\"Collection\" version=\"0.1\">")?;
    writeln!(out, "  <Collection>")?;
    for (time, name) in times_and_names {
        writeln!(
            out,
            "    <DataSet timestep=\"{}\" group=\"\" part=\"0\" file=\"{}\"/>",
            time, name
        )?;
    }
    writeln!(out, "  </Collection>")?;
    writeln!(out, "</VTKFile>")?;
    Ok(())
}

/// Accumulates written files of one solver into a `.pvd` index.
#[derive(Clone, Debug, Default)]
pub struct OutputSeries {
    prefix: String,
    times_and_names: Vec<(f64, String)>,
}

impl OutputSeries {
    pub fn new(prefix: &str) -> Self {
        OutputSeries {
            prefix: prefix.to_string(),
            times_and_names: Vec::new(),
        }
    }

    /// Writes `<prefix>-<step>.vtu` and refreshes `<prefix>.pvd` in `dir`.
    pub fn write(
        &mut self,
        dir: &Path,
        step: u32,
        time: f64,
        mesh: &Mesh,
        point_data: Vec<FieldData>,
        cell_data: Vec<FieldData>,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let name = format!("{}-{}.vtu", self.prefix, step);
        let path = dir.join(&name);
        write_vtu(&path, mesh, point_data, cell_data)?;
        self.times_and_names.retain(|(_, n)| *n != name);
        self.times_and_names.push((time, name));
        write_pvd(dir.join(format!("{}.pvd", self.prefix)), &self.times_and_names)?;
        Ok(path)
    }

    pub fn len(&self) -> usize {
        self.times_and_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times_and_names.is_empty()
    }
}

pub fn checkpoint_path(dir: &Path, prefix: &str, step: u32) -> PathBuf {
    dir.join(format!("{}-checkpoint-{}.bin", prefix, step))
}

/// The checkpoint of `prefix` with the highest step in `dir`, if any.
pub fn latest_checkpoint(dir: &Path, prefix: &str) -> Result<Option<(u32, PathBuf)>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let head = format!("{}-checkpoint-", prefix);
    let mut latest: Option<(u32, PathBuf)> = None;
    for entry in entries {
        let path = entry?.path();
        let step = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(head.as_str()))
            .and_then(|n| n.strip_suffix(".bin"))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(step) = step {
            if latest.as_ref().map_or(true, |(s, _)| step > *s) {
                latest = Some((step, path));
            }
        }
    }
    Ok(latest)
}

pub fn save_checkpoint<T: Serialize>(dir: &Path, prefix: &str, step: u32, state: &T) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = checkpoint_path(dir, prefix, step);
    let out = BufWriter::new(File::create(&path)?);
    bincode::serialize_into(out, state)?;
    Ok(path)
}

/// Loads the most recent checkpoint of `prefix`; `None` if there is none.
pub fn load_latest_checkpoint<T: DeserializeOwned>(dir: &Path, prefix: &str) -> Result<Option<T>> {
    match latest_checkpoint(dir, prefix)? {
        Some((step, path)) => {
            log::info!("Loading checkpoint {} (step {})", path.display(), step);
            let f = BufReader::new(File::open(path)?);
            Ok(Some(bincode::deserialize_from(f)?))
        }
        None => Ok(None),
    }
}
