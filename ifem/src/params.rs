//! Run-time parameters.
//!
//! Parameters can be read from a plain key-value file (`set key = value` lines with `#`
//! comments) or from a RON file. Every key has a default, so a parameter file only needs
//! to list what differs.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationType {
    Solid,
    Fluid,
    FSI,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolidType {
    NeoHookean,
    LinearElastic,
}

/// How the prescribed solid Neumann data is interpreted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeumannBcType {
    /// The boundary value is a traction vector.
    Traction,
    /// The first boundary value is a pressure scaling the reference normal.
    Pressure,
    /// Traction is supplied by the fluid.
    FSI,
}

macro_rules! impl_from_str {
    ($ty:ident { $($name:literal => $variant:ident),* $(,)? }) => {
        impl FromStr for $ty {
            type Err = Error;
            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($name => Ok($ty::$variant),)*
                    _ => Err(Error::InvalidParameter {
                        name: stringify!($ty).to_string(),
                        reason: format!("unrecognized value {:?}", s),
                    }),
                }
            }
        }
    };
}

impl_from_str!(SimulationType { "Solid" => Solid, "Fluid" => Fluid, "FSI" => FSI });
impl_from_str!(NeumannBcType { "Traction" => Traction, "Pressure" => Pressure, "FSI" => FSI });

impl FromStr for SolidType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NeoHookean" => Ok(SolidType::NeoHookean),
            "LinearElastic" => Ok(SolidType::LinearElastic),
            _ => Err(Error::UnsupportedMaterial {
                name: s.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub dimension: usize,
    pub simulation_type: SimulationType,

    pub end_time: f64,
    pub time_step: f64,
    pub output_interval: f64,
    pub refinement_interval: f64,
    pub save_interval: f64,

    /// Global refinements of the fluid (`[0]`) and solid (`[1]`) meshes.
    pub global_refinements: [u32; 2],

    pub solid_type: SolidType,
    pub n_solid_parts: usize,
    /// Neo-Hookean constants `C1` and `kappa` for each solid part.
    #[serde(rename = "C")]
    pub c: Vec<Vec<f64>>,
    /// Young's modulus for each solid part.
    #[serde(rename = "E")]
    pub youngs_modulus: Vec<f64>,
    /// Poisson ratio for each solid part.
    pub nu: Vec<f64>,
    pub solid_rho: f64,
    pub damping: f64,
    pub tol_d: f64,
    pub tol_f: f64,
    pub solid_max_iterations: u32,
    pub solid_neumann_bc_type: NeumannBcType,
    pub solid_neumann_bcs: BTreeMap<u32, Vec<f64>>,
    /// Boundary id to component mask; bit `d` fixes displacement component `d`.
    pub solid_dirichlet_bcs: BTreeMap<u32, u32>,

    pub fluid_rho: f64,
    pub viscosity: f64,
    /// Bulk penalty of the slightly compressible fluid: `p = -fluid_penalty * div v`.
    pub fluid_penalty: f64,
    /// Boundary id to prescribed fluid velocity.
    pub fluid_dirichlet_bcs: BTreeMap<u32, Vec<f64>>,
    pub gravity: Vec<f64>,

    pub fluid_lower: Vec<f64>,
    pub fluid_upper: Vec<f64>,
    pub fluid_subdivisions: Vec<usize>,
    pub solid_lower: Vec<f64>,
    pub solid_upper: Vec<f64>,
    pub solid_subdivisions: Vec<usize>,

    pub linear_solver_tolerance: f64,
    pub output_dir: PathBuf,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            dimension: 2,
            simulation_type: SimulationType::FSI,
            end_time: 1.0,
            time_step: 0.01,
            output_interval: 0.1,
            refinement_interval: 1.0,
            save_interval: 1.0,
            global_refinements: [2, 1],
            solid_type: SolidType::NeoHookean,
            n_solid_parts: 1,
            c: vec![vec![1.0e3, 1.0e5]],
            youngs_modulus: vec![2.5e3],
            nu: vec![0.3],
            solid_rho: 1.0,
            damping: 0.0,
            tol_d: 1e-6,
            tol_f: 1e-6,
            solid_max_iterations: 20,
            solid_neumann_bc_type: NeumannBcType::FSI,
            solid_neumann_bcs: BTreeMap::new(),
            solid_dirichlet_bcs: BTreeMap::new(),
            fluid_rho: 1.0,
            viscosity: 1e-3,
            fluid_penalty: 1e3,
            fluid_dirichlet_bcs: BTreeMap::new(),
            gravity: Vec::new(),
            fluid_lower: Vec::new(),
            fluid_upper: Vec::new(),
            fluid_subdivisions: Vec::new(),
            solid_lower: Vec::new(),
            solid_upper: Vec::new(),
            solid_subdivisions: Vec::new(),
            linear_solver_tolerance: 1e-10,
            output_dir: PathBuf::from("."),
        }
    }
}

impl Parameters {
    /// Loads parameters from a file, dispatching on the file extension.
    ///
    /// `.ron` files are deserialized with `ron`, anything else is read as a key-value file.
    pub fn load(path: impl AsRef<Path>) -> Result<Parameters> {
        let path = path.as_ref();
        let mut params = match path.extension().and_then(|x| x.to_str()) {
            Some("ron") => ron::de::from_reader(File::open(path)?)?,
            _ => Parameters::from_prm_str(&std::fs::read_to_string(path)?)?,
        };
        params.fill_geometry_defaults();
        params.validate()?;
        Ok(params)
    }

    /// Parses a key-value parameter file.
    ///
    /// `subsection` and `end` lines are accepted and ignored so that files organized in
    /// sections can be read as is.
    pub fn from_prm_str(contents: &str) -> Result<Parameters> {
        let mut params = Parameters::default();
        for line in contents.lines() {
            let line = match line.find('#') {
                Some(pos) => &line[..pos],
                None => line,
            }
            .trim();
            if line.is_empty() || line == "end" || line.starts_with("subsection") {
                continue;
            }
            let line = line.strip_prefix("set ").unwrap_or(line);
            let (key, value) = line.split_once('=').ok_or_else(|| Error::InvalidParameter {
                name: line.to_string(),
                reason: "expected `key = value`".to_string(),
            })?;
            params.set(key.trim(), value.trim())?;
        }
        Ok(params)
    }

    /// Assigns a single key.
    ///
    /// Vector valued keys accept an index suffix (e.g. `global_refinements[1] = 2` or
    /// `C[0] = 1e3, 1e5`) which assigns a single entry.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let normalized = key.trim().to_lowercase().replace(' ', "_");
        let (name, index) = split_index(&normalized, key)?;
        let invalid = |reason: String| Error::InvalidParameter {
            name: key.to_string(),
            reason,
        };
        match (name, index) {
            ("dimension", None) => self.dimension = parse_scalar(key, value)?,
            ("simulation_type", None) => self.simulation_type = value.parse()?,
            ("end_time", None) => self.end_time = parse_scalar(key, value)?,
            ("time_step", None) => self.time_step = parse_scalar(key, value)?,
            ("output_interval", None) => self.output_interval = parse_scalar(key, value)?,
            ("refinement_interval", None) => {
                self.refinement_interval = parse_scalar(key, value)?
            }
            ("save_interval", None) => self.save_interval = parse_scalar(key, value)?,
            ("global_refinements", None) => {
                let levels: Vec<u32> = parse_list(key, value)?;
                if levels.len() != 2 {
                    return Err(invalid(format!("expected 2 entries, found {}", levels.len())));
                }
                self.global_refinements = [levels[0], levels[1]];
            }
            ("global_refinements", Some(i)) => {
                let slot = self
                    .global_refinements
                    .get_mut(i)
                    .ok_or_else(|| invalid(format!("index {} out of range", i)))?;
                *slot = parse_scalar(key, value)?;
            }
            ("solid_type", None) => self.solid_type = value.parse()?,
            ("n_solid_parts", None) => self.n_solid_parts = parse_scalar(key, value)?,
            ("c", None) => {
                self.c = value
                    .split(';')
                    .map(|part| parse_list(key, part))
                    .collect::<Result<_>>()?;
            }
            ("c", Some(i)) => assign_indexed(&mut self.c, i, parse_list(key, value)?),
            ("e", None) => self.youngs_modulus = parse_list(key, value)?,
            ("e", Some(i)) => {
                assign_indexed(&mut self.youngs_modulus, i, parse_scalar(key, value)?)
            }
            ("nu", None) => self.nu = parse_list(key, value)?,
            ("nu", Some(i)) => assign_indexed(&mut self.nu, i, parse_scalar(key, value)?),
            ("solid_rho", None) => self.solid_rho = parse_scalar(key, value)?,
            ("damping", None) => self.damping = parse_scalar(key, value)?,
            ("tol_d", None) => self.tol_d = parse_scalar(key, value)?,
            ("tol_f", None) => self.tol_f = parse_scalar(key, value)?,
            ("solid_max_iterations", None) => {
                self.solid_max_iterations = parse_scalar(key, value)?
            }
            ("solid_neumann_bc_type", None) => self.solid_neumann_bc_type = value.parse()?,
            ("solid_neumann_bcs", None) => self.solid_neumann_bcs = parse_map(key, value)?,
            ("solid_dirichlet_bcs", None) => {
                self.solid_dirichlet_bcs = parse_map::<u32>(key, value)?
                    .into_iter()
                    .map(|(id, mask)| match mask.as_slice() {
                        [mask] => Ok((id, *mask)),
                        _ => Err(invalid(format!("expected one component mask for {}", id))),
                    })
                    .collect::<Result<_>>()?;
            }
            ("fluid_rho", None) => self.fluid_rho = parse_scalar(key, value)?,
            ("viscosity", None) => self.viscosity = parse_scalar(key, value)?,
            ("fluid_penalty", None) => self.fluid_penalty = parse_scalar(key, value)?,
            ("fluid_dirichlet_bcs", None) => self.fluid_dirichlet_bcs = parse_map(key, value)?,
            ("gravity", None) => self.gravity = parse_list(key, value)?,
            ("gravity", Some(i)) => assign_indexed(&mut self.gravity, i, parse_scalar(key, value)?),
            ("fluid_lower", None) => self.fluid_lower = parse_list(key, value)?,
            ("fluid_upper", None) => self.fluid_upper = parse_list(key, value)?,
            ("fluid_subdivisions", None) => self.fluid_subdivisions = parse_list(key, value)?,
            ("solid_lower", None) => self.solid_lower = parse_list(key, value)?,
            ("solid_upper", None) => self.solid_upper = parse_list(key, value)?,
            ("solid_subdivisions", None) => self.solid_subdivisions = parse_list(key, value)?,
            ("linear_solver_tolerance", None) => {
                self.linear_solver_tolerance = parse_scalar(key, value)?
            }
            ("output_dir", None) => self.output_dir = PathBuf::from(value),
            _ => return Err(invalid("unknown parameter".to_string())),
        }
        Ok(())
    }

    /// Fills in the mesh extents and gravity when they were left unspecified.
    pub fn fill_geometry_defaults(&mut self) {
        let dim = self.dimension;
        let fill = |v: &mut Vec<f64>, x: f64| {
            if v.is_empty() {
                *v = vec![x; dim];
            }
        };
        fill(&mut self.gravity, 0.0);
        fill(&mut self.fluid_lower, 0.0);
        fill(&mut self.fluid_upper, 1.0);
        fill(&mut self.solid_lower, 0.4);
        fill(&mut self.solid_upper, 0.6);
        if self.fluid_subdivisions.is_empty() {
            self.fluid_subdivisions = vec![4; dim];
        }
        if self.solid_subdivisions.is_empty() {
            self.solid_subdivisions = vec![1; dim];
        }
    }

    pub fn validate(&self) -> Result<()> {
        let dim = self.dimension;
        let invalid = |name: &str, reason: String| {
            Err(Error::InvalidParameter {
                name: name.to_string(),
                reason,
            })
        };
        if dim != 2 && dim != 3 {
            return invalid("dimension", format!("expected 2 or 3, found {}", dim));
        }
        if !(self.time_step > 0.0) {
            return invalid("time_step", "must be positive".to_string());
        }
        if self.end_time < 0.0 {
            return invalid("end_time", "must be non-negative".to_string());
        }
        if self.damping < 0.0 {
            return invalid("damping", "must be non-negative".to_string());
        }
        if !(self.tol_d > 0.0) || !(self.tol_f > 0.0) {
            return invalid("tol_d", "Newton tolerances must be positive".to_string());
        }
        if self.solid_max_iterations == 0 {
            return invalid("solid_max_iterations", "must be positive".to_string());
        }
        if self.n_solid_parts == 0 {
            return invalid("n_solid_parts", "must be positive".to_string());
        }
        for (name, v) in [
            ("gravity", &self.gravity),
            ("fluid_lower", &self.fluid_lower),
            ("fluid_upper", &self.fluid_upper),
            ("solid_lower", &self.solid_lower),
            ("solid_upper", &self.solid_upper),
        ] {
            if v.len() != dim {
                return invalid(name, format!("expected {} entries, found {}", dim, v.len()));
            }
        }
        for (name, v) in [
            ("fluid_subdivisions", &self.fluid_subdivisions),
            ("solid_subdivisions", &self.solid_subdivisions),
        ] {
            if v.len() != dim || v.contains(&0) {
                return invalid(name, format!("expected {} positive entries", dim));
            }
        }
        for (name, lower, upper) in [
            ("fluid_upper", &self.fluid_lower, &self.fluid_upper),
            ("solid_upper", &self.solid_lower, &self.solid_upper),
        ] {
            if lower.iter().zip(upper.iter()).any(|(l, u)| !(u > l)) {
                return invalid(name, "upper corner must exceed lower corner".to_string());
            }
        }

        match self.solid_type {
            SolidType::NeoHookean => {
                if self.c.len() < self.n_solid_parts {
                    return Err(Error::MissingParameter {
                        name: "C".to_string(),
                    });
                }
                if let Some(part) = self.c.iter().position(|c| c.len() < 2) {
                    return invalid("C", format!("part {} needs two constants", part));
                }
            }
            SolidType::LinearElastic => {
                if self.youngs_modulus.len() < self.n_solid_parts {
                    return Err(Error::MissingParameter {
                        name: "E".to_string(),
                    });
                }
                if self.nu.len() < self.n_solid_parts {
                    return Err(Error::MissingParameter {
                        name: "nu".to_string(),
                    });
                }
            }
        }

        if self.simulation_type != SimulationType::FSI {
            let required = match self.solid_neumann_bc_type {
                NeumannBcType::Traction => dim,
                NeumannBcType::Pressure => 1,
                NeumannBcType::FSI => {
                    if self.simulation_type == SimulationType::Solid
                        && !self.solid_neumann_bcs.is_empty()
                    {
                        return invalid(
                            "solid_neumann_bc_type",
                            "FSI traction requires an FSI simulation".to_string(),
                        );
                    }
                    0
                }
            };
            for (id, value) in self.solid_neumann_bcs.iter() {
                if value.len() < required {
                    return invalid(
                        "solid_neumann_bcs",
                        format!("boundary {} needs {} values", id, required),
                    );
                }
            }
        }
        for (id, value) in self.fluid_dirichlet_bcs.iter() {
            if value.len() != dim {
                return invalid(
                    "fluid_dirichlet_bcs",
                    format!("boundary {} needs {} values", id, dim),
                );
            }
        }
        Ok(())
    }
}

fn split_index<'a>(normalized: &'a str, key: &str) -> Result<(&'a str, Option<usize>)> {
    match normalized.split_once('[') {
        None => Ok((normalized, None)),
        Some((name, rest)) => {
            let index = rest
                .strip_suffix(']')
                .and_then(|i| i.trim().parse().ok())
                .ok_or_else(|| Error::InvalidParameter {
                    name: key.to_string(),
                    reason: "malformed index".to_string(),
                })?;
            Ok((name, Some(index)))
        }
    }
}

fn parse_scalar<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| Error::InvalidParameter {
        name: key.to_string(),
        reason: format!("cannot parse {:?}", value),
    })
}

fn parse_list<T: FromStr>(key: &str, value: &str) -> Result<Vec<T>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(|x| parse_scalar(key, x))
        .collect()
}

/// Parses `id: v, v; id: v` into an ordered map.
fn parse_map<T: FromStr>(key: &str, value: &str) -> Result<BTreeMap<u32, Vec<T>>> {
    value
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (id, values) = entry.split_once(':').ok_or_else(|| Error::InvalidParameter {
                name: key.to_string(),
                reason: format!("expected `id: values` in {:?}", entry),
            })?;
            Ok((parse_scalar(key, id)?, parse_list(key, values)?))
        })
        .collect()
}

fn assign_indexed<T: Default + Clone>(v: &mut Vec<T>, i: usize, value: T) {
    if v.len() <= i {
        v.resize(i + 1, T::default());
    }
    v[i] = value;
}
