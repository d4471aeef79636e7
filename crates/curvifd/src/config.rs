use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::GridError;
use crate::grid::{Grid, Point, StructuredGrid};
use crate::grid_function::{GridFunction, JacobianPolicy};
use crate::io::read_grid_binary;

/// Analytic map from computational coordinates `(xi, eta)` in `[0, 1]^2`
/// to physical coordinates.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Mapping {
    /// Axis-aligned rectangle spanned by `x_range` and `y_range`.
    Identity,
    /// Rectangle whose x coordinate is shifted by `factor` times the y offset.
    Shear { factor: f64 },
    /// Annulus sector; ignores `x_range` and `y_range`. xi runs along the
    /// radius, eta along the angle.
    Polar {
        r_inner: f64,
        r_outer: f64,
        theta_range: (f64, f64),
    },
}

impl Default for Mapping {
    fn default() -> Self {
        Mapping::Identity
    }
}

/// Parameters of a generated structured grid.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GridConfig {
    pub nx: usize,
    pub ny: usize,
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    pub mapping: Mapping,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            nx: 20,
            ny: 20,
            x_range: (0.0, 1.0),
            y_range: (0.0, 1.0),
            mapping: Mapping::Identity,
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<()> {
        if self.nx < 2 || self.ny < 2 {
            bail!(
                "grid needs at least 2 cells per axis for derivatives, got nx={} ny={}",
                self.nx,
                self.ny
            );
        }
        for (name, (lo, hi)) in [("x_range", self.x_range), ("y_range", self.y_range)] {
            if !lo.is_finite() || !hi.is_finite() || lo == hi {
                bail!("{} ({}, {}) must be finite and non-empty", name, lo, hi);
            }
        }
        if let Mapping::Polar {
            r_inner,
            r_outer,
            theta_range,
        } = self.mapping
        {
            if !(r_inner >= 0.0 && r_outer > r_inner) {
                bail!(
                    "polar mapping needs 0 <= r_inner < r_outer, got {} and {}",
                    r_inner,
                    r_outer
                );
            }
            if theta_range.0 == theta_range.1 {
                bail!("polar mapping needs a non-empty theta_range");
            }
        }
        Ok(())
    }

    pub fn build(&self) -> StructuredGrid {
        let (x0, x1) = self.x_range;
        let (y0, y1) = self.y_range;
        match self.mapping {
            Mapping::Identity => StructuredGrid::uniform(self.nx, self.ny, self.x_range, self.y_range),
            Mapping::Shear { factor } => StructuredGrid::from_mapping(self.nx, self.ny, |xi, eta| {
                let dy = eta * (y1 - y0);
                Point::new(x0 + xi * (x1 - x0) + factor * dy, y0 + dy)
            }),
            Mapping::Polar {
                r_inner,
                r_outer,
                theta_range: (t0, t1),
            } => StructuredGrid::from_mapping(self.nx, self.ny, |xi, eta| {
                let r = r_inner + xi * (r_outer - r_inner);
                let theta = t0 + eta * (t1 - t0);
                Point::new(r * theta.cos(), r * theta.sin())
            }),
        }
    }
}

/// Named scalar fields the driver can sample.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// `x`
    LinearX,
    /// `x + y`
    Sum,
    /// `x^2 - y^2`
    Harmonic,
    /// `exp(-(x^2 + y^2))`
    Gaussian,
    /// `sin(pi x) cos(pi y)`
    SinCos,
}

impl FieldKind {
    pub fn eval(&self, x: f64, y: f64) -> f64 {
        match self {
            FieldKind::LinearX => x,
            FieldKind::Sum => x + y,
            FieldKind::Harmonic => x * x - y * y,
            FieldKind::Gaussian => (-(x * x + y * y)).exp(),
            FieldKind::SinCos => (PI * x).sin() * (PI * y).cos(),
        }
    }
}

impl FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear_x" | "x" => Ok(FieldKind::LinearX),
            "sum" => Ok(FieldKind::Sum),
            "harmonic" => Ok(FieldKind::Harmonic),
            "gaussian" => Ok(FieldKind::Gaussian),
            "sin_cos" => Ok(FieldKind::SinCos),
            _ => Err(format!(
                "Unknown field: {}. Expected one of linear_x, sum, harmonic, gaussian, sin_cos",
                s
            )),
        }
    }
}

/// Operator applied to the sampled field.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Values,
    DuDx,
    DuDy,
    Laplace,
    DetJInv,
    Jacobian,
}

impl Operator {
    pub fn apply(&self, gf: &GridFunction) -> Result<GridFunction, GridError> {
        match self {
            Operator::Values => Ok(gf.clone()),
            Operator::DuDx => gf.du_dx(),
            Operator::DuDy => gf.du_dy(),
            Operator::Laplace => gf.laplace(),
            Operator::DetJInv => gf.det_j_inv(),
            Operator::Jacobian => gf.jacobian(),
        }
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "values" => Ok(Operator::Values),
            "du_dx" | "dx" => Ok(Operator::DuDx),
            "du_dy" | "dy" => Ok(Operator::DuDy),
            "laplace" => Ok(Operator::Laplace),
            "det_j_inv" => Ok(Operator::DetJInv),
            "jacobian" => Ok(Operator::Jacobian),
            _ => Err(format!(
                "Unknown operator: {}. Expected one of values, du_dx, du_dy, laplace, det_j_inv, jacobian",
                s
            )),
        }
    }
}

/// Full description of one derivative evaluation.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    pub grid: GridConfig,
    /// Binary grid file to load instead of generating `grid`.
    pub grid_file: Option<PathBuf>,
    pub field: FieldKind,
    pub operator: Operator,
    pub jacobian: JacobianPolicy,
    pub output: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            grid_file: None,
            field: FieldKind::Harmonic,
            operator: Operator::Laplace,
            jacobian: JacobianPolicy::default(),
            output: PathBuf::from("curvifd_out.txt"),
        }
    }
}

impl RunConfig {
    pub fn build_grid(&self) -> Result<Arc<dyn Grid>> {
        match &self.grid_file {
            Some(path) => Ok(Arc::new(read_grid_binary(path)?)),
            None => {
                self.grid.validate()?;
                Ok(Arc::new(self.grid.build()))
            }
        }
    }

    /// Build the grid, sample the field and apply the operator.
    pub fn evaluate(&self) -> Result<GridFunction> {
        let grid = self.build_grid()?;
        log::info!(
            "Evaluating {:?} of {:?} on a {}x{} grid",
            self.operator,
            self.field,
            grid.x_extent(),
            grid.y_extent()
        );
        let field = self.field;
        let gf = GridFunction::from_fn(grid, move |x, y| field.eval(x, y))
            .with_jacobian_policy(self.jacobian);
        let result = self
            .operator
            .apply(&gf)
            .with_context(|| format!("Failed to apply {:?}", self.operator))?;
        Ok(result)
    }
}

/// Load a run configuration from a JSON file.
pub fn load_run_config<P: AsRef<Path>>(path: P) -> Result<RunConfig> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
    let config: RunConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
    Ok(config)
}
