//! Scalar fields sampled on the nodes of a structured grid, and their
//! finite-difference derivatives.
//!
//! Derivatives are first taken in computational coordinates `(xi, eta)`, both
//! spanning `[0, 1]` with uniform steps `1 / nx` and `1 / ny`, then mapped to
//! physical coordinates with the chain rule:
//!
//! ```text
//! du/dx = (du/dxi * dy/deta - du/deta * dy/dxi) / J
//! du/dy = (du/deta * dx/dxi - du/dxi * dx/deta) / J
//! J     = dx/dxi * dy/deta - dy/dxi * dx/deta
//! ```
//!
//! Interior nodes use central differences, boundary nodes the one-sided
//! three-point stencils, so every derivative is second-order accurate.
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Axis, GridError};
use crate::grid::Grid;
use crate::matrix::Matrix;

/// Default additive regularization of the Jacobian determinant.
pub const DEFAULT_JACOBIAN_EPSILON: f64 = 1e-8;

/// How the Jacobian determinant is inverted by [`GridFunction::det_j_inv`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JacobianPolicy {
    /// `1 / (J + epsilon)` at every node.
    Regularize { epsilon: f64 },
    /// `1 / J`, failing with [`GridError::SingularJacobian`] at the first node
    /// where `|J| <= threshold`.
    Strict { threshold: f64 },
}

impl Default for JacobianPolicy {
    fn default() -> Self {
        JacobianPolicy::Regularize {
            epsilon: DEFAULT_JACOBIAN_EPSILON,
        }
    }
}

#[derive(Clone)]
pub struct GridFunction {
    values: Matrix,
    grid: Arc<dyn Grid>,
    jacobian_policy: JacobianPolicy,
}

impl GridFunction {
    /// Zero-valued grid function bound to `grid`.
    pub fn new(grid: Arc<dyn Grid>) -> Self {
        let (rows, cols) = grid.node_shape();
        Self {
            values: Matrix::zeros(rows, cols),
            grid,
            jacobian_policy: JacobianPolicy::default(),
        }
    }

    pub fn from_values(grid: Arc<dyn Grid>, values: Matrix) -> Result<Self, GridError> {
        let mut gf = Self::new(grid);
        gf.set_values(values)?;
        Ok(gf)
    }

    /// Sample `f(x, y)` at every node of `grid`.
    pub fn from_fn<F>(grid: Arc<dyn Grid>, f: F) -> Self
    where
        F: Fn(f64, f64) -> f64 + Sync,
    {
        let mut gf = Self::new(grid);
        gf.set_values_fn(f);
        gf
    }

    pub fn with_jacobian_policy(mut self, policy: JacobianPolicy) -> Self {
        self.jacobian_policy = policy;
        self
    }

    pub fn jacobian_policy(&self) -> JacobianPolicy {
        self.jacobian_policy
    }

    pub fn grid(&self) -> &Arc<dyn Grid> {
        &self.grid
    }

    pub fn values(&self) -> &Matrix {
        &self.values
    }

    pub fn into_values(self) -> Matrix {
        self.values
    }

    pub fn set_values(&mut self, values: Matrix) -> Result<(), GridError> {
        let expected = self.grid.node_shape();
        if values.shape() != expected {
            return Err(GridError::ShapeMismatch {
                expected,
                found: values.shape(),
            });
        }
        self.values = values;
        Ok(())
    }

    pub fn set_values_fn<F>(&mut self, f: F)
    where
        F: Fn(f64, f64) -> f64 + Sync,
    {
        let (rows, cols) = self.grid.node_shape();
        let grid = &self.grid;
        self.values = Matrix::from_fn(rows, cols, |i, j| {
            let p = grid.point(i, j);
            f(p.x, p.y)
        });
    }

    /// True when both functions are bound to the same grid instance.
    pub fn same_grid(&self, other: &GridFunction) -> bool {
        Arc::ptr_eq(&self.grid, &other.grid)
    }

    fn check_same_grid(&self, other: &GridFunction, op: &'static str) -> Result<(), GridError> {
        if !self.same_grid(other) {
            return Err(GridError::GridMismatch { op });
        }
        Ok(())
    }

    fn with_values(&self, values: Matrix) -> GridFunction {
        GridFunction {
            values,
            grid: Arc::clone(&self.grid),
            jacobian_policy: self.jacobian_policy,
        }
    }

    // -----------------------------------------------------------------------
    // Elementwise algebra
    // -----------------------------------------------------------------------

    pub fn add(&self, other: &GridFunction) -> Result<GridFunction, GridError> {
        self.check_same_grid(other, "addition")?;
        Ok(self.with_values(self.values.add(&other.values)?))
    }

    pub fn subtract(&self, other: &GridFunction) -> Result<GridFunction, GridError> {
        self.check_same_grid(other, "subtraction")?;
        Ok(self.with_values(self.values.subtract(&other.values)?))
    }

    /// Nodewise product.
    pub fn hadamard(&self, other: &GridFunction) -> Result<GridFunction, GridError> {
        self.check_same_grid(other, "multiplication")?;
        Ok(self.with_values(self.values.hadamard(&other.values)?))
    }

    pub fn scale(&self, k: f64) -> GridFunction {
        self.with_values(self.values.scale(k))
    }

    pub fn divide(&self, k: f64) -> GridFunction {
        let mut values = self.values.clone();
        values.divide_in_place(k);
        self.with_values(values)
    }

    pub fn add_in_place(&mut self, other: &GridFunction) -> Result<(), GridError> {
        self.check_same_grid(other, "addition")?;
        self.values.add_in_place(&other.values)?;
        Ok(())
    }

    pub fn subtract_in_place(&mut self, other: &GridFunction) -> Result<(), GridError> {
        self.check_same_grid(other, "subtraction")?;
        self.values.subtract_in_place(&other.values)?;
        Ok(())
    }

    pub fn scale_in_place(&mut self, k: f64) {
        self.values.scale_in_place(k);
    }

    pub fn divide_in_place(&mut self, k: f64) {
        self.values.divide_in_place(k);
    }

    // -----------------------------------------------------------------------
    // Derivatives in computational coordinates
    // -----------------------------------------------------------------------

    fn require_extent(&self, axis: Axis) -> Result<usize, GridError> {
        let extent = match axis {
            Axis::Col => self.grid.x_extent(),
            Axis::Row => self.grid.y_extent(),
        };
        if extent < 2 {
            return Err(GridError::ExtentTooSmall { axis, extent });
        }
        Ok(extent)
    }

    /// Differentiate the nodal field `field(i, j)` along `axis`: `Axis::Col`
    /// is xi (index `j`), `Axis::Row` is eta (index `i`).
    fn differentiate<F>(&self, axis: Axis, field: F) -> Result<GridFunction, GridError>
    where
        F: Fn(usize, usize) -> f64 + Sync,
    {
        let n = self.require_extent(axis)?;
        let h = 1.0 / n as f64;
        let (rows, cols) = self.grid.node_shape();

        let values = Matrix::from_fn(rows, cols, |i, j| match axis {
            Axis::Col => three_point(|k| field(i, k), j, n, h),
            Axis::Row => three_point(|k| field(k, j), i, n, h),
        });
        Ok(self.with_values(values))
    }

    pub fn dphix_dxi(&self) -> Result<GridFunction, GridError> {
        let grid = &self.grid;
        self.differentiate(Axis::Col, |i, j| grid.point(i, j).x)
    }

    pub fn dphiy_dxi(&self) -> Result<GridFunction, GridError> {
        let grid = &self.grid;
        self.differentiate(Axis::Col, |i, j| grid.point(i, j).y)
    }

    pub fn dphix_deta(&self) -> Result<GridFunction, GridError> {
        let grid = &self.grid;
        self.differentiate(Axis::Row, |i, j| grid.point(i, j).x)
    }

    pub fn dphiy_deta(&self) -> Result<GridFunction, GridError> {
        let grid = &self.grid;
        self.differentiate(Axis::Row, |i, j| grid.point(i, j).y)
    }

    pub fn du_dxi(&self) -> Result<GridFunction, GridError> {
        let u = &self.values;
        self.differentiate(Axis::Col, |i, j| u[(i, j)])
    }

    pub fn du_deta(&self) -> Result<GridFunction, GridError> {
        let u = &self.values;
        self.differentiate(Axis::Row, |i, j| u[(i, j)])
    }

    // -----------------------------------------------------------------------
    // Coordinate transformation
    // -----------------------------------------------------------------------

    /// Jacobian determinant of the grid mapping at every node.
    pub fn jacobian(&self) -> Result<GridFunction, GridError> {
        let lhs = self.dphix_dxi()?.hadamard(&self.dphiy_deta()?)?;
        let rhs = self.dphiy_dxi()?.hadamard(&self.dphix_deta()?)?;
        lhs.subtract(&rhs)
    }

    /// Inverse of the Jacobian determinant, according to the function's
    /// [`JacobianPolicy`].
    pub fn det_j_inv(&self) -> Result<GridFunction, GridError> {
        let jac = self.jacobian()?;

        let inverted = match self.jacobian_policy {
            JacobianPolicy::Regularize { epsilon } => {
                let regularized = near_singular_nodes(&jac.values, epsilon);
                log::debug!(
                    "inverting Jacobian with regularization {:e}; {} of {} nodes have |J| <= {:e}",
                    epsilon,
                    regularized,
                    jac.values.as_slice().len(),
                    epsilon
                );
                jac.values.mapv(move |v| 1.0 / (v + epsilon))
            }
            JacobianPolicy::Strict { threshold } => {
                let (_, cols) = jac.values.shape();
                if let Some(idx) = jac
                    .values
                    .as_slice()
                    .iter()
                    .position(|v| !(v.abs() > threshold))
                {
                    let value = jac.values.as_slice()[idx];
                    log::warn!(
                        "Jacobian determinant {:e} at node ({}, {}) is below threshold {:e}",
                        value,
                        idx / cols,
                        idx % cols,
                        threshold
                    );
                    return Err(GridError::SingularJacobian {
                        row: idx / cols,
                        col: idx % cols,
                        value,
                    });
                }
                jac.values.mapv(|v| 1.0 / v)
            }
        };

        Ok(self.with_values(inverted))
    }

    fn require_stencil_extents(&self) -> Result<(), GridError> {
        self.require_extent(Axis::Col)?;
        self.require_extent(Axis::Row)?;
        Ok(())
    }

    /// Derivative with respect to the physical x coordinate.
    pub fn du_dx(&self) -> Result<GridFunction, GridError> {
        self.require_stencil_extents()?;
        log::trace!(
            "du/dx on {}x{} cells",
            self.grid.x_extent(),
            self.grid.y_extent()
        );
        let a = self.du_dxi()?.hadamard(&self.dphiy_deta()?)?;
        let b = self.du_deta()?.hadamard(&self.dphiy_dxi()?)?;
        self.det_j_inv()?.hadamard(&a.subtract(&b)?)
    }

    /// Derivative with respect to the physical y coordinate.
    pub fn du_dy(&self) -> Result<GridFunction, GridError> {
        self.require_stencil_extents()?;
        log::trace!(
            "du/dy on {}x{} cells",
            self.grid.x_extent(),
            self.grid.y_extent()
        );
        let a = self.du_deta()?.hadamard(&self.dphix_dxi()?)?;
        let b = self.du_dxi()?.hadamard(&self.dphix_deta()?)?;
        self.det_j_inv()?.hadamard(&a.subtract(&b)?)
    }

    /// `d2u/dx2 + d2u/dy2`, by applying each first derivative twice.
    pub fn laplace(&self) -> Result<GridFunction, GridError> {
        let ddxx = self.du_dx()?.du_dx()?;
        let ddyy = self.du_dy()?.du_dy()?;
        ddxx.add(&ddyy)
    }

    /// Largest absolute value over nodes not on the grid boundary, or 0 when
    /// the grid has no interior nodes.
    pub fn max_abs_interior(&self) -> f64 {
        let (rows, cols) = self.values.shape();
        let mut max = 0.0f64;
        for i in 1..rows.saturating_sub(1) {
            for j in 1..cols.saturating_sub(1) {
                max = max.max(self.values[(i, j)].abs());
            }
        }
        max
    }
}

/// Nodes whose Jacobian determinant is dominated by the regularization term.
fn near_singular_nodes(jac: &Matrix, epsilon: f64) -> usize {
    jac.as_slice().iter().filter(|v| v.abs() <= epsilon.abs()).count()
}

/// Second-order first derivative of `f` at index `k` of `0..=n` with step `h`.
///
/// Central difference inside, one-sided three-point stencils at `k == 0` and
/// `k == n`. Requires `n >= 2`.
#[inline]
fn three_point<F>(f: F, k: usize, n: usize, h: f64) -> f64
where
    F: Fn(usize) -> f64,
{
    let c = 1.0 / (2.0 * h);
    if k == 0 {
        (-3.0 * f(0) + 4.0 * f(1) - f(2)) * c
    } else if k == n {
        (3.0 * f(n) - 4.0 * f(n - 1) + f(n - 2)) * c
    } else {
        (f(k + 1) - f(k - 1)) * c
    }
}

impl fmt::Debug for GridFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridFunction")
            .field("x_extent", &self.grid.x_extent())
            .field("y_extent", &self.grid.y_extent())
            .field("jacobian_policy", &self.jacobian_policy)
            .field("values", &self.values)
            .finish()
    }
}
