//! Structured 2D grids mapping computational node indices to physical points.
//!
//! Node `(i, j)` sits on row `i` (the eta axis, `0..=y_extent`) and column `j`
//! (the xi axis, `0..=x_extent`). Flattened coordinate sequences are row-major.
use crate::error::GridError;
use crate::matrix::Matrix;

/// Physical coordinates of a grid node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Read-only view of a structured grid.
///
/// Grid functions hold an `Arc<dyn Grid>`, and stencil sweeps read node
/// coordinates from rayon workers, hence the `Send + Sync` bound.
pub trait Grid: Send + Sync {
    /// Number of cells along the xi axis; there are `x_extent() + 1` columns of nodes.
    fn x_extent(&self) -> usize;

    /// Number of cells along the eta axis; there are `y_extent() + 1` rows of nodes.
    fn y_extent(&self) -> usize;

    /// Physical coordinates of node `(i, j)`, `i <= y_extent()`, `j <= x_extent()`.
    fn point(&self, i: usize, j: usize) -> Point;

    /// Shape of a node-valued matrix on this grid.
    fn node_shape(&self) -> (usize, usize) {
        (self.y_extent() + 1, self.x_extent() + 1)
    }

    fn flattened_x(&self) -> Vec<f64> {
        let (rows, cols) = self.node_shape();
        let mut xs = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                xs.push(self.point(i, j).x);
            }
        }
        xs
    }

    fn flattened_y(&self) -> Vec<f64> {
        let (rows, cols) = self.node_shape();
        let mut ys = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                ys.push(self.point(i, j).y);
            }
        }
        ys
    }
}

/// Grid with explicitly stored node coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredGrid {
    x: Matrix,
    y: Matrix,
}

impl StructuredGrid {
    /// Build a grid from coordinate matrices of shape `(ny + 1, nx + 1)`.
    pub fn from_coordinates(x: Matrix, y: Matrix) -> Result<Self, GridError> {
        if x.shape() != y.shape() {
            return Err(GridError::ShapeMismatch {
                expected: x.shape(),
                found: y.shape(),
            });
        }
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(GridError::ShapeMismatch {
                expected: (1, 1),
                found: x.shape(),
            });
        }
        Ok(Self { x, y })
    }

    /// Grid of `nx x ny` cells whose node `(i, j)` is placed at
    /// `mapping(j / nx, i / ny)`, i.e. the mapping receives the computational
    /// coordinates `(xi, eta)` in `[0, 1]^2`.
    ///
    /// A zero extent places the single node row or column at 0.
    pub fn from_mapping<F>(nx: usize, ny: usize, mapping: F) -> Self
    where
        F: Fn(f64, f64) -> Point + Sync,
    {
        let xi = |j: usize| if nx == 0 { 0.0 } else { j as f64 / nx as f64 };
        let eta = |i: usize| if ny == 0 { 0.0 } else { i as f64 / ny as f64 };

        let x = Matrix::from_fn(ny + 1, nx + 1, |i, j| mapping(xi(j), eta(i)).x);
        let y = Matrix::from_fn(ny + 1, nx + 1, |i, j| mapping(xi(j), eta(i)).y);
        Self { x, y }
    }

    /// Uniformly spaced rectangle `[x0, x1] x [y0, y1]`.
    pub fn uniform(nx: usize, ny: usize, x_range: (f64, f64), y_range: (f64, f64)) -> Self {
        let (x0, x1) = x_range;
        let (y0, y1) = y_range;
        Self::from_mapping(nx, ny, |xi, eta| {
            Point::new(x0 + xi * (x1 - x0), y0 + eta * (y1 - y0))
        })
    }

    /// Uniform grid over the unit square.
    pub fn unit_square(nx: usize, ny: usize) -> Self {
        Self::uniform(nx, ny, (0.0, 1.0), (0.0, 1.0))
    }

    pub fn x_coordinates(&self) -> &Matrix {
        &self.x
    }

    pub fn y_coordinates(&self) -> &Matrix {
        &self.y
    }
}

impl Grid for StructuredGrid {
    fn x_extent(&self) -> usize {
        self.x.ncols() - 1
    }

    fn y_extent(&self) -> usize {
        self.x.nrows() - 1
    }

    fn point(&self, i: usize, j: usize) -> Point {
        Point::new(self.x[(i, j)], self.y[(i, j)])
    }

    fn flattened_x(&self) -> Vec<f64> {
        self.x.as_slice().to_vec()
    }

    fn flattened_y(&self) -> Vec<f64> {
        self.y.as_slice().to_vec()
    }
}
