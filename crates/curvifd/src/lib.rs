//! curvifd: finite-difference derivatives on curvilinear structured 2D grids.
//!
//! A [`GridFunction`](grid_function::GridFunction) stores nodal values of a
//! scalar field on a [`Grid`](grid::Grid) and differentiates it in
//! computational coordinates, then maps the result to physical coordinates
//! through the Jacobian of the grid mapping. Values live in the dense
//! [`Matrix`](matrix::Matrix) engine, which also offers the usual arithmetic,
//! transpose, Frobenius norm and a power-series matrix exponential.
pub mod config;
pub mod error;
pub mod grid;
pub mod grid_function;
pub mod io;
pub mod matrix;

pub use error::{Axis, GridError, MatrixError};
pub use grid::{Grid, Point, StructuredGrid};
pub use grid_function::{GridFunction, JacobianPolicy};
pub use matrix::Matrix;
