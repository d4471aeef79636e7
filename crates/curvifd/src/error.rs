use std::error::Error;
use std::fmt;

/// Which index of a 2D container an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Row,
    Col,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Row => write!(f, "row"),
            Axis::Col => write!(f, "column"),
        }
    }
}

/// Failures raised by the dense matrix engine.
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixError {
    /// Operand shapes are incompatible for `op`.
    DimensionMismatch {
        op: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },
    NotSquare { rows: usize, cols: usize },
    IndexOutOfRange { axis: Axis, index: usize, len: usize },
}

impl fmt::Display for MatrixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixError::DimensionMismatch { op, left, right } => write!(
                f,
                "dimension mismatch in {}: {}x{} vs {}x{}",
                op, left.0, left.1, right.0, right.1
            ),
            MatrixError::NotSquare { rows, cols } => write!(
                f,
                "operation only defined for square matrices, got {}x{}",
                rows, cols
            ),
            MatrixError::IndexOutOfRange { axis, index, len } => {
                write!(f, "{} index {} out of range for length {}", axis, index, len)
            }
        }
    }
}

impl Error for MatrixError {}

/// Failures raised by grid functions and their derivative operators.
#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// Binary operation between grid functions bound to different grids.
    GridMismatch { op: &'static str },
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    /// A three-point stencil needs at least two cells along `axis`.
    ExtentTooSmall { axis: Axis, extent: usize },
    SingularJacobian { row: usize, col: usize, value: f64 },
    Matrix(MatrixError),
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::GridMismatch { op } => {
                write!(f, "{} of grid functions requires identical grids", op)
            }
            GridError::ShapeMismatch { expected, found } => write!(
                f,
                "values of shape {}x{} do not fit grid nodes {}x{}",
                found.0, found.1, expected.0, expected.1
            ),
            GridError::ExtentTooSmall { axis, extent } => write!(
                f,
                "grid extent {} along {} axis is too small, need at least 2 cells",
                extent, axis
            ),
            GridError::SingularJacobian { row, col, value } => write!(
                f,
                "singular Jacobian determinant {:e} at node ({}, {})",
                value, row, col
            ),
            GridError::Matrix(err) => write!(f, "{}", err),
        }
    }
}

impl Error for GridError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GridError::Matrix(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MatrixError> for GridError {
    fn from(err: MatrixError) -> Self {
        GridError::Matrix(err)
    }
}
