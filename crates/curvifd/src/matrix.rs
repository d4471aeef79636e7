//! Dense row-major `f64` matrix used as storage for grid functions and grids.
//!
//! Elementwise loops, the product and the transpose are distributed with rayon
//! over disjoint output cells; the Frobenius norm is a parallel sum reduction.
use std::error::Error;
use std::fmt;
use std::ops::{Index, IndexMut};

use rand::Rng;
use rayon::prelude::*;

use crate::error::{Axis, MatrixError};

/// Number of Horner steps used by [`Matrix::exp`].
pub const FIXED_EXP_TERMS: usize = 30;

/// Upper bound on the term count chosen by [`Matrix::exp_adaptive`].
pub const MAX_EXP_TERMS: usize = 200;

#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl Matrix {
    /// Zero-filled `rows x cols` matrix.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::zeros(rows, cols)
    }

    pub fn square(n: usize) -> Self {
        Self::zeros(n, n)
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    pub fn from_shape_vec(shape: (usize, usize), data: Vec<f64>) -> Result<Self, ShapeError> {
        let (rows, cols) = shape;
        if data.len() != rows * cols {
            return Err(ShapeError {
                rows,
                cols,
                len: data.len(),
            });
        }
        Ok(Self { data, rows, cols })
    }

    /// Build a matrix by evaluating `f(row, col)` for every cell in parallel.
    pub fn from_fn<F>(rows: usize, cols: usize, f: F) -> Self
    where
        F: Fn(usize, usize) -> f64 + Sync,
    {
        let mut m = Self::zeros(rows, cols);
        if cols > 0 {
            m.data
                .par_chunks_mut(cols)
                .enumerate()
                .for_each(|(i, row)| {
                    for (j, v) in row.iter_mut().enumerate() {
                        *v = f(i, j);
                    }
                });
        }
        m
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        if n > 0 {
            m.data
                .par_chunks_mut(n)
                .enumerate()
                .for_each(|(i, row)| row[i] = 1.0);
        }
        m
    }

    /// Square matrix with entries drawn uniformly from `[0, 1)`.
    pub fn random_square(n: usize) -> Self {
        Self::random(n, n)
    }

    pub fn random(rows: usize, cols: usize) -> Self {
        Self::random_with(&mut rand::thread_rng(), rows, cols)
    }

    pub fn random_with<R: Rng + ?Sized>(rng: &mut R, rows: usize, cols: usize) -> Self {
        let data = (0..rows * cols).map(|_| rng.gen::<f64>()).collect();
        Self { data, rows, cols }
    }

    pub fn nrows(&self) -> usize {
        self.rows
    }

    pub fn ncols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    #[inline]
    fn offset(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    fn check_index(&self, row: usize, col: usize) -> Result<usize, MatrixError> {
        if row >= self.rows {
            return Err(MatrixError::IndexOutOfRange {
                axis: Axis::Row,
                index: row,
                len: self.rows,
            });
        }
        if col >= self.cols {
            return Err(MatrixError::IndexOutOfRange {
                axis: Axis::Col,
                index: col,
                len: self.cols,
            });
        }
        Ok(self.offset(row, col))
    }

    pub fn get(&self, row: usize, col: usize) -> Result<&f64, MatrixError> {
        let offset = self.check_index(row, col)?;
        Ok(&self.data[offset])
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> Result<&mut f64, MatrixError> {
        let offset = self.check_index(row, col)?;
        Ok(&mut self.data[offset])
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<(), MatrixError> {
        *self.get_mut(row, col)? = value;
        Ok(())
    }

    /// Contiguous view of row `row`.
    pub fn row(&self, row: usize) -> Result<&[f64], MatrixError> {
        if row >= self.rows {
            return Err(MatrixError::IndexOutOfRange {
                axis: Axis::Row,
                index: row,
                len: self.rows,
            });
        }
        let start = self.offset(row, 0);
        Ok(&self.data[start..start + self.cols])
    }

    pub fn row_mut(&mut self, row: usize) -> Result<&mut [f64], MatrixError> {
        if row >= self.rows {
            return Err(MatrixError::IndexOutOfRange {
                axis: Axis::Row,
                index: row,
                len: self.rows,
            });
        }
        let start = self.offset(row, 0);
        let cols = self.cols;
        Ok(&mut self.data[start..start + cols])
    }

    pub fn mapv<F>(&self, f: F) -> Matrix
    where
        F: Fn(f64) -> f64 + Sync + Send,
    {
        Matrix {
            data: self.data.par_iter().map(|&v| f(v)).collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Copy `other` into `self`, reallocating only when the shapes differ.
    pub fn assign(&mut self, other: &Matrix) {
        if self.shape() != other.shape() {
            self.rows = other.rows;
            self.cols = other.cols;
            self.data = other.data.clone();
        } else {
            self.data.copy_from_slice(&other.data);
        }
    }

    fn check_same_shape(&self, other: &Matrix, op: &'static str) -> Result<(), MatrixError> {
        if self.shape() != other.shape() {
            return Err(MatrixError::DimensionMismatch {
                op,
                left: self.shape(),
                right: other.shape(),
            });
        }
        Ok(())
    }

    pub fn add_in_place(&mut self, other: &Matrix) -> Result<(), MatrixError> {
        self.check_same_shape(other, "addition")?;
        self.data
            .par_iter_mut()
            .zip(other.data.par_iter())
            .for_each(|(a, b)| *a += *b);
        Ok(())
    }

    pub fn subtract_in_place(&mut self, other: &Matrix) -> Result<(), MatrixError> {
        self.check_same_shape(other, "subtraction")?;
        self.data
            .par_iter_mut()
            .zip(other.data.par_iter())
            .for_each(|(a, b)| *a -= *b);
        Ok(())
    }

    /// Elementwise (Hadamard) product.
    pub fn hadamard_in_place(&mut self, other: &Matrix) -> Result<(), MatrixError> {
        self.check_same_shape(other, "elementwise product")?;
        self.data
            .par_iter_mut()
            .zip(other.data.par_iter())
            .for_each(|(a, b)| *a *= *b);
        Ok(())
    }

    pub fn add_scalar_in_place(&mut self, value: f64) {
        self.data.par_iter_mut().for_each(|a| *a += value);
    }

    pub fn scale_in_place(&mut self, value: f64) {
        self.data.par_iter_mut().for_each(|a| *a *= value);
    }

    /// Divides by multiplying with the reciprocal; `value` must be nonzero.
    pub fn divide_in_place(&mut self, value: f64) {
        self.scale_in_place(1.0 / value);
    }

    /// Replace `self` (`n x k`) with the product `self * other` (`n x m`).
    pub fn multiply_in_place(&mut self, other: &Matrix) -> Result<(), MatrixError> {
        if self.cols != other.rows {
            return Err(MatrixError::DimensionMismatch {
                op: "multiplication",
                left: self.shape(),
                right: other.shape(),
            });
        }

        let (k, m) = (self.cols, other.cols);
        let mut out = vec![0.0; self.rows * m];
        if m > 0 {
            let lhs = &self.data;
            out.par_chunks_mut(m).enumerate().for_each(|(i, out_row)| {
                let lhs_row = &lhs[i * k..(i + 1) * k];
                for (kk, &a) in lhs_row.iter().enumerate() {
                    let rhs_row = &other.data[kk * m..(kk + 1) * m];
                    for (o, &b) in out_row.iter_mut().zip(rhs_row) {
                        *o += a * b;
                    }
                }
            });
        }

        self.data = out;
        self.cols = m;
        Ok(())
    }

    pub fn add(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        let mut m = self.clone();
        m.add_in_place(other)?;
        Ok(m)
    }

    pub fn subtract(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        let mut m = self.clone();
        m.subtract_in_place(other)?;
        Ok(m)
    }

    pub fn multiply(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        let mut m = self.clone();
        m.multiply_in_place(other)?;
        Ok(m)
    }

    pub fn hadamard(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        let mut m = self.clone();
        m.hadamard_in_place(other)?;
        Ok(m)
    }

    pub fn scale(&self, value: f64) -> Matrix {
        let mut m = self.clone();
        m.scale_in_place(value);
        m
    }

    pub fn transpose(&self) -> Matrix {
        let (rows, cols) = self.shape();
        let mut out = vec![0.0; rows * cols];
        if rows > 0 {
            out.par_chunks_mut(rows).enumerate().for_each(|(j, out_row)| {
                for (i, v) in out_row.iter_mut().enumerate() {
                    *v = self.data[i * cols + j];
                }
            });
        }
        Matrix {
            data: out,
            rows: cols,
            cols: rows,
        }
    }

    pub fn frobenius_norm(&self) -> f64 {
        self.data.par_iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Matrix exponential through a Horner evaluation of the power series
    /// truncated after [`FIXED_EXP_TERMS`] terms.
    ///
    /// `_tolerance` is accepted for API compatibility but the term count is
    /// fixed, so matrices with a large norm are not resolved to any particular
    /// accuracy. Use [`Matrix::exp_adaptive`] when the tolerance must be honored.
    pub fn exp(&self, _tolerance: f64) -> Result<Matrix, MatrixError> {
        self.exp_terms(FIXED_EXP_TERMS)
    }

    /// Matrix exponential with the term count derived from the Frobenius norm
    /// and `tolerance`, see [`exp_terms_for_tolerance`].
    pub fn exp_adaptive(&self, tolerance: f64) -> Result<Matrix, MatrixError> {
        if !self.is_square() {
            return Err(MatrixError::NotSquare {
                rows: self.rows,
                cols: self.cols,
            });
        }
        let norm = self.frobenius_norm();
        let terms = exp_terms_for_tolerance(norm, tolerance);
        if terms == MAX_EXP_TERMS {
            log::warn!(
                "matrix exponential capped at {} terms (norm {:.3e}, tolerance {:.3e})",
                terms,
                norm,
                tolerance
            );
        }
        log::trace!("matrix exponential with {} terms", terms);
        self.exp_terms(terms)
    }

    /// Horner scheme: starting from `I`, apply `res = res * M / k + I` for
    /// `k = terms, ..., 1`.
    pub fn exp_terms(&self, terms: usize) -> Result<Matrix, MatrixError> {
        if !self.is_square() {
            return Err(MatrixError::NotSquare {
                rows: self.rows,
                cols: self.cols,
            });
        }

        let eye = Matrix::identity(self.rows);
        let mut res = eye.clone();
        for k in (1..=terms).rev() {
            res.multiply_in_place(self)?;
            res.scale_in_place(1.0 / k as f64);
            res.add_in_place(&eye)?;
        }
        Ok(res)
    }

    /// Fill the `lx x ly` block starting at (`ox`, `oy`) from the row-major
    /// slice `values`.
    pub fn fill_sub_block(
        &mut self,
        values: &[f64],
        lx: usize,
        ly: usize,
        ox: usize,
        oy: usize,
    ) -> Result<(), MatrixError> {
        if values.len() != lx * ly {
            return Err(MatrixError::DimensionMismatch {
                op: "sub-block fill",
                left: (lx, ly),
                right: (1, values.len()),
            });
        }
        if lx == 0 || ly == 0 {
            return Ok(());
        }
        let last_row = ox.checked_add(lx - 1).ok_or(MatrixError::IndexOutOfRange {
            axis: Axis::Row,
            index: ox,
            len: self.rows,
        })?;
        let last_col = oy.checked_add(ly - 1).ok_or(MatrixError::IndexOutOfRange {
            axis: Axis::Col,
            index: oy,
            len: self.cols,
        })?;
        self.check_index(last_row, last_col)?;

        for (i, src) in values.chunks(ly).enumerate() {
            let start = self.offset(ox + i, oy);
            self.data[start..start + ly].copy_from_slice(src);
        }
        Ok(())
    }

    pub fn print(&self) {
        println!("{}", self);
    }
}

/// Number of Horner steps needed so the series remainder estimate for a
/// matrix of norm `norm` drops below `tolerance`.
///
/// Never less than `ceil(norm)`, never more than [`MAX_EXP_TERMS`]. A
/// non-positive or non-finite tolerance yields the cap.
pub fn exp_terms_for_tolerance(norm: f64, tolerance: f64) -> usize {
    if !(tolerance > 0.0) || !norm.is_finite() {
        return MAX_EXP_TERMS;
    }

    let x = norm;
    let mut err = (x / 2.0) * (1.0 + (x * (x + 1.0)) / (x + 2.0));
    let mut terms = 0usize;
    while err > tolerance && terms < MAX_EXP_TERMS {
        terms += 1;
        err *= x / (terms as f64 + 1.0);
    }

    terms.max(x.ceil() as usize).min(MAX_EXP_TERMS)
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        assert!(
            index.0 < self.rows && index.1 < self.cols,
            "index ({}, {}) out of bounds for {}x{} matrix",
            index.0,
            index.1,
            self.rows,
            self.cols
        );
        let offset = self.offset(index.0, index.1);
        &self.data[offset]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Self::Output {
        assert!(
            index.0 < self.rows && index.1 < self.cols,
            "index ({}, {}) out of bounds for {}x{} matrix",
            index.0,
            index.1,
            self.rows,
            self.cols
        );
        let offset = self.offset(index.0, index.1);
        &mut self.data[offset]
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}x{} -> [", self.rows, self.cols)?;
        for i in 0..self.rows {
            write!(f, " [")?;
            for j in 0..self.cols {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, " {:.4}", self.data[self.offset(i, j)])?;
            }
            writeln!(f, "],")?;
        }
        write!(f, "]")
    }
}

#[derive(Debug, Clone)]
pub struct ShapeError {
    rows: usize,
    cols: usize,
    len: usize,
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid shape ({}, {}) for buffer of length {}",
            self.rows, self.cols, self.len
        )
    }
}

impl Error for ShapeError {}
