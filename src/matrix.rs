//! Dense row-major matrix.
//!
//! This is the primitive every engine in the crate computes with. Shapes are checked with
//! `assert!` in the arithmetic helpers (misuse is programmer error); the constructors and
//! `copy_rows_from` return [`Result`] because they sit on data boundaries.

use std::ops::Range;

use crate::matmul::{Strides, gemm_f32};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// A `(rows, cols)` matrix of zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build a matrix from a flat row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidData(format!(
                "buffer length {} does not match rows * cols ({rows} * {cols})",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build a matrix from per-row vectors (copies into contiguous storage).
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(Error::InvalidData(format!(
                    "row {i} has len {}, expected {cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[inline]
    pub fn row(&self, r: usize) -> &[f32] {
        let start = r * self.cols;
        &self.data[start..start + self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, r: usize) -> &mut [f32] {
        let start = r * self.cols;
        &mut self.data[start..start + self.cols]
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> f32 {
        debug_assert!(r < self.rows && c < self.cols);
        self.data[r * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, value: f32) {
        debug_assert!(r < self.rows && c < self.cols);
        self.data[r * self.cols + c] = value;
    }

    /// `self · rhs`.
    pub fn matmul(&self, rhs: &Matrix) -> Matrix {
        assert_eq!(
            self.cols, rhs.rows,
            "matmul: lhs cols {} do not match rhs rows {}",
            self.cols, rhs.rows
        );
        let mut out = Matrix::zeros(self.rows, rhs.cols);
        if self.rows == 0 || rhs.cols == 0 || self.cols == 0 {
            return out;
        }
        gemm_f32(
            self.rows,
            rhs.cols,
            self.cols,
            1.0,
            &self.data,
            Strides::row_major(self.cols),
            &rhs.data,
            Strides::row_major(rhs.cols),
            0.0,
            &mut out.data,
            Strides::row_major(rhs.cols),
        );
        out
    }

    /// `selfᵗ · rhs`, reading `self` through transposed strides.
    pub fn t_matmul(&self, rhs: &Matrix) -> Matrix {
        assert_eq!(
            self.rows, rhs.rows,
            "t_matmul: lhs rows {} do not match rhs rows {}",
            self.rows, rhs.rows
        );
        let mut out = Matrix::zeros(self.cols, rhs.cols);
        if self.rows == 0 || self.cols == 0 || rhs.cols == 0 {
            return out;
        }
        gemm_f32(
            self.cols,
            rhs.cols,
            self.rows,
            1.0,
            &self.data,
            Strides::transposed(self.cols),
            &rhs.data,
            Strides::row_major(rhs.cols),
            0.0,
            &mut out.data,
            Strides::row_major(rhs.cols),
        );
        out
    }

    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::zeros(self.cols, self.rows);
        self.transpose_into(&mut out);
        out
    }

    /// Write the transpose of `self` into `out` (which must be `(cols, rows)`).
    pub fn transpose_into(&self, out: &mut Matrix) {
        assert_eq!(
            out.shape(),
            (self.cols, self.rows),
            "transpose_into: output shape mismatch"
        );
        for r in 0..self.rows {
            let row = self.row(r);
            for (c, &v) in row.iter().enumerate() {
                out.data[c * self.rows + r] = v;
            }
        }
    }

    /// Add `v` to every row.
    pub fn add_row_broadcast(&mut self, v: &[f32]) {
        assert_eq!(
            v.len(),
            self.cols,
            "add_row_broadcast: vector len {} does not match cols {}",
            v.len(),
            self.cols
        );
        for row in self.data.chunks_exact_mut(self.cols.max(1)) {
            for (x, &b) in row.iter_mut().zip(v) {
                *x += b;
            }
        }
    }

    /// Element-wise `self *= other`.
    pub fn hadamard_assign(&mut self, other: &Matrix) {
        assert_eq!(
            self.shape(),
            other.shape(),
            "hadamard_assign: shape mismatch"
        );
        for (x, &y) in self.data.iter_mut().zip(&other.data) {
            *x *= y;
        }
    }

    pub fn scale(&mut self, s: f32) {
        for x in &mut self.data {
            *x *= s;
        }
    }

    pub fn map_inplace<F: FnMut(f32) -> f32>(&mut self, mut f: F) {
        for x in &mut self.data {
            *x = f(*x);
        }
    }

    pub fn column_sums(&self) -> Vec<f32> {
        let mut sums = vec![0.0_f32; self.cols];
        for r in 0..self.rows {
            for (s, &v) in sums.iter_mut().zip(self.row(r)) {
                *s += v;
            }
        }
        sums
    }

    /// Copy of the contiguous row range `range`.
    pub fn select_rows(&self, range: Range<usize>) -> Matrix {
        assert!(range.end <= self.rows, "select_rows: range out of bounds");
        let data = self.data[range.start * self.cols..range.end * self.cols].to_vec();
        Matrix {
            rows: range.len(),
            cols: self.cols,
            data,
        }
    }

    /// New matrix whose row `i` is `self.row(indices[i])`.
    pub fn gather_rows(&self, indices: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &idx in indices {
            data.extend_from_slice(self.row(idx));
        }
        Matrix {
            rows: indices.len(),
            cols: self.cols,
            data,
        }
    }

    /// Split into row-contiguous batches of `size` rows; the last batch may be smaller.
    pub fn batches(&self, size: usize) -> Vec<Matrix> {
        assert!(size > 0, "batch size must be > 0");
        (0..self.rows)
            .step_by(size)
            .map(|start| self.select_rows(start..(start + size).min(self.rows)))
            .collect()
    }

    /// Overwrite rows `start_row..start_row + part.rows()` with `part`.
    pub fn copy_rows_from(&mut self, start_row: usize, part: &Matrix) -> Result<()> {
        if part.cols != self.cols {
            return Err(Error::ShapeMismatch {
                context: "row copy-back (cols)",
                expected: self.cols,
                got: part.cols,
            });
        }
        let end = start_row + part.rows;
        if end > self.rows {
            return Err(Error::ShapeMismatch {
                context: "row copy-back (rows)",
                expected: self.rows,
                got: end,
            });
        }
        self.data[start_row * self.cols..end * self.cols].copy_from_slice(&part.data);
        Ok(())
    }
}
