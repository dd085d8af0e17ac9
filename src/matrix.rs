//! Dense matrix — row-major double matrix backed by `ndarray::Array2<f64>`,
//! with the operations CPD and MTTKRP need: GEMM, transposed GEMM,
//! Gauss-Jordan inverse, Frobenius norm.

use ndarray::Array2;

/// Pivot magnitude below which [`Matrix::inverse`] treats a matrix as
/// singular.
pub const SINGULAR_PIVOT_THRESHOLD: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    data: Array2<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix {
            data: Array2::zeros((rows, cols)),
        }
    }

    pub fn identity(n: usize) -> Matrix {
        let mut m = Matrix::zeros(n, n);
        m.fill_identity();
        m
    }

    pub fn from_rows(rows: usize, cols: usize, values: &[f64]) -> Matrix {
        assert_eq!(values.len(), rows * cols);
        let data = Array2::from_shape_vec((rows, cols), values.to_vec()).expect("shape matches values length");
        Matrix { data }
    }

    pub fn from_array(data: Array2<f64>) -> Matrix {
        Matrix { data }
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn into_array(self) -> Array2<f64> {
        self.data
    }

    pub fn as_array_mut(&mut self) -> &mut Array2<f64> {
        &mut self.data
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[[r, c]]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, v: f64) {
        self.data[[r, c]] = v;
    }

    pub fn fill_scalar(&mut self, value: f64) {
        self.data.fill(value);
    }

    pub fn fill_identity(&mut self) {
        self.data.fill(0.0);
        let n = self.rows().min(self.cols());
        for i in 0..n {
            self.data[[i, i]] = 1.0;
        }
    }

    pub fn add(&self, other: &Matrix) -> Matrix {
        Matrix {
            data: &self.data + &other.data,
        }
    }

    pub fn sub(&self, other: &Matrix) -> Matrix {
        Matrix {
            data: &self.data - &other.data,
        }
    }

    /// Element-wise (Hadamard) product.
    pub fn hadamard(&self, other: &Matrix) -> Matrix {
        Matrix {
            data: &self.data * &other.data,
        }
    }

    pub fn scale(&self, factor: f64) -> Matrix {
        Matrix {
            data: &self.data * factor,
        }
    }

    /// `C <- A . B`, delegated to `ndarray`'s matmul (its BLAS-backed path
    /// when the `blas` feature is enabled upstream; pure-Rust otherwise).
    pub fn gemm(&self, other: &Matrix) -> Matrix {
        Matrix {
            data: self.data.dot(&other.data),
        }
    }

    /// `C <- A^T . B` without materializing `A^T` (`ndarray`'s `.t()` is a
    /// zero-copy view).
    pub fn gemm_transpose_lhs(&self, other: &Matrix) -> Matrix {
        Matrix {
            data: self.data.t().dot(&other.data),
        }
    }

    pub fn frobenius_norm(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Gauss-Jordan inverse with partial pivoting. Returns `None`
    /// if the best available pivot falls below
    /// [`SINGULAR_PIVOT_THRESHOLD`] (singular-matrix detection).
    pub fn inverse(&self) -> Option<Matrix> {
        assert_eq!(self.rows(), self.cols(), "inverse requires a square matrix");
        let n = self.rows();

        // augmented = [self | I]
        let mut aug = Array2::<f64>::zeros((n, 2 * n));
        for i in 0..n {
            for j in 0..n {
                aug[[i, j]] = self.data[[i, j]];
            }
            aug[[i, n + i]] = 1.0;
        }

        for col in 0..n {
            // partial pivoting: find the largest-magnitude entry in this column, at or below `col`.
            let mut pivot_row = col;
            let mut pivot_val = aug[[col, col]].abs();
            for r in (col + 1)..n {
                let v = aug[[r, col]].abs();
                if v > pivot_val {
                    pivot_val = v;
                    pivot_row = r;
                }
            }
            if pivot_val < SINGULAR_PIVOT_THRESHOLD {
                return None;
            }
            if pivot_row != col {
                for j in 0..2 * n {
                    aug.swap([col, j], [pivot_row, j]);
                }
            }

            let pivot = aug[[col, col]];
            for j in 0..2 * n {
                aug[[col, j]] /= pivot;
            }

            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = aug[[r, col]];
                if factor == 0.0 {
                    continue;
                }
                for j in 0..2 * n {
                    aug[[r, j]] -= factor * aug[[col, j]];
                }
            }
        }

        let mut result = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in 0..n {
                result[[i, j]] = aug[[i, n + j]];
            }
        }
        Some(Matrix { data: result })
    }

    /// Adds `value` to every diagonal entry (ridge regularization).
    pub fn add_diagonal(&mut self, value: f64) {
        let n = self.rows().min(self.cols());
        for i in 0..n {
            self.data[[i, i]] += value;
        }
    }

    /// Normalizes column `col` in place; L2 norm when `iter == 0`, max-norm
    /// otherwise. Returns the norm used as the divisor
    /// (recorded as that column's lambda).
    pub fn normalize_column(&mut self, col: usize, iter: usize) -> f64 {
        let norm = if iter == 0 {
            (0..self.rows()).map(|r| self.data[[r, col]].powi(2)).sum::<f64>().sqrt()
        } else {
            (0..self.rows())
                .map(|r| self.data[[r, col]].abs())
                .fold(1.0_f64, f64::max)
        };
        if norm != 0.0 {
            for r in 0..self.rows() {
                self.data[[r, col]] /= norm;
            }
        }
        norm
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn gemm_matches_hand_computation() {
        let a = Matrix::from_rows(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = Matrix::from_rows(2, 2, &[5.0, 6.0, 7.0, 8.0]);
        let c = a.gemm(&b);
        assert_eq!(c.get(0, 0), 19.0);
        assert_eq!(c.get(0, 1), 22.0);
        assert_eq!(c.get(1, 0), 43.0);
        assert_eq!(c.get(1, 1), 50.0);
    }

    #[test]
    fn gemm_transpose_lhs_matches_explicit_transpose() {
        let a = Matrix::from_rows(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = Matrix::from_rows(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let got = a.gemm_transpose_lhs(&b);
        // A^T is 2x3; A^T . B is 2x2.
        assert_eq!(got.rows(), 2);
        assert_eq!(got.cols(), 2);
        // column 0 of A^T.B = sum_k A[k,:] * B[k,0]
        assert_eq!(got.get(0, 0), 1.0 * 1.0 + 3.0 * 0.0 + 5.0 * 1.0);
        assert_eq!(got.get(1, 0), 2.0 * 1.0 + 4.0 * 0.0 + 6.0 * 1.0);
    }

    #[test]
    fn inverse_of_identity_is_identity() {
        let id = Matrix::identity(3);
        let inv = id.inverse().unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((inv.get(i, j) - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn inverse_round_trip() {
        let a = Matrix::from_rows(2, 2, &[4.0, 7.0, 2.0, 6.0]);
        let inv = a.inverse().unwrap();
        let product = a.gemm(&inv);
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(product.get(i, j), expected, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn singular_matrix_returns_none() {
        let a = Matrix::from_rows(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert!(a.inverse().is_none());
    }

    #[test]
    fn frobenius_norm_matches_hand_computation() {
        let a = Matrix::from_rows(1, 2, &[3.0, 4.0]);
        assert_relative_eq!(a.frobenius_norm(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn normalize_column_l2_then_maxnorm() {
        let mut m = Matrix::from_rows(2, 1, &[3.0, 4.0]);
        let lambda0 = m.normalize_column(0, 0);
        assert!((lambda0 - 5.0).abs() < 1e-12);
        assert!((m.get(0, 0) - 0.6).abs() < 1e-12);
        assert!((m.get(1, 0) - 0.8).abs() < 1e-12);

        let mut m2 = Matrix::from_rows(2, 1, &[0.6, 0.8]);
        let lambda1 = m2.normalize_column(0, 1);
        assert!((lambda1 - 0.8).abs() < 1e-12);
    }
}
