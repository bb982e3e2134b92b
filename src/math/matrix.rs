// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Fixed-size row-major matrices.
//!
//! Dimensions are const generics so every product is checked at compile time and lives on the
//! stack. Only the handful of operations the estimator uses are provided.

use core::ops::{Index, IndexMut};

use micromath::F32Ext;

/// `R` x `C` matrix of `f32`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix<const R: usize, const C: usize>(pub [[f32; C]; R]);

impl<const R: usize, const C: usize> Matrix<R, C> {
    pub const fn zeros() -> Self {
        Self([[0.0; C]; R])
    }

    pub fn transpose(&self) -> Matrix<C, R> {
        let mut out = Matrix::<C, R>::zeros();
        for i in 0..R {
            for j in 0..C {
                out.0[j][i] = self.0[i][j];
            }
        }
        out
    }

    pub fn mul<const K: usize>(&self, rhs: &Matrix<C, K>) -> Matrix<R, K> {
        let mut out = Matrix::<R, K>::zeros();
        for i in 0..R {
            for k in 0..C {
                let a = self.0[i][k];
                if a == 0.0 {
                    continue;
                }
                for j in 0..K {
                    out.0[i][j] += a * rhs.0[k][j];
                }
            }
        }
        out
    }

    pub fn add(&self, rhs: &Self) -> Self {
        let mut out = *self;
        for i in 0..R {
            for j in 0..C {
                out.0[i][j] += rhs.0[i][j];
            }
        }
        out
    }

    pub fn sub(&self, rhs: &Self) -> Self {
        let mut out = *self;
        for i in 0..R {
            for j in 0..C {
                out.0[i][j] -= rhs.0[i][j];
            }
        }
        out
    }

    pub fn scale(&self, k: f32) -> Self {
        let mut out = *self;
        for row in out.0.iter_mut() {
            for v in row.iter_mut() {
                *v *= k;
            }
        }
        out
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|row| row.iter().all(|v| v.is_finite()))
    }
}

impl<const N: usize> Matrix<N, N> {
    pub fn identity() -> Self {
        Self::diagonal(&[1.0; N])
    }

    pub fn diagonal(d: &[f32; N]) -> Self {
        let mut out = Self::zeros();
        for i in 0..N {
            out.0[i][i] = d[i];
        }
        out
    }

    /// Average the matrix with its transpose to remove rounding asymmetry.
    pub fn symmetrize(&mut self) {
        for i in 0..N {
            for j in (i + 1)..N {
                let m = 0.5 * (self.0[i][j] + self.0[j][i]);
                self.0[i][j] = m;
                self.0[j][i] = m;
            }
        }
    }
}

impl Matrix<2, 2> {
    /// Closed-form inverse, `None` when the determinant vanishes.
    pub fn try_inverse(&self) -> Option<Self> {
        let [[a, b], [c, d]] = self.0;
        let det = a * d - b * c;
        if !det.is_finite() || det.abs() < 1e-12 {
            return None;
        }
        let inv = 1.0 / det;
        Some(Self([[d * inv, -b * inv], [-c * inv, a * inv]]))
    }
}

impl Matrix<3, 3> {
    /// Cofactor inverse, `None` when the determinant vanishes.
    pub fn try_inverse(&self) -> Option<Self> {
        let m = &self.0;
        let c00 = m[1][1] * m[2][2] - m[1][2] * m[2][1];
        let c01 = m[1][2] * m[2][0] - m[1][0] * m[2][2];
        let c02 = m[1][0] * m[2][1] - m[1][1] * m[2][0];

        let det = m[0][0] * c00 + m[0][1] * c01 + m[0][2] * c02;
        if !det.is_finite() || det.abs() < 1e-12 {
            return None;
        }
        let inv = 1.0 / det;

        Some(Self([
            [
                c00 * inv,
                (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv,
                (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv,
            ],
            [
                c01 * inv,
                (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv,
                (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv,
            ],
            [
                c02 * inv,
                (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv,
                (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv,
            ],
        ]))
    }
}

impl<const R: usize, const C: usize> Index<(usize, usize)> for Matrix<R, C> {
    type Output = f32;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &f32 {
        &self.0[i][j]
    }
}

impl<const R: usize, const C: usize> IndexMut<(usize, usize)> for Matrix<R, C> {
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut f32 {
        &mut self.0[i][j]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn product_and_transpose_shapes() {
        let a = Matrix([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let at = a.transpose();
        let p = a.mul(&at);
        assert_eq!(p, Matrix([[14.0, 32.0], [32.0, 77.0]]));
    }

    #[test]
    fn inverse_3x3_recovers_identity() {
        let s = Matrix([[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]]);
        let inv = s.try_inverse().unwrap();
        let id = s.mul(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(id[(i, j)], expected, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn inverse_2x2_recovers_identity() {
        let s = Matrix([[2.0, 1.0], [1.0, 3.0]]);
        let id = s.mul(&s.try_inverse().unwrap());
        assert_abs_diff_eq!(id[(0, 0)], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(id[(0, 1)], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(id[(1, 1)], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn singular_matrices_have_no_inverse() {
        assert!(Matrix([[1.0, 2.0], [2.0, 4.0]]).try_inverse().is_none());
        assert!(Matrix::<3, 3>::zeros().try_inverse().is_none());
    }

    #[test]
    fn symmetrize_averages_off_diagonal() {
        let mut m = Matrix([[1.0, 2.0], [4.0, 1.0]]);
        m.symmetrize();
        assert_eq!(m[(0, 1)], 3.0);
        assert_eq!(m[(1, 0)], 3.0);
    }
}
