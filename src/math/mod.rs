// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Math Backend
//!
//! The estimator never calls platform trigonometry directly. It is generic over a [`MathBackend`],
//! a zero-sized type providing the few transcendental functions the filter needs. Two backends
//! ship with the crate:
//!
//! - [`Libm`] - exact results via `libm` (default)
//! - [`MicroMath`] - fast approximations via `micromath`, for targets where cycles matter more
//!   than the last few bits
//!
//! Fixed-size linear algebra lives in [`matrix`] and the attitude representation in
//! [`quaternion`].

pub mod matrix;
pub mod quaternion;

pub use matrix::Matrix;
pub use quaternion::{EulerAngles, Quaternion};

use micromath::F32Ext;

/// Transcendental functions used by the estimator.
pub trait MathBackend {
    fn sqrt(x: f32) -> f32;
    fn sin(x: f32) -> f32;
    fn cos(x: f32) -> f32;
    fn asin(x: f32) -> f32;
    fn atan2(y: f32, x: f32) -> f32;
}

/// Exact backend built on `libm`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Libm;

impl MathBackend for Libm {
    #[inline]
    fn sqrt(x: f32) -> f32 {
        libm::sqrtf(x)
    }

    #[inline]
    fn sin(x: f32) -> f32 {
        libm::sinf(x)
    }

    #[inline]
    fn cos(x: f32) -> f32 {
        libm::cosf(x)
    }

    #[inline]
    fn asin(x: f32) -> f32 {
        libm::asinf(x)
    }

    #[inline]
    fn atan2(y: f32, x: f32) -> f32 {
        libm::atan2f(y, x)
    }
}

/// Approximate backend built on `micromath`.
///
/// `sqrt` is refined with two Newton steps so quaternion renormalization stays well inside the
/// unit-norm tolerance.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicroMath;

impl MathBackend for MicroMath {
    fn sqrt(x: f32) -> f32 {
        if x <= 0.0 {
            return 0.0;
        }
        let mut r = <f32 as F32Ext>::sqrt(x);
        r = 0.5 * (r + x / r);
        0.5 * (r + x / r)
    }

    #[inline]
    fn sin(x: f32) -> f32 {
        <f32 as F32Ext>::sin(x)
    }

    #[inline]
    fn cos(x: f32) -> f32 {
        <f32 as F32Ext>::cos(x)
    }

    #[inline]
    fn asin(x: f32) -> f32 {
        <f32 as F32Ext>::asin(x)
    }

    #[inline]
    fn atan2(y: f32, x: f32) -> f32 {
        <f32 as F32Ext>::atan2(y, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn micromath_sqrt_is_refined() {
        for &x in &[1e-4_f32, 0.5, 1.0, 2.0, 123.0] {
            assert_abs_diff_eq!(MicroMath::sqrt(x), Libm::sqrt(x), epsilon = 1e-5 * Libm::sqrt(x));
        }
        assert_eq!(MicroMath::sqrt(0.0), 0.0);
        assert_eq!(MicroMath::sqrt(-1.0), 0.0);
    }

    #[test]
    fn micromath_trig_tracks_libm() {
        for i in -10..=10 {
            let a = i as f32 * 0.15;
            assert_abs_diff_eq!(MicroMath::sin(a), Libm::sin(a), epsilon = 5e-3);
            assert_abs_diff_eq!(MicroMath::cos(a), Libm::cos(a), epsilon = 5e-3);
            assert_abs_diff_eq!(MicroMath::atan2(a, 1.0), Libm::atan2(a, 1.0), epsilon = 1e-2);
        }
    }
}
