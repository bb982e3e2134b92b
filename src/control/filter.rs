// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! One-pole low-pass filter.

/// `filtered = coeff * new + (1 - coeff) * filtered`
///
/// `coeff = 1.0` passes the input through, smaller values smooth harder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowPass {
    coeff: f32,
    value: f32,
}

impl LowPass {
    pub const fn new(coeff: f32) -> Self {
        Self { coeff, value: 0.0 }
    }

    pub fn update(&mut self, input: f32) -> f32 {
        self.value = self.coeff * input + (1.0 - self.coeff) * self.value;
        if !self.value.is_finite() {
            self.value = 0.0;
        }
        self.value
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    #[inline]
    pub fn reset(&mut self) {
        self.value = 0.0;
    }

    pub fn set_coeff(&mut self, coeff: f32) {
        self.coeff = coeff;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn unity_coefficient_passes_through() {
        let mut f = LowPass::new(1.0);
        assert_eq!(f.update(3.5), 3.5);
        assert_eq!(f.update(-1.0), -1.0);
    }

    #[test]
    fn step_response_converges_geometrically() {
        let mut f = LowPass::new(0.3);
        assert_abs_diff_eq!(f.update(10.0), 3.0, epsilon = 1e-5);
        assert_abs_diff_eq!(f.update(10.0), 5.1, epsilon = 1e-5);
        for _ in 0..100 {
            f.update(10.0);
        }
        assert_abs_diff_eq!(f.value(), 10.0, epsilon = 1e-3);
        f.reset();
        assert_eq!(f.value(), 0.0);
    }

    #[test]
    fn nan_does_not_stick() {
        let mut f = LowPass::new(0.5);
        f.update(f32::NAN);
        assert_eq!(f.value(), 0.0);
    }
}
