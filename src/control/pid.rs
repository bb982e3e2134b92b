// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Discrete PID controller for fixed-cadence loops.
//!
//! The loop period is implicit: the integral is a plain running sum of errors and the derivative
//! is the error difference between consecutive calls. Gains are tuned per loop cadence.
//!
//! Works in `no_std` and does not allocate memory.

use micromath::F32Ext;

use crate::config::PidGains;

/// Multipliers applied to the nominal gains for a single update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainScale {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl GainScale {
    pub const UNITY: Self = Self {
        kp: 1.0,
        ki: 1.0,
        kd: 1.0,
    };

    /// Scale P and D, leave I untouched.
    pub const fn proportional_derivative(factor: f32) -> Self {
        Self {
            kp: factor,
            ki: 1.0,
            kd: factor,
        }
    }

    /// Scale P and I, leave D untouched.
    pub const fn proportional_integral(factor: f32) -> Self {
        Self {
            kp: factor,
            ki: factor,
            kd: 1.0,
        }
    }
}

/// Continuous gain reduction near zero error.
///
/// Returns 1.0 outside `deadzone` and falls linearly to `min_gain` as `|error|` approaches zero, so
/// small errors get gentler gains without a hard dead-band step.
pub fn gain_factor(error: f32, deadzone: f32, min_gain: f32) -> f32 {
    let e = error.abs();
    if deadzone <= 0.0 || e >= deadzone {
        return 1.0;
    }
    min_gain + (1.0 - min_gain) * (e / deadzone)
}

/// Snapshot of a loop's internals for telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidStatus {
    pub error: f32,
    pub integral: f32,
    pub output: f32,
}

/// PID controller with tunable gains, integral clamp and output clamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pid {
    /// Proportional gain
    kp: f32,
    /// Integral gain
    ki: f32,
    /// Derivative gain
    kd: f32,

    /// Error of the latest update
    error: f32,
    /// Error of the previous update (for derivative term)
    last_error: f32,
    /// Running error sum
    integral: f32,
    /// Latest clamped output
    output: f32,

    /// Integral anti-windup clamp, symmetric
    max_integral: f32,
    /// Output clamp, symmetric
    max_output: f32,
}

impl Pid {
    /// Create a new PID controller.
    ///
    /// `kp`, `ki`, `kd` are the gain constants. Limits default to ±1.
    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self {
            kp,
            ki,
            kd,

            error: 0.0,
            last_error: 0.0,
            integral: 0.0,
            output: 0.0,

            max_integral: 1.0,
            max_output: 1.0,
        }
    }

    pub fn from_gains(gains: &PidGains) -> Self {
        Self::new(gains.kp, gains.ki, gains.kd)
            .with_integral_limit(gains.max_integral)
            .with_output_limit(gains.max_output)
    }

    /// Set the output clamp to `±max`.
    pub fn with_output_limit(mut self, max: f32) -> Self {
        self.max_output = max.abs();
        self
    }

    /// Set the anti-windup clamp to `±max`.
    pub fn with_integral_limit(mut self, max: f32) -> Self {
        self.max_integral = max.abs();
        self
    }

    /// Retune without disturbing the loop state. The integral is re-clamped to the new bound.
    pub fn set_gains(&mut self, gains: &PidGains) {
        self.kp = gains.kp;
        self.ki = gains.ki;
        self.kd = gains.kd;
        self.max_integral = gains.max_integral.abs();
        self.max_output = gains.max_output.abs();
        self.integral = self.integral.clamp(-self.max_integral, self.max_integral);
    }

    pub fn gains(&self) -> PidGains {
        PidGains::new(self.kp, self.ki, self.kd, self.max_integral, self.max_output)
    }

    /// Reset integrator, derivative history and output.
    pub fn reset(&mut self) {
        self.error = 0.0;
        self.last_error = 0.0;
        self.integral = 0.0;
        self.output = 0.0;
    }

    #[inline]
    pub fn clear_integral(&mut self) {
        self.integral = 0.0;
    }

    /// Multiply the integral by `factor` (leak toward zero).
    #[inline]
    pub fn decay_integral(&mut self, factor: f32) {
        self.integral *= factor;
    }

    /// Update the controller.
    ///
    /// Returns a command in `[-max_output, max_output]`.
    #[inline]
    pub fn update(&mut self, target: f32, current: f32) -> f32 {
        self.update_scaled(target, current, GainScale::UNITY)
    }

    /// Update with temporarily scaled gains. The nominal gains are not modified.
    pub fn update_scaled(&mut self, target: f32, current: f32, scale: GainScale) -> f32 {
        let error = target - current;
        if !error.is_finite() {
            self.reset();
            return 0.0;
        }
        self.error = error;

        // ----- I term -----
        self.integral = (self.integral + error).clamp(-self.max_integral, self.max_integral);

        // ----- D term -----
        let derivative = error - self.last_error;

        let out = self.kp * scale.kp * error
            + self.ki * scale.ki * self.integral
            + self.kd * scale.kd * derivative;

        // ----- Output clamp -----
        self.output = if out.is_finite() {
            out.clamp(-self.max_output, self.max_output)
        } else {
            self.integral = 0.0;
            0.0
        };

        self.last_error = error;
        self.output
    }

    #[inline]
    pub fn error(&self) -> f32 {
        self.error
    }

    #[inline]
    pub fn integral(&self) -> f32 {
        self.integral
    }

    #[inline]
    pub fn output(&self) -> f32 {
        self.output
    }

    pub fn status(&self) -> PidStatus {
        PidStatus {
            error: self.error,
            integral: self.integral,
            output: self.output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn proportional_integral_derivative_terms() {
        let mut pid = Pid::new(2.0, 0.5, 1.0)
            .with_integral_limit(100.0)
            .with_output_limit(100.0);

        // error 3: P 6, I 0.5*3, D 3
        assert_abs_diff_eq!(pid.update(3.0, 0.0), 6.0 + 1.5 + 3.0);
        // error 1: P 2, I 0.5*4, D -2
        assert_abs_diff_eq!(pid.update(3.0, 2.0), 2.0 + 2.0 - 2.0);
        assert_eq!(pid.integral(), 4.0);
        assert_eq!(pid.error(), 1.0);
    }

    #[test]
    fn clamps_hold_for_any_input() {
        let mut pid = Pid::new(50.0, 10.0, 5.0)
            .with_integral_limit(20.0)
            .with_output_limit(300.0);

        let mut x = 0.37_f32;
        for i in 0..2000 {
            x = (x * 3.9 * (1.0 - x)).clamp(0.0, 1.0);
            let target = if i % 7 == 0 { 1e6 } else { (x - 0.5) * 400.0 };
            let out = pid.update(target, -target * x);
            assert!(out.abs() <= 300.0);
            assert!(pid.integral().abs() <= 20.0);
        }
    }

    #[test]
    fn scaled_update_keeps_nominal_gains() {
        let mut pid = Pid::new(4.0, 0.0, 0.0).with_output_limit(100.0);
        let out = pid.update_scaled(1.0, 0.0, GainScale::proportional_derivative(0.25));
        assert_abs_diff_eq!(out, 1.0);
        assert_eq!(pid.gains().kp, 4.0);
        assert_abs_diff_eq!(pid.update(1.0, 0.0), 4.0);
    }

    #[test]
    fn non_finite_input_resets() {
        let mut pid = Pid::new(1.0, 1.0, 0.0)
            .with_integral_limit(10.0)
            .with_output_limit(10.0);
        pid.update(2.0, 0.0);
        assert_eq!(pid.update(f32::NAN, 0.0), 0.0);
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.output(), 0.0);
    }

    #[test]
    fn gain_factor_interpolates_inside_deadzone() {
        assert_eq!(gain_factor(10.0, 5.0, 0.2), 1.0);
        assert_eq!(gain_factor(-5.0, 5.0, 0.2), 1.0);
        assert_abs_diff_eq!(gain_factor(0.0, 5.0, 0.2), 0.2);
        assert_abs_diff_eq!(gain_factor(-2.5, 5.0, 0.2), 0.6);
        assert_eq!(gain_factor(0.0, 0.0, 0.2), 1.0);
    }

    #[test]
    fn set_gains_reclamps_integral() {
        let mut pid = Pid::from_gains(&PidGains::new(0.0, 1.0, 0.0, 50.0, 100.0));
        for _ in 0..10 {
            pid.update(10.0, 0.0);
        }
        assert_eq!(pid.integral(), 50.0);
        pid.set_gains(&PidGains::new(0.0, 1.0, 0.0, 5.0, 100.0));
        assert_eq!(pid.integral(), 5.0);
    }
}
