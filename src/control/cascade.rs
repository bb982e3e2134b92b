// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Cascaded balance control.
//!
//! ```text
//!  target speed ──► [speed PID] ──► desired angle ──┐
//!                        ▲                          + turn compensation
//!              balance encoder                      ▼
//!                                 pitch ──► [angle PID] ──► target rate
//!                                                               ▼
//!                                       pitch rate ──► [rate PID] ──► low-pass ──► balance motor
//!
//!  target / open-loop PWM ──► [drive PID] ◄── drive encoder ──► drive motor
//! ```
//!
//! Each `run_*` method is one loop step; the caller decides the cadence and must run outer loops
//! before inner ones within a tick.

use micromath::F32Ext;

use crate::config::{CascadeConfig, DriveMode};
use crate::control::filter::LowPass;
use crate::control::pid::{gain_factor, GainScale, Pid, PidStatus};

/// Internals of all four loops.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CascadeStatus {
    pub speed: PidStatus,
    pub angle: PidStatus,
    pub rate: PidStatus,
    pub drive: PidStatus,
    pub desired_angle: f32,
    pub rate_target: f32,
    pub balance_command: i16,
    pub drive_command: i16,
}

pub struct BalanceCascade {
    config: CascadeConfig,

    speed: Pid,
    angle: Pid,
    rate: Pid,
    drive: Pid,

    pitch_filter: LowPass,
    rate_filter: LowPass,
    output_filter: LowPass,

    target_speed: f32,
    base_target_angle: f32,
    drive_mode: DriveMode,

    desired_angle: f32,
    rate_target: f32,
    speed_invocations: u32,

    balance_command: i16,
    drive_command: i16,
}

impl BalanceCascade {
    pub fn new(config: CascadeConfig) -> Self {
        Self {
            config,

            speed: Pid::from_gains(&config.speed),
            angle: Pid::from_gains(&config.angle),
            rate: Pid::from_gains(&config.rate),
            drive: Pid::from_gains(&config.drive),

            pitch_filter: LowPass::new(config.pitch_filter_coeff),
            rate_filter: LowPass::new(config.rate_filter_coeff),
            output_filter: LowPass::new(config.output_filter_coeff),

            target_speed: config.target_speed,
            base_target_angle: config.base_target_angle,
            drive_mode: config.drive_mode,

            desired_angle: config.base_target_angle,
            rate_target: 0.0,
            speed_invocations: 0,

            balance_command: 0,
            drive_command: 0,
        }
    }

    /// Retune gains, filters and targets. Loop state is kept.
    pub fn set_config(&mut self, config: CascadeConfig) {
        self.speed.set_gains(&config.speed);
        self.angle.set_gains(&config.angle);
        self.rate.set_gains(&config.rate);
        self.drive.set_gains(&config.drive);

        self.pitch_filter.set_coeff(config.pitch_filter_coeff);
        self.rate_filter.set_coeff(config.rate_filter_coeff);
        self.output_filter.set_coeff(config.output_filter_coeff);

        self.target_speed = config.target_speed;
        self.base_target_angle = config.base_target_angle;
        self.set_drive_mode(config.drive_mode);

        self.config = config;
    }

    #[inline]
    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    pub fn set_target_speed(&mut self, speed: f32) {
        self.target_speed = speed;
    }

    #[inline]
    pub fn target_speed(&self) -> f32 {
        self.target_speed
    }

    pub fn set_target_angle(&mut self, degrees: f32) {
        self.base_target_angle = degrees;
    }

    /// Switch the drive wheel between closed-loop and open-loop. Changing the variant clears the
    /// drive PID so no stale integral carries over.
    pub fn set_drive_mode(&mut self, mode: DriveMode) {
        if core::mem::discriminant(&mode) != core::mem::discriminant(&self.drive_mode) {
            self.drive.reset();
        }
        self.drive_mode = mode;
    }

    #[inline]
    pub fn drive_mode(&self) -> DriveMode {
        self.drive_mode
    }

    /// Speed loop step.
    ///
    /// `balance_delta` is the balance-wheel encoder count over the last speed period. Returns the
    /// new desired angle.
    pub fn run_speed_loop(&mut self, balance_delta: f32) -> f32 {
        self.speed_invocations += 1;
        if self.speed_invocations >= self.config.speed_integral_reset_interval {
            self.speed.clear_integral();
            self.speed_invocations = 0;
        }

        let offset = self.speed.update(self.target_speed, balance_delta);
        self.desired_angle = self.base_target_angle + offset;
        self.desired_angle
    }

    /// Angle loop step.
    ///
    /// `pitch` in degrees, `turn_compensation` in degrees added to the desired angle. Returns the
    /// target pitch rate in deg/s.
    pub fn run_angle_loop(&mut self, pitch: f32, turn_compensation: f32) -> f32 {
        let measured = self.pitch_filter.update(pitch);
        let target = self.desired_angle + turn_compensation;
        let error = target - measured;

        let deadzone = self.config.angle_deadzone;
        if error.abs() < deadzone {
            self.angle.decay_integral(self.config.angle_integral_decay);
        }
        let factor = gain_factor(error, deadzone, self.config.angle_min_gain);

        self.rate_target = self.angle.update_scaled(
            target,
            measured,
            GainScale::proportional_derivative(factor),
        );
        self.rate_target
    }

    /// Rate loop step. `pitch_rate` in deg/s. Returns the filtered balance-motor command.
    pub fn run_rate_loop(&mut self, pitch_rate: f32) -> i16 {
        let measured = self.rate_filter.update(pitch_rate);
        let error = self.rate_target - measured;
        let factor = gain_factor(error, self.config.rate_deadzone, self.config.rate_min_gain);

        let raw = self.rate.update_scaled(
            self.rate_target,
            measured,
            GainScale::proportional_integral(factor),
        );
        let filtered = self.output_filter.update(raw);

        self.balance_command = self.saturate(filtered);
        self.balance_command
    }

    /// Drive loop step. `drive_delta` is the drive encoder count over the last drive period.
    pub fn run_drive_loop(&mut self, drive_delta: f32) -> i16 {
        self.drive_command = match self.drive_mode {
            DriveMode::ClosedLoop { target_speed } => {
                let out = self.drive.update(target_speed, drive_delta);
                self.saturate(out)
            }
            DriveMode::OpenLoop { pwm } => {
                let max = self.config.max_pwm;
                pwm.clamp(-max, max)
            }
        };
        self.drive_command
    }

    /// Drop accumulated state so recovery starts without a kick.
    ///
    /// Clears the speed, angle and rate integrals and the rate-loop output filter.
    pub fn clear_integrators(&mut self) {
        self.speed.clear_integral();
        self.angle.clear_integral();
        self.rate.clear_integral();
        self.output_filter.reset();
        self.balance_command = 0;
    }

    /// Full reset of all loops and filters.
    pub fn reset(&mut self) {
        self.speed.reset();
        self.angle.reset();
        self.rate.reset();
        self.drive.reset();

        self.pitch_filter.reset();
        self.rate_filter.reset();
        self.output_filter.reset();

        self.desired_angle = self.base_target_angle;
        self.rate_target = 0.0;
        self.speed_invocations = 0;
        self.balance_command = 0;
        self.drive_command = 0;
    }

    #[inline]
    pub fn desired_angle(&self) -> f32 {
        self.desired_angle
    }

    #[inline]
    pub fn rate_target(&self) -> f32 {
        self.rate_target
    }

    #[inline]
    pub fn balance_command(&self) -> i16 {
        self.balance_command
    }

    #[inline]
    pub fn drive_command(&self) -> i16 {
        self.drive_command
    }

    pub fn status(&self) -> CascadeStatus {
        CascadeStatus {
            speed: self.speed.status(),
            angle: self.angle.status(),
            rate: self.rate.status(),
            drive: self.drive.status(),
            desired_angle: self.desired_angle,
            rate_target: self.rate_target,
            balance_command: self.balance_command,
            drive_command: self.drive_command,
        }
    }

    fn saturate(&self, value: f32) -> i16 {
        let max = self.config.max_pwm as f32;
        if !value.is_finite() {
            return 0;
        }
        value.clamp(-max, max) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PidGains;
    use approx::assert_abs_diff_eq;

    fn config() -> CascadeConfig {
        CascadeConfig {
            rate: PidGains::new(10.0, 0.0, 0.0, 100.0, 8000.0),
            angle: PidGains::new(2.0, 1.0, 0.0, 20.0, 300.0),
            speed: PidGains::new(0.5, 1.0, 0.0, 100.0, 10.0),
            drive: PidGains::new(100.0, 0.0, 0.0, 100.0, 10000.0),
            pitch_filter_coeff: 1.0,
            rate_filter_coeff: 1.0,
            output_filter_coeff: 1.0,
            angle_deadzone: 0.0,
            rate_deadzone: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn speed_output_offsets_base_angle() {
        let mut c = BalanceCascade::new(config());
        c.set_target_angle(2.0);
        c.set_target_speed(4.0);
        // error 4: P 2, I 4 -> 6
        assert_abs_diff_eq!(c.run_speed_loop(0.0), 8.0);
        assert_abs_diff_eq!(c.desired_angle(), 8.0);
    }

    #[test]
    fn speed_integral_is_cleared_periodically() {
        let mut c = BalanceCascade::new(CascadeConfig {
            speed: PidGains::new(0.0, 1.0, 0.0, 1000.0, 1000.0),
            speed_integral_reset_interval: 100,
            ..config()
        });
        c.set_target_speed(1.0);
        for _ in 0..99 {
            c.run_speed_loop(0.0);
        }
        assert_abs_diff_eq!(c.status().speed.integral, 99.0);
        // 100th invocation clears first, then accumulates one step
        c.run_speed_loop(0.0);
        assert_abs_diff_eq!(c.status().speed.integral, 1.0);
    }

    #[test]
    fn angle_target_includes_turn_compensation() {
        let mut c = BalanceCascade::new(CascadeConfig {
            angle: PidGains::new(2.0, 0.0, 0.0, 20.0, 300.0),
            ..config()
        });
        assert_abs_diff_eq!(c.run_angle_loop(0.0, 3.0), 6.0);
        assert_abs_diff_eq!(c.run_angle_loop(1.0, 3.0), 4.0);
    }

    #[test]
    fn angle_deadzone_softens_gain_and_bleeds_integral() {
        let mut c = BalanceCascade::new(CascadeConfig {
            angle: PidGains::new(2.0, 1.0, 0.0, 20.0, 300.0),
            angle_deadzone: 4.0,
            angle_min_gain: 0.5,
            angle_integral_decay: 0.5,
            ..config()
        });
        // error 10 is outside: full gain, integral 10
        assert_abs_diff_eq!(c.run_angle_loop(-10.0, 0.0), 20.0 + 10.0);
        // error 2 is inside: integral 10*0.5 + 2 = 7, factor 0.75 on P only
        assert_abs_diff_eq!(c.run_angle_loop(-2.0, 0.0), 2.0 * 0.75 * 2.0 + 7.0);
    }

    #[test]
    fn rate_output_is_low_passed_and_saturated() {
        let mut c = BalanceCascade::new(CascadeConfig {
            output_filter_coeff: 0.5,
            ..config()
        });
        c.run_angle_loop(-10.0, 0.0);
        let target = c.rate_target();
        let first = c.run_rate_loop(0.0);
        assert_eq!(first, (0.5 * 10.0 * target) as i16);

        let mut c = BalanceCascade::new(CascadeConfig {
            rate: PidGains::new(1e6, 0.0, 0.0, 0.0, 1e9),
            ..config()
        });
        c.run_angle_loop(-10.0, 0.0);
        assert_eq!(c.run_rate_loop(0.0), 10_000);
    }

    #[test]
    fn drive_mode_switches_at_runtime() {
        let mut c = BalanceCascade::new(CascadeConfig {
            drive_mode: DriveMode::ClosedLoop { target_speed: 10.0 },
            ..config()
        });
        assert_eq!(c.run_drive_loop(8.0), 200);

        c.set_drive_mode(DriveMode::OpenLoop { pwm: 3500 });
        assert_eq!(c.run_drive_loop(8.0), 3500);

        c.set_drive_mode(DriveMode::OpenLoop { pwm: 30_000 });
        assert_eq!(c.run_drive_loop(0.0), 10_000);
    }

    #[test]
    fn clear_integrators_drops_filter_state() {
        let mut c = BalanceCascade::new(CascadeConfig {
            output_filter_coeff: 0.1,
            rate: PidGains::new(10.0, 1.0, 0.0, 100.0, 8000.0),
            ..config()
        });
        for _ in 0..50 {
            c.run_angle_loop(-10.0, 0.0);
            c.run_rate_loop(0.0);
        }
        assert!(c.status().rate.integral > 0.0);

        c.clear_integrators();
        let s = c.status();
        assert_eq!(s.rate.integral, 0.0);
        assert_eq!(s.angle.integral, 0.0);
        assert_eq!(s.speed.integral, 0.0);
        assert_eq!(s.balance_command, 0);
    }
}
