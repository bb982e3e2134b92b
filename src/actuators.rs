// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Actuator capabilities consumed by the controller.
//!
//! Board code implements these on top of the concrete drivers in [`crate::drivers`]; tests
//! implement them on plain recorders.

use crate::sensors::Wheel;

/// Full-scale motor command.
pub const MAX_PWM: i16 = 10_000;

/// Signed PWM outputs for the wheel motors.
pub trait MotorSink {
    /// `pwm` in `[-MAX_PWM, MAX_PWM]`; the sign selects the direction.
    fn set_motor_pwm(&mut self, wheel: Wheel, pwm: i16);
}

/// Steering servo.
pub trait ServoSink {
    /// Commanded angle in degrees, already clamped to the mechanical range.
    fn set_servo_angle(&mut self, degrees: f32);
}

/// Audible alarm.
pub trait AlarmSink {
    fn beep(&mut self, count: u8, on_ms: u16, off_ms: u16);
    fn silence(&mut self);
    fn is_active(&self) -> bool;
}
