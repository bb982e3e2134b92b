// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Hobby servo on a 50 Hz PWM channel.
//!
//! Pulse width maps linearly onto the angle: 0.5 ms at 0°, 2.5 ms at 180°.

use embedded_hal::PwmPin;

use crate::actuators::ServoSink;

/// PWM period in milliseconds at 50 Hz.
const PERIOD_MS: f32 = 20.0;

pub struct Servo<P> {
    pwm: P,
    min: f32,
    max: f32,
    angle: f32,
}

impl<P> Servo<P>
where
    P: PwmPin<Duty = u16>,
{
    /// `pwm` must run at 50 Hz. Commands are clamped to `[min, max]` degrees.
    pub fn new(mut pwm: P, min: f32, max: f32) -> Self {
        pwm.enable();
        Self {
            pwm,
            min,
            max,
            angle: min,
        }
    }

    pub fn set_angle(&mut self, degrees: f32) {
        let angle = if degrees.is_finite() {
            degrees.clamp(self.min, self.max)
        } else {
            self.angle
        };
        self.angle = angle;

        let pulse_ms = 0.5 + angle / 90.0;
        let duty = self.pwm.get_max_duty() as f32 * pulse_ms / PERIOD_MS;
        self.pwm.set_duty(duty as u16);
    }

    #[inline]
    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn free(self) -> P {
        self.pwm
    }
}

impl<P> ServoSink for Servo<P>
where
    P: PwmPin<Duty = u16>,
{
    fn set_servo_angle(&mut self, degrees: f32) {
        self.set_angle(degrees);
    }
}
