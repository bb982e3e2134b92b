// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Brushed DC motor on an IN/IN H-bridge (DRV8873, DRV8871 and similar).
//!
//! Each bridge input takes its own PWM channel:
//!
//! | Command | IN1 | IN2 |
//! | ------- | --- | --- |
//! | forward | PWM | 0   |
//! | reverse | 0   | PWM |
//! | zero    | 0   | 0   | (coast)
//! | brake   | max | max |

use embedded_hal::PwmPin;

use crate::actuators::{MotorSink, MAX_PWM};
use crate::sensors::Wheel;

pub struct HBridge<IN1, IN2> {
    in1: IN1,
    in2: IN2,
    inverted: bool,
    command: i16,
}

impl<IN1, IN2> HBridge<IN1, IN2>
where
    IN1: PwmPin<Duty = u16>,
    IN2: PwmPin<Duty = u16>,
{
    /// Both channels must share the same timer resolution. Starts coasting.
    pub fn new(mut in1: IN1, mut in2: IN2) -> Self {
        in1.set_duty(0);
        in2.set_duty(0);
        in1.enable();
        in2.enable();
        Self {
            in1,
            in2,
            inverted: false,
            command: 0,
        }
    }

    /// Swap the meaning of forward and reverse to match the motor wiring.
    pub fn inverted(mut self, inverted: bool) -> Self {
        self.inverted = inverted;
        self
    }

    /// Signed command in `[-MAX_PWM, MAX_PWM]`; out-of-range values saturate.
    pub fn set_pwm(&mut self, pwm: i16) {
        let pwm = pwm.clamp(-MAX_PWM, MAX_PWM);
        self.command = pwm;

        let forward = (pwm > 0) != self.inverted;
        let max = self.in1.get_max_duty() as u32;
        let duty = (pwm.unsigned_abs() as u32 * max / MAX_PWM as u32) as u16;

        if pwm == 0 {
            self.coast();
        } else if forward {
            self.in2.set_duty(0);
            self.in1.set_duty(duty);
        } else {
            self.in1.set_duty(0);
            self.in2.set_duty(duty);
        }
    }

    /// Let the motor spin freely.
    #[inline]
    pub fn coast(&mut self) {
        self.in1.set_duty(0);
        self.in2.set_duty(0);
    }

    /// Short the motor terminals.
    #[inline]
    pub fn brake(&mut self) {
        let max = self.in1.get_max_duty();
        self.in1.set_duty(max);
        self.in2.set_duty(max);
        self.command = 0;
    }

    /// Last command passed to [`set_pwm`](Self::set_pwm), after saturation.
    #[inline]
    pub fn command(&self) -> i16 {
        self.command
    }

    pub fn free(self) -> (IN1, IN2) {
        (self.in1, self.in2)
    }
}

/// Two bridges driving the balance and drive wheels.
pub struct MotorPair<B, D> {
    pub balance: B,
    pub drive: D,
}

impl<B1, B2, D1, D2> MotorSink for MotorPair<HBridge<B1, B2>, HBridge<D1, D2>>
where
    B1: PwmPin<Duty = u16>,
    B2: PwmPin<Duty = u16>,
    D1: PwmPin<Duty = u16>,
    D2: PwmPin<Duty = u16>,
{
    fn set_motor_pwm(&mut self, wheel: Wheel, pwm: i16) {
        match wheel {
            Wheel::Balance => self.balance.set_pwm(pwm),
            Wheel::Drive => self.drive.set_pwm(pwm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Channel {
        duty: u16,
        enabled: bool,
    }

    impl PwmPin for Channel {
        type Duty = u16;

        fn disable(&mut self) {
            self.enabled = false;
        }

        fn enable(&mut self) {
            self.enabled = true;
        }

        fn get_duty(&self) -> u16 {
            self.duty
        }

        fn get_max_duty(&self) -> u16 {
            1000
        }

        fn set_duty(&mut self, duty: u16) {
            self.duty = duty;
        }
    }

    fn bridge() -> HBridge<Channel, Channel> {
        HBridge::new(Channel::default(), Channel::default())
    }

    #[test]
    fn sign_selects_the_driven_input() {
        let mut m = bridge();
        m.set_pwm(5000);
        assert_eq!((m.in1.duty, m.in2.duty), (500, 0));
        m.set_pwm(-2500);
        assert_eq!((m.in1.duty, m.in2.duty), (0, 250));
        m.set_pwm(0);
        assert_eq!((m.in1.duty, m.in2.duty), (0, 0));
        assert!(m.in1.enabled && m.in2.enabled);
    }

    #[test]
    fn saturates_and_handles_extremes() {
        let mut m = bridge();
        m.set_pwm(i16::MAX);
        assert_eq!(m.in1.duty, 1000);
        assert_eq!(m.command(), MAX_PWM);
        m.set_pwm(i16::MIN);
        assert_eq!(m.in2.duty, 1000);
        assert_eq!(m.command(), -MAX_PWM);
    }

    #[test]
    fn inversion_and_brake() {
        let mut m = bridge().inverted(true);
        m.set_pwm(10_000);
        assert_eq!((m.in1.duty, m.in2.duty), (0, 1000));
        m.brake();
        assert_eq!((m.in1.duty, m.in2.duty), (1000, 1000));
        assert_eq!(m.command(), 0);
    }

    #[test]
    fn motor_pair_routes_by_wheel() {
        let mut pair = MotorPair {
            balance: bridge(),
            drive: bridge(),
        };
        pair.set_motor_pwm(Wheel::Drive, 1000);
        assert_eq!(pair.drive.in1.duty, 100);
        assert_eq!(pair.balance.in1.duty, 0);
    }
}
