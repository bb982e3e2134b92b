// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Debug USART.
//!
//! Carries boot messages and a periodic status line. Implements `core::fmt::Write`, so `write!`
//! works too; include `\r` in the format string for correct terminal line endings.
//!
//! To access the terminal on the host machine, connect to the debug USB port and use
//! ```
//! $ screen /dev/tty.usbmodem* <baud_rate>
//! ```
//!
//! To close the debug terminal, press `Ctrl+A` then `Ctrl+\` then `y`.

use core::fmt::{self, Write};
use nb::block;

use stm32f7xx_hal::{
    prelude::*,
    serial::{Instance, Pins, Serial, Tx},
};

use cargobot::ControllerStatus;

pub struct Usart<U: Instance> {
    tx: Tx<U>,
}

impl<U: Instance> Usart<U> {
    pub fn new<PINS: Pins<U>>(serial: Serial<U, PINS>) -> Self {
        let (tx, _rx) = serial.split();
        Self { tx }
    }

    #[inline]
    pub fn write_byte(&mut self, b: u8) {
        let _ = block!(self.tx.write(b));
    }

    pub fn write_str(&mut self, s: &str) {
        for &b in s.as_bytes() {
            self.write_byte(b);
        }
    }

    /// Write string and CRLF terminator.
    #[inline]
    pub fn println(&mut self, s: &str) {
        self.write_str(s);
        self.write_str("\r\n");
    }

    /// One line of attitude, loop outputs and protection state.
    pub fn report(&mut self, s: &ControllerStatus) {
        let state = if s.protected {
            "TRIP"
        } else if s.enabled {
            "RUN"
        } else {
            "IDLE"
        };
        let _ = write!(
            self,
            "{:>8} {:4} p={:7.2} r={:7.2} y={:7.2} rate={:8.2} bal={:6} drv={:6} srv={:6.1} enc={:5}/{:5}\r\n",
            s.tick,
            state,
            s.pitch,
            s.roll,
            s.yaw_total,
            s.pitch_rate,
            s.motor_pwm[0],
            s.motor_pwm[1],
            s.servo_angle,
            s.encoder[0],
            s.encoder[1],
        );
    }
}

impl<U: Instance> fmt::Write for Usart<U> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Usart::write_str(self, s);
        Ok(())
    }
}
