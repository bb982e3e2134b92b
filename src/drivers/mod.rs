// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Device-Specific Drivers
//!
//! Drivers for the parts on the robot, written against `embedded-hal` traits so they build on any
//! HAL and can be exercised on the host with fake pins and buses.
//!
//! ## Existing drivers
//!
//! - [`lsm6dsr`] – ST LSM6DSR 6-axis IMU over SPI, implements [`InertialSource`](crate::sensors::InertialSource)
//! - [`hbridge`] – Brushed DC motor on an IN/IN H-bridge
//! - [`servo`] – 50 Hz hobby servo for steering
//! - [`buzzer`] – Active buzzer with timed beep patterns

pub mod buzzer;
pub mod hbridge;
pub mod lsm6dsr;
pub mod servo;

pub use buzzer::Buzzer;
pub use hbridge::{HBridge, MotorPair};
pub use lsm6dsr::Lsm6dsr;
pub use servo::Servo;
