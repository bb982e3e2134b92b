// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Cargobot Firmware
//!
//! Balance and steering control for a two-wheeled cargo robot: a reaction wheel keeps it upright,
//! a rear wheel drives it forward and a servo steers along a camera-detected lane. The library is
//! hardware-independent and runs its unit tests on the host; the `firmware` feature builds the
//! STM32F777 board binary on top of it.
//!
//! ## Crate Structure
//!
//! | Module | Purpose |
//! | ------ | -------- |
//! | [`math`] | Small fixed-size matrices, quaternions, Euler conversion |
//! | [`estimation`] | Quaternion EKF with gyro-bias states, gyro calibration |
//! | [`sensors`] | Sensor capabilities and the IMU unit conversion front end |
//! | [`actuators`] | Motor, servo and alarm capabilities |
//! | [`drivers`] | Device-level drivers (LSM6DSR, H-bridge, servo, buzzer) |
//! | [`control`] | PID, filters, loop schedule, balance cascade, steering |
//! | [`protection`] | Tilt and stall supervisor |
//! | [`controller`] | The per-tick orchestration of everything above |
//! | [`config`] | Tunable parameters with defaults and validation |
//! | [`shared`] | Interrupt-safe snapshot cell for status publishing |
//!
//! ## Getting Started
//!
//! Run the host tests:
//!
//! ```bash
//! cargo test
//! ```
//!
//! Flash the board:
//!
//! ```bash
//! cargo run --release --features firmware --target thumbv7em-none-eabihf
//! ```
//!
//! ## License
//!
//! Licensed under the **MIT License**.
//! See the `LICENSE` file in the repository root for full terms.
//!
//! © 2025–2026 Christopher Liu

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod logging;

pub mod actuators;
pub mod config;
pub mod control;
pub mod controller;
pub mod drivers;
pub mod error;
pub mod estimation;
pub mod math;
pub mod protection;
pub mod sensors;
pub mod shared;

pub use config::ControlConfig;
pub use controller::{Controller, ControllerStatus, Platform};
pub use error::{CalibrationError, ConfigError};
