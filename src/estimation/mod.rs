// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Attitude Estimation
//!
//! - [`ekf`] - quaternion EKF with gyro-bias estimation and innovation gating
//! - [`calibration`] - bounded static gyro calibration

pub mod calibration;
pub mod ekf;

pub use calibration::GyroCalibrator;
pub use ekf::{OrientationEstimate, QuaternionEkf, UpdateKind};
