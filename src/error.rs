// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Error types.
//!
//! Numeric faults inside the estimator and the control loops never surface here; they are
//! recovered in place. These errors cover the few operations a caller can get wrong.

use core::fmt;

/// A configuration value that the controller refuses to run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Sample period must be finite and positive.
    InvalidSamplePeriod,
    /// Fading factor must lie in (0, 1].
    InvalidFadingFactor,
    /// A noise term or covariance bound is negative, zero or non-finite.
    InvalidNoise(&'static str),
    /// A filter coefficient lies outside [0, 1].
    InvalidFilterCoefficient(&'static str),
    /// A loop period of zero ticks.
    ZeroPeriod(&'static str),
    /// A limit (output, integral, threshold) is negative or non-finite.
    InvalidLimit(&'static str),
    /// Servo range does not contain its center.
    InvalidServoRange,
    /// Sample row range is empty.
    InvalidRowRange,
    /// IMU scale factor is zero or non-finite.
    InvalidScale,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidSamplePeriod => write!(f, "sample period must be positive"),
            ConfigError::InvalidFadingFactor => write!(f, "fading factor must be in (0, 1]"),
            ConfigError::InvalidNoise(name) => write!(f, "invalid noise parameter: {}", name),
            ConfigError::InvalidFilterCoefficient(name) => {
                write!(f, "filter coefficient out of [0, 1]: {}", name)
            }
            ConfigError::ZeroPeriod(name) => write!(f, "loop period must be non-zero: {}", name),
            ConfigError::InvalidLimit(name) => write!(f, "invalid limit: {}", name),
            ConfigError::InvalidServoRange => write!(f, "servo range must contain its center"),
            ConfigError::InvalidRowRange => write!(f, "sample row range is empty"),
            ConfigError::InvalidScale => write!(f, "IMU scale factor must be non-zero"),
        }
    }
}

/// Failure of the synchronous gyro calibration routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError<E> {
    /// Poll budget ran out before enough samples arrived.
    Timeout {
        /// Samples collected before giving up.
        collected: u32,
    },
    /// The inertial source reported an error.
    Sensor(E),
    /// Calibration requested while the controller is driving the actuators.
    Armed,
}

impl<E: fmt::Debug> fmt::Display for CalibrationError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::Timeout { collected } => {
                write!(f, "calibration timed out after {} samples", collected)
            }
            CalibrationError::Sensor(e) => write!(f, "sensor error during calibration: {:?}", e),
            CalibrationError::Armed => write!(f, "cannot calibrate while enabled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_field() {
        let e = ConfigError::ZeroPeriod("angle_period");
        assert_eq!(format!("{}", e), "loop period must be non-zero: angle_period");
    }

    #[test]
    fn calibration_error_display() {
        let e: CalibrationError<()> = CalibrationError::Timeout { collected: 12 };
        assert_eq!(format!("{}", e), "calibration timed out after 12 samples");
        let e: CalibrationError<u8> = CalibrationError::Sensor(3);
        assert_eq!(format!("{}", e), "sensor error during calibration: 3");
    }
}
