// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Sensor Capabilities
//!
//! The control core never touches sensor registers. It consumes three capabilities:
//!
//! - [`InertialSource`] - raw gyro + accelerometer samples, `WouldBlock` until new data is ready
//! - [`EncoderSource`] - signed wheel counts since the previous read
//! - [`LaneErrorSource`] - steering error derived from the camera image
//!
//! [`imu::ImuFrontEnd`] turns raw inertial counts into physical units.

pub mod imu;

pub use imu::{ImuFrontEnd, InertialSample, RawImuSample};

use crate::config::RowRange;

/// The two driven wheels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Wheel {
    /// Reaction (momentum) wheel that keeps the robot upright.
    Balance,
    /// Rear wheel that moves the robot forward.
    Drive,
}

impl Wheel {
    pub const ALL: [Wheel; 2] = [Wheel::Balance, Wheel::Drive];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Wheel::Balance => 0,
            Wheel::Drive => 1,
        }
    }
}

/// Source of raw inertial samples.
pub trait InertialSource {
    type Error: core::fmt::Debug;

    /// Latest sample, or `WouldBlock` when no new data is available.
    fn read_raw(&mut self) -> nb::Result<RawImuSample, Self::Error>;
}

/// Quadrature wheel encoders.
pub trait EncoderSource {
    /// Counts accumulated since the previous call for this wheel; reading clears the count.
    fn read_delta(&mut self, wheel: Wheel) -> i16;
}

/// Camera-derived lane error.
pub trait LaneErrorSource {
    /// Signed steering error averaged over `rows`; positive means the lane lies to the right.
    fn image_error(&mut self, rows: RowRange) -> f32;
}
