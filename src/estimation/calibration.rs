// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Static gyro zero-rate calibration.
//!
//! The robot must be at rest. The calibrator averages raw gyro counts over a fixed number of
//! samples. Every poll of the source counts against a budget, so a sensor that stops producing
//! data ends the routine with [`CalibrationError::Timeout`] instead of hanging.

use crate::error::CalibrationError;
use crate::sensors::InertialSource;
use crate::{log_info, log_warn};

/// Bounded synchronous gyro calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GyroCalibrator {
    samples: u32,
    max_polls: u32,
}

impl Default for GyroCalibrator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SAMPLES, Self::DEFAULT_SAMPLES * 4)
    }
}

impl GyroCalibrator {
    pub const DEFAULT_SAMPLES: u32 = 2000;

    /// `samples` to average (at least one), giving up after `max_polls` reads.
    pub fn new(samples: u32, max_polls: u32) -> Self {
        Self {
            samples: samples.max(1),
            max_polls,
        }
    }

    /// Collect samples and return the mean raw gyro reading per axis.
    pub fn run<S: InertialSource>(
        &self,
        source: &mut S,
    ) -> Result<[f32; 3], CalibrationError<S::Error>> {
        let mut sum = [0i64; 3];
        let mut collected = 0u32;
        let mut polls = 0u32;

        while collected < self.samples {
            if polls >= self.max_polls {
                log_warn!(
                    "gyro calibration timed out: {}/{} samples",
                    collected,
                    self.samples
                );
                return Err(CalibrationError::Timeout { collected });
            }
            polls += 1;

            match source.read_raw() {
                Ok(sample) => {
                    for (acc, &g) in sum.iter_mut().zip(sample.gyro.iter()) {
                        *acc += g as i64;
                    }
                    collected += 1;
                }
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(e)) => return Err(CalibrationError::Sensor(e)),
            }
        }

        let n = collected as f32;
        let offset = [sum[0] as f32 / n, sum[1] as f32 / n, sum[2] as f32 / n];
        log_info!(
            "gyro offset: {} {} {} ({} polls)",
            offset[0],
            offset[1],
            offset[2],
            polls
        );
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::RawImuSample;

    /// Produces a sample on every `period`-th poll.
    struct Intermittent {
        gyro: [i16; 3],
        period: u32,
        polls: u32,
        fail_at: Option<u32>,
    }

    impl InertialSource for Intermittent {
        type Error = &'static str;

        fn read_raw(&mut self) -> nb::Result<RawImuSample, Self::Error> {
            self.polls += 1;
            if Some(self.polls) == self.fail_at {
                return Err(nb::Error::Other("bus fault"));
            }
            if self.polls % self.period != 0 {
                return Err(nb::Error::WouldBlock);
            }
            Ok(RawImuSample {
                gyro: self.gyro,
                accel: [0, 0, 4098],
            })
        }
    }

    #[test]
    fn averages_raw_counts() {
        let mut src = Intermittent {
            gyro: [2, -10, 2],
            period: 2,
            polls: 0,
            fail_at: None,
        };
        let offset = GyroCalibrator::new(100, 1000).run(&mut src).unwrap();
        assert_eq!(offset, [2.0, -10.0, 2.0]);
        assert_eq!(src.polls, 200);
    }

    #[test]
    fn times_out_when_data_stops() {
        let mut src = Intermittent {
            gyro: [0; 3],
            period: 10,
            polls: 0,
            fail_at: None,
        };
        let err = GyroCalibrator::new(100, 50).run(&mut src).unwrap_err();
        assert_eq!(err, CalibrationError::Timeout { collected: 5 });
    }

    #[test]
    fn sensor_error_aborts() {
        let mut src = Intermittent {
            gyro: [0; 3],
            period: 1,
            polls: 0,
            fail_at: Some(3),
        };
        let err = GyroCalibrator::new(10, 100).run(&mut src).unwrap_err();
        assert_eq!(err, CalibrationError::Sensor("bus fault"));
    }
}
