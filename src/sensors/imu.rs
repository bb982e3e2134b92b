// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Raw-to-physical conversion of inertial samples.

use micromath::F32Ext;

use crate::config::ImuConfig;

const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;

/// Sensor counts straight from the output registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawImuSample {
    pub gyro: [i16; 3],
    pub accel: [i16; 3],
}

/// Calibrated sample: gyro in rad/s, accelerometer in g.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InertialSample {
    pub gyro: [f32; 3],
    pub accel: [f32; 3],
}

/// Applies the static offset, dead-bands and scale factors.
#[derive(Debug, Clone, Copy)]
pub struct ImuFrontEnd {
    config: ImuConfig,
}

impl ImuFrontEnd {
    pub fn new(config: ImuConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &ImuConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ImuConfig) {
        self.config = config;
    }

    /// Zero-rate reading in raw counts.
    #[inline]
    pub fn gyro_offset(&self) -> [f32; 3] {
        self.config.gyro_offset
    }

    pub fn set_gyro_offset(&mut self, offset: [f32; 3]) {
        self.config.gyro_offset = offset;
    }

    /// Offset-corrected raw gyro counts with the raw dead-band applied.
    pub fn corrected_gyro_counts(&self, raw: [i16; 3]) -> [f32; 3] {
        let band = self.config.raw_gyro_deadband as f32;
        let mut out = [0.0; 3];
        for i in 0..3 {
            let v = raw[i] as f32 - self.config.gyro_offset[i];
            out[i] = if v.abs() < band { 0.0 } else { v };
        }
        out
    }

    /// Gyro counts to deg/s.
    #[inline]
    pub fn gyro_transition(&self, counts: f32) -> f32 {
        counts / self.config.gyro_lsb_per_dps
    }

    /// Accelerometer counts to g.
    #[inline]
    pub fn accel_transition(&self, counts: f32) -> f32 {
        counts / self.config.accel_lsb_per_g
    }

    pub fn convert(&self, raw: &RawImuSample) -> InertialSample {
        let counts = self.corrected_gyro_counts(raw.gyro);
        let zone = self.config.gyro_deadzone;

        let mut sample = InertialSample::default();
        for i in 0..3 {
            let rate = self.gyro_transition(counts[i]) * DEG_TO_RAD;
            sample.gyro[i] = if rate.abs() < zone { 0.0 } else { rate };
            sample.accel[i] = self.accel_transition(raw.accel[i] as f32);
        }
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn front_end() -> ImuFrontEnd {
        ImuFrontEnd::new(ImuConfig {
            gyro_offset: [0.0; 3],
            ..Default::default()
        })
    }

    #[test]
    fn scales_to_physical_units() {
        let fe = front_end();
        let s = fe.convert(&RawImuSample {
            gyro: [143, -1430, 0],
            accel: [0, 2049, 4098],
        });
        assert_abs_diff_eq!(s.gyro[0], 10.0 * DEG_TO_RAD, epsilon = 1e-5);
        assert_abs_diff_eq!(s.gyro[1], -100.0 * DEG_TO_RAD, epsilon = 1e-4);
        assert_abs_diff_eq!(s.accel[1], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(s.accel[2], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn offset_is_subtracted_before_deadband() {
        let fe = ImuFrontEnd::new(ImuConfig {
            gyro_offset: [2.0, -10.0, 2.0],
            ..Default::default()
        });
        // Exactly the zero-rate reading, and a residual inside the ±5 count band.
        assert_eq!(fe.corrected_gyro_counts([2, -10, 6]), [0.0, 0.0, 0.0]);
        assert_eq!(fe.corrected_gyro_counts([12, -10, 2]), [10.0, 0.0, 0.0]);
    }

    #[test]
    fn default_offset_cancels_shipped_zero_rate_reading() {
        let fe = ImuFrontEnd::new(ImuConfig::default());
        let s = fe.convert(&RawImuSample {
            gyro: [-2, -10, 2],
            accel: [0, 0, 4098],
        });
        assert_eq!(s.gyro, [0.0; 3]);

        // A real rotation on top of the zero-rate reading still comes through.
        let s = fe.convert(&RawImuSample {
            gyro: [141, -10, 2],
            accel: [0, 0, 4098],
        });
        assert_abs_diff_eq!(s.gyro[0], 10.0 * DEG_TO_RAD, epsilon = 1e-5);
        assert_eq!(s.gyro[1], 0.0);
    }

    #[test]
    fn slow_rates_fall_in_physical_deadzone() {
        let fe = front_end();
        // 6 counts = 0.42 deg/s = 0.0073 rad/s, under the 0.008 rad/s zone.
        let s = fe.convert(&RawImuSample {
            gyro: [6, 0, 0],
            accel: [0, 0, 4098],
        });
        assert_eq!(s.gyro[0], 0.0);
    }
}
