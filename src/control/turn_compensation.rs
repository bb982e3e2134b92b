// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Cornering feed-forward on the balance target angle.
//!
//! A sustained turn leans the robot; the compensator shifts the angle loop's target so the balance
//! wheel does not fight that lean. Sign convention: servo deflected above center yields a positive
//! compensation in the product model regardless of travel direction.

use micromath::F32Ext;

use crate::config::TurnCompensationConfig;

/// Compensation formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TurnModel {
    /// `deviation * |speed| * gain / 10`, off while the lane error is small.
    SpeedDeflection,
    /// `k_servo * deviation + k_speed * speed² * sign(deviation)`.
    StaticDynamic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnCompensator {
    config: TurnCompensationConfig,
    last: f32,
}

impl TurnCompensator {
    pub const fn new(config: TurnCompensationConfig) -> Self {
        Self { config, last: 0.0 }
    }

    pub fn set_config(&mut self, config: TurnCompensationConfig) {
        self.config = config;
    }

    /// Compensation in degrees for the current steering state.
    ///
    /// `servo_angle` and `servo_center` in degrees, `speed` in encoder counts per speed period,
    /// `image_error` as reported by the lane source.
    pub fn update(
        &mut self,
        servo_angle: f32,
        servo_center: f32,
        speed: f32,
        image_error: f32,
    ) -> f32 {
        self.last = self.compute(servo_angle - servo_center, speed, image_error);
        self.last
    }

    /// Latest compensation, for telemetry.
    #[inline]
    pub fn last(&self) -> f32 {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = 0.0;
    }

    fn compute(&self, deviation: f32, speed: f32, image_error: f32) -> f32 {
        let cfg = &self.config;
        if !cfg.enabled {
            return 0.0;
        }

        let raw = match cfg.model {
            TurnModel::SpeedDeflection => {
                if image_error.abs() < cfg.image_threshold {
                    return 0.0;
                }
                deviation * speed.abs() * cfg.gain / 10.0
            }
            TurnModel::StaticDynamic => {
                let sign = if deviation > 0.0 {
                    1.0
                } else if deviation < 0.0 {
                    -1.0
                } else {
                    0.0
                };
                cfg.k_servo * deviation + cfg.k_speed * speed * speed * sign
            }
        };

        if !raw.is_finite() || raw.abs() < cfg.deadzone {
            return 0.0;
        }
        raw.clamp(-cfg.max, cfg.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn speed_deflection() -> TurnCompensator {
        TurnCompensator::new(TurnCompensationConfig {
            gain: 1.0,
            deadzone: 0.5,
            max: 8.0,
            image_threshold: 5.0,
            ..Default::default()
        })
    }

    #[test]
    fn product_model_follows_deflection_and_speed() {
        let mut t = speed_deflection();
        // 10° deflection, speed 4 -> 4°
        assert_abs_diff_eq!(t.update(100.0, 90.0, 4.0, 20.0), 4.0);
        assert_abs_diff_eq!(t.update(80.0, 90.0, 4.0, 20.0), -4.0);
        assert_abs_diff_eq!(t.last(), -4.0);
    }

    #[test]
    fn product_model_ignores_travel_direction() {
        let mut t = speed_deflection();
        let forward = t.update(100.0, 90.0, 4.0, 20.0);
        let reverse = t.update(100.0, 90.0, -4.0, 20.0);
        assert_abs_diff_eq!(forward, 4.0);
        assert_abs_diff_eq!(reverse, 4.0);
        assert_abs_diff_eq!(t.update(80.0, 90.0, -4.0, 20.0), -4.0);
    }

    #[test]
    fn product_model_is_gated_on_small_image_error() {
        let mut t = speed_deflection();
        assert_eq!(t.update(100.0, 90.0, 4.0, 4.9), 0.0);
        assert_eq!(t.update(100.0, 90.0, 4.0, -4.9), 0.0);
        assert!(t.update(100.0, 90.0, 4.0, -5.0) > 0.0);
    }

    #[test]
    fn deadzone_and_saturation() {
        let mut t = speed_deflection();
        // 1° * 4 / 10 = 0.4 < 0.5
        assert_eq!(t.update(91.0, 90.0, 4.0, 20.0), 0.0);
        assert_eq!(t.update(150.0, 90.0, 100.0, 20.0), 8.0);
        assert_eq!(t.update(30.0, 90.0, 100.0, 20.0), -8.0);
    }

    #[test]
    fn split_model_keeps_lean_sign_when_reversing() {
        let mut t = TurnCompensator::new(TurnCompensationConfig {
            model: TurnModel::StaticDynamic,
            k_servo: 0.1,
            k_speed: 0.01,
            deadzone: 0.0,
            max: 8.0,
            ..Default::default()
        });
        // 0.1*20 + 0.01*100 = 3, no image gate
        assert_abs_diff_eq!(t.update(110.0, 90.0, 10.0, 0.0), 3.0, epsilon = 1e-5);
        assert_abs_diff_eq!(t.update(110.0, 90.0, -10.0, 0.0), 3.0, epsilon = 1e-5);
        assert_abs_diff_eq!(t.update(70.0, 90.0, 10.0, 0.0), -3.0, epsilon = 1e-5);
        assert_eq!(t.update(90.0, 90.0, 10.0, 0.0), 0.0);
    }

    #[test]
    fn split_model_with_shipped_gains() {
        let mut t = TurnCompensator::new(TurnCompensationConfig {
            model: TurnModel::StaticDynamic,
            ..Default::default()
        });
        // 0.05*20 + 0.001*400 = 1.4
        assert_abs_diff_eq!(t.update(110.0, 90.0, 20.0, 0.0), 1.4, epsilon = 1e-5);
        // 0.05*10 = 0.5, inside the 0.7 deadzone
        assert_eq!(t.update(100.0, 90.0, 0.0, 0.0), 0.0);
        // 0.05*40 + 0.001*90000 saturates at 8
        assert_eq!(t.update(50.0, 90.0, 300.0, 0.0), -8.0);
    }

    #[test]
    fn disabled_yields_zero() {
        let mut t = TurnCompensator::new(TurnCompensationConfig {
            enabled: false,
            ..Default::default()
        });
        assert_eq!(t.update(150.0, 90.0, 50.0, 50.0), 0.0);
    }
}
