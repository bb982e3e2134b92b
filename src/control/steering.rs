// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Lane-following steering loop.
//!
//! `deflection = kp * image_error + kd * yaw_rate`, clamped to `±output_limit` and added to the servo
//! center. Runs on its own cadence, independent of the balance cascade.

use crate::config::SteeringConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Steering {
    config: SteeringConfig,
    image_error: f32,
    deflection: f32,
    servo_angle: f32,
}

impl Steering {
    pub const fn new(config: SteeringConfig) -> Self {
        Self {
            config,
            image_error: 0.0,
            deflection: 0.0,
            servo_angle: config.servo_center,
        }
    }

    pub fn set_config(&mut self, config: SteeringConfig) {
        self.config = config;
    }

    #[inline]
    pub fn config(&self) -> &SteeringConfig {
        &self.config
    }

    /// Compute the servo angle (degrees) for one steering step.
    ///
    /// When steering is disabled the servo is centered and the cached image error is zeroed so
    /// downstream consumers see "going straight".
    pub fn update(&mut self, image_error: f32, yaw_rate: f32) -> f32 {
        let cfg = &self.config;
        if !cfg.enabled {
            self.image_error = 0.0;
            self.deflection = 0.0;
            self.servo_angle = cfg.servo_center;
            return self.servo_angle;
        }

        let error = finite_or_zero(image_error);
        let rate = finite_or_zero(yaw_rate);

        let limit = cfg.output_limit;
        self.image_error = error;
        self.deflection = (cfg.kp * error + cfg.kd * rate).clamp(-limit, limit);
        self.servo_angle = (cfg.servo_center + self.deflection).clamp(cfg.servo_min, cfg.servo_max);
        self.servo_angle
    }

    /// Center the servo without touching the configuration.
    pub fn center(&mut self) -> f32 {
        self.deflection = 0.0;
        self.servo_angle = self.config.servo_center;
        self.servo_angle
    }

    #[inline]
    pub fn servo_angle(&self) -> f32 {
        self.servo_angle
    }

    #[inline]
    pub fn deflection(&self) -> f32 {
        self.deflection
    }

    #[inline]
    pub fn last_image_error(&self) -> f32 {
        self.image_error
    }
}

fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}
