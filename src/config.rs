// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Configuration
//!
//! Every value an operator tunes lives here, grouped per subsystem. Each group is a plain `Copy`
//! struct whose `Default` is the shipped tuning, so a partial override reads naturally:
//!
//! ```
//! use cargobot::config::{ControlConfig, ProtectionConfig};
//!
//! let config = ControlConfig {
//!     protection: ProtectionConfig {
//!         angle_threshold_deg: 30.0,
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! Persisting these values is left to the caller; nothing here knows about storage formats.
//!
//! ## Units
//!
//! - angles in degrees, angular rates in deg/s (loop side) or rad/s (estimator side)
//! - motor commands in signed PWM counts, `±max_pwm`
//! - periods and durations in control ticks (1 ms nominal) unless the name says `_ms`

use crate::control::turn_compensation::TurnModel;
use crate::error::ConfigError;

// ================================================================================================
// Estimator
// ================================================================================================

/// Quaternion EKF tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EkfConfig {
    /// Quaternion process noise density, scaled by `dt` each step.
    pub process_noise_attitude: f32,
    /// Gyro-bias random-walk density, scaled by `dt` each step.
    pub process_noise_bias: f32,
    /// Accelerometer measurement variance (g²) before adaptive scaling.
    pub measurement_noise_accel: f32,
    /// Covariance fading factor λ in (0, 1]; the prior is divided by λ every step.
    pub fading_factor: f32,
    /// Sample period in seconds.
    pub dt: f32,
    /// Accelerometer low-pass time constant in seconds (0 disables the filter).
    pub accel_lpf_time_constant: f32,
    /// Innovation gate on the normalized squared innovation (3 DOF).
    pub chi_square_threshold: f32,
    /// Consecutive gated samples after which the filter re-anchors to the accelerometer.
    pub max_consecutive_rejections: u32,
    /// Measurement-noise inflation per squared deviation of |a| from 1 g.
    pub accel_trust_gain: f32,
    /// Measurement-noise inflation per squared angular rate (rad/s)².
    pub gyro_trust_gain: f32,
    /// Initial quaternion variance.
    pub initial_attitude_variance: f32,
    /// Initial gyro-bias variance (rad/s)².
    pub initial_bias_variance: f32,
    /// Upper bound on the attitude block of the covariance diagonal. The bias block is capped at
    /// `initial_bias_variance`.
    pub max_covariance: f32,
    /// Corrections required before the estimate reports `converged`.
    pub convergence_ticks: u32,
    /// Per-axis bound on the bias estimate in rad/s.
    pub max_bias: f32,
}

impl Default for EkfConfig {
    fn default() -> Self {
        Self {
            process_noise_attitude: 1e-6,
            process_noise_bias: 1e-5,
            measurement_noise_accel: 1e-2,
            fading_factor: 0.9996,
            dt: 0.001,
            accel_lpf_time_constant: 0.0,
            chi_square_threshold: 11.34,
            max_consecutive_rejections: 200,
            accel_trust_gain: 400.0,
            gyro_trust_gain: 1.0,
            initial_attitude_variance: 0.1,
            initial_bias_variance: 5e-3,
            max_covariance: 1.0,
            convergence_ticks: 1000,
            max_bias: 0.5,
        }
    }
}

impl EkfConfig {
    /// The six primary knobs; everything else keeps its default.
    pub fn new(
        process_noise_attitude: f32,
        process_noise_bias: f32,
        measurement_noise_accel: f32,
        fading_factor: f32,
        dt: f32,
        accel_lpf_time_constant: f32,
    ) -> Self {
        Self {
            process_noise_attitude,
            process_noise_bias,
            measurement_noise_accel,
            fading_factor,
            dt,
            accel_lpf_time_constant,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(ConfigError::InvalidSamplePeriod);
        }
        if !(self.fading_factor > 0.0 && self.fading_factor <= 1.0) {
            return Err(ConfigError::InvalidFadingFactor);
        }
        non_negative(self.process_noise_attitude, "process_noise_attitude")?;
        non_negative(self.process_noise_bias, "process_noise_bias")?;
        positive(self.measurement_noise_accel, "measurement_noise_accel")?;
        positive(self.initial_attitude_variance, "initial_attitude_variance")?;
        positive(self.initial_bias_variance, "initial_bias_variance")?;
        positive(self.max_covariance, "max_covariance")?;
        if !(self.accel_lpf_time_constant.is_finite() && self.accel_lpf_time_constant >= 0.0) {
            return Err(ConfigError::InvalidFilterCoefficient("accel_lpf_time_constant"));
        }
        limit(self.chi_square_threshold, "chi_square_threshold")?;
        limit(self.accel_trust_gain, "accel_trust_gain")?;
        limit(self.gyro_trust_gain, "gyro_trust_gain")?;
        limit(self.max_bias, "max_bias")?;
        Ok(())
    }
}

// ================================================================================================
// Inertial front end
// ================================================================================================

/// Raw-to-physical conversion of the inertial sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuConfig {
    /// Gyro sensitivity, LSB per deg/s (±2000 dps range).
    pub gyro_lsb_per_dps: f32,
    /// Accelerometer sensitivity, LSB per g (±8 g range).
    pub accel_lsb_per_g: f32,
    /// Offset-corrected raw gyro counts inside this band read as zero.
    pub raw_gyro_deadband: i16,
    /// Physical gyro rates (rad/s) inside this band read as zero.
    pub gyro_deadzone: f32,
    /// Zero-rate gyro reading in raw counts, subtracted from every sample.
    pub gyro_offset: [f32; 3],
    /// Mechanical zero of the balance axis, added to the estimated pitch (degrees).
    pub pitch_offset_deg: f32,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            gyro_lsb_per_dps: 14.3,
            accel_lsb_per_g: 4098.0,
            raw_gyro_deadband: 5,
            gyro_deadzone: 0.008,
            gyro_offset: [-2.0, -10.0, 2.0],
            pitch_offset_deg: 0.0,
        }
    }
}

impl ImuConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for s in [self.gyro_lsb_per_dps, self.accel_lsb_per_g] {
            if !s.is_finite() || s == 0.0 {
                return Err(ConfigError::InvalidScale);
            }
        }
        if self.raw_gyro_deadband < 0 {
            return Err(ConfigError::InvalidLimit("raw_gyro_deadband"));
        }
        limit(self.gyro_deadzone, "gyro_deadzone")?;
        Ok(())
    }
}

// ================================================================================================
// Balance cascade
// ================================================================================================

/// Gains and clamps of one PID loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub max_integral: f32,
    pub max_output: f32,
}

impl PidGains {
    pub const fn new(kp: f32, ki: f32, kd: f32, max_integral: f32, max_output: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            max_integral,
            max_output,
        }
    }

    pub fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if !(self.kp.is_finite() && self.ki.is_finite() && self.kd.is_finite()) {
            return Err(ConfigError::InvalidLimit(name));
        }
        limit(self.max_integral, name)?;
        limit(self.max_output, name)
    }
}

/// How the drive wheel is commanded.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriveMode {
    /// PID on the drive encoder toward a target speed (counts per speed period).
    ClosedLoop { target_speed: f32 },
    /// Fixed PWM, no feedback.
    OpenLoop { pwm: i16 },
}

/// Cascaded balance loops: speed → angle → angular rate, plus the drive wheel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeConfig {
    /// Angular-rate loop: deg/s in, PWM out.
    pub rate: PidGains,
    /// Angle loop: degrees in, target deg/s out.
    pub angle: PidGains,
    /// Speed loop: encoder counts in, angle offset (degrees) out.
    pub speed: PidGains,
    /// Drive loop: encoder counts in, PWM out.
    pub drive: PidGains,

    pub speed_period: u32,
    pub angle_period: u32,
    pub rate_period: u32,
    pub drive_period: u32,

    /// Speed-loop invocations between forced integral clears.
    pub speed_integral_reset_interval: u32,

    /// Balance point the speed loop offsets from (degrees).
    pub base_target_angle: f32,
    /// Balance-wheel target speed (encoder counts per speed period).
    pub target_speed: f32,
    pub drive_mode: DriveMode,

    /// Angle error (degrees) below which angle-loop gains are scaled down.
    pub angle_deadzone: f32,
    /// Gain factor at zero angle error, in [0, 1].
    pub angle_min_gain: f32,
    /// Angle-loop integral multiplier applied on every step inside the dead-zone.
    pub angle_integral_decay: f32,
    /// Rate error (deg/s) below which rate-loop gains are scaled down.
    pub rate_deadzone: f32,
    /// Gain factor at zero rate error, in [0, 1].
    pub rate_min_gain: f32,

    /// One-pole weight of the newest pitch sample fed to the angle loop.
    pub pitch_filter_coeff: f32,
    /// One-pole weight of the newest rate sample fed to the rate loop.
    pub rate_filter_coeff: f32,
    /// One-pole weight of the newest rate-loop output sent to the motor.
    pub output_filter_coeff: f32,

    /// Motor command saturation.
    pub max_pwm: i16,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            rate: PidGains::new(-100.0, -220.0, 0.0, 100.0, 8000.0),
            angle: PidGains::new(-0.028, 0.0, 0.0, 20.0, 210.0),
            speed: PidGains::new(0.0, 0.0, 0.0, 100.0, 1000.0),
            drive: PidGains::new(-1.0, 0.0, 0.0, 100.0, 10000.0),

            speed_period: 20,
            angle_period: 5,
            rate_period: 1,
            drive_period: 20,

            speed_integral_reset_interval: 100,

            base_target_angle: 0.0,
            target_speed: 0.0,
            drive_mode: DriveMode::ClosedLoop { target_speed: 10.0 },

            angle_deadzone: 5.0,
            angle_min_gain: 1.0,
            angle_integral_decay: 0.95,
            rate_deadzone: 7.0,
            rate_min_gain: 1.0,

            pitch_filter_coeff: 0.4,
            rate_filter_coeff: 1.0,
            output_filter_coeff: 0.3,

            max_pwm: 10_000,
        }
    }
}

impl CascadeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rate.validate("rate")?;
        self.angle.validate("angle")?;
        self.speed.validate("speed")?;
        self.drive.validate("drive")?;

        nonzero(self.speed_period, "speed_period")?;
        nonzero(self.angle_period, "angle_period")?;
        nonzero(self.rate_period, "rate_period")?;
        nonzero(self.drive_period, "drive_period")?;
        nonzero(self.speed_integral_reset_interval, "speed_integral_reset_interval")?;

        limit(self.angle_deadzone, "angle_deadzone")?;
        limit(self.rate_deadzone, "rate_deadzone")?;
        unit(self.angle_min_gain, "angle_min_gain")?;
        unit(self.rate_min_gain, "rate_min_gain")?;
        unit(self.angle_integral_decay, "angle_integral_decay")?;
        unit(self.pitch_filter_coeff, "pitch_filter_coeff")?;
        unit(self.rate_filter_coeff, "rate_filter_coeff")?;
        unit(self.output_filter_coeff, "output_filter_coeff")?;

        if self.max_pwm <= 0 {
            return Err(ConfigError::InvalidLimit("max_pwm"));
        }
        Ok(())
    }
}

// ================================================================================================
// Steering
// ================================================================================================

/// Inclusive range of image rows averaged into the lane error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub start: u16,
    pub end: u16,
}

/// Lane-following steering loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringConfig {
    pub enabled: bool,
    /// Degrees of steering per unit of image error.
    pub kp: f32,
    /// Degrees of steering per deg/s of yaw rate.
    pub kd: f32,
    /// Steering deflection limit either side of center (degrees).
    pub output_limit: f32,
    pub servo_center: f32,
    pub servo_min: f32,
    pub servo_max: f32,
    pub sample_rows: RowRange,
    /// Ticks between steering updates.
    pub period: u32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kp: 0.5,
            kd: 0.0,
            output_limit: 40.0,
            servo_center: 90.0,
            servo_min: 50.0,
            servo_max: 150.0,
            sample_rows: RowRange { start: 40, end: 60 },
            period: 20,
        }
    }
}

impl SteeringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        limit(self.output_limit, "steer_output_limit")?;
        if !(self.servo_min <= self.servo_center && self.servo_center <= self.servo_max) {
            return Err(ConfigError::InvalidServoRange);
        }
        if self.sample_rows.start > self.sample_rows.end {
            return Err(ConfigError::InvalidRowRange);
        }
        nonzero(self.period, "steer_period")
    }
}

/// Cornering feed-forward on the balance target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnCompensationConfig {
    pub enabled: bool,
    pub model: TurnModel,
    /// Speed×deflection model gain.
    pub gain: f32,
    /// Static-lean coefficient of the split model (degrees per degree of deflection).
    pub k_servo: f32,
    /// Centrifugal coefficient of the split model (degrees per speed²).
    pub k_speed: f32,
    /// Compensation magnitudes below this read as zero.
    pub deadzone: f32,
    /// Compensation saturation (degrees).
    pub max: f32,
    /// Image error magnitude below which the robot is treated as going straight.
    pub image_threshold: f32,
}

impl Default for TurnCompensationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: TurnModel::SpeedDeflection,
            gain: 1.0,
            k_servo: 0.05,
            k_speed: 0.001,
            deadzone: 0.7,
            max: 8.0,
            image_threshold: 5.0,
        }
    }
}

impl TurnCompensationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        limit(self.deadzone, "turn_deadzone")?;
        limit(self.max, "turn_max")?;
        limit(self.image_threshold, "turn_image_threshold")?;
        if !(self.gain.is_finite() && self.k_servo.is_finite() && self.k_speed.is_finite()) {
            return Err(ConfigError::InvalidLimit("turn_gain"));
        }
        Ok(())
    }
}

// ================================================================================================
// Protection and run mode
// ================================================================================================

/// Beep pattern played when protection trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmPattern {
    pub count: u8,
    pub on_ms: u16,
    pub off_ms: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectionConfig {
    pub angle_enabled: bool,
    /// |pitch| above this (degrees) trips angle protection.
    pub angle_threshold_deg: f32,
    pub stall_enabled: bool,
    /// |PWM| above this counts as "driving hard".
    pub stall_pwm_threshold: u16,
    /// |encoder delta| below this counts as "not moving".
    pub stall_encoder_threshold: u16,
    /// Consecutive stalled ticks before tripping.
    pub stall_detect_ticks: u32,
    /// Minimum ticks a trip is held before it may auto-release.
    pub cooldown_ticks: u32,
    pub alarm: AlarmPattern,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            angle_enabled: true,
            angle_threshold_deg: 40.0,
            stall_enabled: true,
            stall_pwm_threshold: 5000,
            stall_encoder_threshold: 5,
            stall_detect_ticks: 1000,
            cooldown_ticks: 2000,
            alarm: AlarmPattern {
                count: 3,
                on_ms: 100,
                off_ms: 100,
            },
        }
    }
}

impl ProtectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        limit(self.angle_threshold_deg, "angle_threshold_deg")?;
        nonzero(self.stall_detect_ticks, "stall_detect_ticks")
    }
}

/// Cargo run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Stop automatically after `stop_delay_ms` once a run starts.
    pub delayed_stop: bool,
    pub stop_delay_ms: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            delayed_stop: false,
            stop_delay_ms: 5000,
        }
    }
}

// ================================================================================================
// Aggregate
// ================================================================================================

/// Complete controller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlConfig {
    pub ekf: EkfConfig,
    pub imu: ImuConfig,
    pub cascade: CascadeConfig,
    pub steering: SteeringConfig,
    pub turn: TurnCompensationConfig,
    pub protection: ProtectionConfig,
    pub run: RunConfig,
}

impl ControlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ekf.validate()?;
        self.imu.validate()?;
        self.cascade.validate()?;
        self.steering.validate()?;
        self.turn.validate()?;
        self.protection.validate()
    }

    /// Control ticks per second implied by the estimator sample period.
    pub fn tick_rate_hz(&self) -> f32 {
        1.0 / self.ekf.dt
    }

    pub fn with_ekf(mut self, ekf: EkfConfig) -> Self {
        self.ekf = ekf;
        self
    }

    pub fn with_imu(mut self, imu: ImuConfig) -> Self {
        self.imu = imu;
        self
    }

    pub fn with_cascade(mut self, cascade: CascadeConfig) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn with_steering(mut self, steering: SteeringConfig) -> Self {
        self.steering = steering;
        self
    }

    pub fn with_turn(mut self, turn: TurnCompensationConfig) -> Self {
        self.turn = turn;
        self
    }

    pub fn with_protection(mut self, protection: ProtectionConfig) -> Self {
        self.protection = protection;
        self
    }

    pub fn with_run(mut self, run: RunConfig) -> Self {
        self.run = run;
        self
    }
}

// ----- validation helpers -----

fn limit(v: f32, name: &'static str) -> Result<(), ConfigError> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidLimit(name))
    }
}

fn non_negative(v: f32, name: &'static str) -> Result<(), ConfigError> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidNoise(name))
    }
}

fn positive(v: f32, name: &'static str) -> Result<(), ConfigError> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidNoise(name))
    }
}

fn unit(v: f32, name: &'static str) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(ConfigError::InvalidFilterCoefficient(name))
    }
}

fn nonzero(v: u32, name: &'static str) -> Result<(), ConfigError> {
    if v == 0 {
        Err(ConfigError::ZeroPeriod(name))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(ControlConfig::default().validate(), Ok(()));
    }

    #[test]
    fn ekf_rejects_bad_sample_period_and_fading() {
        let cfg = EkfConfig::new(1e-6, 1e-5, 1e-2, 0.9996, 0.0, 0.0);
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidSamplePeriod));

        let cfg = EkfConfig::new(1e-6, 1e-5, 1e-2, 1.5, 0.001, 0.0);
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidFadingFactor));

        let cfg = EkfConfig::new(1e-6, 1e-5, 0.0, 0.9996, 0.001, 0.0);
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidNoise("measurement_noise_accel"))
        );
    }

    #[test]
    fn cascade_rejects_zero_period() {
        let cfg = ControlConfig {
            cascade: CascadeConfig {
                angle_period: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroPeriod("angle_period")));
    }

    #[test]
    fn filter_coefficients_must_be_unit_interval() {
        let cfg = CascadeConfig {
            output_filter_coeff: 1.3,
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidFilterCoefficient("output_filter_coeff"))
        );
    }

    #[test]
    fn servo_center_must_be_in_range() {
        let cfg = SteeringConfig {
            servo_center: 160.0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidServoRange));
    }

    #[test]
    fn default_tick_rate_is_one_khz() {
        let rate = ControlConfig::default().tick_rate_hz();
        assert!((rate - 1000.0).abs() < 1e-3);
    }
}
