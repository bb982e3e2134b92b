// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Controller
//!
//! Owns every piece of control state and runs one control tick at a time. Board code constructs a
//! single [`Controller`] at startup, hands it a [`Platform`] and calls [`Controller::tick`] from the
//! 1 ms timer.
//!
//! ## Tick order
//!
//! 1. advance the loop schedule
//! 2. read the IMU and update the estimator (the previous estimate is held on `WouldBlock`)
//! 3. sample the encoders when the speed or drive loop is due
//! 4. protection update
//! 5. delayed-stop countdown
//! 6. enable gate: disabled or protected → motors zero, servo centered, done
//! 7. speed loop
//! 8. steering and turn compensation
//! 9. angle loop
//! 10. drive loop
//! 11. rate loop
//! 12. write the actuators and refresh the status snapshot

use crate::actuators::{AlarmSink, MotorSink, ServoSink, MAX_PWM};
use crate::config::{ControlConfig, DriveMode};
use crate::control::{BalanceCascade, CascadeStatus, LoopSchedule, Steering, TurnCompensator};
use crate::error::{CalibrationError, ConfigError};
use crate::estimation::{GyroCalibrator, OrientationEstimate, QuaternionEkf};
use crate::math::{Libm, MathBackend};
use crate::protection::{ProtectionEvent, ProtectionInputs, ProtectionSupervisor, TripReason};
use crate::sensors::{EncoderSource, ImuFrontEnd, InertialSource, LaneErrorSource, Wheel};
use crate::{log_debug, log_info, log_warn};

const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// Everything the controller needs from the board.
pub trait Platform:
    InertialSource + EncoderSource + LaneErrorSource + MotorSink + ServoSink + AlarmSink
{
}

impl<T> Platform for T where
    T: InertialSource + EncoderSource + LaneErrorSource + MotorSink + ServoSink + AlarmSink
{
}

/// Copy of the controller state for display and telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerStatus {
    pub tick: u32,
    pub enabled: bool,
    pub protected: bool,
    pub trip_reason: Option<TripReason>,
    /// Protection trips since power-up.
    pub trip_count: u32,

    /// Degrees, pitch includes the mounting offset.
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub yaw_total: f32,
    /// Degrees per second.
    pub pitch_rate: f32,
    pub gyro_bias: [f32; 3],
    pub estimator_errors: u32,
    pub estimator_converged: bool,

    pub cascade: CascadeStatus,
    pub turn_compensation: f32,
    pub servo_angle: f32,
    pub image_error: f32,

    pub motor_pwm: [i16; 2],
    pub encoder: [i16; 2],
    pub sensor_errors: u32,
    /// Ticks left before the delayed stop disables the controller.
    pub stop_remaining: Option<u32>,
}

pub struct Controller<P: Platform, M: MathBackend = Libm> {
    platform: P,
    config: ControlConfig,

    ekf: QuaternionEkf<M>,
    front_end: ImuFrontEnd,
    cascade: BalanceCascade,
    steering: Steering,
    turn: TurnCompensator,
    protection: ProtectionSupervisor,
    schedule: LoopSchedule,

    enabled: bool,
    ticks: u32,
    encoder: [i16; 2],
    applied: [i16; 2],
    turn_compensation: f32,
    stop_countdown: Option<u32>,
    trip_count: u32,
    sensor_errors: u32,
}

impl<P: Platform, M: MathBackend> Controller<P, M> {
    /// Build a disabled controller. Fails if `config` does not validate.
    pub fn new(platform: P, config: ControlConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            platform,
            config,

            ekf: QuaternionEkf::new(config.ekf),
            front_end: ImuFrontEnd::new(config.imu),
            cascade: BalanceCascade::new(config.cascade),
            steering: Steering::new(config.steering),
            turn: TurnCompensator::new(config.turn),
            protection: ProtectionSupervisor::new(config.protection),
            schedule: LoopSchedule::new(&config.cascade, &config.steering),

            enabled: false,
            ticks: 0,
            encoder: [0; 2],
            applied: [0; 2],
            turn_compensation: 0.0,
            stop_countdown: None,
            trip_count: 0,
            sensor_errors: 0,
        })
    }

    /// Run one control tick.
    pub fn tick(&mut self) {
        self.ticks = self.ticks.wrapping_add(1);
        let due = self.schedule.advance();

        // ----- Estimation -----
        match self.platform.read_raw() {
            Ok(raw) => {
                let s = self.front_end.convert(&raw);
                self.ekf.update(
                    s.gyro[0], s.gyro[1], s.gyro[2], s.accel[0], s.accel[1], s.accel[2],
                );
            }
            Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(_)) => {
                self.sensor_errors = self.sensor_errors.wrapping_add(1);
                log_warn!("imu read failed ({} total)", self.sensor_errors);
            }
        }

        if LoopSchedule::samples_encoders(&due) {
            for wheel in Wheel::ALL {
                self.encoder[wheel.index()] = self.platform.read_delta(wheel);
            }
        }

        let pitch = self.pitch();
        let pitch_rate = self.ekf.estimate().gyro[1] * RAD_TO_DEG;
        let yaw_rate = self.ekf.estimate().gyro[2] * RAD_TO_DEG;

        // ----- Protection -----
        let inputs = ProtectionInputs {
            pitch_deg: pitch,
            applied_pwm: self.applied,
            encoder_delta: self.encoder,
        };
        match self.protection.update(&inputs, &mut self.platform) {
            Some(ProtectionEvent::Tripped { reason, .. }) => {
                self.trip_count = self.trip_count.wrapping_add(1);
                self.cascade.clear_integrators();
                log_warn!("actuators held: {:?}", reason);
            }
            Some(ProtectionEvent::Released) => {
                self.cascade.clear_integrators();
            }
            None => {}
        }

        // ----- Delayed stop -----
        if let Some(remaining) = self.stop_countdown {
            if remaining == 0 {
                self.stop_countdown = None;
                self.enabled = false;
                log_info!("delayed stop reached");
            } else {
                self.stop_countdown = Some(remaining - 1);
            }
        }

        // ----- Enable gate -----
        if !self.enabled || self.protection.any_protected() {
            self.idle();
            return;
        }

        // ----- Loops, outer to inner -----
        if due.speed {
            self.cascade.run_speed_loop(self.encoder[Wheel::Balance.index()] as f32);
        }

        if due.steering {
            let rows = self.config.steering.sample_rows;
            let image_error = self.platform.image_error(rows);
            let servo = self.steering.update(image_error, yaw_rate);
            self.platform.set_servo_angle(servo);

            self.turn_compensation = self.turn.update(
                servo,
                self.config.steering.servo_center,
                self.encoder[Wheel::Drive.index()] as f32,
                self.steering.last_image_error(),
            );
        }

        if due.angle {
            self.cascade.run_angle_loop(pitch, self.turn_compensation);
        }

        if due.drive {
            self.cascade.run_drive_loop(self.encoder[Wheel::Drive.index()] as f32);
        }

        if due.rate {
            self.cascade.run_rate_loop(pitch_rate);
        }

        // ----- Actuation -----
        let balance = self.cascade.balance_command().clamp(-MAX_PWM, MAX_PWM);
        let drive = self.cascade.drive_command().clamp(-MAX_PWM, MAX_PWM);
        self.write_motors([balance, drive]);
    }

    /// Start a cargo run: clear faults and loop state, enable, arm the delayed stop if configured.
    pub fn start_run(&mut self) {
        self.protection.reset(&mut self.platform);
        self.cascade.reset();
        self.turn.reset();
        self.turn_compensation = 0.0;
        self.enabled = true;

        self.stop_countdown = if self.config.run.delayed_stop {
            Some(self.ms_to_ticks(self.config.run.stop_delay_ms))
        } else {
            None
        };
        log_info!("run started");
    }

    /// Global enable. Disabling zeroes the motors immediately; enabling starts the loops from a
    /// clean state.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.cascade.reset();
            self.turn.reset();
            self.turn_compensation = 0.0;
        }
        self.enabled = enabled;

        if !enabled {
            self.stop_countdown = None;
            self.idle();
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_target_speed(&mut self, speed: f32) {
        self.cascade.set_target_speed(speed);
    }

    /// Base balance angle in degrees.
    pub fn set_target_angle(&mut self, degrees: f32) {
        self.cascade.set_target_angle(degrees);
    }

    pub fn set_drive_mode(&mut self, mode: DriveMode) {
        self.cascade.set_drive_mode(mode);
    }

    /// Clear every protection trip and silence the alarm.
    pub fn reset_protection(&mut self) {
        self.protection.reset(&mut self.platform);
        self.cascade.clear_integrators();
    }

    pub fn is_protected(&self) -> bool {
        self.protection.any_protected()
    }

    /// Measure the gyro zero-rate offset with the robot at rest and install it.
    ///
    /// Refused while enabled. The estimator restarts afterwards so it does not carry bias learned
    /// against the old offset.
    pub fn calibrate_gyro(
        &mut self,
        samples: u32,
        max_polls: u32,
    ) -> Result<[f32; 3], CalibrationError<<P as InertialSource>::Error>> {
        if self.enabled {
            return Err(CalibrationError::Armed);
        }

        let offset = GyroCalibrator::new(samples, max_polls).run(&mut self.platform)?;
        self.front_end.set_gyro_offset(offset);
        self.config.imu.gyro_offset = offset;
        self.ekf.reset();
        Ok(offset)
    }

    /// Replace the whole configuration. Loop state is kept; the schedule restarts its phase.
    pub fn apply_config(&mut self, config: ControlConfig) -> Result<(), ConfigError> {
        config.validate()?;

        self.ekf.set_config(config.ekf);
        self.front_end.set_config(config.imu);
        self.cascade.set_config(config.cascade);
        self.steering.set_config(config.steering);
        self.turn.set_config(config.turn);
        self.protection.set_config(config.protection);
        self.schedule = LoopSchedule::new(&config.cascade, &config.steering);
        self.config = config;

        log_debug!("configuration applied");
        Ok(())
    }

    #[inline]
    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    #[inline]
    pub fn estimate(&self) -> &OrientationEstimate {
        self.ekf.estimate()
    }

    /// Zero the heading.
    pub fn reset_yaw(&mut self) {
        self.ekf.reset_yaw();
    }

    #[inline]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    #[inline]
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn status(&self) -> ControllerStatus {
        let e = self.ekf.estimate();
        let trip_reason = Wheel::ALL
            .iter()
            .find_map(|&w| self.protection.trip_reason(w));

        ControllerStatus {
            tick: self.ticks,
            enabled: self.enabled,
            protected: self.protection.any_protected(),
            trip_reason,
            trip_count: self.trip_count,

            roll: e.roll,
            pitch: self.pitch(),
            yaw: e.yaw,
            yaw_total: e.yaw_total_angle,
            pitch_rate: e.gyro[1] * RAD_TO_DEG,
            gyro_bias: e.gyro_bias,
            estimator_errors: e.error_count,
            estimator_converged: e.converged,

            cascade: self.cascade.status(),
            turn_compensation: self.turn_compensation,
            servo_angle: self.steering.servo_angle(),
            image_error: self.steering.last_image_error(),

            motor_pwm: self.applied,
            encoder: self.encoder,
            sensor_errors: self.sensor_errors,
            stop_remaining: self.stop_countdown,
        }
    }

    fn pitch(&self) -> f32 {
        self.ekf.estimate().pitch + self.config.imu.pitch_offset_deg
    }

    /// Motors off, servo centered.
    fn idle(&mut self) {
        self.write_motors([0, 0]);
        let center = self.steering.center();
        self.platform.set_servo_angle(center);
    }

    fn write_motors(&mut self, pwm: [i16; 2]) {
        for wheel in Wheel::ALL {
            self.platform.set_motor_pwm(wheel, pwm[wheel.index()]);
        }
        self.applied = pwm;
    }

    fn ms_to_ticks(&self, ms: u32) -> u32 {
        libm::roundf(ms as f32 * 0.001 * self.config.tick_rate_hz()) as u32
    }
}
