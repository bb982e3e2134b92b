// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Closed-loop scenarios against a simulated robot.

use approx::assert_abs_diff_eq;

use cargobot::actuators::{AlarmSink, MotorSink, ServoSink};
use cargobot::config::{CascadeConfig, DriveMode, PidGains, RowRange, SteeringConfig};
use cargobot::protection::TripReason;
use cargobot::sensors::{EncoderSource, InertialSource, LaneErrorSource, RawImuSample, Wheel};
use cargobot::{CalibrationError, ControlConfig, Controller};

/// Raw accelerometer counts for 1 g at the default ±8 g range.
const ONE_G: i16 = 4098;

struct SimRobot {
    gyro: [i16; 3],
    accel: [i16; 3],
    /// Return `WouldBlock` on every read.
    imu_stalled: bool,
    /// Return an error on every read.
    imu_failed: bool,
    encoder: [i16; 2],
    image_error: f32,

    motors: [i16; 2],
    servo: f32,
    beeps: u32,
    beeping: bool,
}

impl SimRobot {
    fn level() -> Self {
        Self {
            gyro: [0; 3],
            accel: [0, 0, ONE_G],
            imu_stalled: false,
            imu_failed: false,
            encoder: [0; 2],
            image_error: 0.0,
            motors: [0; 2],
            servo: 0.0,
            beeps: 0,
            beeping: false,
        }
    }
}

impl InertialSource for SimRobot {
    type Error = &'static str;

    fn read_raw(&mut self) -> nb::Result<RawImuSample, &'static str> {
        if self.imu_failed {
            return Err(nb::Error::Other("bus fault"));
        }
        if self.imu_stalled {
            return Err(nb::Error::WouldBlock);
        }
        Ok(RawImuSample {
            gyro: self.gyro,
            accel: self.accel,
        })
    }
}

impl EncoderSource for SimRobot {
    fn read_delta(&mut self, wheel: Wheel) -> i16 {
        self.encoder[wheel.index()]
    }
}

impl LaneErrorSource for SimRobot {
    fn image_error(&mut self, _rows: RowRange) -> f32 {
        self.image_error
    }
}

impl MotorSink for SimRobot {
    fn set_motor_pwm(&mut self, wheel: Wheel, pwm: i16) {
        self.motors[wheel.index()] = pwm;
    }
}

impl ServoSink for SimRobot {
    fn set_servo_angle(&mut self, degrees: f32) {
        self.servo = degrees;
    }
}

impl AlarmSink for SimRobot {
    fn beep(&mut self, _count: u8, _on_ms: u16, _off_ms: u16) {
        self.beeps += 1;
        self.beeping = true;
    }

    fn silence(&mut self) {
        self.beeping = false;
    }

    fn is_active(&self) -> bool {
        self.beeping
    }
}

fn config() -> ControlConfig {
    let mut c = ControlConfig::default();
    c.imu.gyro_offset = [0.0; 3];
    c
}

fn controller(robot: SimRobot, config: ControlConfig) -> Controller<SimRobot> {
    Controller::new(robot, config).unwrap()
}

fn run(c: &mut Controller<SimRobot>, ticks: u32) {
    for _ in 0..ticks {
        c.tick();
    }
}

#[test]
fn disabling_zeroes_motors_immediately_and_keeps_them_off() {
    let mut c = controller(SimRobot::level(), config());
    c.set_drive_mode(DriveMode::OpenLoop { pwm: 3000 });
    c.set_enabled(true);
    run(&mut c, 40);
    assert_eq!(c.platform().motors[Wheel::Drive.index()], 3000);

    c.set_enabled(false);
    assert_eq!(c.platform().motors, [0, 0]);
    assert_eq!(c.platform().servo, 90.0);

    for _ in 0..100 {
        c.tick();
        assert_eq!(c.platform().motors, [0, 0]);
    }
    assert_eq!(c.status().motor_pwm, [0, 0]);
}

#[test]
fn disabling_mid_run_holds_both_motors_until_reenabled() {
    let cfg = config().with_cascade(CascadeConfig {
        speed: PidGains::new(0.1, 0.0, 0.0, 100.0, 1000.0),
        ..Default::default()
    });
    let mut c = controller(SimRobot::level(), cfg);
    c.set_target_speed(50.0);
    c.set_enabled(true);
    run(&mut c, 200);
    assert_ne!(c.platform().motors, [0, 0]);

    c.set_enabled(false);
    assert_eq!(c.platform().motors, [0, 0]);
    for _ in 0..500 {
        c.tick();
        assert_eq!(c.platform().motors, [0, 0]);
    }

    c.set_enabled(true);
    run(&mut c, 20);
    assert_ne!(c.platform().motors, [0, 0]);
}

#[test]
fn stalled_drive_wheel_trips_after_detection_window() {
    let mut c = controller(SimRobot::level(), config());
    c.set_drive_mode(DriveMode::OpenLoop { pwm: 8000 });
    c.set_enabled(true);

    // The drive loop first runs on tick 20; stall counting starts one tick later.
    run(&mut c, 1019);
    assert!(!c.is_protected());
    assert_eq!(c.platform().motors[Wheel::Drive.index()], 8000);

    c.tick();
    assert!(c.is_protected());
    assert_eq!(c.platform().motors, [0, 0]);
    assert_eq!(c.status().trip_reason, Some(TripReason::Stall));
    assert_eq!(c.status().trip_count, 1);
    assert!(c.platform().beeping);

    // Held for the cooldown, then released.
    run(&mut c, 1999);
    assert!(c.is_protected());
    assert_eq!(c.platform().motors, [0, 0]);
    c.tick();
    assert!(!c.is_protected());
    assert!(!c.platform().beeping);
}

#[test]
fn moving_drive_wheel_never_stalls() {
    let mut robot = SimRobot::level();
    robot.encoder = [0, 40];
    let mut c = controller(robot, config());
    c.set_drive_mode(DriveMode::OpenLoop { pwm: 8000 });
    c.set_enabled(true);

    run(&mut c, 3000);
    assert!(!c.is_protected());
    assert_eq!(c.status().trip_count, 0);
}

#[test]
fn sustained_tilt_trips_once() {
    // ~60° about the pitch axis
    let mut robot = SimRobot::level();
    robot.accel = [-3549, 0, 2049];
    let mut c = controller(robot, config());
    c.set_enabled(true);

    run(&mut c, 500);
    let status = c.status();
    assert!(status.pitch.abs() > 40.0);
    assert!(status.protected);
    assert_eq!(status.trip_reason, Some(TripReason::Angle));
    assert_eq!(status.trip_count, 1);
    assert_eq!(c.platform().beeps, 1);
    assert_eq!(c.platform().motors, [0, 0]);
}

#[test]
fn tilt_trip_holds_past_cooldown_while_still_tilted() {
    let mut robot = SimRobot::level();
    robot.accel = [-3549, 0, 2049];
    let mut c = controller(robot, config());
    c.set_enabled(true);

    run(&mut c, 3000);
    assert!(c.is_protected());

    c.reset_protection();
    assert!(!c.is_protected());
    assert!(!c.platform().beeping);
}

#[test]
fn calibration_removes_gyro_offset() {
    let mut robot = SimRobot::level();
    robot.gyro = [2, -10, 2];
    let mut c = controller(robot, ControlConfig::default());

    let offset = c.calibrate_gyro(200, 1000).unwrap();
    assert_abs_diff_eq!(offset[0], 2.0, epsilon = 0.1);
    assert_abs_diff_eq!(offset[1], -10.0, epsilon = 0.5);
    assert_abs_diff_eq!(offset[2], 2.0, epsilon = 0.1);
    assert_eq!(c.config().imu.gyro_offset, offset);

    run(&mut c, 1000);
    let status = c.status();
    assert!(status.roll.abs() < 0.5);
    assert!(status.pitch.abs() < 0.5);
    assert!(status.yaw.abs() < 0.5);
}

#[test]
fn calibration_times_out_without_samples() {
    let mut robot = SimRobot::level();
    robot.imu_stalled = true;
    let mut c = controller(robot, config());

    assert_eq!(
        c.calibrate_gyro(100, 50),
        Err(CalibrationError::Timeout { collected: 0 })
    );
    assert_eq!(c.config().imu.gyro_offset, [0.0; 3]);
}

#[test]
fn calibration_reports_sensor_errors() {
    let mut robot = SimRobot::level();
    robot.imu_failed = true;
    let mut c = controller(robot, config());

    assert_eq!(
        c.calibrate_gyro(100, 50),
        Err(CalibrationError::Sensor("bus fault"))
    );
}

#[test]
fn failed_imu_reads_are_counted() {
    let mut robot = SimRobot::level();
    robot.imu_failed = true;
    let mut c = controller(robot, config());

    run(&mut c, 25);
    assert_eq!(c.status().sensor_errors, 25);
}

#[test]
fn steering_follows_lane_error() {
    let cfg = config().with_steering(SteeringConfig {
        enabled: true,
        kp: 0.5,
        kd: 0.0,
        ..Default::default()
    });
    let mut robot = SimRobot::level();
    robot.image_error = 10.0;
    let mut c = controller(robot, cfg);
    c.set_enabled(true);

    run(&mut c, 20);
    assert_abs_diff_eq!(c.platform().servo, 95.0, epsilon = 1e-4);
    assert_abs_diff_eq!(c.status().image_error, 10.0, epsilon = 1e-6);

    c.platform_mut().image_error = 1000.0;
    run(&mut c, 20);
    // deflection limited to ±40° around center
    assert_abs_diff_eq!(c.platform().servo, 130.0, epsilon = 1e-4);
}
