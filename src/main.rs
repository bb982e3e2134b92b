// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Board firmware for the STM32F777 cargo robot.
//!
//! The control tick runs in the SysTick handler at 1 kHz. Thread mode only prints the status line
//! published by the handler.

#![no_main]
#![no_std]

use core::cell::RefCell;

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m_rt::{entry, exception};
use critical_section::Mutex;
use panic_halt as _;

#[cfg(feature = "defmt")]
use defmt_rtt as _;

use hal::{
    gpio::{
        gpiod::PD10,
        gpioe::{PE12, PE13, PE14, PE4},
        Alternate, Output, PushPull,
    },
    pac,
    prelude::*,
    serial::{Config, Serial},
    spi::{Enabled, Mode, Phase, Polarity, Spi},
};
use stm32f7xx_hal as hal;

use cargobot::actuators::{AlarmSink, MotorSink, ServoSink};
use cargobot::config::{ControlConfig, RowRange};
use cargobot::drivers::{Buzzer, HBridge, Lsm6dsr, MotorPair, Servo};
use cargobot::sensors::{EncoderSource, InertialSource, LaneErrorSource, RawImuSample, Wheel};
use cargobot::shared::Shared;
use cargobot::{log_error, log_info, Controller, ControllerStatus};

mod hw;
use hw::{Encoder, PwmChannel, Usart, WheelEncoders};

/// Control tick rate.
const TICK_HZ: u32 = 1_000;
/// H-bridge switching frequency.
const MOTOR_PWM_HZ: u32 = 20_000;
const SERVO_PWM_HZ: u32 = 50;
/// Ticks between status lines on the debug USART.
const REPORT_TICKS: u32 = 100;

const CALIBRATION_SAMPLES: u32 = 1_000;
const CALIBRATION_MAX_POLLS: u32 = 2_000_000;

type ImuSpi = Spi<
    pac::SPI4,
    (PE12<Alternate<5>>, PE13<Alternate<5>>, PE14<Alternate<5>>),
    Enabled<u8>,
>;
type Imu = Lsm6dsr<ImuSpi, PE4<Output<PushPull>>>;
type Motors = MotorPair<
    HBridge<PwmChannel<pac::TIM4, 1>, PwmChannel<pac::TIM4, 2>>,
    HBridge<PwmChannel<pac::TIM4, 3>, PwmChannel<pac::TIM4, 4>>,
>;

/// Everything the controller drives on this board.
struct Board {
    imu: Imu,
    encoders: WheelEncoders,
    motors: Motors,
    servo: Servo<PwmChannel<pac::TIM9, 1>>,
    buzzer: Buzzer<PD10<Output<PushPull>>>,
}

impl InertialSource for Board {
    type Error = <Imu as InertialSource>::Error;

    fn read_raw(&mut self) -> nb::Result<RawImuSample, Self::Error> {
        self.imu.read_raw()
    }
}

impl EncoderSource for Board {
    fn read_delta(&mut self, wheel: Wheel) -> i16 {
        self.encoders.read_delta(wheel)
    }
}

impl LaneErrorSource for Board {
    /// No camera on this board revision; steering holds center.
    fn image_error(&mut self, _rows: RowRange) -> f32 {
        0.0
    }
}

impl MotorSink for Board {
    fn set_motor_pwm(&mut self, wheel: Wheel, pwm: i16) {
        self.motors.set_motor_pwm(wheel, pwm);
    }
}

impl ServoSink for Board {
    fn set_servo_angle(&mut self, degrees: f32) {
        self.servo.set_servo_angle(degrees);
    }
}

impl AlarmSink for Board {
    fn beep(&mut self, count: u8, on_ms: u16, off_ms: u16) {
        self.buzzer.beep(count, on_ms, off_ms);
    }

    fn silence(&mut self) {
        self.buzzer.silence();
    }

    fn is_active(&self) -> bool {
        self.buzzer.is_active()
    }
}

static CONTROLLER: Mutex<RefCell<Option<Controller<Board>>>> = Mutex::new(RefCell::new(None));
static STATUS: Shared<Option<ControllerStatus>> = Shared::new(None);

#[entry]
fn main() -> ! {
    // Peripherals
    let dp = pac::Peripherals::take().unwrap();
    let cp = cortex_m::Peripherals::take().unwrap();

    // Clocks
    let rcc = dp.RCC.constrain();
    let clocks = rcc.cfgr.freeze();
    let mut apb2 = rcc.apb2;
    let sysclk_hz = clocks.sysclk().raw();

    // GPIO
    let gpioa = dp.GPIOA.split();
    let gpiod = dp.GPIOD.split();
    let gpioe = dp.GPIOE.split();

    // USART1 (DBG)
    let tx = gpioa.pa9.into_alternate::<7>();
    let rx = gpioa.pa10.into_alternate::<7>();
    let usart_cfg = Config {
        baud_rate: 115_200.bps(),
        ..Default::default()
    };
    let serial = Serial::new(dp.USART1, (tx, rx), &clocks, usart_cfg);
    let mut usart = Usart::new(serial);
    usart.println("cargobot booting");

    // SPI4 (LSM6DSR), mode 3
    let sck = gpioe.pe12.into_alternate::<5>();
    let miso = gpioe.pe13.into_alternate::<5>();
    let mosi = gpioe.pe14.into_alternate::<5>();
    let spi_mode = Mode {
        polarity: Polarity::IdleHigh,
        phase: Phase::CaptureOnSecondTransition,
    };
    let spi4 = Spi::new(dp.SPI4, (sck, miso, mosi)).enable::<u8>(
        spi_mode,
        4.MHz(),
        &clocks,
        &mut apb2,
    );
    let imu_cs = gpioe.pe4.into_push_pull_output();
    let imu = match Lsm6dsr::new(spi4, imu_cs) {
        Ok(imu) => imu,
        Err(e) => {
            if let cargobot::drivers::lsm6dsr::Error::WrongDevice(id) = e {
                log_error!("unexpected IMU id {}", id);
            }
            usart.println("IMU init failed");
            halt();
        }
    };

    // Encoders: TIM2 on PA0/PA1, TIM3 on PA6/PA7
    let _enc_a = (gpioa.pa0.into_alternate::<1>(), gpioa.pa1.into_alternate::<1>());
    let _enc_b = (gpioa.pa6.into_alternate::<2>(), gpioa.pa7.into_alternate::<2>());
    // SAFETY: single RMW of the clock enable bits during init
    let rcc_pac = unsafe { &*pac::RCC::ptr() };
    rcc_pac
        .apb1enr
        .modify(|_, w| w.tim2en().set_bit().tim3en().set_bit());
    let encoders = WheelEncoders {
        balance: Encoder::tim2(dp.TIM2),
        drive: Encoder::tim3(dp.TIM3),
    };

    // Motor PWM: TIM4 CH1..CH4 on PD12..PD15
    let _motor_pins = (
        gpiod.pd12.into_alternate::<2>(),
        gpiod.pd13.into_alternate::<2>(),
        gpiod.pd14.into_alternate::<2>(),
        gpiod.pd15.into_alternate::<2>(),
    );
    // Default clock tree: APB prescalers are 1, so timer clocks equal SYSCLK
    let (m1, m2, m3, m4) = hw::pwm::tim4(dp.TIM4, sysclk_hz, MOTOR_PWM_HZ);
    let motors = MotorPair {
        balance: HBridge::new(m1, m2),
        drive: HBridge::new(m3, m4).inverted(true),
    };

    // Servo PWM: TIM9 CH1 on PE5
    let _servo_pin = gpioe.pe5.into_alternate::<3>();
    let config = ControlConfig::default();
    let servo = Servo::new(
        hw::pwm::tim9(dp.TIM9, sysclk_hz, SERVO_PWM_HZ),
        config.steering.servo_min,
        config.steering.servo_max,
    );

    let buzzer = Buzzer::active_high(gpiod.pd10.into_push_pull_output());

    let board = Board {
        imu,
        encoders,
        motors,
        servo,
        buzzer,
    };

    let mut controller: Controller<Board> = match Controller::new(board, config) {
        Ok(c) => c,
        Err(e) => {
            log_error!("invalid configuration: {}", e);
            usart.println("invalid configuration");
            halt();
        }
    };

    // Robot must be still and upright
    usart.println("calibrating gyro, hold still");
    match controller.calibrate_gyro(CALIBRATION_SAMPLES, CALIBRATION_MAX_POLLS) {
        Ok(offset) => log_info!(
            "gyro offset {} {} {}",
            offset[0],
            offset[1],
            offset[2]
        ),
        Err(_) => {
            log_error!("gyro calibration failed");
            usart.println("gyro calibration failed, using stored offset");
        }
    }
    controller.start_run();

    critical_section::with(|cs| CONTROLLER.borrow_ref_mut(cs).replace(controller));

    // SysTick at TICK_HZ
    let mut syst = cp.SYST;
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(sysclk_hz / TICK_HZ - 1);
    syst.clear_current();
    syst.enable_counter();
    syst.enable_interrupt();

    usart.println("running");

    let mut last_report = 0u32;
    loop {
        cortex_m::asm::wfi();
        if let Some(status) = STATUS.read() {
            if status.tick.wrapping_sub(last_report) >= REPORT_TICKS {
                last_report = status.tick;
                usart.report(&status);
            }
        }
    }
}

#[exception]
fn SysTick() {
    critical_section::with(|cs| {
        if let Some(controller) = CONTROLLER.borrow_ref_mut(cs).as_mut() {
            controller.tick();
            controller
                .platform_mut()
                .buzzer
                .update(1_000 / TICK_HZ);
            STATUS.write(Some(controller.status()));
        }
    });
}

fn halt() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}
