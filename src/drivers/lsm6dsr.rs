// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! ST LSM6DSR 6-axis IMU over 4-wire SPI.
//!
//! Configured for ±8 g and ±2000 dps at 1.66 kHz with block data update, so one burst read always
//! returns a coherent gyro + accelerometer pair.
//!
//! SPI mode 3 (CPOL=1, CPHA=1), MSB first. Bit 7 of the address byte selects a read; the address
//! auto-increments during a burst.

use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

use crate::sensors::{InertialSource, RawImuSample};

// Register addresses
pub mod reg {
    pub const WHO_AM_I: u8 = 0x0F;
    pub const CTRL1_XL: u8 = 0x10;
    pub const CTRL2_G: u8 = 0x11;
    pub const CTRL3_C: u8 = 0x12;
    pub const STATUS_REG: u8 = 0x1E;
    /// First of six gyro bytes, followed by six accelerometer bytes.
    pub const OUTX_L_G: u8 = 0x22;
    pub const OUTX_L_A: u8 = 0x28;
}

/// Expected WHO_AM_I value.
pub const DEVICE_ID: u8 = 0x6B;

const READ: u8 = 0x80;

/// 1.66 kHz, ±8 g.
const CTRL1_XL_VALUE: u8 = 0x8C;
/// 1.66 kHz, ±2000 dps.
const CTRL2_G_VALUE: u8 = 0x8C;
/// Block data update, address auto-increment.
const CTRL3_C_VALUE: u8 = 0x44;

/// STATUS_REG contents.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Status {
    raw: u8,
}

impl Status {
    #[inline]
    pub fn raw(&self) -> u8 {
        self.raw
    }

    /// New accelerometer data available.
    #[inline]
    pub fn xlda(&self) -> bool {
        (self.raw & (1 << 0)) != 0
    }

    /// New gyroscope data available.
    #[inline]
    pub fn gda(&self) -> bool {
        (self.raw & (1 << 1)) != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<SpiE, PinE> {
    Spi(SpiE),
    Pin(PinE),
    /// WHO_AM_I returned something other than [`DEVICE_ID`].
    WrongDevice(u8),
}

pub struct Lsm6dsr<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS, SpiE, PinE> Lsm6dsr<SPI, CS>
where
    SPI: Transfer<u8, Error = SpiE>,
    CS: OutputPin<Error = PinE>,
{
    /// Probe the device and apply the sampling configuration.
    pub fn new(spi: SPI, mut cs: CS) -> Result<Self, Error<SpiE, PinE>> {
        cs.set_high().map_err(Error::Pin)?;
        let mut imu = Self { spi, cs };

        let id = imu.read_reg(reg::WHO_AM_I)?;
        if id != DEVICE_ID {
            return Err(Error::WrongDevice(id));
        }

        imu.write_reg(reg::CTRL3_C, CTRL3_C_VALUE)?;
        imu.write_reg(reg::CTRL1_XL, CTRL1_XL_VALUE)?;
        imu.write_reg(reg::CTRL2_G, CTRL2_G_VALUE)?;
        Ok(imu)
    }

    pub fn free(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    pub fn read_reg(&mut self, addr: u8) -> Result<u8, Error<SpiE, PinE>> {
        let mut buf = [addr | READ, 0x00];
        self.transaction(&mut buf)?;
        Ok(buf[1])
    }

    pub fn write_reg(&mut self, addr: u8, value: u8) -> Result<(), Error<SpiE, PinE>> {
        let mut buf = [addr & !READ, value];
        self.transaction(&mut buf)
    }

    pub fn status(&mut self) -> Result<Status, Error<SpiE, PinE>> {
        Ok(Status {
            raw: self.read_reg(reg::STATUS_REG)?,
        })
    }

    /// Burst-read gyro and accelerometer output registers.
    pub fn read_sample(&mut self) -> Result<RawImuSample, Error<SpiE, PinE>> {
        let mut buf = [0u8; 13];
        buf[0] = reg::OUTX_L_G | READ;
        self.transaction(&mut buf)?;

        let word = |i: usize| i16::from_le_bytes([buf[1 + 2 * i], buf[2 + 2 * i]]);
        Ok(RawImuSample {
            gyro: [word(0), word(1), word(2)],
            accel: [word(3), word(4), word(5)],
        })
    }

    fn transaction(&mut self, buf: &mut [u8]) -> Result<(), Error<SpiE, PinE>> {
        self.cs.set_low().map_err(Error::Pin)?;
        let result = self.spi.transfer(buf).map(|_| ()).map_err(Error::Spi);
        self.cs.set_high().map_err(Error::Pin)?;
        result
    }
}

impl<SPI, CS, SpiE, PinE> InertialSource for Lsm6dsr<SPI, CS>
where
    SPI: Transfer<u8, Error = SpiE>,
    CS: OutputPin<Error = PinE>,
    SpiE: core::fmt::Debug,
    PinE: core::fmt::Debug,
{
    type Error = Error<SpiE, PinE>;

    /// `WouldBlock` until both the gyro and the accelerometer have new data.
    fn read_raw(&mut self) -> nb::Result<RawImuSample, Self::Error> {
        let status = self.status()?;
        if !(status.gda() && status.xlda()) {
            return Err(nb::Error::WouldBlock);
        }
        Ok(self.read_sample()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    /// Register file behind a fake SPI bus.
    struct FakeBus {
        regs: [u8; 0x80],
        transactions: u32,
    }

    impl FakeBus {
        fn new() -> Self {
            let mut regs = [0u8; 0x80];
            regs[reg::WHO_AM_I as usize] = DEVICE_ID;
            Self {
                regs,
                transactions: 0,
            }
        }
    }

    impl Transfer<u8> for FakeBus {
        type Error = Infallible;

        fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Infallible> {
            self.transactions += 1;
            let addr = (words[0] & !READ) as usize;
            if words[0] & READ != 0 {
                for (i, w) in words.iter_mut().skip(1).enumerate() {
                    *w = self.regs[addr + i];
                }
            } else {
                self.regs[addr] = words[1];
            }
            Ok(words)
        }
    }

    #[derive(Default)]
    struct Pin {
        low: bool,
        selects: u32,
    }

    impl OutputPin for Pin {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Infallible> {
            self.low = true;
            self.selects += 1;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.low = false;
            Ok(())
        }
    }

    #[test]
    fn init_configures_ranges_and_rate() {
        let imu = Lsm6dsr::new(FakeBus::new(), Pin::default()).unwrap();
        let (bus, cs) = imu.free();
        assert_eq!(bus.regs[reg::CTRL1_XL as usize], 0x8C);
        assert_eq!(bus.regs[reg::CTRL2_G as usize], 0x8C);
        assert_eq!(bus.regs[reg::CTRL3_C as usize], 0x44);
        assert_eq!(cs.selects, bus.transactions);
        assert!(!cs.low);
    }

    #[test]
    fn wrong_device_is_rejected() {
        let mut bus = FakeBus::new();
        bus.regs[reg::WHO_AM_I as usize] = 0x6A;
        assert!(matches!(
            Lsm6dsr::new(bus, Pin::default()),
            Err(Error::WrongDevice(0x6A))
        ));
    }

    #[test]
    fn read_raw_waits_for_both_data_ready_flags() {
        let mut imu = Lsm6dsr::new(FakeBus::new(), Pin::default()).unwrap();
        let (mut bus, cs) = imu.free();

        let values: [i16; 6] = [100, -200, 300, 0, 2049, 4098];
        for (i, v) in values.iter().enumerate() {
            let [lo, hi] = v.to_le_bytes();
            bus.regs[reg::OUTX_L_G as usize + 2 * i] = lo;
            bus.regs[reg::OUTX_L_G as usize + 2 * i + 1] = hi;
        }
        bus.regs[reg::STATUS_REG as usize] = 0b01;
        imu = Lsm6dsr { spi: bus, cs };
        assert!(matches!(imu.read_raw(), Err(nb::Error::WouldBlock)));

        imu.spi.regs[reg::STATUS_REG as usize] = 0b11;
        let sample = imu.read_raw().unwrap();
        assert_eq!(sample.gyro, [100, -200, 300]);
        assert_eq!(sample.accel, [0, 2049, 4098]);
    }
}
