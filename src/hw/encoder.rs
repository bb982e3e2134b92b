// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Quadrature wheel encoders on STM32F7 timers in encoder mode.
//!
//! TIM2 (32-bit) counts the balance wheel and TIM3 (16-bit) the drive wheel. The control loop only
//! needs counts since the previous sample, so each read takes the counter and clears it.

use stm32f7xx_hal::pac;

use cargobot::sensors::{EncoderSource, Wheel};

pub struct Encoder<TIM> {
    tim: TIM,
}

impl<TIM> Encoder<TIM> {
    /// Consume the wrapper and return the underlying timer peripheral.
    #[inline]
    pub fn free(self) -> TIM {
        self.tim
    }
}

impl Encoder<pac::TIM2> {
    /// Configure TIM2 as a quadrature encoder with full 32-bit range.
    pub fn tim2(tim: pac::TIM2) -> Self {
        // Disable counter while configuring
        tim.cr1.modify(|_, w| w.cen().clear_bit());

        tim.arr.write(|w| w.bits(0xFFFF_FFFF));

        // Encoder mode 3: count on both TI1 and TI2 edges
        tim.smcr.modify(|_, w| w.sms().bits(0b011));
        tim.ccmr1_input().modify(|_, w| w.cc1s().ti1().cc2s().ti2());
        tim.ccer.modify(|_, w| {
            w.cc1p()
                .clear_bit()
                .cc2p()
                .clear_bit()
                .cc1e()
                .set_bit()
                .cc2e()
                .set_bit()
        });

        tim.cnt.write(|w| w.bits(0));
        tim.cr1.modify(|_, w| w.cen().set_bit());

        Self { tim }
    }

    /// Counts since the previous call, saturated to `i16`.
    pub fn take_delta(&mut self) -> i16 {
        let count = self.tim.cnt.read().cnt().bits() as i32;
        self.tim.cnt.write(|w| w.bits(0));
        count.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }
}

impl Encoder<pac::TIM3> {
    /// Configure TIM3 as a quadrature encoder with full 16-bit range.
    pub fn tim3(tim: pac::TIM3) -> Self {
        tim.cr1.modify(|_, w| w.cen().clear_bit());

        tim.arr.write(|w| unsafe { w.bits(0xFFFF) });

        tim.smcr.modify(|_, w| w.sms().bits(0b011));
        tim.ccmr1_input().modify(|_, w| w.cc1s().ti1().cc2s().ti2());
        tim.ccer.modify(|_, w| {
            w.cc1p()
                .clear_bit()
                .cc2p()
                .clear_bit()
                .cc1e()
                .set_bit()
                .cc2e()
                .set_bit()
        });

        tim.cnt.write(|w| unsafe { w.bits(0) });
        tim.cr1.modify(|_, w| w.cen().set_bit());

        Self { tim }
    }

    /// Counts since the previous call. The 16-bit counter wraps, so the signed reinterpretation is
    /// exact as long as fewer than 32768 counts pass between reads.
    pub fn take_delta(&mut self) -> i16 {
        let count = self.tim.cnt.read().cnt().bits() as i16;
        self.tim.cnt.write(|w| unsafe { w.bits(0) });
        count
    }
}

/// Both wheel encoders.
pub struct WheelEncoders {
    pub balance: Encoder<pac::TIM2>,
    pub drive: Encoder<pac::TIM3>,
}

impl EncoderSource for WheelEncoders {
    fn read_delta(&mut self, wheel: Wheel) -> i16 {
        match wheel {
            Wheel::Balance => self.balance.take_delta(),
            Wheel::Drive => self.drive.take_delta(),
        }
    }
}
