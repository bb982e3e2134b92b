// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Edge-aligned PWM outputs on general-purpose timers.
//!
//! - TIM4 CH1..CH4 drive the two H-bridges (IN1/IN2 for each motor)
//! - TIM9 CH1 drives the steering servo at 50 Hz
//!
//! Each channel is handed out as its own [`PwmChannel`] implementing [`embedded_hal::PwmPin`], so
//! the drivers in [`cargobot::drivers`] take them directly. Channels only touch their own CCR and
//! CCER bits.

use core::marker::PhantomData;

use embedded_hal::PwmPin;
use stm32f7xx_hal::pac;

/// OCxM = PWM mode 1 with preload enabled, for one 8-bit CCMR slot.
const PWM_MODE_1_PRELOAD: u32 = 0b0110_1000;

pub struct PwmChannel<TIM, const C: u8> {
    max_duty: u16,
    _tim: PhantomData<TIM>,
}

/// Prescaler and auto-reload that put `pwm_hz` on a 16-bit counter clocked at `timer_hz`.
fn timing(timer_hz: u32, pwm_hz: u32) -> (u16, u16) {
    let ticks = (timer_hz / pwm_hz.max(1)).max(2);
    let psc = (ticks - 1) / 0x1_0000;
    let arr = ticks / (psc + 1) - 1;
    (psc as u16, arr as u16)
}

/// Configure TIM4 for four PWM outputs at `pwm_hz`.
pub fn tim4(
    tim: pac::TIM4,
    timer_hz: u32,
    pwm_hz: u32,
) -> (
    PwmChannel<pac::TIM4, 1>,
    PwmChannel<pac::TIM4, 2>,
    PwmChannel<pac::TIM4, 3>,
    PwmChannel<pac::TIM4, 4>,
) {
    // SAFETY: single RMW of the clock enable bit during init
    let rcc = unsafe { &*pac::RCC::ptr() };
    rcc.apb1enr.modify(|_, w| w.tim4en().set_bit());

    let (psc, arr) = timing(timer_hz, pwm_hz);

    tim.cr1.modify(|_, w| w.cen().clear_bit());
    tim.psc.write(|w| unsafe { w.bits(psc as u32) });
    tim.arr.write(|w| unsafe { w.bits(arr as u32) });

    let mode = PWM_MODE_1_PRELOAD | (PWM_MODE_1_PRELOAD << 8);
    tim.ccmr1_output().write(|w| unsafe { w.bits(mode) });
    tim.ccmr2_output().write(|w| unsafe { w.bits(mode) });
    tim.ccer.write(|w| unsafe { w.bits(0) });

    // Load PSC/ARR before starting
    tim.cr1.modify(|_, w| w.arpe().set_bit());
    tim.egr.write(|w| unsafe { w.bits(1) });
    tim.cr1.modify(|_, w| w.cen().set_bit());

    let max_duty = arr.saturating_add(1);
    (
        PwmChannel::new(max_duty),
        PwmChannel::new(max_duty),
        PwmChannel::new(max_duty),
        PwmChannel::new(max_duty),
    )
}

/// Configure TIM9 channel 1 for a PWM output at `pwm_hz`.
pub fn tim9(tim: pac::TIM9, timer_hz: u32, pwm_hz: u32) -> PwmChannel<pac::TIM9, 1> {
    // SAFETY: single RMW of the clock enable bit during init
    let rcc = unsafe { &*pac::RCC::ptr() };
    rcc.apb2enr.modify(|_, w| w.tim9en().set_bit());

    let (psc, arr) = timing(timer_hz, pwm_hz);

    tim.cr1.modify(|_, w| w.cen().clear_bit());
    tim.psc.write(|w| unsafe { w.bits(psc as u32) });
    tim.arr.write(|w| unsafe { w.bits(arr as u32) });
    tim.ccmr1_output().write(|w| unsafe { w.bits(PWM_MODE_1_PRELOAD) });
    tim.ccer.write(|w| unsafe { w.bits(0) });

    tim.cr1.modify(|_, w| w.arpe().set_bit());
    tim.egr.write(|w| unsafe { w.bits(1) });
    tim.cr1.modify(|_, w| w.cen().set_bit());

    PwmChannel::new(arr.saturating_add(1))
}

impl<TIM, const C: u8> PwmChannel<TIM, C> {
    fn new(max_duty: u16) -> Self {
        Self {
            max_duty,
            _tim: PhantomData,
        }
    }

    /// CCxE bit for this channel.
    #[inline]
    const fn enable_mask() -> u32 {
        1 << (4 * (C as u32 - 1))
    }
}

impl<const C: u8> PwmPin for PwmChannel<pac::TIM4, C> {
    type Duty = u16;

    fn disable(&mut self) {
        // SAFETY: the timer was configured in `tim4`; channels only touch their own bits
        let tim = unsafe { &*pac::TIM4::ptr() };
        cortex_m::interrupt::free(|_| {
            tim.ccer
                .modify(|r, w| unsafe { w.bits(r.bits() & !Self::enable_mask()) })
        });
    }

    fn enable(&mut self) {
        let tim = unsafe { &*pac::TIM4::ptr() };
        cortex_m::interrupt::free(|_| {
            tim.ccer
                .modify(|r, w| unsafe { w.bits(r.bits() | Self::enable_mask()) })
        });
    }

    fn get_duty(&self) -> u16 {
        let tim = unsafe { &*pac::TIM4::ptr() };
        let bits = match C {
            1 => tim.ccr1.read().bits(),
            2 => tim.ccr2.read().bits(),
            3 => tim.ccr3.read().bits(),
            _ => tim.ccr4.read().bits(),
        };
        bits as u16
    }

    fn get_max_duty(&self) -> u16 {
        self.max_duty
    }

    fn set_duty(&mut self, duty: u16) {
        let tim = unsafe { &*pac::TIM4::ptr() };
        let duty = duty.min(self.max_duty) as u32;
        match C {
            1 => tim.ccr1.write(|w| unsafe { w.bits(duty) }),
            2 => tim.ccr2.write(|w| unsafe { w.bits(duty) }),
            3 => tim.ccr3.write(|w| unsafe { w.bits(duty) }),
            _ => tim.ccr4.write(|w| unsafe { w.bits(duty) }),
        }
    }
}

impl PwmPin for PwmChannel<pac::TIM9, 1> {
    type Duty = u16;

    fn disable(&mut self) {
        // SAFETY: TIM9 has a single user
        let tim = unsafe { &*pac::TIM9::ptr() };
        tim.ccer
            .modify(|r, w| unsafe { w.bits(r.bits() & !Self::enable_mask()) });
    }

    fn enable(&mut self) {
        let tim = unsafe { &*pac::TIM9::ptr() };
        tim.ccer
            .modify(|r, w| unsafe { w.bits(r.bits() | Self::enable_mask()) });
    }

    fn get_duty(&self) -> u16 {
        let tim = unsafe { &*pac::TIM9::ptr() };
        tim.ccr1.read().bits() as u16
    }

    fn get_max_duty(&self) -> u16 {
        self.max_duty
    }

    fn set_duty(&mut self, duty: u16) {
        let tim = unsafe { &*pac::TIM9::ptr() };
        let duty = duty.min(self.max_duty) as u32;
        tim.ccr1.write(|w| unsafe { w.bits(duty) });
    }
}
