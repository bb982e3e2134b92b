// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Active buzzer on a GPIO line.
//!
//! [`Buzzer::beep`] starts a pattern that [`Buzzer::update`] advances from a periodic timer. A
//! count of zero repeats until [`Buzzer::silence`].

use embedded_hal::digital::v2::OutputPin;

use crate::actuators::AlarmSink;

/// Whether the buzzer is driven active-high or active-low on the board wiring.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActiveLevel {
    High,
    Low,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct Pattern {
    /// Beeps to play, 0 = continuous.
    total: u8,
    done: u8,
    on_ms: u16,
    off_ms: u16,
}

pub struct Buzzer<PIN: OutputPin> {
    pin: PIN,
    active_level: ActiveLevel,
    is_on: bool,
    pattern: Option<Pattern>,
    /// Time spent in the current on/off phase.
    phase_ms: u32,
}

impl<PIN: OutputPin> Buzzer<PIN> {
    /// Create a buzzer wrapper, initially silent.
    pub fn new(pin: PIN, active_level: ActiveLevel) -> Self {
        let mut buzzer = Self {
            pin,
            active_level,
            is_on: false,
            pattern: None,
            phase_ms: 0,
        };
        buzzer.set(false);
        buzzer
    }

    pub fn active_high(pin: PIN) -> Self {
        Self::new(pin, ActiveLevel::High)
    }

    pub fn active_low(pin: PIN) -> Self {
        Self::new(pin, ActiveLevel::Low)
    }

    /// Drive the buzzer on or off directly. Cancels any running pattern.
    pub fn set_manual(&mut self, on: bool) {
        self.pattern = None;
        self.set(on);
    }

    /// Advance the running pattern by `elapsed_ms`.
    pub fn update(&mut self, elapsed_ms: u32) {
        let Some(mut p) = self.pattern else {
            return;
        };
        self.phase_ms = self.phase_ms.saturating_add(elapsed_ms);

        if self.is_on {
            if self.phase_ms >= p.on_ms as u32 {
                self.set(false);
                self.phase_ms = 0;
                p.done = p.done.saturating_add(1);
                if p.total > 0 && p.done >= p.total {
                    self.pattern = None;
                    return;
                }
            }
        } else if self.phase_ms >= p.off_ms as u32 {
            self.set(true);
            self.phase_ms = 0;
        }
        self.pattern = Some(p);
    }

    #[inline]
    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn free(self) -> PIN {
        self.pin
    }

    fn set(&mut self, on: bool) {
        match (self.active_level, on) {
            (ActiveLevel::High, true) | (ActiveLevel::Low, false) => self.pin.set_high().ok(),
            (ActiveLevel::High, false) | (ActiveLevel::Low, true) => self.pin.set_low().ok(),
        };
        self.is_on = on;
    }
}

impl<PIN: OutputPin> AlarmSink for Buzzer<PIN> {
    /// Start `count` beeps (0 = continuous). The first beep sounds immediately.
    fn beep(&mut self, count: u8, on_ms: u16, off_ms: u16) {
        self.pattern = Some(Pattern {
            total: count,
            done: 0,
            on_ms,
            off_ms,
        });
        self.phase_ms = 0;
        self.set(true);
    }

    fn silence(&mut self) {
        self.pattern = None;
        self.set(false);
    }

    fn is_active(&self) -> bool {
        self.pattern.is_some()
    }
}
