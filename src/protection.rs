// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Protection Supervisor
//!
//! Two fault detectors gate actuation:
//!
//! - **Angle** (global): `|pitch|` above the threshold trips every actuator on the tick it is first
//!   seen. The trip is edge-triggered: it fires again only after the angle has come back within
//!   bounds and crossed out once more.
//! - **Stall** (per actuator): a large applied PWM with almost no encoder movement, sustained for
//!   `stall_detect_ticks` consecutive updates, trips that actuator.
//!
//! Any trip holds all actuators off (shared fail-safe). A trip auto-releases after
//! `cooldown_ticks`; an angle trip additionally waits until the robot is back within the
//! threshold. [`ProtectionSupervisor::reset`] releases immediately.
//!
//! ```text
//!            threshold crossed
//!   Normal ───────────────────► Protected ──(cooldown elapsed, or reset)──► Normal
//! ```

use micromath::F32Ext;

use crate::actuators::AlarmSink;
use crate::config::ProtectionConfig;
use crate::sensors::Wheel;
use crate::{log_info, log_warn};

/// Why an actuator was taken offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TripReason {
    Angle,
    Stall,
}

/// State transition reported by [`ProtectionSupervisor::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtectionEvent {
    /// `wheel` is `None` for the global angle trip.
    Tripped {
        wheel: Option<Wheel>,
        reason: TripReason,
    },
    Released,
}

/// Per-actuator bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtectionState {
    /// PWM actually applied on the previous tick.
    pub last_pwm: i16,
    /// Sign of the last non-zero command, `0` before the first one.
    pub last_direction: i8,
    /// Consecutive stalled updates.
    pub stall_count: u32,
    pub protected: bool,
    pub reason: Option<TripReason>,
    /// Supervisor tick at which the current trip was asserted.
    pub asserted_at: u32,
}

/// Signals sampled once per control tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProtectionInputs {
    /// Estimated pitch in degrees.
    pub pitch_deg: f32,
    /// PWM written to each actuator on the previous tick, indexed by [`Wheel::index`].
    pub applied_pwm: [i16; 2],
    /// Latest encoder delta for each actuator.
    pub encoder_delta: [i16; 2],
}

pub struct ProtectionSupervisor {
    config: ProtectionConfig,
    states: [ProtectionState; 2],
    ticks: u32,
    angle_triggered: bool,
}

impl ProtectionSupervisor {
    pub const fn new(config: ProtectionConfig) -> Self {
        Self {
            config,
            states: [ProtectionState {
                last_pwm: 0,
                last_direction: 0,
                stall_count: 0,
                protected: false,
                reason: None,
                asserted_at: 0,
            }; 2],
            ticks: 0,
            angle_triggered: false,
        }
    }

    pub fn set_config(&mut self, config: ProtectionConfig) {
        self.config = config;
    }

    #[inline]
    pub fn config(&self) -> &ProtectionConfig {
        &self.config
    }

    /// Advance one tick. Call every control tick.
    pub fn update(
        &mut self,
        inputs: &ProtectionInputs,
        alarm: &mut impl AlarmSink,
    ) -> Option<ProtectionEvent> {
        self.ticks = self.ticks.wrapping_add(1);

        for wheel in Wheel::ALL {
            let state = &mut self.states[wheel.index()];
            let pwm = inputs.applied_pwm[wheel.index()];
            state.last_pwm = pwm;
            if pwm != 0 {
                state.last_direction = pwm.signum() as i8;
            }
        }

        // ----- Angle (highest priority, all actuators) -----
        if self.check_angle(inputs.pitch_deg) {
            for state in self.states.iter_mut() {
                Self::assert_trip(state, TripReason::Angle, self.ticks);
            }
            log_warn!("angle protection: pitch {} deg", inputs.pitch_deg);
            self.sound(alarm);
            return Some(ProtectionEvent::Tripped {
                wheel: None,
                reason: TripReason::Angle,
            });
        }

        if self.any_protected() {
            if self.releasable(inputs.pitch_deg) {
                self.release();
                alarm.silence();
                log_info!("protection released after cooldown");
                return Some(ProtectionEvent::Released);
            }
            return None;
        }

        // ----- Stall (per actuator) -----
        if !self.config.stall_enabled {
            for state in self.states.iter_mut() {
                state.stall_count = 0;
            }
            return None;
        }

        let pwm_threshold = self.config.stall_pwm_threshold;
        let encoder_threshold = self.config.stall_encoder_threshold;
        for wheel in Wheel::ALL {
            let state = &mut self.states[wheel.index()];
            let pwm = state.last_pwm.unsigned_abs();
            let moved = inputs.encoder_delta[wheel.index()].unsigned_abs();

            if pwm > pwm_threshold && moved < encoder_threshold {
                state.stall_count += 1;
                if state.stall_count >= self.config.stall_detect_ticks {
                    state.stall_count = 0;
                    Self::assert_trip(state, TripReason::Stall, self.ticks);
                    log_warn!("stall protection on {:?}", wheel);
                    self.sound(alarm);
                    return Some(ProtectionEvent::Tripped {
                        wheel: Some(wheel),
                        reason: TripReason::Stall,
                    });
                }
            } else {
                state.stall_count = 0;
            }
        }

        None
    }

    /// Clear every trip and counter and silence the alarm.
    pub fn reset(&mut self, alarm: &mut impl AlarmSink) {
        self.release();
        for state in self.states.iter_mut() {
            state.stall_count = 0;
        }
        alarm.silence();
    }

    /// True while any actuator holds a trip; one fault stops every actuator.
    #[inline]
    pub fn is_protected(&self, _wheel: Wheel) -> bool {
        self.any_protected()
    }

    pub fn any_protected(&self) -> bool {
        self.states.iter().any(|s| s.protected)
    }

    /// Reason recorded for this actuator's own trip.
    #[inline]
    pub fn trip_reason(&self, wheel: Wheel) -> Option<TripReason> {
        self.states[wheel.index()].reason
    }

    #[inline]
    pub fn state(&self, wheel: Wheel) -> ProtectionState {
        self.states[wheel.index()]
    }

    /// Rising edge of `|pitch| > threshold`.
    fn check_angle(&mut self, pitch: f32) -> bool {
        if !self.config.angle_enabled {
            self.angle_triggered = false;
            return false;
        }

        if pitch.abs() > self.config.angle_threshold_deg {
            let edge = !self.angle_triggered;
            self.angle_triggered = true;
            edge
        } else {
            self.angle_triggered = false;
            false
        }
    }

    fn releasable(&self, pitch: f32) -> bool {
        let within_bounds = pitch.abs() <= self.config.angle_threshold_deg;
        self.states.iter().filter(|s| s.protected).all(|s| {
            let held = self.ticks.wrapping_sub(s.asserted_at);
            let cooled = held >= self.config.cooldown_ticks;
            match s.reason {
                Some(TripReason::Angle) => cooled && within_bounds,
                _ => cooled,
            }
        })
    }

    fn release(&mut self) {
        for state in self.states.iter_mut() {
            state.protected = false;
            state.reason = None;
        }
    }

    fn assert_trip(state: &mut ProtectionState, reason: TripReason, tick: u32) {
        state.protected = true;
        state.reason = Some(reason);
        state.asserted_at = tick;
    }

    fn sound(&self, alarm: &mut impl AlarmSink) {
        if !alarm.is_active() {
            let a = self.config.alarm;
            alarm.beep(a.count, a.on_ms, a.off_ms);
        }
    }
}
