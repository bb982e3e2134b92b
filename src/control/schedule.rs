// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Static cyclic executive for the control loops.
//!
//! One counter advances per tick; a loop runs when the counter is a multiple of its period. The
//! counter wraps at the least common multiple of all periods so phase alignment survives the wrap.

use crate::config::{CascadeConfig, SteeringConfig};

/// Which loops run on the current tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Due {
    pub speed: bool,
    pub angle: bool,
    pub rate: bool,
    pub drive: bool,
    pub steering: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSchedule {
    count: u32,
    wrap: u32,
    speed: u32,
    angle: u32,
    rate: u32,
    drive: u32,
    steering: u32,
}

impl LoopSchedule {
    pub fn new(cascade: &CascadeConfig, steering: &SteeringConfig) -> Self {
        let periods = [
            cascade.speed_period.max(1),
            cascade.angle_period.max(1),
            cascade.rate_period.max(1),
            cascade.drive_period.max(1),
            steering.period.max(1),
        ];
        // Saturates at u32::MAX when the periods share no useful multiple; both operands then stay
        // within u32, so the product never overflows u64.
        let wrap = periods
            .iter()
            .fold(1u64, |acc, &p| lcm(acc, p as u64).min(u32::MAX as u64));

        Self {
            count: 0,
            wrap: wrap as u32,
            speed: periods[0],
            angle: periods[1],
            rate: periods[2],
            drive: periods[3],
            steering: periods[4],
        }
    }

    /// Step to the next tick and report the loops that are due.
    pub fn advance(&mut self) -> Due {
        self.count = self.count % self.wrap + 1;
        let c = self.count;
        Due {
            speed: c % self.speed == 0,
            angle: c % self.angle == 0,
            rate: c % self.rate == 0,
            drive: c % self.drive == 0,
            steering: c % self.steering == 0,
        }
    }

    /// Counter value of the latest tick, in `1..=wrap`.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn wrap(&self) -> u32 {
        self.wrap
    }

    /// Whether encoders must be sampled this tick (the speed or drive loop is about to run).
    #[inline]
    pub fn samples_encoders(due: &Due) -> bool {
        due.speed || due.drive
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn lcm(a: u64, b: u64) -> u64 {
    a / gcd(a, b) * b
}
