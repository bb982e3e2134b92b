// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Control Algorithms
//!
//! Building blocks for the balance and steering loops. Everything here is plain numeric state: no
//! hardware access and no allocation.
//!
//! ## Modules
//!
//! - [`pid`] - Discrete PID controller with dead-zone gain scaling.
//! - [`filter`] - One-pole low-pass filter.
//! - [`schedule`] - Modulo-counter cyclic executive for the loop cadences.
//! - [`cascade`] - Speed → angle → rate balance cascade plus the drive-wheel loop.
//! - [`steering`] - Lane-following servo loop.
//! - [`turn_compensation`] - Cornering feed-forward on the balance target.

pub mod cascade;
pub mod filter;
pub mod pid;
pub mod schedule;
pub mod steering;
pub mod turn_compensation;

pub use cascade::{BalanceCascade, CascadeStatus};
pub use filter::LowPass;
pub use pid::{gain_factor, GainScale, Pid, PidStatus};
pub use schedule::{Due, LoopSchedule};
pub use steering::Steering;
pub use turn_compensation::{TurnCompensator, TurnModel};
