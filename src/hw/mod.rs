// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! MCU-level wrappers for the STM32F777 board: encoder timers, PWM timers and the debug USART.

pub mod encoder;
pub mod pwm;
pub mod usart;

pub use encoder::{Encoder, WheelEncoders};
pub use pwm::PwmChannel;
pub use usart::Usart;
