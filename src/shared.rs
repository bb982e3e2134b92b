// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Copy-on-read snapshot shared between the control tick and a lower-priority reader.
//!
//! The control tick is the only writer. Readers (display, telemetry) get a full copy taken inside a
//! critical section, so they never observe a half-written value.
//!
//! ```
//! use cargobot::shared::Shared;
//!
//! static PITCH: Shared<f32> = Shared::new(0.0);
//!
//! PITCH.write(3.5);
//! assert_eq!(PITCH.read(), 3.5);
//! ```

use core::cell::UnsafeCell;

pub struct Shared<T: Copy> {
    value: UnsafeCell<T>,
}

// Safety: every access to `value` happens inside a critical section and copies the whole value.
unsafe impl<T: Copy + Send> Sync for Shared<T> {}
unsafe impl<T: Copy + Send> Send for Shared<T> {}

impl<T: Copy> Shared<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
        }
    }

    /// Copy of the latest value.
    pub fn read(&self) -> T {
        critical_section::with(|_cs| unsafe { *self.value.get() })
    }

    /// Replace the value.
    pub fn write(&self, value: T) {
        critical_section::with(|_cs| unsafe {
            *self.value.get() = value;
        });
    }

    /// Read-modify-write in one critical section.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        critical_section::with(|_cs| unsafe { f(&mut *self.value.get()) });
    }
}

impl<T: Copy + Default> Default for Shared<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
