// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Unit quaternion attitude representation.
//!
//! Convention: Hamilton product, body-to-world rotation, ZYX (yaw-pitch-roll) Euler order. With the
//! robot level the accelerometer reads `+1 g` on Z, which is what [`Quaternion::gravity`] returns
//! for the identity.

use super::MathBackend;

/// Roll, pitch, yaw in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EulerAngles {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl EulerAngles {
    pub fn to_degrees(self) -> Self {
        Self {
            roll: self.roll.to_degrees(),
            pitch: self.pitch.to_degrees(),
            yaw: self.yaw.to_degrees(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    /// Below this norm the quaternion carries no usable attitude.
    pub const DEGENERATE_NORM: f32 = 1e-6;

    pub const fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    pub fn as_array(&self) -> [f32; 4] {
        [self.w, self.x, self.y, self.z]
    }

    pub fn from_array(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }

    #[inline]
    pub fn norm_squared(&self) -> f32 {
        self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn norm<M: MathBackend>(&self) -> f32 {
        M::sqrt(self.norm_squared())
    }

    pub fn is_finite(&self) -> bool {
        self.w.is_finite() && self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Scale to unit length.
    ///
    /// A non-finite or degenerate quaternion is replaced by the identity and `false` is returned.
    pub fn normalize<M: MathBackend>(&mut self) -> bool {
        let n = self.norm::<M>();
        if !n.is_finite() || n < Self::DEGENERATE_NORM {
            *self = Self::identity();
            return false;
        }
        let inv = 1.0 / n;
        self.w *= inv;
        self.x *= inv;
        self.y *= inv;
        self.z *= inv;
        true
    }

    /// First-order integration of `q_dot = 0.5 * q ⊗ (0, omega)` over `dt` seconds.
    ///
    /// The result is not renormalized.
    pub fn integrate(&mut self, omega: [f32; 3], dt: f32) {
        let [wx, wy, wz] = omega;
        let h = 0.5 * dt;
        let Self { w, x, y, z } = *self;

        self.w += h * (-x * wx - y * wy - z * wz);
        self.x += h * (w * wx + y * wz - z * wy);
        self.y += h * (w * wy - x * wz + z * wx);
        self.z += h * (w * wz + x * wy - y * wx);
    }

    /// Gravity direction in the body frame, i.e. what a level, resting accelerometer reads.
    pub fn gravity(&self) -> [f32; 3] {
        let Self { w, x, y, z } = *self;
        [
            2.0 * (x * z - w * y),
            2.0 * (w * x + y * z),
            w * w - x * x - y * y + z * z,
        ]
    }

    pub fn to_euler<M: MathBackend>(&self) -> EulerAngles {
        let Self { w, x, y, z } = *self;

        let roll = M::atan2(2.0 * (w * x + y * z), 1.0 - 2.0 * (x * x + y * y));

        // Clamp for gimbal lock
        let sinp = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0);
        let pitch = M::asin(sinp);

        let yaw = M::atan2(2.0 * (w * z + x * y), 1.0 - 2.0 * (y * y + z * z));

        EulerAngles { roll, pitch, yaw }
    }

    pub fn from_euler<M: MathBackend>(roll: f32, pitch: f32, yaw: f32) -> Self {
        let (sr, cr) = (M::sin(roll * 0.5), M::cos(roll * 0.5));
        let (sp, cp) = (M::sin(pitch * 0.5), M::cos(pitch * 0.5));
        let (sy, cy) = (M::sin(yaw * 0.5), M::cos(yaw * 0.5));

        Self {
            w: cr * cp * cy + sr * sp * sy,
            x: sr * cp * cy - cr * sp * sy,
            y: cr * sp * cy + sr * cp * sy,
            z: cr * cp * sy - sr * sp * cy,
        }
    }

    /// Level attitude (yaw = 0) that explains an accelerometer reading, `None` if the reading has
    /// no usable direction.
    pub fn from_gravity<M: MathBackend>(accel: [f32; 3]) -> Option<Self> {
        let [ax, ay, az] = accel;
        let n = M::sqrt(ax * ax + ay * ay + az * az);
        if !n.is_finite() || n < 1e-3 {
            return None;
        }

        let roll = M::atan2(ay, az);
        let pitch = M::atan2(-ax, M::sqrt(ay * ay + az * az));

        let mut q = Self::from_euler::<M>(roll, pitch, 0.0);
        q.normalize::<M>();
        Some(q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Libm;
    use approx::assert_abs_diff_eq;

    #[test]
    fn identity_sees_gravity_on_z() {
        let g = Quaternion::identity().gravity();
        assert_eq!(g, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn degenerate_normalizes_to_identity() {
        let mut q = Quaternion::new(0.0, 0.0, 0.0, 0.0);
        assert!(!q.normalize::<Libm>());
        assert_eq!(q, Quaternion::identity());

        let mut q = Quaternion::new(f32::NAN, 0.0, 0.0, 0.0);
        assert!(!q.normalize::<Libm>());
        assert_eq!(q, Quaternion::identity());
    }

    #[test]
    fn euler_round_trip() {
        let (r, p, y) = (0.3_f32, -0.4_f32, 1.2_f32);
        let e = Quaternion::from_euler::<Libm>(r, p, y).to_euler::<Libm>();
        assert_abs_diff_eq!(e.roll, r, epsilon = 1e-5);
        assert_abs_diff_eq!(e.pitch, p, epsilon = 1e-5);
        assert_abs_diff_eq!(e.yaw, y, epsilon = 1e-5);
    }

    #[test]
    fn nose_up_pitch_matches_accelerometer_sign() {
        let theta = 20.0_f32.to_radians();
        let accel = [-libm::sinf(theta), 0.0, libm::cosf(theta)];
        let q = Quaternion::from_gravity::<Libm>(accel).unwrap();
        assert_abs_diff_eq!(q.to_euler::<Libm>().pitch, theta, epsilon = 1e-5);

        let g = q.gravity();
        for i in 0..3 {
            assert_abs_diff_eq!(g[i], accel[i], epsilon = 1e-5);
        }
    }

    #[test]
    fn integrating_yaw_rate_turns_about_z() {
        let mut q = Quaternion::identity();
        for _ in 0..1000 {
            q.integrate([0.0, 0.0, 1.0], 0.001);
            q.normalize::<Libm>();
        }
        let e = q.to_euler::<Libm>();
        assert_abs_diff_eq!(e.yaw, 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(e.roll, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn zero_vector_has_no_gravity_attitude() {
        assert!(Quaternion::from_gravity::<Libm>([0.0, 0.0, 0.0]).is_none());
    }
}
