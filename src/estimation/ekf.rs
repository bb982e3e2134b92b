// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Quaternion Extended Kalman Filter for attitude estimation.
//!
//! Fuses the gyroscope and accelerometer into a unit quaternion while estimating the gyro bias.
//!
//! ## State Vector (7 elements)
//!
//! | Index | Symbol | Description |
//! | ----- | ------ | ----------- |
//! | 0-3 | q0..q3 | Attitude quaternion (w, x, y, z) |
//! | 4-6 | bx, by, bz | Gyro bias (rad/s) |
//!
//! ## Measurement Model
//!
//! The normalized accelerometer is compared with the gravity direction predicted by the
//! quaternion:
//!
//! ```text
//! h(q) = [ 2(q1 q3 - q0 q2),  2(q0 q1 + q2 q3),  q0² - q1² - q2² + q3² ]
//! ```
//!
//! Yaw is unobservable from gravity alone and is pure gyro integration.
//!
//! ## Robustness
//!
//! - the accelerometer noise is inflated when |a| leaves 1 g or the body rotates fast
//! - the prior covariance is divided by the fading factor λ every step
//! - innovations failing a chi-square gate skip the correction; a long streak of rejections
//!   re-initializes the covariance and re-anchors to the accelerometer
//! - non-finite inputs skip the tick, a degenerate quaternion falls back to the identity
//!
//! `update` is the only per-tick entry point and must be called from a single context.

use core::marker::PhantomData;

use micromath::F32Ext;

use crate::config::EkfConfig;
use crate::math::{Libm, MathBackend, Matrix, Quaternion};
use crate::{log_debug, log_warn};

const N: usize = 7;

type Mat7 = Matrix<N, N>;

/// What the last call to [`QuaternionEkf::update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateKind {
    /// No update has run yet.
    None,
    /// Attitude seeded from the first usable accelerometer sample.
    Initialized,
    /// Prediction followed by an accepted accelerometer correction.
    Corrected,
    /// Prediction only; the accelerometer sample failed the chi-square gate.
    Gated,
    /// Covariance re-initialized after too many rejections, correction forced.
    Reanchored,
    /// Prediction only; the accelerometer carried no usable direction.
    PredictOnly,
    /// Non-finite input, state untouched.
    Skipped,
}

/// Published filter output.
///
/// Angles are in degrees, rates in rad/s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationEstimate {
    pub quaternion: Quaternion,
    pub gyro_bias: [f32; 3],
    /// Bias-corrected angular rate.
    pub gyro: [f32; 3],

    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub yaw_round_count: i32,
    /// `yaw_round_count * 360 + yaw`, continuous across ±180°.
    pub yaw_total_angle: f32,

    /// Low-passed, normalized accelerometer direction.
    pub accel_reference: [f32; 3],
    pub gyro_norm: f32,
    pub accel_norm: f32,
    /// Reciprocal of the adaptive measurement-noise scale, 1.0 = full trust.
    pub accel_trust: f32,
    pub chi_square: f32,

    pub update_count: u32,
    pub error_count: u32,
    pub skipped_count: u32,
    pub converged: bool,
    pub stable: bool,
    pub last_update: UpdateKind,
}

impl OrientationEstimate {
    pub const fn new() -> Self {
        Self {
            quaternion: Quaternion::identity(),
            gyro_bias: [0.0; 3],
            gyro: [0.0; 3],
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            yaw_round_count: 0,
            yaw_total_angle: 0.0,
            accel_reference: [0.0, 0.0, 1.0],
            gyro_norm: 0.0,
            accel_norm: 1.0,
            accel_trust: 1.0,
            chi_square: 0.0,
            update_count: 0,
            error_count: 0,
            skipped_count: 0,
            converged: false,
            stable: false,
            last_update: UpdateKind::None,
        }
    }
}

impl Default for OrientationEstimate {
    fn default() -> Self {
        Self::new()
    }
}

/// Quaternion EKF with gyro-bias estimation.
pub struct QuaternionEkf<M: MathBackend = Libm> {
    config: EkfConfig,

    q: Quaternion,
    bias: [f32; 3],
    p: Mat7,

    accel_filtered: [f32; 3],
    initialized: bool,
    consecutive_rejections: u32,
    corrections: u32,

    estimate: OrientationEstimate,
    _math: PhantomData<M>,
}

impl<M: MathBackend> QuaternionEkf<M> {
    /// Create a filter. The attitude is seeded by the first valid accelerometer sample.
    pub fn new(config: EkfConfig) -> Self {
        Self {
            config,
            q: Quaternion::identity(),
            bias: [0.0; 3],
            p: initial_covariance(&config),
            accel_filtered: [0.0, 0.0, 1.0],
            initialized: false,
            consecutive_rejections: 0,
            corrections: 0,
            estimate: OrientationEstimate::new(),
            _math: PhantomData,
        }
    }

    /// Return to the freshly constructed state.
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    /// Zero the heading while keeping roll and pitch.
    pub fn reset_yaw(&mut self) {
        let e = self.q.to_euler::<M>();
        self.q = Quaternion::from_euler::<M>(e.roll, e.pitch, 0.0);
        self.q.normalize::<M>();
        self.estimate.quaternion = self.q;
        self.estimate.yaw = 0.0;
        self.estimate.yaw_round_count = 0;
        self.estimate.yaw_total_angle = 0.0;
    }

    /// Swap in new tuning. State and covariance are kept.
    pub fn set_config(&mut self, config: EkfConfig) {
        self.config = config;
    }

    #[inline]
    pub fn config(&self) -> &EkfConfig {
        &self.config
    }

    #[inline]
    pub fn estimate(&self) -> &OrientationEstimate {
        &self.estimate
    }

    #[inline]
    pub fn covariance(&self) -> &Matrix<N, N> {
        &self.p
    }

    /// Advance the filter by one sample period.
    ///
    /// `gx, gy, gz` in rad/s, `ax, ay, az` in g.
    pub fn update(&mut self, gx: f32, gy: f32, gz: f32, ax: f32, ay: f32, az: f32) {
        let gyro = [gx, gy, gz];
        let accel = [ax, ay, az];

        if !gyro.iter().chain(accel.iter()).all(|v| v.is_finite()) {
            self.estimate.skipped_count = self.estimate.skipped_count.wrapping_add(1);
            self.estimate.last_update = UpdateKind::Skipped;
            log_debug!("ekf: non-finite sample skipped");
            return;
        }

        let dt = self.config.dt;
        self.filter_accel(accel, dt);

        let accel_norm = norm3::<M>(self.accel_filtered);
        let omega = [gx - self.bias[0], gy - self.bias[1], gz - self.bias[2]];
        let gyro_norm = norm3::<M>(omega);

        if !self.initialized {
            if let Some(q) = Quaternion::from_gravity::<M>(self.accel_filtered) {
                self.q = q;
                self.initialized = true;
                self.publish(UpdateKind::Initialized, omega, gyro_norm, accel_norm, 1.0, 0.0);
                return;
            }
        }

        self.predict(omega, dt);

        if !self.q.normalize::<M>() {
            self.recover("degenerate quaternion after prediction");
        }

        if accel_norm < 1e-3 {
            self.publish(UpdateKind::PredictOnly, omega, gyro_norm, accel_norm, 0.0, 0.0);
            return;
        }

        let (kind, trust, chi_square) = self.correct(accel_norm, gyro_norm);

        if !self.q.normalize::<M>() {
            self.recover("degenerate quaternion after correction");
        }
        if !self.p.is_finite() {
            self.recover("non-finite covariance");
        }

        let omega = [gx - self.bias[0], gy - self.bias[1], gz - self.bias[2]];
        self.publish(kind, omega, gyro_norm, accel_norm, trust, chi_square);
    }

    /// Time-constant low-pass on the raw accelerometer.
    fn filter_accel(&mut self, accel: [f32; 3], dt: f32) {
        let tau = self.config.accel_lpf_time_constant;
        if !self.initialized || tau <= 0.0 {
            self.accel_filtered = accel;
            return;
        }
        let k_old = tau / (dt + tau);
        let k_new = dt / (dt + tau);
        for i in 0..3 {
            self.accel_filtered[i] = self.accel_filtered[i] * k_old + accel[i] * k_new;
        }
    }

    fn predict(&mut self, omega: [f32; 3], dt: f32) {
        let prior = self.q;
        self.q.integrate(omega, dt);

        // ----- State transition Jacobian -----
        let [wx, wy, wz] = omega;
        let h = 0.5 * dt;
        let Quaternion { w, x, y, z } = prior;

        let mut f = Mat7::identity();

        // dq/dq = I + 0.5 dt Ω(ω)
        let omega_m = [
            [0.0, -wx, -wy, -wz],
            [wx, 0.0, wz, -wy],
            [wy, -wz, 0.0, wx],
            [wz, wy, -wx, 0.0],
        ];
        for (i, row) in omega_m.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                f[(i, j)] += h * v;
            }
        }

        // dq/db = -0.5 dt Ξ(q)
        let xi = [[-x, -y, -z], [w, -z, y], [z, w, -x], [-y, x, w]];
        for (i, row) in xi.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                f[(i, 4 + j)] = -h * v;
            }
        }

        // ----- Covariance propagation with fading -----
        let inv_lambda = 1.0 / self.config.fading_factor;
        let mut p = f.mul(&self.p).mul(&f.transpose()).scale(inv_lambda);

        let qa = self.config.process_noise_attitude * dt;
        let qb = self.config.process_noise_bias * dt;
        for i in 0..4 {
            p[(i, i)] += qa;
        }
        for i in 4..N {
            p[(i, i)] += qb;
        }

        p.symmetrize();
        self.p = p;
        self.bound_covariance();
    }

    /// Accelerometer correction. Returns the outcome, the published trust and the chi-square.
    fn correct(&mut self, accel_norm: f32, gyro_norm: f32) -> (UpdateKind, f32, f32) {
        let inv_norm = 1.0 / accel_norm;
        let measured = [
            self.accel_filtered[0] * inv_norm,
            self.accel_filtered[1] * inv_norm,
            self.accel_filtered[2] * inv_norm,
        ];

        let predicted = self.q.gravity();
        let innovation = Matrix([
            [measured[0] - predicted[0]],
            [measured[1] - predicted[1]],
            [measured[2] - predicted[2]],
        ]);

        let h = self.measurement_jacobian();

        // ----- Adaptive measurement trust -----
        let deviation = accel_norm - 1.0;
        let scale = 1.0
            + self.config.accel_trust_gain * deviation * deviation
            + self.config.gyro_trust_gain * gyro_norm * gyro_norm;
        let r = self.config.measurement_noise_accel * scale;
        let trust = 1.0 / scale;

        let Some(s_inv) = self.innovation_inverse(&h, r) else {
            self.recover("singular innovation covariance");
            return (UpdateKind::PredictOnly, trust, 0.0);
        };

        let chi_square = innovation.transpose().mul(&s_inv).mul(&innovation)[(0, 0)];

        // ----- Innovation gating -----
        let mut kind = UpdateKind::Corrected;
        let mut s_inv = s_inv;
        if !(chi_square <= self.config.chi_square_threshold) {
            self.estimate.error_count = self.estimate.error_count.wrapping_add(1);
            self.consecutive_rejections += 1;

            if self.consecutive_rejections < self.config.max_consecutive_rejections {
                return (UpdateKind::Gated, trust, chi_square);
            }

            log_warn!(
                "ekf: {} consecutive rejections, re-anchoring (chi2 {})",
                self.consecutive_rejections,
                chi_square
            );
            self.p = initial_covariance(&self.config);
            self.corrections = 0;
            kind = UpdateKind::Reanchored;
            match self.innovation_inverse(&h, r) {
                Some(inv) => s_inv = inv,
                None => return (UpdateKind::PredictOnly, trust, chi_square),
            }
        }
        self.consecutive_rejections = 0;

        // ----- Kalman update -----
        let k = self.p.mul(&h.transpose()).mul(&s_inv);
        let dx = k.mul(&innovation);

        self.q.w += dx[(0, 0)];
        self.q.x += dx[(1, 0)];
        self.q.y += dx[(2, 0)];
        self.q.z += dx[(3, 0)];

        let max_bias = self.config.max_bias;
        for i in 0..3 {
            self.bias[i] = (self.bias[i] + dx[(4 + i, 0)]).clamp(-max_bias, max_bias);
        }

        let ikh = Mat7::identity().sub(&k.mul(&h));
        let mut p = ikh.mul(&self.p);
        p.symmetrize();
        self.p = p;
        self.bound_covariance();

        self.corrections = self.corrections.saturating_add(1);
        (kind, trust, chi_square)
    }

    /// Jacobian of the gravity projection with respect to the state.
    fn measurement_jacobian(&self) -> Matrix<3, N> {
        let Quaternion { w, x, y, z } = self.q;
        let mut h = Matrix::<3, N>::zeros();

        h.0[0][..4].copy_from_slice(&[-2.0 * y, 2.0 * z, -2.0 * w, 2.0 * x]);
        h.0[1][..4].copy_from_slice(&[2.0 * x, 2.0 * w, 2.0 * z, 2.0 * y]);
        h.0[2][..4].copy_from_slice(&[2.0 * w, -2.0 * x, -2.0 * y, 2.0 * z]);

        h
    }

    fn innovation_inverse(&self, h: &Matrix<3, N>, r: f32) -> Option<Matrix<3, 3>> {
        let mut s = h.mul(&self.p).mul(&h.transpose());
        for i in 0..3 {
            s[(i, i)] += r;
        }
        s.try_inverse()
    }

    /// Cap the diagonal, rescaling the matching row and column so P stays positive semi-definite.
    fn bound_covariance(&mut self) {
        for i in 0..N {
            let max = if i < 4 {
                self.config.max_covariance
            } else {
                self.config.initial_bias_variance
            };
            let v = self.p[(i, i)];
            if v > max {
                let s = M::sqrt(max / v);
                for j in 0..N {
                    self.p[(i, j)] *= s;
                    self.p[(j, i)] *= s;
                }
                self.p[(i, i)] = max;
            } else if v < 0.0 {
                self.p[(i, i)] = 0.0;
            }
        }
    }

    /// Fall back to a safe state after a numeric fault.
    fn recover(&mut self, reason: &'static str) {
        log_warn!("ekf: {}, resetting attitude", reason);
        if !self.q.is_finite() || self.q.norm_squared() < 1e-12 {
            self.q = Quaternion::identity();
        }
        if !self.bias.iter().all(|b| b.is_finite()) {
            self.bias = [0.0; 3];
        }
        self.p = initial_covariance(&self.config);
        self.corrections = 0;
        self.estimate.error_count = self.estimate.error_count.wrapping_add(1);
    }

    fn publish(
        &mut self,
        kind: UpdateKind,
        omega: [f32; 3],
        gyro_norm: f32,
        accel_norm: f32,
        trust: f32,
        chi_square: f32,
    ) {
        let euler = self.q.to_euler::<M>().to_degrees();
        let e = &mut self.estimate;

        if e.update_count > 0 {
            let delta = euler.yaw - e.yaw;
            if delta > 180.0 {
                e.yaw_round_count -= 1;
            } else if delta < -180.0 {
                e.yaw_round_count += 1;
            }
        }

        e.quaternion = self.q;
        e.gyro_bias = self.bias;
        e.gyro = omega;
        e.roll = euler.roll;
        e.pitch = euler.pitch;
        e.yaw = euler.yaw;
        e.yaw_total_angle = e.yaw_round_count as f32 * 360.0 + euler.yaw;

        if accel_norm > 1e-3 {
            let inv = 1.0 / accel_norm;
            e.accel_reference = [
                self.accel_filtered[0] * inv,
                self.accel_filtered[1] * inv,
                self.accel_filtered[2] * inv,
            ];
        }
        e.gyro_norm = gyro_norm;
        e.accel_norm = accel_norm;
        e.accel_trust = trust;
        e.chi_square = chi_square;

        e.update_count = e.update_count.wrapping_add(1);
        e.converged =
            self.corrections >= self.config.convergence_ticks && self.consecutive_rejections == 0;
        e.stable = gyro_norm < 0.3 && (accel_norm - 1.0).abs() < 0.1;
        e.last_update = kind;
    }
}

fn initial_covariance(config: &EkfConfig) -> Mat7 {
    let a = config.initial_attitude_variance;
    let b = config.initial_bias_variance;
    Mat7::diagonal(&[a, a, a, a, b, b, b])
}

fn norm3<M: MathBackend>(v: [f32; 3]) -> f32 {
    M::sqrt(v[0] * v[0] + v[1] * v[1] + v[2] * v[2])
}
