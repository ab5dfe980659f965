//! Madgwick-style AHRS with gain ramp
//!
//! Gyroscope integration corrected by the gravity direction (accelerometer)
//! and the west direction (accelerometer × magnetometer). The correction gain
//! starts high so the filter locks onto the initial attitude quickly, then
//! ramps down to the configured gain over the initialisation period.
//!
//! # Frame convention
//!
//! Earth frame is North-West-Up. The quaternion rotates sensor-frame vectors
//! into the earth frame.
//!
//! # Example
//!
//! ```
//! use revex_io::core::types::Vector3;
//! use revex_io::fusion::{Ahrs, AhrsConfig};
//!
//! let mut ahrs = Ahrs::new(AhrsConfig::default());
//! let gyro = Vector3::ZERO;
//! let accel = Vector3::new(0.0, 0.0, 1.0);
//! let mag = Vector3::new(30.0, 0.0, -20.0);
//! ahrs.update(gyro, accel, mag, 0.01);
//! assert!((ahrs.quaternion().norm() - 1.0).abs() < 1e-5);
//! ```

use crate::config::FusionConfig;
use crate::core::types::{EulerAngles, Quaternion, Vector3};

/// Parameters for [`Ahrs`]
#[derive(Debug, Clone, Copy)]
pub struct AhrsConfig {
    /// Steady-state feedback gain
    pub gain: f32,
    /// Gain at start-up
    pub initial_gain: f32,
    /// Seconds to ramp from `initial_gain` to `gain`
    pub initialisation_period: f32,
    /// Accepted magnetic field magnitude window (µT)
    pub min_magnetic_field: f32,
    pub max_magnetic_field: f32,
    /// Use the magnetometer for heading correction
    pub use_magnetometer: bool,
}

impl Default for AhrsConfig {
    fn default() -> Self {
        Self::from(&FusionConfig::default())
    }
}

impl From<&FusionConfig> for AhrsConfig {
    fn from(config: &FusionConfig) -> Self {
        Self {
            gain: config.gain,
            initial_gain: config.initial_gain,
            initialisation_period: config.initialisation_period,
            min_magnetic_field: config.min_magnetic_field,
            max_magnetic_field: config.max_magnetic_field,
            use_magnetometer: config.use_magnetometer,
        }
    }
}

/// Attitude and heading reference system
#[derive(Debug, Clone)]
pub struct Ahrs {
    gain: f32,
    initial_gain: f32,
    initialisation_period: f32,
    min_mag_sq: f32,
    max_mag_sq: f32,
    use_magnetometer: bool,
    ramped_gain: f32,
    quaternion: Quaternion,
    linear_acceleration: Vector3,
}

impl Ahrs {
    pub fn new(config: AhrsConfig) -> Self {
        Self::with_orientation(config, Quaternion::identity())
    }

    /// Start from a known orientation instead of identity.
    pub fn with_orientation(config: AhrsConfig, mut initial: Quaternion) -> Self {
        initial.normalize();
        Self {
            gain: config.gain,
            initial_gain: config.initial_gain,
            initialisation_period: config.initialisation_period,
            min_mag_sq: config.min_magnetic_field * config.min_magnetic_field,
            max_mag_sq: config.max_magnetic_field * config.max_magnetic_field,
            use_magnetometer: config.use_magnetometer,
            ramped_gain: config.initial_gain,
            quaternion: initial,
            linear_acceleration: Vector3::ZERO,
        }
    }

    /// Set the accepted magnetic field magnitude window in µT.
    pub fn set_magnetic_field_limits(&mut self, min: f32, max: f32) {
        self.min_mag_sq = min * min;
        self.max_mag_sq = max * max;
    }

    /// Advance the filter by one sample.
    ///
    /// # Arguments
    /// * `gyro` - Bias-corrected angular rate in deg/s
    /// * `accel` - Acceleration in g
    /// * `mag` - Calibrated magnetic field in µT
    /// * `dt` - Sample period in seconds
    pub fn update(&mut self, gyro: Vector3, accel: Vector3, mag: Vector3, dt: f32) {
        let q = self.quaternion;
        let half_gravity = q.half_gravity();

        let mut half_error = Vector3::ZERO;
        if !accel.is_zero() {
            half_error = accel.normalize().cross(half_gravity);

            let mag_sq = mag.magnitude_squared();
            if self.use_magnetometer && mag_sq >= self.min_mag_sq && mag_sq <= self.max_mag_sq {
                let west = accel.cross(mag).normalize();
                half_error += west.cross(q.half_west());
            }
        }

        let feedback_gain = self.ramp_gain(dt);

        let half_gyro = gyro.to_radians() * 0.5 + half_error * feedback_gain;
        self.quaternion = q + q.mul_vector(half_gyro * dt);
        self.quaternion.normalize();

        let gravity = self.quaternion.half_gravity() * 2.0;
        self.linear_acceleration = accel - gravity;
    }

    fn ramp_gain(&mut self, dt: f32) -> f32 {
        if self.gain == 0.0 {
            self.ramped_gain = 0.0;
        }
        if self.ramped_gain > self.gain {
            self.ramped_gain -= (self.initial_gain - self.gain) * dt / self.initialisation_period;
            self.ramped_gain = self.ramped_gain.max(self.gain);
            return self.ramped_gain;
        }
        self.gain
    }

    /// True while the start-up gain ramp is still running.
    pub fn is_initialising(&self) -> bool {
        self.ramped_gain > self.gain
    }

    pub fn quaternion(&self) -> Quaternion {
        self.quaternion
    }

    pub fn euler(&self) -> EulerAngles {
        self.quaternion.to_euler()
    }

    /// Acceleration with gravity removed, in g.
    pub fn linear_acceleration(&self) -> Vector3 {
        self.linear_acceleration
    }

    /// Rotate the orientation about the earth Z axis so its heading is `yaw_deg`.
    pub fn set_yaw(&mut self, yaw_deg: f32) {
        let q = self.quaternion;
        let current_yaw = (q.x * q.y + q.w * q.z).atan2(q.w * q.w - 0.5 + q.x * q.x);
        let half_delta = 0.5 * (current_yaw - yaw_deg.to_radians());
        let correction = Quaternion::new(half_delta.cos(), 0.0, 0.0, -half_delta.sin());
        self.quaternion = correction * q;
        self.quaternion.normalize();
    }

    /// Return to identity and restart the gain ramp.
    pub fn reset(&mut self) {
        self.quaternion = Quaternion::identity();
        self.linear_acceleration = Vector3::ZERO;
        self.ramped_gain = self.initial_gain;
    }
}
