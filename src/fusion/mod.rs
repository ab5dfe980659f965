//! Calibration and orientation fusion
//!
//! [`FusionEngine`] runs each decoded sample through:
//!
//! 1. [`GyroBias`]: stationary gyroscope bias removal
//! 2. [`MagneticCalibration`]: soft-iron and hard-iron correction
//! 3. [`Ahrs`]: gravity and heading corrected orientation
//! 4. [`ExponentialMovingAverage`]: flexion angle smoothing
//!
//! The engine is owned by the consumer thread and is not shared.

pub mod ahrs;
pub mod bias;
pub mod magnetic;
pub mod smoothing;

pub use ahrs::{Ahrs, AhrsConfig};
pub use bias::GyroBias;
pub use magnetic::{HardIronEstimator, MagneticCalibration};
pub use smoothing::ExponentialMovingAverage;

use crate::config::FusionConfig;
use crate::core::types::{EulerAngles, Matrix3, Quaternion, SensorSample, Vector3};
use std::time::Duration;

/// Engine state after the most recent sample
#[derive(Debug, Clone, Copy, Default)]
pub struct FusionOutput {
    pub orientation: Quaternion,
    pub euler: EulerAngles,
    pub linear_acceleration: Vector3,
    /// Flexion from the latest sample, degrees
    pub flexion_angle_deg: f32,
    /// Smoothed flexion, degrees
    pub smoothed_flexion_deg: f32,
    /// Whether gyroscope bias estimation is running
    pub bias_active: bool,
}

/// Per-sample calibration and fusion pipeline
pub struct FusionEngine {
    config: FusionConfig,
    bias: GyroBias,
    magnetic: MagneticCalibration,
    ahrs: Ahrs,
    flexion: ExponentialMovingAverage,
    output: FusionOutput,
    samples: u64,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        let bias = GyroBias::new(
            config.stationary_threshold,
            config.stationary_period,
            config.bias_cutoff_hz,
        );
        let magnetic = MagneticCalibration::new(
            Matrix3::new(config.soft_iron_matrix),
            Vector3::from_array(config.hard_iron_bias),
        );
        let ahrs = Ahrs::new(AhrsConfig::from(&config));
        let flexion = ExponentialMovingAverage::new(config.flexion_smoothing);

        Self {
            config,
            bias,
            magnetic,
            ahrs,
            flexion,
            output: FusionOutput::default(),
            samples: 0,
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Fuse one sample taken `dt` seconds after the previous one.
    pub fn process(&mut self, sample: &SensorSample, dt: f32) -> FusionOutput {
        let gyro = self.bias.update(sample.angular_velocity, dt);
        let mag = self.magnetic.apply(sample.magnetic_field);
        self.ahrs.update(gyro, sample.linear_acceleration, mag, dt);

        let smoothed = self.flexion.update(sample.flexion_angle_deg);
        self.samples += 1;

        log::trace!(
            "Fusion: gyro=({:.2}, {:.2}, {:.2}) bias_active={} flex={:.1}",
            gyro.x,
            gyro.y,
            gyro.z,
            self.bias.is_active(),
            smoothed
        );

        self.output = FusionOutput {
            orientation: self.ahrs.quaternion(),
            euler: self.ahrs.euler(),
            linear_acceleration: self.ahrs.linear_acceleration(),
            flexion_angle_deg: sample.flexion_angle_deg,
            smoothed_flexion_deg: smoothed,
            bias_active: self.bias.is_active(),
        };
        self.output
    }

    /// Fuse a batch received over `elapsed`, splitting the period evenly.
    ///
    /// An empty batch leaves the state unchanged.
    pub fn process_batch(&mut self, samples: &[SensorSample], elapsed: Duration) -> FusionOutput {
        if samples.is_empty() {
            return self.output;
        }
        let dt = elapsed.as_secs_f32() / samples.len() as f32;
        let dt = if dt > 0.0 { dt } else { self.config.sample_period };
        for sample in samples {
            self.process(sample, dt);
        }
        self.output
    }

    pub fn output(&self) -> FusionOutput {
        self.output
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    pub fn is_initialising(&self) -> bool {
        self.ahrs.is_initialising()
    }

    pub fn gyro_bias(&self) -> Vector3 {
        self.bias.bias()
    }

    /// Re-zero the heading.
    pub fn set_yaw(&mut self, yaw_deg: f32) {
        self.ahrs.set_yaw(yaw_deg);
        self.output.orientation = self.ahrs.quaternion();
        self.output.euler = self.ahrs.euler();
    }

    /// Replace the hard-iron offset, e.g. after a calibration session.
    pub fn set_hard_iron_bias(&mut self, bias: Vector3) {
        self.magnetic.hard_iron = bias;
        self.config.hard_iron_bias = bias.to_array();
    }

    pub fn reset(&mut self) {
        self.bias.reset();
        self.ahrs.reset();
        self.flexion.reset();
        self.output = FusionOutput::default();
        self.samples = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn resting(flexion: f32) -> SensorSample {
        SensorSample {
            angular_velocity: Vector3::ZERO,
            linear_acceleration: Vector3::new(0.0, 0.0, 1.0),
            magnetic_field: Vector3::new(30.0, 0.0, -35.0),
            flexion_angle_deg: flexion,
        }
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut engine = FusionEngine::new(FusionConfig::default());
        let out = engine.process_batch(&[], Duration::from_millis(16));
        assert_eq!(out.orientation, Quaternion::identity());
        assert_eq!(engine.sample_count(), 0);
    }

    #[test]
    fn test_batch_splits_period() {
        let mut engine = FusionEngine::new(FusionConfig {
            gain: 0.0,
            stationary_threshold: 0.0,
            ..Default::default()
        });

        // 4 samples at 90 deg/s about Z over 1 s -> 90 degrees
        let spin = SensorSample {
            angular_velocity: Vector3::new(0.0, 0.0, 90.0),
            ..Default::default()
        };
        let out = engine.process_batch(&[spin; 4], Duration::from_secs(1));
        let (_, _, yaw) = out.euler.to_degrees();
        assert_relative_eq!(yaw, 90.0, epsilon = 2.0);
        assert_eq!(engine.sample_count(), 4);
    }

    #[test]
    fn test_flexion_smoothing() {
        let mut engine = FusionEngine::new(FusionConfig::default());
        engine.process(&resting(90.0), 0.01);
        let out = engine.process(&resting(140.0), 0.01);
        assert_eq!(out.flexion_angle_deg, 140.0);
        assert_relative_eq!(out.smoothed_flexion_deg, 130.0, epsilon = 1e-4);
    }

    #[test]
    fn test_resting_stays_identity() {
        let mut engine = FusionEngine::new(FusionConfig::default());
        let samples = vec![resting(120.0); 200];
        let out = engine.process_batch(&samples, Duration::from_secs(2));
        assert_relative_eq!(out.orientation.w, 1.0, epsilon = 1e-4);
        assert_relative_eq!(out.orientation.norm(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_set_yaw_updates_output() {
        let mut engine = FusionEngine::new(FusionConfig::default());
        engine.set_yaw(-45.0);
        let (_, _, yaw) = engine.output().euler.to_degrees();
        assert_relative_eq!(yaw, -45.0, epsilon = 1e-3);
    }
}
