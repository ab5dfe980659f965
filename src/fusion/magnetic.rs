//! Magnetometer calibration
//!
//! - [`MagneticCalibration`]: applies soft-iron and hard-iron correction
//! - [`HardIronEstimator`]: estimates the hard-iron offset from raw samples
//!   collected while the device is rotated through all orientations

use crate::core::types::{Matrix3, Vector3};

/// Soft-iron then hard-iron correction
#[derive(Debug, Clone, Copy, Default)]
pub struct MagneticCalibration {
    pub soft_iron: Matrix3,
    pub hard_iron: Vector3,
}

impl MagneticCalibration {
    pub fn new(soft_iron: Matrix3, hard_iron: Vector3) -> Self {
        Self {
            soft_iron,
            hard_iron,
        }
    }

    /// Calibrated field in µT.
    pub fn apply(&self, raw: Vector3) -> Vector3 {
        self.soft_iron * raw - self.hard_iron
    }
}

/// Running min/max hard-iron estimator
#[derive(Debug, Clone, Default)]
pub struct HardIronEstimator {
    min: Option<Vector3>,
    max: Option<Vector3>,
    samples: usize,
}

impl HardIronEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, raw: Vector3) {
        self.min = Some(self.min.map_or(raw, |m| m.min(raw)));
        self.max = Some(self.max.map_or(raw, |m| m.max(raw)));
        self.samples += 1;
    }

    pub fn sample_count(&self) -> usize {
        self.samples
    }

    /// Offset at the centre of the observed range.
    pub fn bias(&self) -> Option<Vector3> {
        let (min, max) = (self.min?, self.max?);
        Some((min + max) * 0.5)
    }

    /// Half of the observed range per axis, an estimate of the local field.
    pub fn field_radius(&self) -> Option<Vector3> {
        let (min, max) = (self.min?, self.max?);
        Some((max - min) * 0.5)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hard_iron_subtracted() {
        let cal = MagneticCalibration::new(Matrix3::identity(), Vector3::new(-26.025, 12.825, 12.825));
        let out = cal.apply(Vector3::new(0.0, 12.825, 40.0));
        assert_relative_eq!(out.x, 26.025, epsilon = 1e-4);
        assert_relative_eq!(out.y, 0.0, epsilon = 1e-4);
        assert_relative_eq!(out.z, 27.175, epsilon = 1e-4);
    }

    #[test]
    fn test_soft_iron_applied_first() {
        let soft = Matrix3::new([[2.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.5]]);
        let cal = MagneticCalibration::new(soft, Vector3::new(1.0, 1.0, 1.0));
        let out = cal.apply(Vector3::new(10.0, 10.0, 10.0));
        assert_eq!(out, Vector3::new(19.0, 9.0, 4.0));
    }

    #[test]
    fn test_estimator_sphere() {
        let mut est = HardIronEstimator::new();
        assert!(est.bias().is_none());

        let centre = Vector3::new(-20.0, 10.0, 5.0);
        let r = 40.0;
        for axis in [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        ] {
            est.update(centre + axis * r);
            est.update(centre - axis * r);
        }

        let bias = est.bias().unwrap();
        assert_relative_eq!(bias.x, -20.0);
        assert_relative_eq!(bias.y, 10.0);
        assert_relative_eq!(bias.z, 5.0);
        assert_relative_eq!(est.field_radius().unwrap().y, 40.0);
        assert_eq!(est.sample_count(), 6);
    }
}
