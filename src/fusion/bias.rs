//! Gyroscope stationary-bias estimator
//!
//! While every axis of the bias-corrected gyroscope stays under the
//! stationary threshold, a timer accumulates. Once it reaches the stationary
//! period the bias estimate tracks the residual through a first-order
//! low-pass filter. Any motion resets the timer.

use crate::core::types::Vector3;
use std::f32::consts::PI;

/// Gyroscope bias estimator
#[derive(Debug, Clone)]
pub struct GyroBias {
    threshold: f32,
    stationary_period: f32,
    cutoff_hz: f32,
    stationary_timer: f32,
    bias: Vector3,
}

impl GyroBias {
    /// # Arguments
    /// * `threshold` - Stationary threshold in deg/s
    /// * `stationary_period` - Seconds of stillness before the bias adapts
    /// * `cutoff_hz` - Low-pass cutoff of the bias filter
    pub fn new(threshold: f32, stationary_period: f32, cutoff_hz: f32) -> Self {
        Self {
            threshold,
            stationary_period,
            cutoff_hz,
            stationary_timer: 0.0,
            bias: Vector3::ZERO,
        }
    }

    /// Correct one gyroscope reading (deg/s) and update the estimate.
    pub fn update(&mut self, gyro: Vector3, dt: f32) -> Vector3 {
        let corrected = gyro - self.bias;

        if corrected.any_abs_above(self.threshold) {
            self.stationary_timer = 0.0;
            return corrected;
        }

        self.stationary_timer = (self.stationary_timer + dt).min(self.stationary_period);
        if self.stationary_timer < self.stationary_period {
            return corrected;
        }

        self.bias += corrected * self.filter_coefficient(dt);
        corrected
    }

    /// Low-pass coefficient for one sample period.
    pub fn filter_coefficient(&self, dt: f32) -> f32 {
        2.0 * PI * self.cutoff_hz * dt
    }

    /// True once the device has been stationary long enough to adapt.
    pub fn is_active(&self) -> bool {
        self.stationary_timer >= self.stationary_period
    }

    pub fn bias(&self) -> Vector3 {
        self.bias
    }

    pub fn stationary_timer(&self) -> f32 {
        self.stationary_timer
    }

    pub fn reset(&mut self) {
        self.stationary_timer = 0.0;
        self.bias = Vector3::ZERO;
    }
}
