//! Haptic command encoding
//!
//! One byte drives the vibration motor: the top 5 bits select the duty cycle
//! (0-31) and the bottom 3 bits the drive frequency (0-7).

use super::constants::*;

/// Encoded haptic command.
///
/// Two commands compare equal when they produce the same payload byte,
/// regardless of the percentages they were built from.
#[derive(Debug, Clone, Copy)]
pub struct HapticFeedback {
    payload: u8,
    duty_level: u8,
    frequency_level: u8,
}

impl HapticFeedback {
    /// Build a command from duty-cycle and frequency fractions in `[0, 1]`.
    ///
    /// Out-of-range inputs are clamped.
    pub fn new(duty_cycle_percent: f32, frequency_percent: f32) -> Self {
        let duty_level = quantize(duty_cycle_percent, HAPTIC_DUTY_LEVELS);
        let frequency_level = quantize(frequency_percent, HAPTIC_FREQ_LEVELS);
        Self {
            payload: (duty_level << HAPTIC_DUTY_SHIFT) | (frequency_level & HAPTIC_FREQ_MASK),
            duty_level,
            frequency_level,
        }
    }

    /// Motor off.
    pub fn off() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn payload(&self) -> u8 {
        self.payload
    }

    pub fn duty_level(&self) -> u8 {
        self.duty_level
    }

    pub fn frequency_level(&self) -> u8 {
        self.frequency_level
    }

    /// Drive frequency in Hz.
    pub fn frequency_hz(&self) -> f32 {
        HAPTIC_FREQ_STEP_HZ * self.frequency_level as f32 + HAPTIC_BASE_FREQ_HZ
    }

    /// Duty cycle in percent (0-100).
    pub fn duty_cycle_percent(&self) -> f32 {
        self.duty_level as f32 * 100.0 / HAPTIC_DUTY_LEVELS
    }
}

impl PartialEq for HapticFeedback {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

impl Eq for HapticFeedback {}

#[inline]
fn quantize(percent: f32, levels: f32) -> u8 {
    let p = if percent.is_nan() { 0.0 } else { percent.clamp(0.0, 1.0) };
    (p * levels).round() as u8
}
