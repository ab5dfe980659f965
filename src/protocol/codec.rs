//! Sensor packet codec
//!
//! A packet is 22 bytes of big-endian `i16` fields:
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0 | Flexion ADC |
//! | 2, 4, 6 | Gyroscope X, Y, Z |
//! | 8, 10, 12 | Accelerometer X, Y, Z |
//! | 14, 16, 18 | Magnetometer X, Y, Z |
//! | 20 | Pad, ignored |
//!
//! The sensor fields occupy the first [`FIELD_BLOCK_SIZE`] bytes. The current
//! firmware pads each packet to 22 bytes; the two trailing bytes carry no
//! reading and are never decoded. Firmware builds that send the bare 20-byte
//! field block do not frame on this protocol: the serial framer would slice
//! across packet boundaries and BLE would drop them as an unknown size.
//!
//! Decoding is pure: the same bytes always produce the same sample.

use super::constants::*;
use crate::core::types::{SensorSample, Vector3};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

const _: () = assert!(OFFSET_MAG + 3 * FIELD_SIZE == FIELD_BLOCK_SIZE);
const _: () = assert!(FIELD_BLOCK_SIZE <= PACKET_SIZE);

/// One complete sensor packet as received from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPacket([u8; PACKET_SIZE]);

impl RawPacket {
    pub fn new(bytes: [u8; PACKET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Copy a packet out of a slice that must be exactly `PACKET_SIZE` long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let data: [u8; PACKET_SIZE] = bytes.try_into().map_err(|_| Error::InvalidPacketLength {
            expected: PACKET_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(data))
    }

    /// Encode raw integer readings into a packet.
    pub fn from_fields(flexion_adc: i16, gyro: [i16; 3], accel: [i16; 3], mag: [i16; 3]) -> Self {
        let mut data = [0u8; PACKET_SIZE];
        data[OFFSET_FLEXION..OFFSET_FLEXION + FIELD_SIZE]
            .copy_from_slice(&flexion_adc.to_be_bytes());
        for (base, values) in [(OFFSET_GYRO, gyro), (OFFSET_ACCEL, accel), (OFFSET_MAG, mag)] {
            for (i, v) in values.iter().enumerate() {
                let at = base + i * FIELD_SIZE;
                data[at..at + FIELD_SIZE].copy_from_slice(&v.to_be_bytes());
            }
        }
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    fn field(&self, offset: usize) -> i16 {
        i16::from_be_bytes([self.0[offset], self.0[offset + 1]])
    }

    #[inline]
    fn axes(&self, offset: usize, lsb_per_unit: f32) -> Vector3 {
        Vector3::new(
            self.field(offset) as f32 / lsb_per_unit,
            self.field(offset + FIELD_SIZE) as f32 / lsb_per_unit,
            self.field(offset + 2 * FIELD_SIZE) as f32 / lsb_per_unit,
        )
    }

    pub fn flexion_adc(&self) -> i16 {
        self.field(OFFSET_FLEXION)
    }
}

/// Linear two-point mapping from flexion ADC counts to degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FlexionCalibration {
    /// ADC reading at the first reference angle
    pub min_adc: f32,
    /// First reference angle in degrees
    pub min_deg: f32,
    /// ADC reading at the second reference angle
    pub max_adc: f32,
    /// Second reference angle in degrees
    pub max_deg: f32,
}

impl Default for FlexionCalibration {
    fn default() -> Self {
        Self {
            min_adc: FLEXION_MIN_ADC,
            min_deg: FLEXION_MIN_DEG,
            max_adc: FLEXION_MAX_ADC,
            max_deg: FLEXION_MAX_DEG,
        }
    }
}

impl FlexionCalibration {
    pub fn slope(&self) -> f32 {
        (self.max_deg - self.min_deg) / (self.max_adc - self.min_adc)
    }

    pub fn intercept(&self) -> f32 {
        self.max_deg - self.slope() * self.max_adc
    }

    pub fn angle(&self, adc: i16) -> f32 {
        adc as f32 * self.slope() + self.intercept()
    }

    /// Both reference points must be distinct.
    pub fn validate(&self) -> Result<()> {
        if (self.max_adc - self.min_adc).abs() < f32::EPSILON {
            return Err(Error::Config(format!(
                "flexion calibration points share ADC value {}",
                self.min_adc
            )));
        }
        Ok(())
    }
}

/// Decode a packet into physical units.
pub fn decode(packet: &RawPacket, flexion: &FlexionCalibration) -> SensorSample {
    SensorSample {
        angular_velocity: packet.axes(OFFSET_GYRO, GYRO_LSB_PER_DPS),
        linear_acceleration: packet.axes(OFFSET_ACCEL, ACCEL_LSB_PER_G),
        magnetic_field: packet.axes(OFFSET_MAG, MAG_LSB_PER_UT),
        flexion_angle_deg: flexion.angle(packet.flexion_adc()),
    }
}
