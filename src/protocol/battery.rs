//! Battery telemetry decoding

use super::constants::*;

/// Decode a 2-byte big-endian battery ADC notification into volts.
///
/// Returns `None` for payloads that are not exactly two bytes.
pub fn battery_voltage(payload: &[u8]) -> Option<f32> {
    let bytes: [u8; BATTERY_PACKET_SIZE] = payload.try_into().ok()?;
    let adc = i16::from_be_bytes(bytes) as f32;
    Some(adc / BATTERY_ADC_RESOLUTION * BATTERY_ADC_REFERENCE_V / BATTERY_DIVIDER_RATIO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_battery_voltage() {
        // Full-charge cell: 3.7 V behind the divider is ~1.183 V at the ADC
        let adc: i16 = (3.7 * (47.0 / 147.0) / 1.8 * 4096.0) as i16;
        let v = battery_voltage(&adc.to_be_bytes()).unwrap();
        assert_relative_eq!(v, 3.7, epsilon = 5e-3);
    }

    #[test]
    fn test_battery_wrong_size() {
        assert!(battery_voltage(&[0x01]).is_none());
        assert!(battery_voltage(&[0x01, 0x02, 0x03]).is_none());
    }
}
