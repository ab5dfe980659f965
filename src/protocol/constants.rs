//! Constants for the RevEx sensor protocol

// Sensor packet layout: flexion + 9 IMU fields, big-endian i16 each,
// padded with two unused bytes
pub const PACKET_SIZE: usize = 22;
pub const FIELD_BLOCK_SIZE: usize = 20;
pub const FIELD_SIZE: usize = 2;
pub const OFFSET_FLEXION: usize = 0;
pub const OFFSET_GYRO: usize = 2;
pub const OFFSET_ACCEL: usize = 8;
pub const OFFSET_MAG: usize = 14;

// Sensor scales
pub const GYRO_LSB_PER_DPS: f32 = 65.5; // ±500 deg/s range
pub const ACCEL_LSB_PER_G: f32 = 8192.0; // 8.192 LSB/mg, ±4 g range
pub const MAG_LSB_PER_UT: f32 = 1.0 / 0.15; // 0.15 µT/LSB

// Flexion sensor two-point calibration (ADC counts -> degrees)
pub const FLEXION_MIN_ADC: f32 = 1752.0;
pub const FLEXION_MIN_DEG: f32 = 90.0;
pub const FLEXION_MAX_ADC: f32 = 2592.0;
pub const FLEXION_MAX_DEG: f32 = 180.0;

// Notification sizes other than the sensor packet
pub const BATTERY_PACKET_SIZE: usize = 2;
pub const SLEEP_STATUS_PACKET_SIZE: usize = 1;
pub const AWAKE_VALUE: u8 = 1;

// Battery ADC: 12-bit, 1.8 V reference, 47k/147k divider
pub const BATTERY_ADC_RESOLUTION: f32 = 4096.0;
pub const BATTERY_ADC_REFERENCE_V: f32 = 1.8;
pub const BATTERY_DIVIDER_RATIO: f32 = 47.0 / 147.0;

// Haptic byte: duty level in bits 7..3, frequency level in bits 2..0
pub const HAPTIC_DUTY_LEVELS: f32 = 31.0;
pub const HAPTIC_FREQ_LEVELS: f32 = 7.0;
pub const HAPTIC_DUTY_SHIFT: u8 = 3;
pub const HAPTIC_FREQ_MASK: u8 = 0x07;
pub const HAPTIC_BASE_FREQ_HZ: f32 = 5.0;
pub const HAPTIC_FREQ_STEP_HZ: f32 = 2.0;

// Serial stream
pub const DEFAULT_START_MARKER: &str = "Data Start";
pub const DEFAULT_FRAMER_CAPACITY: usize = 50;

// BLE GATT identifiers
pub const DEFAULT_DEVICE_ID: &str = "BluetoothLE#BluetoothLE04:33:c2:80:5e:25-00:1e:c0:1d:42:8a";
pub const SERVICE_UUID: &str = "{12345678-9012-3456-7890-1234567890ff}";
pub const SENSOR_CHARACTERISTIC_UUID: &str = "12345678-9012-3456-7890-123456789011";
pub const HAPTIC_CHARACTERISTIC_UUID: &str = "12345678-9012-3456-7890-123456789022";
pub const SLEEP_CHARACTERISTIC_UUID: &str = "12345678-9012-3456-7890-123456789033";
