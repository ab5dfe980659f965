//! Configuration for RevexIO
//!
//! Loads configuration from a TOML file. Every field has a default, so a file
//! only needs the values that differ from the stock RevEx hardware.
//!
//! ```toml
//! [transport]
//! kind = "serial"
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//!
//! [fusion]
//! gain = 1.0
//! hard_iron_bias = [-26.025, 12.825, 12.825]
//! ```

use crate::error::{Error, Result};
use crate::protocol::FlexionCalibration;
use crate::protocol::constants::*;
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub ble: BleConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub flexion: FlexionCalibration,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which link carries the sensor stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Serial,
    Ble,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
}

/// Wired serial link
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Serial port path
    #[serde(default = "default_serial_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read timeout; an idle read returns after this long
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// ASCII marker the device sends before streaming
    #[serde(default = "default_start_marker")]
    pub start_marker: String,
    /// Framer pending-buffer capacity in bytes
    #[serde(default = "default_framer_capacity")]
    pub buffer_capacity: usize,
    /// Silence after which the device is reported asleep
    #[serde(default = "default_max_silence_ms")]
    pub max_silence_ms: u64,
    /// How long close waits for the reader thread to exit
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            start_marker: default_start_marker(),
            buffer_capacity: default_framer_capacity(),
            max_silence_ms: default_max_silence_ms(),
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn max_silence(&self) -> Duration {
        Duration::from_millis(self.max_silence_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

/// Bluetooth LE link
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BleConfig {
    /// Platform device id to connect to
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Advertised name; when set, a device with this name also matches
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default = "default_service_uuid")]
    pub service_uuid: String,
    #[serde(default = "default_sensor_characteristic")]
    pub sensor_characteristic: String,
    #[serde(default = "default_haptic_characteristic")]
    pub haptic_characteristic: String,
    #[serde(default = "default_sleep_characteristic")]
    pub sleep_characteristic: String,
    /// Subscribe to the sleep-status characteristic
    #[serde(default)]
    pub subscribe_sleep_status: bool,
    /// Verify the service and characteristics before subscribing
    #[serde(default)]
    pub discover_gatt: bool,
    /// Read worker poll period
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Silence after which the device is considered asleep
    #[serde(default = "default_max_silence_ms")]
    pub max_silence_ms: u64,
    /// How long close waits for the read worker to exit
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            device_name: None,
            service_uuid: default_service_uuid(),
            sensor_characteristic: default_sensor_characteristic(),
            haptic_characteristic: default_haptic_characteristic(),
            sleep_characteristic: default_sleep_characteristic(),
            subscribe_sleep_status: false,
            discover_gatt: false,
            poll_interval_ms: default_poll_interval_ms(),
            max_silence_ms: default_max_silence_ms(),
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

impl BleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// Empty poll cycles tolerated before the device is considered asleep.
    pub fn missed_threshold(&self) -> u32 {
        u32::try_from(self.max_silence_ms / self.poll_interval_ms.max(1)).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

/// Calibration and AHRS parameters
///
/// The hard-iron bias and stationary threshold are per-unit calibration
/// values. Known RevEx units measured `[-26.025, 12.825, 12.825]` and
/// `[-28.725, 10.65, 10.65]` µT.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FusionConfig {
    /// AHRS feedback gain; 0 disables accelerometer/magnetometer correction
    pub gain: f32,
    /// Gain at start-up, ramped down to `gain`
    pub initial_gain: f32,
    /// Seconds taken to ramp from `initial_gain` to `gain`
    pub initialisation_period: f32,
    /// Gyroscope magnitude below which the device counts as stationary (deg/s)
    pub stationary_threshold: f32,
    /// Stationary time before bias estimation starts (s)
    pub stationary_period: f32,
    /// Bias low-pass cutoff (Hz)
    pub bias_cutoff_hz: f32,
    /// Magnetic field magnitude window accepted for heading correction (µT)
    pub min_magnetic_field: f32,
    pub max_magnetic_field: f32,
    /// Disable magnetometer feedback entirely
    pub use_magnetometer: bool,
    /// Hard-iron offset subtracted after soft-iron correction (µT)
    pub hard_iron_bias: [f32; 3],
    /// Soft-iron correction matrix, row-major
    pub soft_iron_matrix: [[f32; 3]; 3],
    /// Nominal sample period, used when a batch carries no timing (s)
    pub sample_period: f32,
    /// Flexion smoothing weight of the newest reading
    pub flexion_smoothing: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            gain: 1.0,
            initial_gain: 10.0,
            initialisation_period: 3.0,
            stationary_threshold: 2.0,
            stationary_period: 5.0,
            bias_cutoff_hz: 0.02,
            min_magnetic_field: 0.0,
            max_magnetic_field: 70.0,
            use_magnetometer: true,
            hard_iron_bias: [0.0; 3],
            soft_iron_matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            sample_period: 0.01,
            flexion_smoothing: 0.8,
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.gain < 0.0 || self.initial_gain < 0.0 {
            return Err(Error::Config("AHRS gains must be non-negative".into()));
        }
        if self.initialisation_period <= 0.0 || self.sample_period <= 0.0 {
            return Err(Error::Config(
                "initialisation_period and sample_period must be positive".into(),
            ));
        }
        if self.min_magnetic_field > self.max_magnetic_field {
            return Err(Error::Config(format!(
                "magnetic field window [{}, {}] is empty",
                self.min_magnetic_field, self.max_magnetic_field
            )));
        }
        if !(0.0..=1.0).contains(&self.flexion_smoothing) {
            return Err(Error::Config(format!(
                "flexion_smoothing {} outside [0, 1]",
                self.flexion_smoothing
            )));
        }
        Ok(())
    }
}

/// Consumer tick loop
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    /// Tick rate of the daemon loop
    #[serde(default = "default_tick_hz")]
    pub tick_hz: f32,
    /// Log the orientation every N ticks (0 disables)
    #[serde(default = "default_report_every")]
    pub report_every: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            report_every: default_report_every(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud_rate() -> u32 {
    115_200
}
fn default_read_timeout_ms() -> u64 {
    10
}
fn default_start_marker() -> String {
    DEFAULT_START_MARKER.to_string()
}
fn default_framer_capacity() -> usize {
    DEFAULT_FRAMER_CAPACITY
}
fn default_max_silence_ms() -> u64 {
    2000
}
fn default_close_timeout_ms() -> u64 {
    1000
}
fn default_device_id() -> String {
    DEFAULT_DEVICE_ID.to_string()
}
fn default_service_uuid() -> String {
    SERVICE_UUID.to_string()
}
fn default_sensor_characteristic() -> String {
    SENSOR_CHARACTERISTIC_UUID.to_string()
}
fn default_haptic_characteristic() -> String {
    HAPTIC_CHARACTERISTIC_UUID.to_string()
}
fn default_sleep_characteristic() -> String {
    SLEEP_CHARACTERISTIC_UUID.to_string()
}
fn default_poll_interval_ms() -> u64 {
    95
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_tick_hz() -> f32 {
    60.0
}
fn default_report_every() -> u32 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use revex_io::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("revex.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.fusion.validate()?;
        self.flexion.validate()?;
        if self.serial.start_marker.is_empty() {
            return Err(Error::Config("serial.start_marker must not be empty".into()));
        }
        if !self.tracker.tick_hz.is_finite() || self.tracker.tick_hz <= 0.0 {
            return Err(Error::Config(format!(
                "tracker.tick_hz must be a positive finite rate, got {}",
                self.tracker.tick_hz
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.transport.kind, TransportKind::Serial);
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.buffer_capacity, 50);
        assert_eq!(config.queue.capacity, 100);
        assert_eq!(config.ble.poll_interval_ms, 95);
        assert_eq!(config.ble.service_uuid, SERVICE_UUID);
        assert_eq!(config.fusion.stationary_threshold, 2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missed_threshold() {
        let ble = BleConfig {
            poll_interval_ms: 95,
            max_silence_ms: 2000,
            ..Default::default()
        };
        assert_eq!(ble.missed_threshold(), 21);

        let sleepy = BleConfig {
            poll_interval_ms: 1,
            max_silence_ms: u64::MAX,
            ..Default::default()
        };
        assert_eq!(sleepy.missed_threshold(), u32::MAX);
    }

    #[test]
    fn test_tick_rate_must_be_finite() {
        for tick_hz in ["nan", "inf", "0.0", "-60.0"] {
            let toml_content = format!("[tracker]\ntick_hz = {}\n", tick_hz);
            let config: AppConfig = toml::from_str(&toml_content).unwrap();
            assert!(
                matches!(config.validate(), Err(Error::Config(_))),
                "tick_hz = {} accepted",
                tick_hz
            );
        }
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[transport]"));
        assert!(toml_string.contains("[serial]"));
        assert!(toml_string.contains("[ble]"));
        assert!(toml_string.contains("[fusion]"));
        assert!(toml_string.contains("[logging]"));
        assert!(toml_string.contains("kind = \"serial\""));
    }

    #[test]
    fn test_partial_toml_deserialization() {
        let toml_content = r#"
[transport]
kind = "ble"

[ble]
device_name = "RevEx"
poll_interval_ms = 50

[fusion]
gain = 0.5
hard_iron_bias = [-28.725, 10.65, 10.65]

[logging]
level = "debug"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.transport.kind, TransportKind::Ble);
        assert_eq!(config.ble.device_name.as_deref(), Some("RevEx"));
        assert_eq!(config.ble.poll_interval_ms, 50);
        assert_eq!(config.ble.device_id, DEFAULT_DEVICE_ID);
        assert_eq!(config.fusion.gain, 0.5);
        assert_eq!(config.fusion.hard_iron_bias, [-28.725, 10.65, 10.65]);
        assert_eq!(config.fusion.initial_gain, 10.0);
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_shipped_config_parses() {
        let config: AppConfig = toml::from_str(include_str!("../config/revex.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.ble.sensor_characteristic, SENSOR_CHARACTERISTIC_UUID);
        assert_eq!(config.fusion.hard_iron_bias, [-26.025, 12.825, 12.825]);
        assert_eq!(config.flexion, FlexionCalibration::default());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("revex.toml");

        let mut config = AppConfig::default();
        config.serial.port = "/dev/ttyACM1".to_string();
        config.fusion.gain = 2.5;
        config.to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.serial.port, "/dev/ttyACM1");
        assert_eq!(loaded.fusion, config.fusion);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[fusion]\nmin_magnetic_field = 80.0\n").unwrap();
        assert!(matches!(
            AppConfig::from_file(&path),
            Err(Error::Config(_))
        ));
    }
}
