//! RevexIO - IMU ingestion and orientation fusion for the RevEx arm sensor
//!
//! This library turns the sleeve's raw byte stream into a drift-corrected
//! orientation quaternion and a calibrated elbow flexion angle.
//!
//! ## Pipeline
//!
//! ```text
//! serial / BLE ─▶ StreamFramer ─▶ decode ─▶ SampleQueue ─▶ Tracker::tick ─▶ FusionEngine
//!   (I/O thread)                                           (consumer thread)
//! ```
//!
//! - [`serial::SerialTransceiver`]: wired link, start-marker framed stream
//! - [`ble::BleTransceiver`]: BLE link over a poll-style [`ble::BleBackend`]
//! - [`tracker::Tracker`]: per-tick controller owning a transceiver and the fusion state

pub mod ble;
pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod fusion;
pub mod protocol;
pub mod queue;
pub mod serial;
pub mod tracker;
pub mod transport;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
pub use tracker::{TickOutput, Tracker};
