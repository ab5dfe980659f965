//! Core abstractions for IMU transports.
//!
//! - [`transceiver::Transceiver`]: Trait implemented by every device link
//! - [`types`]: Vectors, quaternions and decoded sensor samples

pub mod transceiver;
pub mod types;
