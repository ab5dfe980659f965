//! RevEx wire protocol
//!
//! - [`codec`]: 22-byte sensor packet decoding and flexion calibration
//! - [`framer`]: start-marker synchronization and packet slicing for byte streams
//! - [`haptic`]: 1-byte vibration motor command
//! - [`battery`]: 2-byte battery telemetry

pub mod battery;
pub mod codec;
pub mod constants;
pub mod framer;
pub mod haptic;

pub use battery::battery_voltage;
pub use codec::{FlexionCalibration, RawPacket, decode};
pub use framer::StreamFramer;
pub use haptic::HapticFeedback;
