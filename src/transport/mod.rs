//! Byte source for the wired sensor stream
//!
//! The serial reader pulls raw bytes through [`Transport`]; framing into
//! packets happens above it. [`SerialTransport`] reads a real port and
//! [`MockTransport`] replays scripted chunks in tests.

use crate::error::Result;

pub mod mock;
mod serial;

pub use mock::MockTransport;
pub use serial::SerialTransport;

/// Inbound byte stream from the sensor
pub trait Transport: Send {
    /// Read whatever bytes have arrived, at most `buffer.len()`.
    ///
    /// `Ok(0)` means the read timeout passed with nothing received, which is
    /// normal between packets and while the device is asleep.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Discard buffered input before the port is released.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
