//! Error types for RevexIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// RevexIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Config serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid config: {0}")]
    Config(String),

    /// Transport could not be opened with the configured parameters
    #[error("Hardware configuration error: {0}")]
    HardwareConfiguration(String),

    /// Start marker completed with trailing data in the same read
    #[error("Invalid start sequence: {0}")]
    InvalidStartSequence(String),

    /// Framer pending buffer would exceed its capacity
    #[error("Framer buffer full: {pending} pending + {incoming} incoming > {capacity} bytes")]
    FramerBufferFull {
        /// Configured capacity in bytes
        capacity: usize,
        /// Bytes already pending
        pending: usize,
        /// Bytes in the rejected chunk
        incoming: usize,
    },

    /// Packet slice of the wrong size
    #[error("Invalid packet length: expected {expected}, got {actual}")]
    InvalidPacketLength {
        /// Expected size in bytes
        expected: usize,
        /// Actual size in bytes
        actual: usize,
    },

    /// Device scan finished without a match
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Service scan finished without a match
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// Characteristic scan finished without a match
    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(String),

    /// BLE backend reported a failure status
    #[error("BLE error: {0}")]
    Ble(String),

    /// Write to the device failed
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Reader thread did not acknowledge shutdown in time
    #[error("Failed to close: {0}")]
    FailedToClose(String),

    /// Operation not supported by this transport
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Worker thread panicked
    #[error("Thread panicked: {0}")]
    ThreadPanic(&'static str),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Framing errors end the current stream session and force resynchronization.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Error::InvalidStartSequence(_)
                | Error::FramerBufferFull { .. }
                | Error::InvalidPacketLength { .. }
        )
    }

    /// Discovery errors are recoverable; the caller may retry connection.
    pub fn is_discovery(&self) -> bool {
        matches!(
            self,
            Error::DeviceNotFound(_) | Error::ServiceNotFound(_) | Error::CharacteristicNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let framing = Error::FramerBufferFull {
            capacity: 50,
            pending: 40,
            incoming: 22,
        };
        assert!(framing.is_framing());
        assert!(!framing.is_discovery());

        let discovery = Error::DeviceNotFound("revex".to_string());
        assert!(discovery.is_discovery());
        assert!(!discovery.is_framing());

        assert!(!Error::WriteFailed("x".into()).is_framing());
    }

    #[test]
    fn test_error_display() {
        let err = Error::FramerBufferFull {
            capacity: 50,
            pending: 40,
            incoming: 22,
        };
        assert_eq!(
            err.to_string(),
            "Framer buffer full: 40 pending + 22 incoming > 50 bytes"
        );
    }
}
