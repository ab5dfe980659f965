//! Transceiver selection

use crate::ble::{BleBackend, BleTransceiver};
use crate::config::{AppConfig, TransportKind};
use crate::core::transceiver::Transceiver;
use crate::error::{Error, Result};
use crate::serial::SerialTransceiver;
use std::sync::Arc;

/// Create the transceiver named by `config.transport.kind`.
///
/// BLE needs a platform backend; this crate ships no radio driver, so the
/// caller supplies one (or a [`MockBleBackend`](crate::ble::MockBleBackend)).
pub fn create_transceiver(
    config: &AppConfig,
    ble_backend: Option<Arc<dyn BleBackend>>,
) -> Result<Box<dyn Transceiver>> {
    match config.transport.kind {
        TransportKind::Serial => {
            let transceiver = SerialTransceiver::open(config)?;
            Ok(Box::new(transceiver))
        }
        TransportKind::Ble => {
            let backend = ble_backend.ok_or_else(|| {
                Error::HardwareConfiguration("no BLE backend available on this platform".to_string())
            })?;
            let transceiver = BleTransceiver::new(backend, config)?;
            Ok(Box::new(transceiver))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::MockBleBackend;

    #[test]
    fn test_ble_requires_backend() {
        let mut config = AppConfig::default();
        config.transport.kind = TransportKind::Ble;
        assert!(matches!(
            create_transceiver(&config, None),
            Err(Error::HardwareConfiguration(_))
        ));

        let backend: Arc<dyn BleBackend> = Arc::new(MockBleBackend::new());
        let mut transceiver = create_transceiver(&config, Some(backend)).unwrap();
        assert!(!transceiver.try_establish_connection().unwrap());
        transceiver.close().unwrap();
    }

    #[test]
    fn test_missing_serial_port() {
        let mut config = AppConfig::default();
        config.serial.port = "/dev/revex-does-not-exist".to_string();
        assert!(matches!(
            create_transceiver(&config, None),
            Err(Error::HardwareConfiguration(_))
        ));
    }
}
