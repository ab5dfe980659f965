//! Poll-style BLE backend interface
//!
//! Mirrors the shape of platform BLE shims: scans are started once and then
//! polled without blocking until they report [`ScanStatus::Finished`].
//! Subscription and write calls may block and are only made from worker
//! threads.

use crate::error::Result;

/// Progress of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// Scan running, nothing new yet
    Processing,
    /// A result is available; poll again for more
    Available,
    /// Scan complete, no more results
    Finished,
}

/// One advertising device seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceUpdate {
    pub id: String,
    pub name: String,
}

/// One characteristic notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub characteristic_uuid: String,
    pub data: Vec<u8>,
}

/// Platform BLE central
///
/// Shared between the state machine, the read worker and short-lived
/// subscribe/write workers, so implementations must be `Sync`.
pub trait BleBackend: Send + Sync {
    fn start_device_scan(&self) -> Result<()>;

    /// Next device scan result, without blocking.
    fn poll_device(&self) -> Result<(ScanStatus, Option<DeviceUpdate>)>;

    fn stop_device_scan(&self) -> Result<()>;

    fn scan_services(&self, device_id: &str) -> Result<()>;

    /// Next service UUID, without blocking.
    fn poll_service(&self) -> Result<(ScanStatus, Option<String>)>;

    fn scan_characteristics(&self, device_id: &str, service_uuid: &str) -> Result<()>;

    /// Next characteristic UUID, without blocking.
    fn poll_characteristic(&self) -> Result<(ScanStatus, Option<String>)>;

    /// Enable notifications. Blocks until the peripheral confirms.
    fn subscribe_characteristic(
        &self,
        device_id: &str,
        service_uuid: &str,
        characteristic_uuid: &str,
    ) -> Result<()>;

    /// Next pending notification, without blocking.
    fn poll_data(&self) -> Result<Option<Notification>>;

    /// Write to a characteristic. Blocks until the write is acknowledged.
    fn send_data(
        &self,
        device_id: &str,
        service_uuid: &str,
        characteristic_uuid: &str,
        data: &[u8],
    ) -> Result<()>;

    /// Release all platform resources.
    fn quit(&self);
}

/// Compare GATT UUIDs ignoring case and surrounding braces.
pub fn uuid_eq(a: &str, b: &str) -> bool {
    let trim = |s: &str| s.trim().trim_start_matches('{').trim_end_matches('}').to_string();
    trim(a).eq_ignore_ascii_case(&trim(b))
}
