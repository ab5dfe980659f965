//! Scriptable BLE backend for testing
//!
//! Tests describe what the "radio" sees (advertising devices, GATT tables,
//! notifications) and inspect what the transceiver did (scans, subscriptions,
//! writes). Clones share state, so a test keeps one handle while the
//! transceiver owns another.

use super::backend::{BleBackend, DeviceUpdate, Notification, ScanStatus, uuid_eq};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Mock BLE central
#[derive(Clone, Default)]
pub struct MockBleBackend {
    inner: Arc<Mutex<MockBleInner>>,
}

#[derive(Default)]
struct MockBleInner {
    advertised: Vec<DeviceUpdate>,
    scan_queue: VecDeque<DeviceUpdate>,
    scan_finishes: bool,
    scans_started: usize,
    scans_stopped: usize,

    services: Vec<String>,
    service_queue: VecDeque<String>,
    characteristics: Vec<String>,
    characteristic_queue: VecDeque<String>,

    failing_subscriptions: Vec<String>,
    subscribe_delay: Duration,
    subscriptions: Vec<String>,

    notifications: VecDeque<Notification>,
    poll_error: Option<String>,

    writes: Vec<(String, Vec<u8>)>,
    fail_writes: bool,

    quit: bool,
}

impl MockBleBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend advertising one device with a full RevEx GATT table.
    pub fn with_device(id: &str, name: &str) -> Self {
        use crate::protocol::constants::*;
        let backend = Self::new();
        backend.add_device(id, name);
        backend.set_services(&[SERVICE_UUID]);
        backend.set_characteristics(&[
            SENSOR_CHARACTERISTIC_UUID,
            HAPTIC_CHARACTERISTIC_UUID,
            SLEEP_CHARACTERISTIC_UUID,
        ]);
        backend
    }

    /// Add a device reported by every subsequent device scan.
    pub fn add_device(&self, id: &str, name: &str) {
        self.inner.lock().advertised.push(DeviceUpdate {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    /// Whether scans report `Finished` after the last device (default: keep processing).
    pub fn set_scan_finishes(&self, finishes: bool) {
        self.inner.lock().scan_finishes = finishes;
    }

    pub fn set_services(&self, uuids: &[&str]) {
        self.inner.lock().services = uuids.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_characteristics(&self, uuids: &[&str]) {
        self.inner.lock().characteristics = uuids.iter().map(|s| s.to_string()).collect();
    }

    /// Make subscription to `uuid` fail.
    pub fn fail_subscription(&self, uuid: &str) {
        self.inner.lock().failing_subscriptions.push(uuid.to_string());
    }

    /// Let subscriptions to `uuid` succeed again.
    pub fn allow_subscription(&self, uuid: &str) {
        self.inner
            .lock()
            .failing_subscriptions
            .retain(|u| !uuid_eq(u, uuid));
    }

    /// Delay every subscription call to emulate a slow peripheral.
    pub fn set_subscribe_delay(&self, delay: Duration) {
        self.inner.lock().subscribe_delay = delay;
    }

    /// Queue a notification for the read worker.
    pub fn push_notification(&self, characteristic_uuid: &str, data: &[u8]) {
        self.inner.lock().notifications.push_back(Notification {
            characteristic_uuid: characteristic_uuid.to_string(),
            data: data.to_vec(),
        });
    }

    /// Make the next `poll_data` call fail.
    pub fn fail_next_poll(&self, message: &str) {
        self.inner.lock().poll_error = Some(message.to_string());
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    pub fn scans_started(&self) -> usize {
        self.inner.lock().scans_started
    }

    pub fn scans_stopped(&self) -> usize {
        self.inner.lock().scans_stopped
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.lock().subscriptions.clone()
    }

    pub fn pending_notifications(&self) -> usize {
        self.inner.lock().notifications.len()
    }

    /// Every successful write as (characteristic, payload).
    pub fn writes(&self) -> Vec<(String, Vec<u8>)> {
        self.inner.lock().writes.clone()
    }

    pub fn quit_called(&self) -> bool {
        self.inner.lock().quit
    }
}

fn poll_queue<T>(queue: &mut VecDeque<T>, finishes: bool) -> (ScanStatus, Option<T>) {
    match queue.pop_front() {
        Some(item) => (ScanStatus::Available, Some(item)),
        None if finishes => (ScanStatus::Finished, None),
        None => (ScanStatus::Processing, None),
    }
}

impl BleBackend for MockBleBackend {
    fn start_device_scan(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.scan_queue = inner.advertised.iter().cloned().collect();
        inner.scans_started += 1;
        Ok(())
    }

    fn poll_device(&self) -> Result<(ScanStatus, Option<DeviceUpdate>)> {
        let mut inner = self.inner.lock();
        let finishes = inner.scan_finishes;
        Ok(poll_queue(&mut inner.scan_queue, finishes))
    }

    fn stop_device_scan(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.scan_queue.clear();
        inner.scans_stopped += 1;
        Ok(())
    }

    fn scan_services(&self, _device_id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.service_queue = inner.services.iter().cloned().collect();
        Ok(())
    }

    fn poll_service(&self) -> Result<(ScanStatus, Option<String>)> {
        Ok(poll_queue(&mut self.inner.lock().service_queue, true))
    }

    fn scan_characteristics(&self, _device_id: &str, _service_uuid: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.characteristic_queue = inner.characteristics.iter().cloned().collect();
        Ok(())
    }

    fn poll_characteristic(&self) -> Result<(ScanStatus, Option<String>)> {
        Ok(poll_queue(&mut self.inner.lock().characteristic_queue, true))
    }

    fn subscribe_characteristic(
        &self,
        _device_id: &str,
        _service_uuid: &str,
        characteristic_uuid: &str,
    ) -> Result<()> {
        let delay = self.inner.lock().subscribe_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut inner = self.inner.lock();
        if inner
            .failing_subscriptions
            .iter()
            .any(|u| uuid_eq(u, characteristic_uuid))
        {
            return Err(Error::Ble(format!(
                "subscribe to {} rejected",
                characteristic_uuid
            )));
        }
        inner.subscriptions.push(characteristic_uuid.to_string());
        Ok(())
    }

    fn poll_data(&self) -> Result<Option<Notification>> {
        let mut inner = self.inner.lock();
        if let Some(message) = inner.poll_error.take() {
            return Err(Error::Ble(message));
        }
        Ok(inner.notifications.pop_front())
    }

    fn send_data(
        &self,
        _device_id: &str,
        _service_uuid: &str,
        characteristic_uuid: &str,
        data: &[u8],
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(Error::Ble("write not acknowledged".to_string()));
        }
        inner
            .writes
            .push((characteristic_uuid.to_string(), data.to_vec()));
        Ok(())
    }

    fn quit(&self) {
        self.inner.lock().quit = true;
    }
}
