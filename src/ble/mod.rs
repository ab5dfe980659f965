//! Bluetooth LE transceiver
//!
//! # Architecture
//!
//! ```text
//! consumer thread                      worker threads
//! ───────────────                      ──────────────
//! try_establish_connection()  ──spawn──▶ ble-subscribe (one per characteristic)
//!   state machine             ◀─result── crossbeam channel
//! try_get_sensor_data()       ◀─drain─── SampleQueue ◀── ble-reader (poll loop)
//! send_haptic_feedback()      ──spawn──▶ ble-haptic
//! take_fault()                ◀─errors── crossbeam channel
//! ```
//!
//! The read worker starts at construction and runs until [`close`]. It only
//! tracks liveness while the link is streaming.
//!
//! [`close`]: BleTransceiver::close

pub mod backend;
pub mod mock;
mod reader;
pub mod state;

pub use backend::{BleBackend, DeviceUpdate, Notification, ScanStatus};
pub use mock::MockBleBackend;
pub use state::{CharacteristicInfo, CharacteristicRole, ConnectionState, LinkState};

use crate::config::{AppConfig, BleConfig};
use crate::core::transceiver::{Transceiver, fault_channel, post_fault};
use crate::core::types::SensorSample;
use crate::error::{Error, Result};
use crate::protocol::HapticFeedback;
use crate::protocol::constants::{PACKET_SIZE, SLEEP_STATUS_PACKET_SIZE};
use crate::queue::SampleQueue;
use backend::uuid_eq;
use crossbeam_channel::{Receiver, Sender};
use reader::ReadWorker;
use state::{all_subscribed, clear_subscriptions};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Result of one subscription worker: (attempt, characteristic index, outcome)
type SubscribeResult = (u64, usize, Result<()>);

/// BLE link to the RevEx sleeve
pub struct BleTransceiver {
    backend: Arc<dyn BleBackend>,
    config: BleConfig,
    device_id: String,
    state: ConnectionState,
    scan_active: bool,
    found_characteristics: HashSet<String>,
    characteristics: Arc<Vec<CharacteristicInfo>>,
    link: Arc<LinkState>,
    queue: Arc<SampleQueue>,
    attempt: u64,
    subscribe_tx: Sender<SubscribeResult>,
    subscribe_rx: Receiver<SubscribeResult>,
    fault_tx: Sender<Error>,
    fault_rx: Receiver<Error>,
    shutdown: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    closed: bool,
}

impl BleTransceiver {
    /// Create the transceiver and start its read worker.
    pub fn new(backend: Arc<dyn BleBackend>, config: &AppConfig) -> Result<Self> {
        let ble = config.ble.clone();
        let characteristics = Arc::new(vec![
            CharacteristicInfo::new(
                &ble.sensor_characteristic,
                CharacteristicRole::Sensor,
                true,
                PACKET_SIZE,
            ),
            CharacteristicInfo::new(&ble.haptic_characteristic, CharacteristicRole::Haptic, false, 0),
            CharacteristicInfo::new(
                &ble.sleep_characteristic,
                CharacteristicRole::SleepStatus,
                ble.subscribe_sleep_status,
                SLEEP_STATUS_PACKET_SIZE,
            ),
        ]);

        let link = Arc::new(LinkState::new());
        let queue = Arc::new(SampleQueue::new(config.queue.capacity));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (subscribe_tx, subscribe_rx) = crossbeam_channel::unbounded();
        let (fault_tx, fault_rx) = fault_channel();

        let worker = ReadWorker {
            backend: Arc::clone(&backend),
            link: Arc::clone(&link),
            characteristics: Arc::clone(&characteristics),
            queue: Arc::clone(&queue),
            flexion: config.flexion,
            poll_interval: ble.poll_interval(),
            missed_threshold: ble.missed_threshold(),
            faults: fault_tx.clone(),
            shutdown: Arc::clone(&shutdown),
        };
        let reader = thread::Builder::new()
            .name("ble-reader".to_string())
            .spawn(move || worker.run())
            .map_err(|e| Error::Other(format!("Failed to spawn BLE reader: {}", e)))?;

        log::info!(
            "BLE: looking for device {}{}",
            ble.device_id,
            ble.device_name
                .as_deref()
                .map(|n| format!(" or name '{}'", n))
                .unwrap_or_default()
        );

        Ok(Self {
            backend,
            device_id: ble.device_id.clone(),
            config: ble,
            state: ConnectionState::SearchingDevice,
            scan_active: false,
            found_characteristics: HashSet::new(),
            characteristics,
            link,
            queue,
            attempt: 0,
            subscribe_tx,
            subscribe_rx,
            fault_tx,
            fault_rx,
            shutdown,
            reader: Some(reader),
            closed: false,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Device id in use; updated when a name match resolves a new id.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn link(&self) -> &LinkState {
        &self.link
    }

    pub fn queue(&self) -> &SampleQueue {
        &self.queue
    }

    pub fn characteristics(&self) -> &[CharacteristicInfo] {
        &self.characteristics
    }

    fn characteristic(&self, role: CharacteristicRole) -> Option<&CharacteristicInfo> {
        self.characteristics.iter().find(|c| c.role == role)
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            log::debug!("BLE: {} -> {}", self.state, next);
            self.state = next;
        }
    }

    /// Abandon the current attempt; the next call starts a fresh scan.
    fn restart_discovery(&mut self) {
        if self.scan_active && self.state == ConnectionState::SearchingDevice {
            if let Err(e) = self.backend.stop_device_scan() {
                log::debug!("BLE: stop_device_scan failed: {}", e);
            }
        }
        self.scan_active = false;
        self.found_characteristics.clear();
        self.link.stop_streaming();
        clear_subscriptions(&self.characteristics);
        self.set_state(ConnectionState::SearchingDevice);
    }

    fn is_target(&self, device: &DeviceUpdate) -> bool {
        device.id == self.config.device_id
            || self
                .config
                .device_name
                .as_deref()
                .is_some_and(|name| !name.is_empty() && device.name == name)
    }

    fn search_device(&mut self) -> Result<()> {
        if !self.scan_active {
            self.backend.start_device_scan()?;
            self.scan_active = true;
            log::debug!("BLE: device scan started");
        }

        loop {
            let (status, device) = self.backend.poll_device()?;
            if let Some(device) = device {
                log::trace!("BLE: saw device {} '{}'", device.id, device.name);
                if self.is_target(&device) {
                    log::info!("BLE: found device {} '{}'", device.id, device.name);
                    self.backend.stop_device_scan()?;
                    self.scan_active = false;
                    self.device_id = device.id;
                    let next = if self.config.discover_gatt {
                        ConnectionState::SearchingService
                    } else {
                        ConnectionState::Subscribing
                    };
                    self.set_state(next);
                    return Ok(());
                }
            }

            match status {
                ScanStatus::Available => continue,
                ScanStatus::Processing => return Ok(()),
                ScanStatus::Finished => {
                    self.scan_active = false;
                    return Err(Error::DeviceNotFound(format!(
                        "scan finished without {}",
                        self.config.device_id
                    )));
                }
            }
        }
    }

    fn search_service(&mut self) -> Result<()> {
        if !self.scan_active {
            self.backend.scan_services(&self.device_id)?;
            self.scan_active = true;
        }

        loop {
            let (status, service) = self.backend.poll_service()?;
            if let Some(uuid) = service {
                if uuid_eq(&uuid, &self.config.service_uuid) {
                    log::debug!("BLE: found service {}", uuid);
                    self.scan_active = false;
                    self.set_state(ConnectionState::SearchingCharacteristics);
                    return Ok(());
                }
            }

            match status {
                ScanStatus::Available => continue,
                ScanStatus::Processing => return Ok(()),
                ScanStatus::Finished => {
                    self.scan_active = false;
                    return Err(Error::ServiceNotFound(self.config.service_uuid.clone()));
                }
            }
        }
    }

    fn search_characteristics(&mut self) -> Result<()> {
        if !self.scan_active {
            self.backend
                .scan_characteristics(&self.device_id, &self.config.service_uuid)?;
            self.scan_active = true;
            self.found_characteristics.clear();
        }

        loop {
            let (status, characteristic) = self.backend.poll_characteristic()?;
            if let Some(uuid) = characteristic {
                if let Some(c) = self
                    .characteristics
                    .iter()
                    .find(|c| uuid_eq(&c.uuid, &uuid))
                {
                    log::debug!("BLE: found {:?} characteristic {}", c.role, uuid);
                    self.found_characteristics.insert(c.uuid.clone());
                }
                if self.found_characteristics.len() == self.characteristics.len() {
                    self.scan_active = false;
                    self.set_state(ConnectionState::Subscribing);
                    return Ok(());
                }
            }

            match status {
                ScanStatus::Available => continue,
                ScanStatus::Processing => return Ok(()),
                ScanStatus::Finished => {
                    self.scan_active = false;
                    let missing: Vec<&str> = self
                        .characteristics
                        .iter()
                        .filter(|c| !self.found_characteristics.contains(&c.uuid))
                        .map(|c| c.uuid.as_str())
                        .collect();
                    return Err(Error::CharacteristicNotFound(missing.join(", ")));
                }
            }
        }
    }

    fn subscribe(&mut self) -> Result<()> {
        self.attempt += 1;
        clear_subscriptions(&self.characteristics);

        for (index, c) in self.characteristics.iter().enumerate() {
            if !c.should_subscribe {
                continue;
            }
            let backend = Arc::clone(&self.backend);
            let tx = self.subscribe_tx.clone();
            let attempt = self.attempt;
            let device_id = self.device_id.clone();
            let service_uuid = self.config.service_uuid.clone();
            let uuid = c.uuid.clone();

            thread::Builder::new()
                .name("ble-subscribe".to_string())
                .spawn(move || {
                    let result = backend.subscribe_characteristic(&device_id, &service_uuid, &uuid);
                    let _ = tx.send((attempt, index, result));
                })
                .map_err(|e| Error::Other(format!("Failed to spawn subscribe worker: {}", e)))?;
        }

        self.set_state(ConnectionState::AwaitingSubscriptionConfirmation);
        Ok(())
    }

    fn check_subscriptions(&mut self) {
        while let Ok((attempt, index, result)) = self.subscribe_rx.try_recv() {
            if attempt != self.attempt {
                continue;
            }
            let uuid = &self.characteristics[index].uuid;
            match result {
                Ok(()) => {
                    log::debug!("BLE: subscribed to {}", uuid);
                    self.characteristics[index].set_subscribed(true);
                }
                Err(e) => {
                    log::error!("BLE: subscribe to {} failed: {}", uuid, e);
                    self.restart_discovery();
                    return;
                }
            }
        }

        if all_subscribed(&self.characteristics) {
            self.link.mark_streaming();
            self.set_state(ConnectionState::Ready);
            log::info!("BLE: streaming from {}", self.device_id);
        }
    }
}

impl Transceiver for BleTransceiver {
    fn try_establish_connection(&mut self) -> Result<bool> {
        if self.closed {
            return Err(Error::Other("BLE transceiver is closed".to_string()));
        }

        if self.link.take_reset_request() && self.state == ConnectionState::Ready {
            log::info!("BLE: device went to sleep, searching again");
            self.restart_discovery();
            return Ok(false);
        }

        let step = match self.state {
            ConnectionState::SearchingDevice => self.search_device(),
            ConnectionState::SearchingService => self.search_service(),
            ConnectionState::SearchingCharacteristics => self.search_characteristics(),
            ConnectionState::Subscribing => self.subscribe(),
            ConnectionState::AwaitingSubscriptionConfirmation => {
                self.check_subscriptions();
                Ok(())
            }
            ConnectionState::Ready => Ok(()),
        };

        if let Err(e) = step {
            self.restart_discovery();
            return Err(e);
        }
        Ok(self.state == ConnectionState::Ready)
    }

    fn try_get_sensor_data(&mut self) -> Option<Vec<SensorSample>> {
        let samples = self.queue.drain_all();
        (!samples.is_empty()).then_some(samples)
    }

    fn send_haptic_feedback(&mut self, feedback: HapticFeedback) -> Result<()> {
        if self.state != ConnectionState::Ready {
            log::debug!("BLE: not connected, dropping haptic command");
            return Ok(());
        }
        let Some(haptic) = self.characteristic(CharacteristicRole::Haptic) else {
            return Err(Error::NotSupported("no haptic characteristic".to_string()));
        };

        let backend = Arc::clone(&self.backend);
        let faults = self.fault_tx.clone();
        let device_id = self.device_id.clone();
        let service_uuid = self.config.service_uuid.clone();
        let uuid = haptic.uuid.clone();
        let payload = feedback.payload();

        thread::Builder::new()
            .name("ble-haptic".to_string())
            .spawn(move || match backend.send_data(&device_id, &service_uuid, &uuid, &[payload]) {
                Ok(()) => log::debug!("BLE: sent haptic 0x{:02X}", payload),
                Err(e) => {
                    log::error!("BLE: haptic write failed: {}", e);
                    post_fault(&faults, Error::WriteFailed(e.to_string()));
                }
            })
            .map_err(|e| Error::Other(format!("Failed to spawn haptic writer: {}", e)))?;
        Ok(())
    }

    fn device_is_awake(&mut self, force_refresh: bool) -> bool {
        if force_refresh {
            self.link.refresh_awake(self.config.missed_threshold())
        } else {
            self.link.is_awake()
        }
    }

    fn last_battery_voltage(&self) -> Option<f32> {
        self.link.battery_voltage()
    }

    fn take_fault(&mut self) -> Option<Error> {
        self.fault_rx.try_recv().ok()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        log::info!("BLE: closing");
        self.shutdown.store(true, Ordering::Relaxed);

        let deadline = Instant::now() + self.config.close_timeout();
        while !self.link.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        if !self.link.is_finished() {
            return Err(Error::FailedToClose(format!(
                "BLE read worker did not stop within {:?}",
                self.config.close_timeout()
            )));
        }

        if let Some(handle) = self.reader.take() {
            handle
                .join()
                .map_err(|_| Error::ThreadPanic("ble-reader"))?;
        }
        self.backend.quit();
        self.link.stop_streaming();
        self.closed = true;
        log::info!("BLE: closed");
        Ok(())
    }
}

impl Drop for BleTransceiver {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                log::warn!("BLE: close on drop failed: {}", e);
            }
        }
    }
}
