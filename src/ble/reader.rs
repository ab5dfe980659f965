//! Read worker for the BLE transceiver
//!
//! Polls the backend at a fixed interval and routes each notification by
//! payload size:
//!
//! | Size | Payload |
//! |------|---------|
//! | 22 | Sensor packet, decoded and queued |
//! | 2 | Battery ADC reading |
//! | 1 | Sleep status (1 = awake) |
//!
//! Anything else is logged and dropped.
//!
//! # Liveness
//!
//! Once subscriptions are confirmed, every poll cycle without a sensor packet
//! counts as missed. When the count exceeds the configured threshold the
//! device is treated as asleep: subscription flags are cleared and the state
//! machine is asked to start over from device search.

use super::backend::{BleBackend, Notification};
use super::state::{CharacteristicInfo, LinkState, clear_subscriptions};
use crate::core::transceiver::post_fault;
use crate::error::Error;
use crate::protocol::constants::{AWAKE_VALUE, BATTERY_PACKET_SIZE, PACKET_SIZE, SLEEP_STATUS_PACKET_SIZE};
use crate::protocol::{FlexionCalibration, RawPacket, battery_voltage, decode};
use crate::queue::{PushOutcome, SampleQueue};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Everything the read worker needs, moved into its thread
pub(super) struct ReadWorker {
    pub backend: Arc<dyn BleBackend>,
    pub link: Arc<LinkState>,
    pub characteristics: Arc<Vec<CharacteristicInfo>>,
    pub queue: Arc<SampleQueue>,
    pub flexion: FlexionCalibration,
    pub poll_interval: Duration,
    pub missed_threshold: u32,
    pub faults: Sender<Error>,
    pub shutdown: Arc<AtomicBool>,
}

impl ReadWorker {
    pub(super) fn run(self) {
        log::info!(
            "BLE: read worker started (poll {:?}, sleep after {} empty cycles)",
            self.poll_interval,
            self.missed_threshold
        );

        while !self.shutdown.load(Ordering::Relaxed) {
            let sensor_packets = self.drain_notifications();

            if self.link.record_cycle(sensor_packets, self.missed_threshold) {
                clear_subscriptions(&self.characteristics);
                log::warn!(
                    "BLE: no sensor data for {} cycles, device asleep; restarting discovery",
                    self.link.missed_cycles()
                );
            }

            thread::sleep(self.poll_interval);
        }

        self.link.mark_finished();
        log::info!("BLE: read worker exiting");
    }

    /// Handle every pending notification. Returns the number of sensor packets.
    fn drain_notifications(&self) -> usize {
        let mut sensor_packets = 0;
        loop {
            match self.backend.poll_data() {
                Ok(Some(notification)) => {
                    if self.route(&notification) {
                        sensor_packets += 1;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::error!("BLE: poll_data failed: {}", e);
                    post_fault(&self.faults, e);
                    break;
                }
            }
        }
        sensor_packets
    }

    fn route(&self, notification: &Notification) -> bool {
        let data = &notification.data;
        log::trace!("BLE: rx {} bytes {:02X?}", data.len(), data);

        match data.len() {
            PACKET_SIZE => match RawPacket::from_slice(data) {
                Ok(packet) => {
                    let sample = decode(&packet, &self.flexion);
                    if self.queue.push(sample) == PushOutcome::Evicted {
                        log::debug!("BLE: consumer is not keeping up");
                    }
                    true
                }
                Err(e) => {
                    log::error!("BLE: {}", e);
                    false
                }
            },
            BATTERY_PACKET_SIZE => {
                if let Some(volts) = battery_voltage(data) {
                    log::debug!("BLE: battery {:.2} V", volts);
                    self.link.set_battery_voltage(volts);
                }
                false
            }
            SLEEP_STATUS_PACKET_SIZE => {
                let awake = data[0] == AWAKE_VALUE;
                log::debug!("BLE: sleep status awake={}", awake);
                self.link.set_awake(awake);
                false
            }
            n => {
                log::warn!(
                    "BLE: unknown {}-byte notification on {}",
                    n,
                    notification.characteristic_uuid
                );
                false
            }
        }
    }
}
