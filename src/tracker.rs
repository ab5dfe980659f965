//! Per-tick consumer of a [`Transceiver`]
//!
//! The tracker is called once per render/control tick. Each tick it advances
//! the connection, drains whatever samples the I/O thread queued since the
//! previous tick, and runs them through the [`FusionEngine`]. The time since
//! the last consumed batch is split evenly across the batch.
//!
//! ```text
//!   Connecting ──try_establish_connection() == true──▶ Connected
//!        ▲                                                 │
//!        └──────── framing fault / device went silent ─────┘
//! ```

use crate::config::FusionConfig;
use crate::core::transceiver::Transceiver;
use crate::core::types::{EulerAngles, Quaternion};
use crate::error::{Error, Result};
use crate::fusion::FusionEngine;
use crate::protocol::HapticFeedback;
use std::time::Duration;

/// What one tick produced
#[derive(Debug, Clone, Copy, Default)]
pub struct TickOutput {
    pub orientation: Quaternion,
    pub euler: EulerAngles,
    /// Latest flexion angle, degrees
    pub flexion_angle_deg: f32,
    /// Smoothed flexion angle, degrees
    pub smoothed_flexion_deg: f32,
    /// Samples consumed this tick
    pub samples: usize,
    pub connected: bool,
}

/// Owns a transceiver and the fusion state fed from it
pub struct Tracker {
    transceiver: Box<dyn Transceiver>,
    fusion: FusionEngine,
    connected: bool,
    was_awake: bool,
    unconsumed: Duration,
    last_haptic: Option<HapticFeedback>,
    write_fault: Option<Error>,
}

impl Tracker {
    pub fn new(transceiver: Box<dyn Transceiver>, fusion_config: FusionConfig) -> Self {
        Self {
            transceiver,
            fusion: FusionEngine::new(fusion_config),
            connected: false,
            was_awake: false,
            unconsumed: Duration::ZERO,
            last_haptic: None,
            write_fault: None,
        }
    }

    /// Advance by one tick of length `elapsed`.
    ///
    /// Discovery errors are logged and retried on the next tick. Any other
    /// error from connection establishment is returned.
    pub fn tick(&mut self, elapsed: Duration) -> Result<TickOutput> {
        if !self.connected {
            match self.transceiver.try_establish_connection() {
                Ok(true) => {
                    log::info!("Tracker: device connected");
                    self.connected = true;
                    self.was_awake = false;
                    self.unconsumed = Duration::ZERO;
                }
                Ok(false) => {}
                Err(e) if e.is_discovery() => {
                    log::warn!("Tracker: {}, retrying", e);
                }
                Err(e) => return Err(e),
            }
        }

        self.drain_faults();

        let mut consumed = 0;
        if self.connected {
            self.unconsumed += elapsed;
            if let Some(samples) = self.transceiver.try_get_sensor_data() {
                self.fusion.process_batch(&samples, self.unconsumed);
                self.unconsumed = Duration::ZERO;
                consumed = samples.len();
            }
            self.check_liveness();
        }

        let output = self.fusion.output();
        Ok(TickOutput {
            orientation: output.orientation,
            euler: output.euler,
            flexion_angle_deg: output.flexion_angle_deg,
            smoothed_flexion_deg: output.smoothed_flexion_deg,
            samples: consumed,
            connected: self.connected,
        })
    }

    /// Send a vibration command; percents are clamped to [0, 1].
    ///
    /// A write failure reported since the previous call is returned instead
    /// of sending. Repeating the last command is a no-op.
    pub fn send_haptic(&mut self, duty_cycle_percent: f32, frequency_percent: f32) -> Result<()> {
        self.drain_faults();
        if let Some(fault) = self.write_fault.take() {
            self.last_haptic = None;
            return Err(fault);
        }

        let feedback = HapticFeedback::new(duty_cycle_percent, frequency_percent);
        if self.last_haptic == Some(feedback) {
            return Ok(());
        }
        self.transceiver.send_haptic_feedback(feedback)?;
        self.last_haptic = Some(feedback);
        Ok(())
    }

    pub fn set_yaw(&mut self, yaw_deg: f32) {
        self.fusion.set_yaw(yaw_deg);
    }

    pub fn battery_voltage(&self) -> Option<f32> {
        self.transceiver.last_battery_voltage()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn fusion(&self) -> &FusionEngine {
        &self.fusion
    }

    pub fn fusion_mut(&mut self) -> &mut FusionEngine {
        &mut self.fusion
    }

    pub fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.transceiver.close()
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.was_awake = false;
        self.unconsumed = Duration::ZERO;
        self.last_haptic = None;
    }

    fn drain_faults(&mut self) {
        while let Some(fault) = self.transceiver.take_fault() {
            if fault.is_framing() {
                log::error!("Tracker: framing fault, reconnecting: {}", fault);
                self.disconnect();
            } else if matches!(fault, Error::WriteFailed(_)) {
                self.write_fault = Some(fault);
            } else {
                log::warn!("Tracker: transport fault: {}", fault);
            }
        }
    }

    fn check_liveness(&mut self) {
        if self.transceiver.device_is_awake(false) {
            self.was_awake = true;
        } else if self.was_awake {
            log::warn!("Tracker: device went silent, reconnecting");
            self.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{SensorSample, Vector3};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Default)]
    struct Script {
        connect: VecDeque<Result<bool>>,
        batches: VecDeque<Vec<SensorSample>>,
        faults: VecDeque<Error>,
        awake: bool,
        connect_calls: usize,
        haptics: Vec<u8>,
        closed: bool,
    }

    #[derive(Clone, Default)]
    struct ScriptedTransceiver(Arc<Mutex<Script>>);

    impl Transceiver for ScriptedTransceiver {
        fn try_establish_connection(&mut self) -> Result<bool> {
            let mut s = self.0.lock();
            s.connect_calls += 1;
            s.connect.pop_front().unwrap_or(Ok(true))
        }

        fn try_get_sensor_data(&mut self) -> Option<Vec<SensorSample>> {
            self.0.lock().batches.pop_front()
        }

        fn send_haptic_feedback(&mut self, feedback: HapticFeedback) -> Result<()> {
            self.0.lock().haptics.push(feedback.payload());
            Ok(())
        }

        fn device_is_awake(&mut self, _force_refresh: bool) -> bool {
            self.0.lock().awake
        }

        fn last_battery_voltage(&self) -> Option<f32> {
            Some(3.7)
        }

        fn take_fault(&mut self) -> Option<Error> {
            self.0.lock().faults.pop_front()
        }

        fn close(&mut self) -> Result<()> {
            self.0.lock().closed = true;
            Ok(())
        }
    }

    fn sample(flexion: f32) -> SensorSample {
        SensorSample {
            angular_velocity: Vector3::ZERO,
            linear_acceleration: Vector3::new(0.0, 0.0, 1.0),
            magnetic_field: Vector3::new(30.0, 0.0, -35.0),
            flexion_angle_deg: flexion,
        }
    }

    fn tracker() -> (Tracker, Arc<Mutex<Script>>) {
        let script = ScriptedTransceiver::default();
        script.0.lock().awake = true;
        let handle = Arc::clone(&script.0);
        (Tracker::new(Box::new(script), FusionConfig::default()), handle)
    }

    const TICK: Duration = Duration::from_millis(16);

    #[test]
    fn test_discovery_errors_are_retried() {
        let (mut tracker, script) = tracker();
        script
            .lock()
            .connect
            .extend([Err(Error::DeviceNotFound("x".into())), Ok(false), Ok(true)]);

        assert!(!tracker.tick(TICK).unwrap().connected);
        assert!(!tracker.tick(TICK).unwrap().connected);
        assert!(tracker.tick(TICK).unwrap().connected);
        tracker.tick(TICK).unwrap();
        assert_eq!(script.lock().connect_calls, 3);
    }

    #[test]
    fn test_other_connection_errors_are_returned() {
        let (mut tracker, script) = tracker();
        script
            .lock()
            .connect
            .push_back(Err(Error::Ble("adapter off".into())));
        assert!(matches!(tracker.tick(TICK), Err(Error::Ble(_))));
    }

    #[test]
    fn test_samples_consumed_and_fused() {
        let (mut tracker, script) = tracker();
        tracker.tick(TICK).unwrap();

        script
            .lock()
            .batches
            .push_back(vec![sample(90.0), sample(100.0), sample(110.0)]);
        let out = tracker.tick(TICK).unwrap();
        assert_eq!(out.samples, 3);
        assert_eq!(out.flexion_angle_deg, 110.0);
        assert!(out.smoothed_flexion_deg > 100.0 && out.smoothed_flexion_deg < 110.0);
        assert_eq!(tracker.fusion().sample_count(), 3);
        assert!((out.orientation.norm() - 1.0).abs() < 1e-5);

        let out = tracker.tick(TICK).unwrap();
        assert_eq!(out.samples, 0);
        assert_eq!(out.flexion_angle_deg, 110.0);
    }

    #[test]
    fn test_framing_fault_reconnects() {
        let (mut tracker, script) = tracker();
        assert!(tracker.tick(TICK).unwrap().connected);

        script
            .lock()
            .faults
            .push_back(Error::InvalidStartSequence("marker".into()));
        script.lock().connect.push_back(Ok(false));

        // The fault is drained after the connection step of this tick
        assert!(!tracker.tick(TICK).unwrap().connected);
        assert!(!tracker.tick(TICK).unwrap().connected);
        assert!(tracker.tick(TICK).unwrap().connected);
    }

    #[test]
    fn test_liveness_loss_reconnects() {
        let (mut tracker, script) = tracker();
        assert!(tracker.tick(TICK).unwrap().connected);

        script.lock().awake = false;
        assert!(!tracker.tick(TICK).unwrap().connected);
    }

    #[test]
    fn test_not_awake_before_first_data_is_not_a_loss() {
        let (mut tracker, script) = tracker();
        script.lock().awake = false;
        assert!(tracker.tick(TICK).unwrap().connected);
        assert!(tracker.tick(TICK).unwrap().connected);
    }

    #[test]
    fn test_haptic_deduplicated() {
        let (mut tracker, script) = tracker();
        tracker.send_haptic(0.5, 0.5).unwrap();
        tracker.send_haptic(0.5, 0.5).unwrap();
        tracker.send_haptic(1.0, 0.0).unwrap();
        tracker.send_haptic(1.0, 0.0).unwrap();

        let expected_first = HapticFeedback::new(0.5, 0.5).payload();
        assert_eq!(script.lock().haptics, vec![expected_first, 0xF8]);
    }

    #[test]
    fn test_write_failure_surfaces_on_next_send() {
        let (mut tracker, script) = tracker();
        tracker.send_haptic(1.0, 1.0).unwrap();

        script
            .lock()
            .faults
            .push_back(Error::WriteFailed("no ack".into()));
        assert!(matches!(
            tracker.send_haptic(1.0, 1.0),
            Err(Error::WriteFailed(_))
        ));

        // Next call resends even though the payload did not change
        tracker.send_haptic(1.0, 1.0).unwrap();
        assert_eq!(script.lock().haptics, vec![0xFF, 0xFF]);
    }

    #[test]
    fn test_battery_and_close() {
        let (mut tracker, script) = tracker();
        assert_eq!(tracker.battery_voltage(), Some(3.7));
        tracker.close().unwrap();
        assert!(script.lock().closed);
        assert!(!tracker.is_connected());
    }
}
