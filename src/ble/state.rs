//! Connection state shared between the BLE state machine and its workers
//!
//! All fields shared with worker threads are atomics so the read worker never
//! contends with the consumer thread.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Device acquisition progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    SearchingDevice,
    SearchingService,
    SearchingCharacteristics,
    Subscribing,
    AwaitingSubscriptionConfirmation,
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::SearchingDevice => "searching device",
            ConnectionState::SearchingService => "searching service",
            ConnectionState::SearchingCharacteristics => "searching characteristics",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::AwaitingSubscriptionConfirmation => "awaiting subscriptions",
            ConnectionState::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// What a characteristic carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacteristicRole {
    Sensor,
    Haptic,
    SleepStatus,
}

/// One GATT characteristic the transceiver uses
#[derive(Debug)]
pub struct CharacteristicInfo {
    pub uuid: String,
    pub role: CharacteristicRole,
    pub should_subscribe: bool,
    /// Notification payload size; 0 for write-only characteristics
    pub expected_size: usize,
    subscribed: AtomicBool,
}

impl CharacteristicInfo {
    pub fn new(uuid: &str, role: CharacteristicRole, should_subscribe: bool, expected_size: usize) -> Self {
        Self {
            uuid: uuid.to_string(),
            role,
            should_subscribe,
            expected_size: if should_subscribe { expected_size } else { 0 },
            subscribed: AtomicBool::new(false),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::Acquire)
    }

    pub fn set_subscribed(&self, subscribed: bool) {
        self.subscribed.store(subscribed, Ordering::Release);
    }
}

/// Mark every characteristic unsubscribed.
pub fn clear_subscriptions(characteristics: &[CharacteristicInfo]) {
    for c in characteristics {
        c.set_subscribed(false);
    }
}

/// True when every characteristic that should notify is subscribed.
pub fn all_subscribed(characteristics: &[CharacteristicInfo]) -> bool {
    characteristics
        .iter()
        .filter(|c| c.should_subscribe)
        .all(CharacteristicInfo::is_subscribed)
}

/// Liveness and telemetry shared with the read worker
pub struct LinkState {
    /// Subscriptions confirmed; liveness is tracked only while set
    streaming: AtomicBool,
    awake: AtomicBool,
    missed_cycles: AtomicU32,
    reset_requested: AtomicBool,
    sleep_events: AtomicU32,
    /// f32 bits of the last battery reading, NaN when none
    battery_volts: AtomicU32,
    /// Set by the read worker as its last action
    finished: AtomicBool,
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkState {
    pub fn new() -> Self {
        Self {
            streaming: AtomicBool::new(false),
            awake: AtomicBool::new(false),
            missed_cycles: AtomicU32::new(0),
            reset_requested: AtomicBool::new(false),
            sleep_events: AtomicU32::new(0),
            battery_volts: AtomicU32::new(f32::NAN.to_bits()),
            finished: AtomicBool::new(false),
        }
    }

    /// Subscriptions confirmed: start liveness tracking from a clean slate.
    pub fn mark_streaming(&self) {
        self.missed_cycles.store(0, Ordering::Relaxed);
        self.reset_requested.store(false, Ordering::Relaxed);
        self.awake.store(true, Ordering::Relaxed);
        self.streaming.store(true, Ordering::Release);
    }

    pub fn stop_streaming(&self) {
        self.streaming.store(false, Ordering::Release);
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Account one poll cycle. Returns true exactly once per sleep, on the
    /// cycle where the missed count first exceeds `threshold`.
    pub fn record_cycle(&self, sensor_packets: usize, threshold: u32) -> bool {
        if !self.is_streaming() {
            return false;
        }
        if sensor_packets > 0 {
            self.missed_cycles.store(0, Ordering::Relaxed);
            self.awake.store(true, Ordering::Relaxed);
            return false;
        }

        let missed = self.missed_cycles.fetch_add(1, Ordering::Relaxed) + 1;
        if missed > threshold && self.streaming.swap(false, Ordering::AcqRel) {
            self.awake.store(false, Ordering::Relaxed);
            self.sleep_events.fetch_add(1, Ordering::Relaxed);
            self.reset_requested.store(true, Ordering::Release);
            return true;
        }
        false
    }

    /// Re-derive the awake flag from the missed counter.
    pub fn refresh_awake(&self, threshold: u32) -> bool {
        if self.is_streaming() && self.missed_cycles.load(Ordering::Relaxed) > threshold {
            self.awake.store(false, Ordering::Relaxed);
        }
        self.is_awake()
    }

    pub fn is_awake(&self) -> bool {
        self.awake.load(Ordering::Relaxed)
    }

    pub fn set_awake(&self, awake: bool) {
        self.awake.store(awake, Ordering::Relaxed);
    }

    pub fn missed_cycles(&self) -> u32 {
        self.missed_cycles.load(Ordering::Relaxed)
    }

    pub fn sleep_events(&self) -> u32 {
        self.sleep_events.load(Ordering::Relaxed)
    }

    /// Consume a pending reset request from the read worker.
    pub fn take_reset_request(&self) -> bool {
        self.reset_requested.swap(false, Ordering::AcqRel)
    }

    pub fn set_battery_voltage(&self, volts: f32) {
        self.battery_volts.store(volts.to_bits(), Ordering::Relaxed);
    }

    pub fn battery_voltage(&self) -> Option<f32> {
        let v = f32::from_bits(self.battery_volts.load(Ordering::Relaxed));
        (!v.is_nan()).then_some(v)
    }

    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}
