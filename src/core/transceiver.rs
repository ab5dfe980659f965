//! Transceiver trait definition

use crate::core::types::SensorSample;
use crate::error::{Error, Result};
use crate::protocol::HapticFeedback;
use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Faults held for the consumer before new ones are dropped
pub const FAULT_CHANNEL_CAPACITY: usize = 32;

/// Bounded channel from worker threads to the consumer.
pub fn fault_channel() -> (Sender<Error>, Receiver<Error>) {
    crossbeam_channel::bounded(FAULT_CHANNEL_CAPACITY)
}

/// Post a fault without blocking. A full channel drops the fault: the
/// consumer already has unread faults of the same origin.
pub fn post_fault(faults: &Sender<Error>, fault: Error) {
    match faults.try_send(fault) {
        Ok(()) => {}
        Err(TrySendError::Full(dropped)) => {
            log::debug!("Fault channel full, dropping: {}", dropped);
        }
        Err(TrySendError::Disconnected(_)) => {}
    }
}

/// Device link that produces sensor samples and accepts haptic commands.
///
/// Implementations own an I/O thread that fills a bounded sample queue. All
/// methods are called from the consumer thread and never block on I/O.
pub trait Transceiver: Send {
    /// Advance connection establishment by one non-blocking step.
    ///
    /// Returns `Ok(true)` once the link is streaming. Discovery errors are
    /// recoverable and the caller may call again on a later tick.
    fn try_establish_connection(&mut self) -> Result<bool>;

    /// Drain every sample queued since the previous call, in arrival order.
    ///
    /// Returns `None` when no samples are available.
    fn try_get_sensor_data(&mut self) -> Option<Vec<SensorSample>>;

    /// Queue a haptic command for the device.
    fn send_haptic_feedback(&mut self, feedback: HapticFeedback) -> Result<()>;

    /// Device liveness. `force_refresh` re-evaluates against the link's
    /// silence counters instead of returning the cached value.
    fn device_is_awake(&mut self, force_refresh: bool) -> bool;

    /// Most recent battery reading in volts, if one has been received.
    fn last_battery_voltage(&self) -> Option<f32> {
        None
    }

    /// Next fault reported by a worker thread, if any.
    fn take_fault(&mut self) -> Option<Error>;

    /// Stop worker threads and release the device.
    fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_channel_is_bounded() {
        let (tx, rx) = fault_channel();
        for i in 0..FAULT_CHANNEL_CAPACITY * 3 {
            post_fault(&tx, Error::Other(format!("fault {}", i)));
        }
        assert_eq!(rx.len(), FAULT_CHANNEL_CAPACITY);

        // Oldest faults are kept
        assert!(matches!(rx.try_recv(), Ok(Error::Other(m)) if m == "fault 0"));

        drop(rx);
        post_fault(&tx, Error::Other("after disconnect".into()));
    }
}
