//! Wired serial transceiver
//!
//! The port is opened in the constructor and a `serial-reader` thread starts
//! reading immediately. The link counts as connected only while the framer
//! is synchronized: after the start marker, and again after the marker that
//! follows a framing reset. The reader owns the framing state and fills the
//! sample queue; the consumer drains it without touching the port.
//!
//! The serial link has no haptic channel and no sleep notification. Liveness
//! is derived from the time since the last received byte.

mod reader;

pub use reader::SerialLink;

use crate::config::{AppConfig, SerialConfig};
use crate::core::transceiver::{Transceiver, fault_channel};
use crate::core::types::SensorSample;
use crate::error::{Error, Result};
use crate::protocol::{HapticFeedback, StreamFramer};
use crate::queue::SampleQueue;
use crate::transport::{SerialTransport, Transport};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use reader::ReadWorker;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Sensor stream over a serial port
pub struct SerialTransceiver {
    config: SerialConfig,
    transport: Arc<Mutex<Box<dyn Transport>>>,
    link: Arc<SerialLink>,
    queue: Arc<SampleQueue>,
    faults: Receiver<Error>,
    shutdown: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    closed: bool,
}

impl SerialTransceiver {
    /// Open the configured serial port and start reading.
    pub fn open(config: &AppConfig) -> Result<Self> {
        let serial = &config.serial;
        let transport = SerialTransport::open(&serial.port, serial.baud_rate, serial.read_timeout())?;
        Self::with_transport(Box::new(transport), config)
    }

    /// Start reading from an already-open transport.
    pub fn with_transport(transport: Box<dyn Transport>, config: &AppConfig) -> Result<Self> {
        let serial = config.serial.clone();
        let transport = Arc::new(Mutex::new(transport));
        let link = Arc::new(SerialLink::new());
        let queue = Arc::new(SampleQueue::new(config.queue.capacity));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (fault_tx, faults) = fault_channel();

        let worker = ReadWorker {
            transport: Arc::clone(&transport),
            framer: StreamFramer::new(serial.start_marker.as_bytes(), serial.buffer_capacity),
            flexion: config.flexion,
            link: Arc::clone(&link),
            queue: Arc::clone(&queue),
            max_silence: serial.max_silence(),
            faults: fault_tx,
            shutdown: Arc::clone(&shutdown),
        };
        let reader = thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || worker.run())
            .map_err(|e| Error::Other(format!("Failed to spawn serial reader: {}", e)))?;

        Ok(Self {
            config: serial,
            transport,
            link,
            queue,
            faults,
            shutdown,
            reader: Some(reader),
            closed: false,
        })
    }

    pub fn link(&self) -> &SerialLink {
        &self.link
    }

    pub fn queue(&self) -> &SampleQueue {
        &self.queue
    }
}

impl Transceiver for SerialTransceiver {
    fn try_establish_connection(&mut self) -> Result<bool> {
        if self.closed {
            return Err(Error::Other("serial transceiver is closed".to_string()));
        }
        Ok(self.link.is_synchronized())
    }

    fn try_get_sensor_data(&mut self) -> Option<Vec<SensorSample>> {
        let samples = self.queue.drain_all();
        (!samples.is_empty()).then_some(samples)
    }

    fn send_haptic_feedback(&mut self, _feedback: HapticFeedback) -> Result<()> {
        Err(Error::NotSupported(
            "haptic feedback requires the BLE transport".to_string(),
        ))
    }

    fn device_is_awake(&mut self, force_refresh: bool) -> bool {
        if force_refresh {
            self.link.refresh_awake(self.config.max_silence())
        } else {
            self.link.is_awake()
        }
    }

    fn take_fault(&mut self) -> Option<Error> {
        self.faults.try_recv().ok()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        log::info!("Serial: closing {}", self.config.port);
        self.shutdown.store(true, Ordering::Relaxed);

        let deadline = Instant::now() + self.config.close_timeout();
        while !self.link.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        if !self.link.is_finished() {
            return Err(Error::FailedToClose(format!(
                "serial reader did not stop within {:?}",
                self.config.close_timeout()
            )));
        }

        if let Some(handle) = self.reader.take() {
            handle
                .join()
                .map_err(|_| Error::ThreadPanic("serial-reader"))?;
        }
        if let Err(e) = self.transport.lock().flush() {
            log::warn!("Serial: flush on close failed: {}", e);
        }
        self.closed = true;
        log::info!("Serial: closed");
        Ok(())
    }
}

impl Drop for SerialTransceiver {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                log::warn!("Serial: close on drop failed: {}", e);
            }
        }
    }
}
