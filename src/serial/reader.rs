//! Reader thread for the serial transceiver
//!
//! Reads whatever the transport has, feeds it to the [`StreamFramer`] and
//! queues every decoded packet. Framing and transport errors are posted to
//! the fault channel; the loop itself only stops on shutdown.

use crate::core::transceiver::post_fault;
use crate::error::Error;
use crate::protocol::constants::PACKET_SIZE;
use crate::protocol::{FlexionCalibration, StreamFramer, decode};
use crate::queue::{PushOutcome, SampleQueue};
use crate::transport::Transport;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const NEVER: u64 = u64::MAX;

/// State shared between the reader thread and the transceiver
pub struct SerialLink {
    epoch: Instant,
    /// Milliseconds since `epoch` of the last non-empty read
    last_rx_ms: AtomicU64,
    synchronized: AtomicBool,
    awake: AtomicBool,
    packets: AtomicU64,
    finished: AtomicBool,
}

impl Default for SerialLink {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialLink {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_rx_ms: AtomicU64::new(NEVER),
            synchronized: AtomicBool::new(false),
            awake: AtomicBool::new(false),
            packets: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        }
    }

    fn touch(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.last_rx_ms.store(now, Ordering::Relaxed);
    }

    /// Time since the last received byte, `None` before any data.
    pub fn silence(&self) -> Option<Duration> {
        match self.last_rx_ms.load(Ordering::Relaxed) {
            NEVER => None,
            last => {
                let now = self.epoch.elapsed().as_millis() as u64;
                Some(Duration::from_millis(now.saturating_sub(last)))
            }
        }
    }

    /// Recompute the awake flag from the silence window.
    pub fn refresh_awake(&self, max_silence: Duration) -> bool {
        let awake = self.silence().is_some_and(|s| s <= max_silence);
        self.awake.store(awake, Ordering::Relaxed);
        awake
    }

    pub fn is_awake(&self) -> bool {
        self.awake.load(Ordering::Relaxed)
    }

    /// Start marker seen and framer in steady state.
    pub fn is_synchronized(&self) -> bool {
        self.synchronized.load(Ordering::Relaxed)
    }

    /// Packets decoded since start.
    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    pub(super) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

pub(super) struct ReadWorker {
    pub transport: Arc<Mutex<Box<dyn Transport>>>,
    pub framer: StreamFramer,
    pub flexion: FlexionCalibration,
    pub link: Arc<SerialLink>,
    pub queue: Arc<SampleQueue>,
    pub max_silence: Duration,
    pub faults: Sender<Error>,
    pub shutdown: Arc<AtomicBool>,
}

impl ReadWorker {
    pub(super) fn run(mut self) {
        log::info!("Serial: reader started, waiting for start marker");
        let mut buffer = [0u8; PACKET_SIZE];

        while !self.shutdown.load(Ordering::Relaxed) {
            let read = self.transport.lock().read(&mut buffer);

            match read {
                Ok(0) => thread::sleep(Duration::from_millis(2)),
                Ok(n) => {
                    self.link.touch();
                    log::trace!("Serial: rx {} bytes {:02X?}", n, &buffer[..n]);
                    self.handle_chunk(&buffer[..n]);
                }
                Err(e) => {
                    log::error!("Serial: read failed: {}", e);
                    post_fault(&self.faults, e);
                    thread::sleep(Duration::from_millis(10));
                }
            }

            self.link.refresh_awake(self.max_silence);
        }

        self.link.mark_finished();
        log::info!("Serial: reader exiting");
    }

    fn handle_chunk(&mut self, chunk: &[u8]) {
        let was_synchronized = self.framer.is_synchronized();
        let queue = &self.queue;
        let flexion = &self.flexion;
        let mut evicted = false;

        let result = self.framer.feed(chunk, |packet| {
            if queue.push(decode(&packet, flexion)) == PushOutcome::Evicted {
                evicted = true;
            }
        });

        match result {
            Ok(n) => {
                self.link.packets.fetch_add(n as u64, Ordering::Relaxed);
                if !was_synchronized && self.framer.is_synchronized() {
                    log::info!("Serial: start marker received, streaming");
                }
                if evicted {
                    log::debug!("Serial: consumer is not keeping up");
                }
            }
            Err(e) => {
                log::error!("Serial: framing error, resynchronizing: {}", e);
                post_fault(&self.faults, e);
            }
        }

        self.link
            .synchronized
            .store(self.framer.is_synchronized(), Ordering::Relaxed);
    }
}
