//! Stream framer for the serial sensor link
//!
//! The device announces a stream with an ASCII start marker and then sends
//! back-to-back fixed-size packets with no delimiters. Reads arrive in chunks
//! of any size, so the framer keeps a small pending buffer between calls.
//!
//! # Phases
//!
//! 1. **Synchronization**: bytes are matched against the marker one at a time.
//!    The marker must arrive as an isolated message; data bytes following
//!    the completed marker in the same read are rejected with
//!    [`Error::InvalidStartSequence`].
//! 2. **Steady state**: chunks are appended to the pending buffer and every
//!    complete packet is sliced off. The pending buffer is bounded; a chunk
//!    that would overflow it fails with [`Error::FramerBufferFull`].
//!
//! Either error resets the framer to the synchronization phase.

use super::codec::RawPacket;
use super::constants::{DEFAULT_FRAMER_CAPACITY, DEFAULT_START_MARKER, PACKET_SIZE};
use crate::error::{Error, Result};

/// Start-marker synchronizing packet framer
pub struct StreamFramer {
    marker: Vec<u8>,
    cursor: usize,
    synchronized: bool,
    pending: Vec<u8>,
    capacity: usize,
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new(DEFAULT_START_MARKER.as_bytes(), DEFAULT_FRAMER_CAPACITY)
    }
}

impl StreamFramer {
    /// Create a framer for `marker` with a pending buffer of `capacity` bytes.
    ///
    /// The capacity is raised to at least one packet.
    pub fn new(marker: &[u8], capacity: usize) -> Self {
        let capacity = capacity.max(PACKET_SIZE);
        Self {
            marker: marker.to_vec(),
            cursor: 0,
            synchronized: marker.is_empty(),
            pending: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all progress and wait for the start marker again.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.synchronized = self.marker.is_empty();
        self.pending.clear();
    }

    /// Consume one transport read.
    ///
    /// Every complete packet is passed to `on_packet` in stream order.
    /// Returns the number of packets emitted.
    pub fn feed<F>(&mut self, chunk: &[u8], mut on_packet: F) -> Result<usize>
    where
        F: FnMut(RawPacket),
    {
        if chunk.is_empty() {
            return Ok(0);
        }

        if !self.synchronized {
            return self.match_marker(chunk).map(|_| 0);
        }

        if self.pending.len() + chunk.len() > self.capacity {
            let err = Error::FramerBufferFull {
                capacity: self.capacity,
                pending: self.pending.len(),
                incoming: chunk.len(),
            };
            self.reset();
            return Err(err);
        }

        self.pending.extend_from_slice(chunk);

        let mut emitted = 0;
        let mut consumed = 0;
        while self.pending.len() - consumed >= PACKET_SIZE {
            let packet = RawPacket::from_slice(&self.pending[consumed..consumed + PACKET_SIZE])?;
            on_packet(packet);
            consumed += PACKET_SIZE;
            emitted += 1;
        }
        self.pending.drain(..consumed);

        Ok(emitted)
    }

    fn match_marker(&mut self, chunk: &[u8]) -> Result<()> {
        for (i, &byte) in chunk.iter().enumerate() {
            if byte == self.marker[self.cursor] {
                self.cursor += 1;
            } else {
                self.cursor = usize::from(byte == self.marker[0]);
            }

            if self.cursor == self.marker.len() {
                let trailing = chunk.len() - i - 1;
                if trailing > 0 {
                    self.reset();
                    return Err(Error::InvalidStartSequence(format!(
                        "{} data bytes followed the start marker in the same read",
                        trailing
                    )));
                }
                self.synchronized = true;
                log::debug!("Framer: start marker received, streaming");
                return Ok(());
            }
        }

        log::trace!(
            "Framer: marker progress {}/{}",
            self.cursor,
            self.marker.len()
        );
        Ok(())
    }
}
