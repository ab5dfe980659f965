//! Mock transport for testing
//!
//! Each injected chunk is delivered by its own `read` call, so tests control
//! exactly how the byte stream is split.

use super::Transport;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Mock transport with scripted read chunks
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    read_chunks: VecDeque<Vec<u8>>,
    fail_reads: bool,
    reads: usize,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                read_chunks: VecDeque::new(),
                fail_reads: false,
                reads: 0,
            })),
        }
    }

    /// Queue one chunk to be returned by a single read
    pub fn inject_read(&self, data: &[u8]) {
        if !data.is_empty() {
            self.inner.lock().read_chunks.push_back(data.to_vec());
        }
    }

    /// Queue `data` split into chunks of at most `chunk_size` bytes
    pub fn inject_chunked(&self, data: &[u8], chunk_size: usize) {
        for chunk in data.chunks(chunk_size.max(1)) {
            self.inject_read(chunk);
        }
    }

    /// Number of chunks not yet read
    pub fn pending_chunks(&self) -> usize {
        self.inner.lock().read_chunks.len()
    }

    /// Number of reads that returned data
    pub fn read_count(&self) -> usize {
        self.inner.lock().reads
    }

    /// Make subsequent reads fail with an I/O error
    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.lock().fail_reads = fail;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.fail_reads {
            return Err(Error::Io(std::io::Error::other("mock read failure")));
        }

        let Some(chunk) = inner.read_chunks.front_mut() else {
            return Ok(0);
        };

        let n = chunk.len().min(buffer.len());
        buffer[..n].copy_from_slice(&chunk[..n]);
        chunk.drain(..n);
        if chunk.is_empty() {
            inner.read_chunks.pop_front();
        }
        inner.reads += 1;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_delivered_separately() {
        let mock = MockTransport::new();
        mock.inject_read(&[1, 2, 3]);
        mock.inject_read(&[4]);

        let mut port = mock.clone();
        let mut buf = [0u8; 16];
        assert_eq!(port.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(port.read(&mut buf).unwrap(), 1);
        assert_eq!(port.read(&mut buf).unwrap(), 0);
        assert_eq!(mock.read_count(), 2);
    }

    #[test]
    fn test_chunk_larger_than_buffer() {
        let mock = MockTransport::new();
        mock.inject_read(&[1, 2, 3, 4, 5]);

        let mut port = mock.clone();
        let mut buf = [0u8; 2];
        assert_eq!(port.read(&mut buf).unwrap(), 2);
        assert_eq!(mock.pending_chunks(), 1);
        assert_eq!(port.read(&mut buf).unwrap(), 2);
        assert_eq!(port.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 5);
    }

    #[test]
    fn test_read_failure_injection() {
        let mock = MockTransport::new();
        mock.inject_read(&[0xAB]);
        mock.set_fail_reads(true);

        let mut port = mock.clone();
        assert!(port.read(&mut [0u8; 4]).is_err());
        assert_eq!(mock.pending_chunks(), 1);

        mock.set_fail_reads(false);
        assert_eq!(port.read(&mut [0u8; 4]).unwrap(), 1);
    }
}
