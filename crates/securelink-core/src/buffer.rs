//! Fixed-capacity message buffers.
//!
//! The session owns two of these: the outbound message slot and the receive
//! scratch buffer. Both are cleared before reuse and never grow past their
//! capacity, so one message can never leak into the next.

use crate::error::CapacityError;

/// A byte buffer with a hard capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl MessageBuffer {
    /// Empty buffer holding at most `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: Vec::with_capacity(capacity), capacity }
    }

    /// Maximum number of bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Number of bytes held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds nothing.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drop the contents.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Replace the contents with `bytes`.
    ///
    /// Oversized input is rejected, never truncated; the buffer is left empty.
    pub fn load(&mut self, bytes: &[u8]) -> Result<(), CapacityError> {
        self.data.clear();
        if bytes.len() > self.capacity {
            return Err(CapacityError { len: bytes.len(), capacity: self.capacity });
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Zeroed scratch space of full capacity for a read.
    ///
    /// Follow with [`MessageBuffer::commit`] to keep the bytes actually read.
    pub fn prepare_read(&mut self) -> &mut [u8] {
        self.data.clear();
        self.data.resize(self.capacity, 0);
        &mut self.data
    }

    /// Keep the first `n` bytes of a read (clamped to capacity).
    pub fn commit(&mut self, n: usize) {
        self.data.truncate(n.min(self.capacity));
    }
}
