//! Byte accounting.
//!
//! Raw counts are bytes on the wire (TLS records); clear counts are
//! application plaintext. Counters only grow while connected and saturate
//! instead of wrapping.

/// Bytes moved by one transport read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transfer {
    /// Plaintext bytes
    pub clear: usize,
    /// Ciphertext bytes on the wire
    pub raw: usize,
}

impl Transfer {
    /// A transfer with separate clear and raw sizes.
    pub const fn new(clear: usize, raw: usize) -> Self {
        Self { clear, raw }
    }

    /// A transfer with no framing overhead.
    pub const fn plain(bytes: usize) -> Self {
        Self { clear: bytes, raw: bytes }
    }
}

/// Direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Written to the peer
    Sent,
    /// Read from the peer
    Received,
}

/// One of the four counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    /// Ciphertext written
    RawSent,
    /// Ciphertext read
    RawReceived,
    /// Plaintext written
    ClearSent,
    /// Plaintext read
    ClearReceived,
}

/// Raw and clear byte counters for the current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteCounters {
    raw_sent: u64,
    raw_received: u64,
    clear_sent: u64,
    clear_received: u64,
}

impl ByteCounters {
    /// All counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n` bytes to one counter, saturating at `u64::MAX`.
    pub fn add(&mut self, kind: CounterKind, n: u64) {
        let slot = match kind {
            CounterKind::RawSent => &mut self.raw_sent,
            CounterKind::RawReceived => &mut self.raw_received,
            CounterKind::ClearSent => &mut self.clear_sent,
            CounterKind::ClearReceived => &mut self.clear_received,
        };
        *slot = slot.saturating_add(n);
    }

    /// Account for a transport read or write.
    pub fn record(&mut self, direction: Direction, transfer: Transfer) {
        let (clear, raw) = match direction {
            Direction::Sent => (CounterKind::ClearSent, CounterKind::RawSent),
            Direction::Received => (CounterKind::ClearReceived, CounterKind::RawReceived),
        };
        self.add(clear, transfer.clear as u64);
        self.add(raw, transfer.raw as u64);
    }

    /// Value of one counter.
    pub fn get(&self, kind: CounterKind) -> u64 {
        match kind {
            CounterKind::RawSent => self.raw_sent,
            CounterKind::RawReceived => self.raw_received,
            CounterKind::ClearSent => self.clear_sent,
            CounterKind::ClearReceived => self.clear_received,
        }
    }

    /// Ciphertext bytes written.
    pub fn raw_sent(&self) -> u64 {
        self.raw_sent
    }

    /// Ciphertext bytes read.
    pub fn raw_received(&self) -> u64 {
        self.raw_received
    }

    /// Plaintext bytes written.
    pub fn clear_sent(&self) -> u64 {
        self.clear_sent
    }

    /// Plaintext bytes read.
    pub fn clear_received(&self) -> u64 {
        self.clear_received
    }

    /// Zero every counter (start of a new attempt).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn record_splits_clear_and_raw() {
        let mut counters = ByteCounters::new();
        counters.record(Direction::Sent, Transfer::new(11, 40));
        counters.record(Direction::Received, Transfer::plain(7));

        assert_eq!(counters.clear_sent(), 11);
        assert_eq!(counters.raw_sent(), 40);
        assert_eq!(counters.clear_received(), 7);
        assert_eq!(counters.raw_received(), 7);
    }

    #[test]
    fn add_saturates() {
        let mut counters = ByteCounters::new();
        counters.add(CounterKind::RawReceived, u64::MAX - 1);
        counters.add(CounterKind::RawReceived, 10);
        assert_eq!(counters.get(CounterKind::RawReceived), u64::MAX);
    }

    #[test]
    fn reset_zeroes() {
        let mut counters = ByteCounters::new();
        counters.add(CounterKind::ClearSent, 3);
        counters.reset();
        assert_eq!(counters, ByteCounters::new());
    }

    proptest! {
        #[test]
        fn prop_counters_are_monotonic(adds in prop::collection::vec(any::<u64>(), 0..20)) {
            let mut counters = ByteCounters::new();
            let mut last = 0;
            for n in adds {
                counters.add(CounterKind::ClearSent, n);
                prop_assert!(counters.clear_sent() >= last);
                last = counters.clear_sent();
            }
        }
    }
}
