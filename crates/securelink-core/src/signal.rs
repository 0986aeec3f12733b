//! Receive signal bridge.
//!
//! The transport learns about inbound data on its own schedule, possibly on
//! another thread. It announces it by raising a [`ReceiveSignal`], which only
//! bumps a counter. The state machine owns the matching [`ReceiveBridge`]
//! and consumes one pending signal per step, so the session's state field
//! has a single writer and no preemption is lost.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

/// Transport-side handle for announcing inbound data.
///
/// Cheap to clone and safe to raise from any thread.
#[derive(Debug, Clone)]
pub struct ReceiveSignal {
    pending: Arc<AtomicUsize>,
}

impl ReceiveSignal {
    /// Announce that inbound data is available.
    pub fn raise(&self) {
        // Saturating; a stuck counter at usize::MAX still reads as pending.
        let _ = self.pending.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            Some(n.saturating_add(1))
        });
    }

    /// Whether a raised signal has not been consumed yet.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) > 0
    }
}

/// Machine-side end of the bridge, created once per secure connection.
#[derive(Debug, Default)]
pub struct ReceiveBridge {
    pending: Arc<AtomicUsize>,
}

impl ReceiveBridge {
    /// A bridge with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal handle to register with the transport.
    pub fn signal(&self) -> ReceiveSignal {
        ReceiveSignal { pending: Arc::clone(&self.pending) }
    }

    /// Number of raised signals not yet consumed.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Consume one pending signal. Returns `false` if none was pending.
    pub fn take_one(&self) -> bool {
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}
