//! Simulated environment with a manually advanced clock.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use securelink_core::Environment;

/// Simulated environment.
///
/// Time starts at construction and only moves when [`SimEnv::advance`] is
/// called. Clones share the same clock.
#[derive(Debug, Clone)]
pub struct SimEnv {
    origin: Instant,
    offset_nanos: Arc<AtomicU64>,
}

impl SimEnv {
    /// Create a clock at offset zero.
    pub fn new() -> Self {
        Self { origin: Instant::now(), offset_nanos: Arc::new(AtomicU64::new(0)) }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        let _ = self.offset_nanos.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            Some(n.saturating_add(nanos))
        });
    }

    /// Total simulated time since construction.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::Acquire))
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}
