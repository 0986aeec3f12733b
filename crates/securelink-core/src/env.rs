//! Environment abstraction.
//!
//! The state machine takes time as a step parameter; drivers get it from an
//! [`Environment`]. Production reads the system monotonic clock, simulation
//! uses a manually advanced one.

use std::time::Instant;

/// Source of monotonic time.
pub trait Environment {
    /// Current monotonic time.
    fn now(&self) -> Instant;
}

/// The host's monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
