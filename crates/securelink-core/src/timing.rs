//! Lifecycle milestone timestamps.
//!
//! Each connection attempt records up to six monotonic timestamps. A
//! milestone that has not happened yet is `None`. Milestones happen in
//! declaration order whenever they happen at all; first and last data may
//! coincide on a single-packet exchange.

use std::time::{Duration, Instant};

/// A lifecycle event worth timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Milestone {
    /// Target accepted by the parser
    AttemptStarted,
    /// Destination address known
    AddressResolved,
    /// TCP connection established
    ConnectionOpened,
    /// TLS negotiation finished (secure or not)
    NegotiationComplete,
    /// First application data received
    FirstDataReceived,
    /// Most recent application data received
    LastDataReceived,
}

impl Milestone {
    /// All milestones in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::AttemptStarted,
        Self::AddressResolved,
        Self::ConnectionOpened,
        Self::NegotiationComplete,
        Self::FirstDataReceived,
        Self::LastDataReceived,
    ];

    fn index(self) -> usize {
        match self {
            Self::AttemptStarted => 0,
            Self::AddressResolved => 1,
            Self::ConnectionOpened => 2,
            Self::NegotiationComplete => 3,
            Self::FirstDataReceived => 4,
            Self::LastDataReceived => 5,
        }
    }
}

/// Per-attempt milestone timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timings {
    stamps: [Option<Instant>; 6],
}

impl Timings {
    /// Empty timings; no milestone has occurred.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a milestone.
    ///
    /// Every milestone is write-once per attempt except
    /// [`Milestone::LastDataReceived`], which tracks the latest receive.
    /// Stamping an already-recorded milestone is a no-op.
    pub fn stamp(&mut self, milestone: Milestone, now: Instant) {
        let slot = &mut self.stamps[milestone.index()];
        if milestone == Milestone::LastDataReceived || slot.is_none() {
            *slot = Some(now);
        }
    }

    /// Timestamp of a milestone, if it occurred.
    pub fn get(&self, milestone: Milestone) -> Option<Instant> {
        self.stamps[milestone.index()]
    }

    /// Time between two milestones.
    ///
    /// `None` if either is missing or `to` precedes `from`.
    pub fn elapsed(&self, from: Milestone, to: Milestone) -> Option<Duration> {
        let start = self.get(from)?;
        let end = self.get(to)?;
        end.checked_duration_since(start)
    }

    /// Forget every milestone (start of a new attempt).
    pub fn reset(&mut self) {
        self.stamps = [None; 6];
    }
}
