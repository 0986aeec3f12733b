//! Reference model for model-based testing.
//!
//! A deliberately simple description of what the state machine should do
//! against a well-behaved peer (instant connect, instant secure negotiation,
//! ample buffer space). Property tests drive the model and the real machine
//! with the same [`Operation`]s and compare them after every operation.

use securelink_core::{AddressFamily, CommandError};

/// Targets the generated operations pick from.
///
/// Index 0 is valid for IPv4 and "any", index 1 for IPv6 and "any"; the
/// rest are always rejected.
pub const TARGETS: [&str; 5] =
    ["10.0.0.5:4433", "[::1]:4433", "10.0.0.5", "10.0.0.5:0", "gateway.local:443"];

/// Outbound message capacity assumed by the model.
pub const MESSAGE_CAPACITY: usize = 256;

/// Operator or peer action.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Connect to `TARGETS[target]`
    Connect {
        /// Index into [`TARGETS`]
        target: usize,
    },
    /// Send a message of `len` bytes
    Send {
        /// Message length
        len: usize,
    },
    /// Peer delivers `len` bytes
    Deliver {
        /// Payload length
        len: usize,
    },
    /// Operator disconnects
    Disconnect,
    /// Operator switches address family
    SetFamily(AddressFamily),
    /// Simulated time passes
    AdvanceTime {
        /// Milliseconds to advance
        millis: u16,
    },
}

/// Coarse connection phase visible to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for a connect command
    Idle,
    /// Secure connection up, waiting for messages
    Connected,
}

/// Why the model expects a command to be refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Wrong phase for the command
    InvalidState,
    /// Empty message
    EmptyMessage,
    /// Message over capacity
    MessageTooLarge,
}

impl Rejection {
    /// Whether a real command error is this rejection.
    pub fn matches(self, error: &CommandError) -> bool {
        matches!(
            (self, error),
            (Self::InvalidState, CommandError::InvalidState { .. })
                | (Self::EmptyMessage, CommandError::EmptyMessage)
                | (Self::MessageTooLarge, CommandError::MessageTooLarge(_))
        )
    }
}

/// Reference model of one session.
#[derive(Debug, Clone)]
pub struct ModelSession {
    phase: Phase,
    family: AddressFamily,
    clear_sent: u64,
    clear_received: u64,
    attempts: u64,
}

impl ModelSession {
    /// A booted, idle session in IPv4 mode.
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            family: AddressFamily::V4,
            clear_sent: 0,
            clear_received: 0,
            attempts: 0,
        }
    }

    /// Apply an operation; `Err` means the command must be refused.
    ///
    /// Peer-side operations never fail.
    pub fn apply(&mut self, op: &Operation) -> Result<(), Rejection> {
        match *op {
            Operation::Connect { target } => {
                if self.phase != Phase::Idle {
                    return Err(Rejection::InvalidState);
                }
                if self.accepts(target) {
                    self.phase = Phase::Connected;
                    self.clear_sent = 0;
                    self.clear_received = 0;
                    self.attempts += 1;
                }
                Ok(())
            },
            Operation::Send { len } => {
                if self.phase != Phase::Connected {
                    return Err(Rejection::InvalidState);
                }
                if len == 0 {
                    return Err(Rejection::EmptyMessage);
                }
                if len > MESSAGE_CAPACITY {
                    return Err(Rejection::MessageTooLarge);
                }
                self.clear_sent += len as u64;
                Ok(())
            },
            Operation::Deliver { len } => {
                if self.phase == Phase::Connected {
                    self.clear_received += len as u64;
                }
                Ok(())
            },
            Operation::Disconnect => {
                if self.phase != Phase::Connected {
                    return Err(Rejection::InvalidState);
                }
                self.phase = Phase::Idle;
                Ok(())
            },
            Operation::SetFamily(family) => {
                self.family = family;
                Ok(())
            },
            Operation::AdvanceTime { .. } => Ok(()),
        }
    }

    fn accepts(&self, target: usize) -> bool {
        match target {
            0 => matches!(self.family, AddressFamily::V4 | AddressFamily::Any),
            1 => matches!(self.family, AddressFamily::V6 | AddressFamily::Any),
            _ => false,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Plaintext sent during the current attempt.
    pub fn clear_sent(&self) -> u64 {
        self.clear_sent
    }

    /// Plaintext received during the current attempt.
    pub fn clear_received(&self) -> u64 {
        self.clear_received
    }

    /// Successful connection attempts so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }
}

impl Default for ModelSession {
    fn default() -> Self {
        Self::new()
    }
}
