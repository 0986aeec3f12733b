//! Error types for the connection core.
//!
//! None of these cross the state machine's step boundary: a failure inside a
//! step becomes a state transition plus a [`crate::MachineEvent`]. They are
//! returned by the parser, the transport capability and the command entry
//! points.

use thiserror::Error;

use crate::{machine::ConnectionState, transport::SocketHandle};

/// Rejection kinds for a `host:port` target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TargetError {
    /// No separator, or nothing after it.
    #[error("no port")]
    NoPort,

    /// Port outside `[1, 65535]` or not numeric.
    #[error("invalid port")]
    InvalidPort,

    /// Host is not an address of the selected family.
    #[error("invalid host")]
    InvalidHost,
}

/// Input larger than a fixed-capacity buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{len} bytes exceeds capacity of {capacity} bytes")]
pub struct CapacityError {
    /// Length of the rejected input
    pub len: usize,
    /// Capacity of the buffer
    pub capacity: usize,
}

/// Errors returned by the command entry points of the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The machine is not in a state that accepts this command.
    #[error("cannot {operation} while in state {state:?}")]
    InvalidState {
        /// State the machine was in
        state: ConnectionState,
        /// Rejected operation
        operation: &'static str,
    },

    /// Target string does not fit the target slot.
    #[error("target too long: {0}")]
    TargetTooLong(CapacityError),

    /// Message does not fit the outbound message buffer.
    #[error("message too large: {0}")]
    MessageTooLarge(CapacityError),

    /// Nothing to send.
    #[error("message is empty")]
    EmptyMessage,
}

/// Errors reported by a [`crate::SecureTransport`] implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport could not create a socket.
    #[error("socket open failed: {0}")]
    Open(String),

    /// The handle does not name an open socket.
    #[error("unknown socket {0}")]
    UnknownSocket(SocketHandle),

    /// A receive signal is already registered for this socket.
    #[error("receive signal already registered on socket {0}")]
    AlreadyRegistered(SocketHandle),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// I/O error from the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
