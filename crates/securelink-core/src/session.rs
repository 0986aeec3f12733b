//! Session data for the single logical connection.
//!
//! The session is owned by the state machine. The command surface writes into
//! it only through the machine's command methods; everything else is
//! read-only from outside.

use std::time::Instant;

use crate::{
    address::TargetAddress,
    buffer::MessageBuffer,
    counters::ByteCounters,
    machine::{ConnectionState, MachineConfig},
    signal::ReceiveBridge,
    timing::Timings,
    transport::{SocketHandle, Subscription},
};

/// Mutable state of the current (or last) connection attempt.
///
/// Fields describing a closed connection go stale after teardown and are
/// overwritten by the next attempt.
#[derive(Debug)]
pub struct Session {
    pub(crate) state: ConnectionState,
    /// Set only when a receive preempts the machine.
    pub(crate) previous_state: Option<ConnectionState>,
    /// When the current state was entered by a step.
    pub(crate) state_entered: Option<Instant>,
    pub(crate) target_spec: String,
    /// Host and port are set together or not at all.
    pub(crate) address: Option<TargetAddress>,
    pub(crate) socket: Option<SocketHandle>,
    /// Present only while `socket` is open and negotiated secure.
    pub(crate) subscription: Option<Subscription>,
    pub(crate) bridge: Option<ReceiveBridge>,
    pub(crate) pending_message: MessageBuffer,
    pub(crate) receive_buffer: MessageBuffer,
    pub(crate) counters: ByteCounters,
    pub(crate) timings: Timings,
}

impl Session {
    /// Empty session sized by `config`, in [`ConnectionState::Init`].
    pub fn new(config: &MachineConfig) -> Self {
        Self {
            state: ConnectionState::Init,
            previous_state: None,
            state_entered: None,
            target_spec: String::with_capacity(config.target_capacity),
            address: None,
            socket: None,
            subscription: None,
            bridge: None,
            pending_message: MessageBuffer::with_capacity(config.message_capacity),
            receive_buffer: MessageBuffer::with_capacity(config.receive_capacity),
            counters: ByteCounters::new(),
            timings: Timings::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// State to resume after the in-flight receive.
    pub fn previous_state(&self) -> Option<ConnectionState> {
        self.previous_state
    }

    /// Last target string supplied by the command surface.
    pub fn target_spec(&self) -> &str {
        &self.target_spec
    }

    /// Parsed target of the current attempt.
    pub fn address(&self) -> Option<&TargetAddress> {
        self.address.as_ref()
    }

    /// Open secure socket, if any.
    pub fn socket(&self) -> Option<SocketHandle> {
        self.socket
    }

    /// Registered receive subscription, if any.
    pub fn subscription(&self) -> Option<Subscription> {
        self.subscription
    }

    /// Outbound message waiting to be sent.
    pub fn pending_message(&self) -> &[u8] {
        self.pending_message.as_slice()
    }

    /// Bytes from the most recent receive.
    pub fn last_received(&self) -> &[u8] {
        self.receive_buffer.as_slice()
    }

    /// Byte counters of the current attempt.
    pub fn counters(&self) -> &ByteCounters {
        &self.counters
    }

    /// Milestone timestamps of the current attempt.
    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Drop the connection handles after the socket has been closed.
    pub(crate) fn release_connection(&mut self) {
        self.socket = None;
        self.subscription = None;
        self.bridge = None;
        self.previous_state = None;
        self.pending_message.clear();
    }

    /// Start a fresh attempt: counters and milestones are per attempt.
    pub(crate) fn begin_attempt(&mut self, address: TargetAddress) {
        self.counters.reset();
        self.timings.reset();
        self.address = Some(address);
    }
}
