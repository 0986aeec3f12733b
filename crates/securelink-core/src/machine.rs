//! Connection state machine.
//!
//! Drives a single secure TCP session through its lifecycle, one decision per
//! [`ConnectionStateMachine::step`].
//!
//! # Architecture: Step-Based State Machine
//!
//! - `step` receives the network stack, the secure transport and the current
//!   time from the caller (nothing is stored)
//! - `step` returns the [`MachineEvent`]s it produced; the driver renders them
//! - no state blocks: every wait is "stay and return", re-checked next step
//! - inbound data preempts through the [`ReceiveBridge`], drained at the
//!   start of a step
//!
//! # State Machine
//!
//! ```text
//! Init ─> AwaitStackReady ─> AwaitAddressReady ─> WaitingForCommand <────────────┐
//!              │                    │                  │ connect     ^            │
//!              └──> FatalError <────┘                  v             │ rejected   │
//!                                                 ParsingTarget ─────┤            │
//!                                                      v             │ open fail  │
//!                                              OpeningSecureSocket ──┘            │
//!                                                      v                          │
//!                                              AwaitingConnection ──┐ timeout     │
//!                                                      v            │ disconnect  │
//!                                              AwaitingNegotiation ─┤ not secure  │
//!                                                      v            v             │
//!     SendingMessage <─ send ─ WaitingForMessage ─> ClosingConnection ────────────┘
//!          └─────────────────────> ^   │ ^
//!                                      v │ resume
//!                                 ReceivingMessage
//! ```
//!
//! # Timeouts
//!
//! - **Connect timeout**: bound on `AwaitingConnection` (default 30 seconds)
//! - **Negotiation timeout**: bound on `AwaitingNegotiation` (default 30
//!   seconds)
//!
//! Either can be disabled, in which case only a disconnect request leaves the
//! state.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::{
    address::{AddressFamily, parse_target},
    counters::{ByteCounters, Direction},
    error::{CommandError, TargetError},
    session::Session,
    signal::ReceiveBridge,
    stack::{NetworkStack, StackStatus},
    timing::{Milestone, Timings},
    transport::{SecureTransport, SocketHandle},
};

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Session about to be cleared
    Init,
    /// Waiting for the network stack to come up
    AwaitStackReady,
    /// Waiting for every interface to have an address
    AwaitAddressReady,
    /// Idle, waiting for a connect request
    WaitingForCommand,
    /// Validating the target string
    ParsingTarget,
    /// Requesting a secure socket from the transport
    OpeningSecureSocket,
    /// Waiting for the TCP connection
    AwaitingConnection,
    /// Waiting for TLS negotiation to finish
    AwaitingNegotiation,
    /// Connected and secure, waiting for a send, receive or disconnect
    WaitingForMessage,
    /// Writing the pending message
    SendingMessage,
    /// Reading inbound data, then resuming the preempted state
    ReceivingMessage,
    /// Tearing down the socket
    ClosingConnection,
    /// Network stack failed; needs external reinitialization
    FatalError,
}

impl ConnectionState {
    /// Whether a secure socket is (or may be) open in this state.
    pub fn holds_socket(self) -> bool {
        matches!(
            self,
            Self::AwaitingConnection
                | Self::AwaitingNegotiation
                | Self::WaitingForMessage
                | Self::SendingMessage
                | Self::ReceivingMessage
                | Self::ClosingConnection
        )
    }

    /// Whether this state only changes on an external trigger.
    pub fn is_idle(self) -> bool {
        matches!(self, Self::WaitingForCommand | Self::WaitingForMessage | Self::FatalError)
    }
}

/// State machine configuration
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Address family for parsing targets and opening sockets
    pub family: AddressFamily,
    /// Bound on `AwaitingConnection`; `None` waits forever
    pub connect_timeout: Option<Duration>,
    /// Bound on `AwaitingNegotiation`; `None` waits forever
    pub negotiation_timeout: Option<Duration>,
    /// Capacity of the target slot in bytes
    pub target_capacity: usize,
    /// Capacity of the outbound message buffer in bytes
    pub message_capacity: usize,
    /// Capacity of the receive scratch buffer in bytes
    pub receive_capacity: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            family: AddressFamily::V4,
            connect_timeout: Some(Duration::from_secs(30)),
            negotiation_timeout: Some(Duration::from_secs(30)),
            target_capacity: 64,
            message_capacity: 256,
            receive_capacity: 256,
        }
    }
}

/// Observable outcome of a step, for the console or log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineEvent {
    /// The network stack failed to initialize
    StackFailed,
    /// An interface was found once the stack came up
    InterfaceFound {
        /// Interface name
        name: String,
    },
    /// An interface has its address
    InterfaceReady {
        /// Interface name
        name: String,
        /// Assigned address
        address: std::net::IpAddr,
    },
    /// All interfaces are up; commands are accepted
    Ready,
    /// The target parsed; a new attempt starts
    TargetAccepted {
        /// Destination
        address: std::net::SocketAddr,
    },
    /// The target was rejected
    TargetRejected {
        /// Target as supplied
        target: String,
        /// Rejection kind
        error: TargetError,
    },
    /// The transport created a secure socket
    SocketOpened {
        /// New socket
        handle: SocketHandle,
    },
    /// The transport could not create a socket
    SocketOpenFailed {
        /// Transport's reason
        reason: String,
    },
    /// TCP connection established; negotiation starting
    Connected,
    /// Negotiation finished
    NegotiationComplete {
        /// Whether the channel is secure
        secure: bool,
    },
    /// The pending message was written
    MessageSent {
        /// Message bytes
        message: Bytes,
    },
    /// The pending message was dropped for lack of buffer space
    MessageDropped {
        /// Size of the dropped message
        len: usize,
    },
    /// Inbound data was read
    DataReceived {
        /// Bytes read
        data: Bytes,
    },
    /// An await state exceeded its deadline
    TimedOut {
        /// State that timed out
        state: ConnectionState,
        /// Time spent in it
        after: Duration,
    },
    /// The transport failed mid-connection
    TransportFailed {
        /// Transport's reason
        reason: String,
    },
    /// The connection was closed
    Closed,
}

/// Connection state machine for one secure session.
///
/// Owns the [`Session`]; collaborators are passed to every
/// [`step`](Self::step).
#[derive(Debug)]
pub struct ConnectionStateMachine {
    config: MachineConfig,
    family: AddressFamily,
    session: Session,
}

impl ConnectionStateMachine {
    /// Create a machine in [`ConnectionState::Init`].
    pub fn new(config: MachineConfig) -> Self {
        let session = Session::new(&config);
        Self { family: config.family, config, session }
    }

    /// Configuration the machine was built with.
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.session.state
    }

    /// State to resume after the in-flight receive.
    pub fn previous_state(&self) -> Option<ConnectionState> {
        self.session.previous_state
    }

    /// Address family used for the next parse.
    pub fn address_family(&self) -> AddressFamily {
        self.family
    }

    /// Read-only session view.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Byte counters of the current attempt.
    pub fn counters(&self) -> &ByteCounters {
        &self.session.counters
    }

    /// Milestone timestamps of the current attempt.
    pub fn timings(&self) -> &Timings {
        &self.session.timings
    }

    /// Request a connection to `target` (`host:port`).
    ///
    /// Only accepted while waiting for a command.
    pub fn connect(&mut self, target: &str) -> Result<(), CommandError> {
        self.require(ConnectionState::WaitingForCommand, "connect")?;

        if target.len() > self.config.target_capacity {
            return Err(CommandError::TargetTooLong(crate::CapacityError {
                len: target.len(),
                capacity: self.config.target_capacity,
            }));
        }

        self.session.target_spec.clear();
        self.session.target_spec.push_str(target);
        self.force(ConnectionState::ParsingTarget);
        Ok(())
    }

    /// Queue `message` for sending.
    ///
    /// Only accepted while connected and idle.
    pub fn send(&mut self, message: &[u8]) -> Result<(), CommandError> {
        self.require(ConnectionState::WaitingForMessage, "send")?;

        if message.is_empty() {
            return Err(CommandError::EmptyMessage);
        }
        self.session.pending_message.load(message).map_err(CommandError::MessageTooLarge)?;

        self.force(ConnectionState::SendingMessage);
        Ok(())
    }

    /// Request teardown of the current connection.
    ///
    /// Accepted in any state that holds a socket, including the await states.
    pub fn disconnect(&mut self) -> Result<(), CommandError> {
        let state = self.session.state;
        if !state.holds_socket() || state == ConnectionState::ClosingConnection {
            return Err(CommandError::InvalidState { state, operation: "disconnect" });
        }

        self.session.previous_state = None;
        self.force(ConnectionState::ClosingConnection);
        Ok(())
    }

    /// Select the address family for subsequent connects.
    pub fn set_address_family(&mut self, family: AddressFamily) {
        debug!(%family, "address family changed");
        self.family = family;
    }

    /// Reinitialize from any state, including [`ConnectionState::FatalError`].
    ///
    /// Closes an open socket, then restarts from [`ConnectionState::Init`].
    pub fn reinitialize<T: SecureTransport + ?Sized>(&mut self, transport: &mut T) {
        if let Some(handle) = self.session.socket {
            if let Some(subscription) = self.session.subscription {
                transport.deregister(handle, subscription);
            }
            transport.close(handle);
        }
        info!(state = ?self.session.state, "reinitializing");
        self.session = Session::new(&self.config);
    }

    /// Advance the machine by one decision.
    ///
    /// Never blocks. A pending receive signal takes priority: the step then
    /// only redirects into [`ConnectionState::ReceivingMessage`].
    pub fn step<N, T>(&mut self, stack: &N, transport: &mut T, now: Instant) -> Vec<MachineEvent>
    where
        N: NetworkStack + ?Sized,
        T: SecureTransport + ?Sized,
    {
        let mut events = Vec::new();

        if self.take_receive_signal(transport) {
            return events;
        }

        match self.session.state {
            ConnectionState::Init => {
                self.session = Session::new(&self.config);
                self.transition(ConnectionState::AwaitStackReady, now);
            },
            ConnectionState::AwaitStackReady => self.await_stack(stack, &mut events, now),
            ConnectionState::AwaitAddressReady => self.await_addresses(stack, &mut events, now),
            ConnectionState::WaitingForCommand
            | ConnectionState::WaitingForMessage
            | ConnectionState::FatalError => {},
            ConnectionState::ParsingTarget => self.parse(&mut events, now),
            ConnectionState::OpeningSecureSocket => self.open(transport, &mut events, now),
            ConnectionState::AwaitingConnection => {
                self.await_connection(transport, &mut events, now);
            },
            ConnectionState::AwaitingNegotiation => {
                self.await_negotiation(transport, &mut events, now);
            },
            ConnectionState::SendingMessage => self.send_pending(transport, &mut events, now),
            ConnectionState::ReceivingMessage => self.receive(transport, &mut events, now),
            ConnectionState::ClosingConnection => self.close(transport, &mut events, now),
        }

        events
    }

    fn await_stack<N: NetworkStack + ?Sized>(
        &mut self,
        stack: &N,
        events: &mut Vec<MachineEvent>,
        now: Instant,
    ) {
        match stack.status() {
            StackStatus::Pending => {},
            StackStatus::Failed => {
                error!("network stack initialization failed");
                events.push(MachineEvent::StackFailed);
                self.transition(ConnectionState::FatalError, now);
            },
            StackStatus::Ready => {
                for index in 0..stack.interface_count() {
                    if let Some(interface) = stack.interface(index) {
                        info!(name = %interface.name, "interface available");
                        events.push(MachineEvent::InterfaceFound { name: interface.name });
                    }
                }
                self.transition(ConnectionState::AwaitAddressReady, now);
            },
        }
    }

    fn await_addresses<N: NetworkStack + ?Sized>(
        &mut self,
        stack: &N,
        events: &mut Vec<MachineEvent>,
        now: Instant,
    ) {
        if stack.status() == StackStatus::Failed {
            error!("network stack failed while waiting for addresses");
            events.push(MachineEvent::StackFailed);
            self.transition(ConnectionState::FatalError, now);
            return;
        }

        let mut ready = Vec::with_capacity(stack.interface_count());
        for index in 0..stack.interface_count() {
            let Some(interface) = stack.interface(index) else { return };
            let Some(address) = interface.address else { return };
            ready.push((interface.name, address));
        }

        for (name, address) in ready {
            info!(%name, %address, "interface address assigned");
            events.push(MachineEvent::InterfaceReady { name, address });
        }
        events.push(MachineEvent::Ready);
        self.transition(ConnectionState::WaitingForCommand, now);
    }

    fn parse(&mut self, events: &mut Vec<MachineEvent>, now: Instant) {
        match parse_target(&self.session.target_spec, self.family) {
            Err(error) => {
                warn!(target = %self.session.target_spec, %error, "target rejected");
                events.push(MachineEvent::TargetRejected {
                    target: self.session.target_spec.clone(),
                    error,
                });
                self.transition(ConnectionState::WaitingForCommand, now);
            },
            Ok(address) => {
                info!(%address, "target accepted");
                events.push(MachineEvent::TargetAccepted { address: address.socket_addr() });
                self.session.begin_attempt(address);
                self.session.timings.stamp(Milestone::AttemptStarted, now);
                self.session.timings.stamp(Milestone::AddressResolved, now);
                self.transition(ConnectionState::OpeningSecureSocket, now);
            },
        }
    }

    fn open<T: SecureTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        events: &mut Vec<MachineEvent>,
        now: Instant,
    ) {
        let Some(address) = self.session.address.as_ref() else {
            self.transition(ConnectionState::WaitingForCommand, now);
            return;
        };

        match transport.open(address.family(), address.socket_addr()) {
            Ok(handle) => {
                info!(%handle, %address, "secure socket created");
                self.session.socket = Some(handle);
                events.push(MachineEvent::SocketOpened { handle });
                self.transition(ConnectionState::AwaitingConnection, now);
            },
            Err(err) => {
                warn!(%address, %err, "secure socket creation failed");
                events.push(MachineEvent::SocketOpenFailed { reason: err.to_string() });
                self.transition(ConnectionState::WaitingForCommand, now);
            },
        }
    }

    fn await_connection<T: SecureTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        events: &mut Vec<MachineEvent>,
        now: Instant,
    ) {
        let Some(handle) = self.socket_or_close(now) else { return };

        if transport.is_connected(handle) {
            info!(%handle, "connection opened, starting negotiation");
            self.session.timings.stamp(Milestone::ConnectionOpened, now);
            events.push(MachineEvent::Connected);
            self.transition(ConnectionState::AwaitingNegotiation, now);
        } else {
            self.check_deadline(self.config.connect_timeout, events, now);
        }
    }

    fn await_negotiation<T: SecureTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        events: &mut Vec<MachineEvent>,
        now: Instant,
    ) {
        let Some(handle) = self.socket_or_close(now) else { return };

        if transport.is_negotiating(handle) {
            self.check_deadline(self.config.negotiation_timeout, events, now);
            return;
        }

        self.session.timings.stamp(Milestone::NegotiationComplete, now);
        let secure = transport.is_secure(handle);
        events.push(MachineEvent::NegotiationComplete { secure });

        if !secure {
            warn!(%handle, "could not establish secure connection");
            self.transition(ConnectionState::ClosingConnection, now);
            return;
        }

        let bridge = ReceiveBridge::new();
        match transport.register_receive(handle, bridge.signal()) {
            Ok(subscription) => {
                info!(%handle, "socket is secure");
                self.session.subscription = Some(subscription);
                self.session.bridge = Some(bridge);
                self.transition(ConnectionState::WaitingForMessage, now);
            },
            Err(err) => {
                warn!(%handle, %err, "receive registration failed");
                events.push(MachineEvent::TransportFailed { reason: err.to_string() });
                self.transition(ConnectionState::ClosingConnection, now);
            },
        }
    }

    fn send_pending<T: SecureTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        events: &mut Vec<MachineEvent>,
        now: Instant,
    ) {
        let Some(handle) = self.socket_or_close(now) else { return };
        let len = self.session.pending_message.len();

        // At-most-once: a message that does not fit is dropped, not queued.
        if !transport.write_ready(handle, len) {
            warn!(%handle, len, "insufficient buffer space, message dropped");
            self.session.pending_message.clear();
            events.push(MachineEvent::MessageDropped { len });
            self.transition(ConnectionState::WaitingForMessage, now);
            return;
        }

        match transport.write(handle, self.session.pending_message.as_slice()) {
            Ok(transfer) => {
                debug!(%handle, clear = transfer.clear, raw = transfer.raw, "message written");
                self.session.counters.record(Direction::Sent, transfer);
                let message = Bytes::copy_from_slice(self.session.pending_message.as_slice());
                self.session.pending_message.clear();
                events.push(MachineEvent::MessageSent { message });
                self.transition(ConnectionState::WaitingForMessage, now);
            },
            Err(err) => {
                warn!(%handle, %err, "write failed");
                events.push(MachineEvent::TransportFailed { reason: err.to_string() });
                self.transition(ConnectionState::ClosingConnection, now);
            },
        }
    }

    fn receive<T: SecureTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        events: &mut Vec<MachineEvent>,
        now: Instant,
    ) {
        let Some(handle) = self.socket_or_close(now) else { return };

        if !transport.read_ready(handle) {
            return;
        }

        self.session.timings.stamp(Milestone::FirstDataReceived, now);
        self.session.timings.stamp(Milestone::LastDataReceived, now);

        let scratch = self.session.receive_buffer.prepare_read();
        match transport.read(handle, scratch) {
            Ok(transfer) => {
                self.session.receive_buffer.commit(transfer.clear);
                self.session.counters.record(Direction::Received, transfer);
                debug!(%handle, clear = transfer.clear, raw = transfer.raw, "data received");
                if !self.session.receive_buffer.is_empty() {
                    events.push(MachineEvent::DataReceived {
                        data: Bytes::copy_from_slice(self.session.receive_buffer.as_slice()),
                    });
                }

                let resume =
                    self.session.previous_state.take().unwrap_or(ConnectionState::WaitingForMessage);
                self.transition(resume, now);
            },
            Err(err) => {
                self.session.receive_buffer.commit(0);
                warn!(%handle, %err, "read failed");
                events.push(MachineEvent::TransportFailed { reason: err.to_string() });
                self.session.previous_state = None;
                self.transition(ConnectionState::ClosingConnection, now);
            },
        }
    }

    fn close<T: SecureTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        events: &mut Vec<MachineEvent>,
        now: Instant,
    ) {
        if let Some(handle) = self.session.socket {
            if let Some(subscription) = self.session.subscription {
                transport.deregister(handle, subscription);
            }
            transport.close(handle);
            info!(%handle, "connection closed");
        }
        self.session.release_connection();
        events.push(MachineEvent::Closed);
        self.transition(ConnectionState::WaitingForCommand, now);
    }

    /// Consume one pending receive signal and preempt, if allowed.
    ///
    /// Signals are ignored without an active subscription or while closing,
    /// and stay queued while a receive is already in progress. A signal whose
    /// data was already consumed by an earlier read is dropped.
    fn take_receive_signal<T: SecureTransport + ?Sized>(&mut self, transport: &mut T) -> bool {
        let state = self.session.state;
        if self.session.subscription.is_none()
            || !state.holds_socket()
            || matches!(state, ConnectionState::ReceivingMessage | ConnectionState::ClosingConnection)
        {
            return false;
        }

        let (Some(bridge), Some(handle)) = (self.session.bridge.as_ref(), self.session.socket)
        else {
            return false;
        };
        if !bridge.take_one() {
            return false;
        }
        if !transport.read_ready(handle) {
            debug!(%handle, "stale receive signal dropped");
            return false;
        }

        debug!(from = ?state, "receive preempts");
        self.session.previous_state = Some(state);
        self.session.state = ConnectionState::ReceivingMessage;
        true
    }

    fn socket_or_close(&mut self, now: Instant) -> Option<SocketHandle> {
        let socket = self.session.socket;
        if socket.is_none() {
            warn!(state = ?self.session.state, "no socket in a connected state");
            self.transition(ConnectionState::ClosingConnection, now);
        }
        socket
    }

    fn check_deadline(
        &mut self,
        timeout: Option<Duration>,
        events: &mut Vec<MachineEvent>,
        now: Instant,
    ) {
        let Some(timeout) = timeout else { return };
        let Some(entered) = self.session.state_entered else { return };
        let Some(elapsed) = now.checked_duration_since(entered) else { return };

        if elapsed > timeout {
            let state = self.session.state;
            warn!(?state, ?elapsed, "timed out");
            events.push(MachineEvent::TimedOut { state, after: elapsed });
            self.transition(ConnectionState::ClosingConnection, now);
        }
    }

    fn require(
        &self,
        expected: ConnectionState,
        operation: &'static str,
    ) -> Result<(), CommandError> {
        let state = self.session.state;
        if state == expected {
            Ok(())
        } else {
            Err(CommandError::InvalidState { state, operation })
        }
    }

    fn force(&mut self, next: ConnectionState) {
        debug!(from = ?self.session.state, to = ?next, "forced transition");
        self.session.state = next;
        self.session.state_entered = None;
    }

    fn transition(&mut self, next: ConnectionState, now: Instant) {
        if self.session.state != next {
            debug!(from = ?self.session.state, to = ?next, "state transition");
        }
        self.session.state = next;
        self.session.state_entered = Some(now);
    }
}
