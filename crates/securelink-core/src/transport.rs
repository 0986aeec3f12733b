//! Secure transport capability.
//!
//! Abstracts an encrypted stream socket (connect, negotiate, read, write,
//! close) above raw TCP. Production uses rustls over a non-blocking TCP
//! stream; tests use a scripted simulation.
//!
//! Every method must return promptly. Readiness is reported as booleans and
//! re-polled by the state machine on later steps.

use std::{fmt, net::SocketAddr};

use crate::{
    address::AddressFamily, counters::Transfer, error::TransportError, signal::ReceiveSignal,
};

/// Handle naming one open secure socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketHandle(u32);

impl SocketHandle {
    /// Wrap a transport-assigned identifier.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Transport-assigned identifier.
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Token for a registered receive signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u32);

impl Subscription {
    /// Wrap a transport-assigned identifier.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Transport-assigned identifier.
    pub const fn id(self) -> u32 {
        self.0
    }
}

/// An encrypted client stream provider.
///
/// The TLS protocol itself is opaque here; the state machine only observes
/// "connected", "negotiating" and "secure".
pub trait SecureTransport {
    /// Start an encrypted client connection to `remote`.
    ///
    /// Returns immediately; connection progress is observed through
    /// [`SecureTransport::is_connected`].
    fn open(&mut self, family: AddressFamily, remote: SocketAddr)
    -> Result<SocketHandle, TransportError>;

    /// Whether the TCP connection is established.
    fn is_connected(&mut self, handle: SocketHandle) -> bool;

    /// Whether TLS negotiation is still in progress.
    fn is_negotiating(&mut self, handle: SocketHandle) -> bool;

    /// Whether negotiation produced a secure channel.
    fn is_secure(&self, handle: SocketHandle) -> bool;

    /// Whether `len` plaintext bytes can be written without blocking.
    fn write_ready(&mut self, handle: SocketHandle, len: usize) -> bool;

    /// Write the whole buffer.
    fn write(&mut self, handle: SocketHandle, buf: &[u8]) -> Result<Transfer, TransportError>;

    /// Whether plaintext (or an end-of-stream) is ready to be read.
    fn read_ready(&mut self, handle: SocketHandle) -> bool;

    /// Read up to `buf.len()` plaintext bytes.
    fn read(&mut self, handle: SocketHandle, buf: &mut [u8]) -> Result<Transfer, TransportError>;

    /// Register a signal to raise whenever inbound data arrives.
    fn register_receive(
        &mut self,
        handle: SocketHandle,
        signal: ReceiveSignal,
    ) -> Result<Subscription, TransportError>;

    /// Remove a registered receive signal.
    fn deregister(&mut self, handle: SocketHandle, subscription: Subscription);

    /// Close the socket and release its handle.
    fn close(&mut self, handle: SocketHandle);

    /// Run the transport's own event delivery.
    ///
    /// Called by the scheduler before each step; implementations that learn
    /// about inbound data by polling raise receive signals here.
    fn service(&mut self) {}
}
