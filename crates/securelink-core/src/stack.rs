//! Network stack readiness capability.
//!
//! Bringing the stack up is someone else's job; the state machine only waits
//! for it to report ready and for every interface to have an address.

use std::net::IpAddr;

/// Initialization status of the network stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStatus {
    /// Still initializing
    Pending,
    /// Up and running
    Ready,
    /// Initialization failed; unrecoverable
    Failed,
}

/// A network interface as reported by the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    /// Interface name
    pub name: String,
    /// Assigned address, if any yet
    pub address: Option<IpAddr>,
}

impl Interface {
    /// An interface with an assigned address.
    pub fn up(name: impl Into<String>, address: IpAddr) -> Self {
        Self { name: name.into(), address: Some(address) }
    }

    /// An interface still waiting for an address.
    pub fn unassigned(name: impl Into<String>) -> Self {
        Self { name: name.into(), address: None }
    }
}

/// Read-only view of the network stack.
pub trait NetworkStack {
    /// Current initialization status.
    fn status(&self) -> StackStatus;

    /// Number of interfaces.
    fn interface_count(&self) -> usize;

    /// Interface at `index`, if it exists.
    fn interface(&self, index: usize) -> Option<Interface>;
}
