//! Scriptable network stack.

use std::net::{IpAddr, Ipv4Addr};

use securelink_core::{Interface, NetworkStack, StackStatus};

/// In-memory network stack whose status and interfaces are set by the test.
#[derive(Debug, Clone)]
pub struct SimStack {
    status: StackStatus,
    interfaces: Vec<Interface>,
}

impl SimStack {
    /// A ready stack with one addressed interface, `eth0` at 10.0.0.2.
    pub fn ready() -> Self {
        Self {
            status: StackStatus::Ready,
            interfaces: vec![Interface::up("eth0", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)))],
        }
    }

    /// A stack still initializing, with no interfaces.
    pub fn pending() -> Self {
        Self { status: StackStatus::Pending, interfaces: Vec::new() }
    }

    /// A stack whose initialization failed.
    pub fn failed() -> Self {
        Self { status: StackStatus::Failed, interfaces: Vec::new() }
    }

    /// Change the reported status.
    pub fn set_status(&mut self, status: StackStatus) {
        self.status = status;
    }

    /// Add an interface.
    pub fn add_interface(&mut self, interface: Interface) {
        self.interfaces.push(interface);
    }

    /// Assign `address` to the named interface. Returns `false` if unknown.
    pub fn assign_address(&mut self, name: &str, address: IpAddr) -> bool {
        match self.interfaces.iter_mut().find(|i| i.name == name) {
            Some(interface) => {
                interface.address = Some(address);
                true
            },
            None => false,
        }
    }
}

impl Default for SimStack {
    fn default() -> Self {
        Self::ready()
    }
}

impl NetworkStack for SimStack {
    fn status(&self) -> StackStatus {
        self.status
    }

    fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    fn interface(&self, index: usize) -> Option<Interface> {
        self.interfaces.get(index).cloned()
    }
}
