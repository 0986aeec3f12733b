//! The host's network stack.
//!
//! On a hosted OS the stack is up before the process starts, so status is
//! always [`StackStatus::Ready`]. Interfaces are the loopback plus the
//! address the OS would use for an outbound route, found by connecting an
//! unbound UDP socket (no packet is sent).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use securelink_core::{Interface, NetworkStack, StackStatus};
use tracing::debug;

/// Route probe destinations (documentation ranges; never contacted).
const PROBE_V4: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 9);
const PROBE_V6: SocketAddr =
    SocketAddr::new(IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)), 9);

/// Network stack view of the host.
#[derive(Debug, Clone)]
pub struct HostStack {
    interfaces: Vec<Interface>,
}

impl HostStack {
    /// Discover the loopback and outbound-route addresses.
    pub fn discover() -> Self {
        let mut interfaces = vec![Interface::up("lo", IpAddr::V4(Ipv4Addr::LOCALHOST))];

        for (name, bind, probe) in [
            ("route4", SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)), PROBE_V4),
            ("route6", SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)), PROBE_V6),
        ] {
            match route_address(bind, probe) {
                Ok(address) => interfaces.push(Interface::up(name, address)),
                Err(err) => debug!(name, %err, "no outbound route"),
            }
        }

        Self { interfaces }
    }

    /// A stack with exactly these interfaces.
    pub fn with_interfaces(interfaces: Vec<Interface>) -> Self {
        Self { interfaces }
    }
}

fn route_address(bind: SocketAddr, probe: SocketAddr) -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind(bind)?;
    socket.connect(probe)?;
    Ok(socket.local_addr()?.ip())
}

impl NetworkStack for HostStack {
    fn status(&self) -> StackStatus {
        StackStatus::Ready
    }

    fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    fn interface(&self, index: usize) -> Option<Interface> {
        self.interfaces.get(index).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_always_has_loopback() {
        let stack = HostStack::discover();

        assert_eq!(stack.status(), StackStatus::Ready);
        assert_eq!(stack.interface(0), Some(Interface::up("lo", IpAddr::V4(Ipv4Addr::LOCALHOST))));
        for index in 0..stack.interface_count() {
            assert!(stack.interface(index).unwrap().address.is_some());
        }
    }

    #[test]
    fn out_of_range_interface() {
        let stack = HostStack::with_interfaces(Vec::new());
        assert_eq!(stack.interface_count(), 0);
        assert_eq!(stack.interface(0), None);
    }
}
