//! Console lines for machine events.

use securelink_core::MachineEvent;

/// One console line for an event.
pub fn describe(event: &MachineEvent) -> String {
    match event {
        MachineEvent::StackFailed => "network stack initialization failed".to_string(),
        MachineEvent::InterfaceFound { name } => format!("interface {name} found"),
        MachineEvent::InterfaceReady { name, address } => {
            format!("interface {name} address {address}")
        },
        MachineEvent::Ready => "ready".to_string(),
        MachineEvent::TargetAccepted { address } => format!("target {address}"),
        MachineEvent::TargetRejected { target, error } => format!("rejected {target}: {error}"),
        MachineEvent::SocketOpened { handle } => format!("secure socket {handle} created"),
        MachineEvent::SocketOpenFailed { reason } => {
            format!("secure socket creation failed: {reason}")
        },
        MachineEvent::Connected => "connection opened, starting TLS negotiation".to_string(),
        MachineEvent::NegotiationComplete { secure: true } => {
            "negotiation complete, socket is secure".to_string()
        },
        MachineEvent::NegotiationComplete { secure: false } => {
            "negotiation complete, could not establish secure connection".to_string()
        },
        MachineEvent::MessageSent { message } => {
            format!("sent \"{}\"", String::from_utf8_lossy(message))
        },
        MachineEvent::MessageDropped { len } => {
            format!("not enough buffer space, dropped {len} byte message")
        },
        MachineEvent::DataReceived { data } => {
            format!("server response: {}", String::from_utf8_lossy(data))
        },
        MachineEvent::TimedOut { state, after } => {
            format!("timed out in {state:?} after {} ms", after.as_millis())
        },
        MachineEvent::TransportFailed { reason } => format!("transport error: {reason}"),
        MachineEvent::Closed => "connection closed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use securelink_core::{ConnectionState, SocketHandle, TargetError};

    use super::*;

    #[test]
    fn describes_target_outcomes() {
        let accepted = MachineEvent::TargetAccepted { address: "[::1]:4433".parse().unwrap() };
        assert_eq!(describe(&accepted), "target [::1]:4433");

        let rejected =
            MachineEvent::TargetRejected { target: "10.0.0.5:0".into(), error: TargetError::InvalidPort };
        assert_eq!(describe(&rejected), "rejected 10.0.0.5:0: invalid port");
    }

    #[test]
    fn describes_socket_and_negotiation() {
        assert_eq!(
            describe(&MachineEvent::SocketOpened { handle: SocketHandle::new(3) }),
            "secure socket #3 created"
        );
        assert_eq!(
            describe(&MachineEvent::NegotiationComplete { secure: false }),
            "negotiation complete, could not establish secure connection"
        );
    }

    #[test]
    fn payloads_render_lossily() {
        let data = MachineEvent::DataReceived { data: Bytes::from_static(b"ok\xff") };
        assert_eq!(describe(&data), "server response: ok\u{fffd}");
    }

    #[test]
    fn timeouts_show_milliseconds() {
        let event = MachineEvent::TimedOut {
            state: ConnectionState::AwaitingNegotiation,
            after: Duration::from_millis(1500),
        };
        assert_eq!(describe(&event), "timed out in AwaitingNegotiation after 1500 ms");
    }
}
