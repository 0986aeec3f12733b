//! Reusable oracle functions.
//!
//! Each helper returns an [`OracleFn`] checking one property of the final
//! world; [`all_of`] composes them.

use securelink_core::{ConnectionState, MachineEvent};

use crate::scenario::{OracleFn, World};

/// Run every oracle in order, stopping at the first failure.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |world: &World| {
        for oracle in oracles {
            oracle(world)?;
        }
        Ok(())
    })
}

/// The machine ends in `expected`.
pub fn final_state(expected: ConnectionState) -> OracleFn {
    Box::new(move |world: &World| {
        let actual = world.machine().state();
        if actual == expected {
            Ok(())
        } else {
            Err(format!("expected final state {expected:?}, got {actual:?}"))
        }
    })
}

/// The machine passed through `state` at some point.
pub fn visited(state: ConnectionState) -> OracleFn {
    Box::new(move |world: &World| {
        if world.visited(state) {
            Ok(())
        } else {
            Err(format!("never visited {state:?}; trace: {:?}", world.states()))
        }
    })
}

/// No socket is open on the transport, and the session holds none.
pub fn no_open_sockets() -> OracleFn {
    Box::new(|world: &World| {
        let open = world.transport().open_sockets();
        if open != 0 {
            return Err(format!("{open} socket(s) still open on the transport"));
        }
        let session = world.machine().session();
        if session.socket().is_some() || session.subscription().is_some() {
            return Err(format!(
                "session still holds socket {:?} / subscription {:?}",
                session.socket(),
                session.subscription()
            ));
        }
        Ok(())
    })
}

/// Exactly these messages reached the peer, in order.
pub fn peer_received(expected: Vec<&'static [u8]>) -> OracleFn {
    Box::new(move |world: &World| {
        let written: Vec<&[u8]> = world.transport().written().iter().map(AsRef::as_ref).collect();
        if written == expected {
            Ok(())
        } else {
            Err(format!("peer received {written:?}, expected {expected:?}"))
        }
    })
}

/// The machine surfaced exactly `expected` as received plaintext.
pub fn client_received(expected: &'static [u8]) -> OracleFn {
    Box::new(move |world: &World| {
        let received = world.received();
        if received == expected {
            Ok(())
        } else {
            Err(format!(
                "client received {:?}, expected {:?}",
                String::from_utf8_lossy(&received),
                String::from_utf8_lossy(expected)
            ))
        }
    })
}

/// Plaintext counters match the given totals.
pub fn clear_counts(sent: u64, received: u64) -> OracleFn {
    Box::new(move |world: &World| {
        let counters = world.machine().counters();
        if counters.clear_sent() == sent && counters.clear_received() == received {
            Ok(())
        } else {
            Err(format!(
                "clear counters sent={} received={}, expected sent={sent} received={received}",
                counters.clear_sent(),
                counters.clear_received()
            ))
        }
    })
}

/// Every `Closed` event was preceded by a socket that is now closed.
pub fn closed_sockets_released() -> OracleFn {
    Box::new(|world: &World| {
        let closes = world.count_events(|e| matches!(e, MachineEvent::Closed));
        let released = world.transport().closed().len();
        if closes == released {
            Ok(())
        } else {
            Err(format!("{closes} Closed event(s) but {released} socket(s) released"))
        }
    })
}
