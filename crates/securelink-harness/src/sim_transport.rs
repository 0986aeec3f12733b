//! Scriptable secure transport.
//!
//! Every socket talks to the same simulated peer, configured by a
//! [`PeerConfig`]. Connection and negotiation progress are counted in polls,
//! so a test controls exactly how many steps each phase takes. Buffer
//! exhaustion can be injected with a seeded RNG for reproducible runs.

use std::{
    collections::{BTreeMap, VecDeque},
    net::SocketAddr,
};

use bytes::Bytes;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use securelink_core::{
    AddressFamily, ReceiveSignal, SecureTransport, SocketHandle, Subscription, Transfer,
    TransportError,
};
use tracing::trace;

/// Behaviour of the simulated peer.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Fail every `open` call
    pub refuse_open: bool,
    /// Polls of `is_connected` answered `false` before connecting; `None`
    /// never connects
    pub connect_after: Option<u32>,
    /// Polls of `is_negotiating` answered `true` before finishing; `None`
    /// negotiates forever
    pub negotiate_after: Option<u32>,
    /// Whether negotiation yields a secure channel
    pub secure: bool,
    /// Largest write accepted by `write_ready`
    pub write_capacity: usize,
    /// Record framing bytes added to every non-empty read and write
    pub record_overhead: usize,
    /// Echo every write back as inbound data
    pub echo: bool,
    /// Probability that `write_ready` reports exhaustion regardless of size
    pub write_exhaustion_rate: f64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            refuse_open: false,
            connect_after: Some(0),
            negotiate_after: Some(0),
            secure: true,
            write_capacity: 1024,
            record_overhead: 0,
            echo: false,
            write_exhaustion_rate: 0.0,
        }
    }
}

#[derive(Debug)]
struct SimSocket {
    remote: SocketAddr,
    connect_polls: u32,
    negotiate_polls: u32,
    connected: bool,
    negotiated: bool,
    inbound: VecDeque<u8>,
    receive: Option<(Subscription, ReceiveSignal)>,
    peer_closed: bool,
}

impl SimSocket {
    fn new(remote: SocketAddr) -> Self {
        Self {
            remote,
            connect_polls: 0,
            negotiate_polls: 0,
            connected: false,
            negotiated: false,
            inbound: VecDeque::new(),
            receive: None,
            peer_closed: false,
        }
    }

    fn notify(&self) {
        if let Some((_, signal)) = &self.receive {
            signal.raise();
        }
    }
}

/// In-memory secure transport.
#[derive(Debug)]
pub struct SimTransport {
    peer: PeerConfig,
    rng: ChaCha8Rng,
    sockets: BTreeMap<SocketHandle, SimSocket>,
    next_handle: u32,
    next_subscription: u32,
    opens: Vec<(AddressFamily, SocketAddr)>,
    closed: Vec<SocketHandle>,
    written: Vec<Bytes>,
}

impl SimTransport {
    /// Create a transport with a fixed RNG seed.
    pub fn new(peer: PeerConfig) -> Self {
        Self::with_seed(peer, 0)
    }

    /// Create a transport whose fault injection follows `seed`.
    pub fn with_seed(peer: PeerConfig, seed: u64) -> Self {
        Self {
            peer,
            rng: ChaCha8Rng::seed_from_u64(seed),
            sockets: BTreeMap::new(),
            next_handle: 1,
            next_subscription: 1,
            opens: Vec::new(),
            closed: Vec::new(),
            written: Vec::new(),
        }
    }

    /// Peer behaviour, mutable mid-run.
    pub fn peer_mut(&mut self) -> &mut PeerConfig {
        &mut self.peer
    }

    /// Queue inbound plaintext on `handle` and raise its receive signal.
    ///
    /// Returns `false` if the socket does not exist.
    pub fn deliver(&mut self, handle: SocketHandle, data: &[u8]) -> bool {
        let Some(socket) = self.sockets.get_mut(&handle) else { return false };
        socket.inbound.extend(data);
        socket.notify();
        trace!(%handle, len = data.len(), "peer delivered data");
        true
    }

    /// Simulate the peer closing its side; reads then fail once drained.
    pub fn close_from_peer(&mut self, handle: SocketHandle) -> bool {
        let Some(socket) = self.sockets.get_mut(&handle) else { return false };
        socket.peer_closed = true;
        socket.notify();
        true
    }

    /// Number of sockets currently open.
    pub fn open_sockets(&self) -> usize {
        self.sockets.len()
    }

    /// Whether `handle` has a registered receive signal.
    pub fn is_registered(&self, handle: SocketHandle) -> bool {
        self.sockets.get(&handle).is_some_and(|s| s.receive.is_some())
    }

    /// Every successful and refused `open`, in order.
    pub fn opens(&self) -> &[(AddressFamily, SocketAddr)] {
        &self.opens
    }

    /// Sockets closed by the client, in order.
    pub fn closed(&self) -> &[SocketHandle] {
        &self.closed
    }

    /// Every message written by the client, in order.
    pub fn written(&self) -> &[Bytes] {
        &self.written
    }

    /// Remote address of an open socket.
    pub fn remote(&self, handle: SocketHandle) -> Option<SocketAddr> {
        self.sockets.get(&handle).map(|s| s.remote)
    }

    fn framed(&self, clear: usize) -> Transfer {
        if clear == 0 {
            Transfer::plain(0)
        } else {
            Transfer::new(clear, clear.saturating_add(self.peer.record_overhead))
        }
    }
}

impl SecureTransport for SimTransport {
    fn open(
        &mut self,
        family: AddressFamily,
        remote: SocketAddr,
    ) -> Result<SocketHandle, TransportError> {
        self.opens.push((family, remote));
        if self.peer.refuse_open {
            return Err(TransportError::Open(format!("peer {remote} refused socket")));
        }

        let handle = SocketHandle::new(self.next_handle);
        self.next_handle += 1;
        self.sockets.insert(handle, SimSocket::new(remote));
        trace!(%handle, %remote, "socket opened");
        Ok(handle)
    }

    fn is_connected(&mut self, handle: SocketHandle) -> bool {
        let connect_after = self.peer.connect_after;
        let Some(socket) = self.sockets.get_mut(&handle) else { return false };
        if socket.connected {
            return true;
        }
        match connect_after {
            Some(after) if socket.connect_polls >= after => socket.connected = true,
            _ => socket.connect_polls = socket.connect_polls.saturating_add(1),
        }
        socket.connected
    }

    fn is_negotiating(&mut self, handle: SocketHandle) -> bool {
        let negotiate_after = self.peer.negotiate_after;
        let Some(socket) = self.sockets.get_mut(&handle) else { return false };
        if socket.negotiated {
            return false;
        }
        match negotiate_after {
            Some(after) if socket.negotiate_polls >= after => socket.negotiated = true,
            _ => socket.negotiate_polls = socket.negotiate_polls.saturating_add(1),
        }
        !socket.negotiated
    }

    fn is_secure(&self, handle: SocketHandle) -> bool {
        self.peer.secure && self.sockets.get(&handle).is_some_and(|s| s.negotiated)
    }

    fn write_ready(&mut self, handle: SocketHandle, len: usize) -> bool {
        if !self.sockets.contains_key(&handle) || len > self.peer.write_capacity {
            return false;
        }
        let rate = self.peer.write_exhaustion_rate.clamp(0.0, 1.0);
        !(rate > 0.0 && self.rng.gen_bool(rate))
    }

    fn write(&mut self, handle: SocketHandle, buf: &[u8]) -> Result<Transfer, TransportError> {
        let echo = self.peer.echo;
        let socket = self.sockets.get_mut(&handle).ok_or(TransportError::UnknownSocket(handle))?;
        if socket.peer_closed {
            return Err(TransportError::Closed);
        }
        if echo {
            socket.inbound.extend(buf);
            socket.notify();
        }

        self.written.push(Bytes::copy_from_slice(buf));
        Ok(self.framed(buf.len()))
    }

    fn read_ready(&mut self, handle: SocketHandle) -> bool {
        self.sockets.get(&handle).is_some_and(|s| !s.inbound.is_empty() || s.peer_closed)
    }

    fn read(&mut self, handle: SocketHandle, buf: &mut [u8]) -> Result<Transfer, TransportError> {
        let socket = self.sockets.get_mut(&handle).ok_or(TransportError::UnknownSocket(handle))?;
        if socket.inbound.is_empty() && socket.peer_closed {
            return Err(TransportError::Closed);
        }

        let n = buf.len().min(socket.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(socket.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(self.framed(n))
    }

    fn register_receive(
        &mut self,
        handle: SocketHandle,
        signal: ReceiveSignal,
    ) -> Result<Subscription, TransportError> {
        let socket = self.sockets.get_mut(&handle).ok_or(TransportError::UnknownSocket(handle))?;
        if socket.receive.is_some() {
            return Err(TransportError::AlreadyRegistered(handle));
        }

        let subscription = Subscription::new(self.next_subscription);
        self.next_subscription += 1;
        socket.receive = Some((subscription, signal));
        Ok(subscription)
    }

    fn deregister(&mut self, handle: SocketHandle, subscription: Subscription) {
        if let Some(socket) = self.sockets.get_mut(&handle) {
            if socket.receive.as_ref().is_some_and(|(s, _)| *s == subscription) {
                socket.receive = None;
            }
        }
    }

    fn close(&mut self, handle: SocketHandle) {
        if self.sockets.remove(&handle).is_some() {
            self.closed.push(handle);
        }
    }

    fn service(&mut self) {
        // Re-announce data left over after a read that filled the buffer.
        for socket in self.sockets.values() {
            if let Some((_, signal)) = &socket.receive {
                if !socket.inbound.is_empty() && !signal.is_pending() {
                    signal.raise();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use securelink_core::ReceiveBridge;

    use super::*;

    fn remote() -> SocketAddr {
        "10.0.0.5:4433".parse().unwrap()
    }

    #[test]
    fn connect_after_counts_polls() {
        let mut transport =
            SimTransport::new(PeerConfig { connect_after: Some(2), ..Default::default() });
        let handle = transport.open(AddressFamily::V4, remote()).unwrap();

        assert!(!transport.is_connected(handle));
        assert!(!transport.is_connected(handle));
        assert!(transport.is_connected(handle));
        assert!(transport.is_connected(handle));
    }

    #[test]
    fn never_connecting_peer() {
        let mut transport =
            SimTransport::new(PeerConfig { connect_after: None, ..Default::default() });
        let handle = transport.open(AddressFamily::V4, remote()).unwrap();

        for _ in 0..100 {
            assert!(!transport.is_connected(handle));
        }
    }

    #[test]
    fn deliver_raises_registered_signal() {
        let mut transport = SimTransport::new(PeerConfig::default());
        let handle = transport.open(AddressFamily::V4, remote()).unwrap();
        let bridge = ReceiveBridge::new();
        transport.register_receive(handle, bridge.signal()).unwrap();

        assert!(transport.deliver(handle, b"hello"));
        assert_eq!(bridge.pending(), 1);
        assert!(transport.read_ready(handle));

        let mut buf = [0u8; 3];
        assert_eq!(transport.read(handle, &mut buf).unwrap(), Transfer::plain(3));
        assert_eq!(&buf, b"hel");

        assert!(bridge.take_one());
        transport.service();
        assert_eq!(bridge.pending(), 1, "leftover data is re-announced");
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut transport = SimTransport::new(PeerConfig::default());
        let handle = transport.open(AddressFamily::V4, remote()).unwrap();
        let bridge = ReceiveBridge::new();

        transport.register_receive(handle, bridge.signal()).unwrap();
        assert!(matches!(
            transport.register_receive(handle, bridge.signal()),
            Err(TransportError::AlreadyRegistered(h)) if h == handle
        ));
    }

    #[test]
    fn record_overhead_inflates_raw_counts() {
        let mut transport =
            SimTransport::new(PeerConfig { record_overhead: 29, ..Default::default() });
        let handle = transport.open(AddressFamily::V4, remote()).unwrap();

        assert_eq!(transport.write(handle, b"abc").unwrap(), Transfer::new(3, 32));
    }

    #[test]
    fn same_seed_same_faults() {
        let peer = PeerConfig { write_exhaustion_rate: 0.5, ..Default::default() };
        let run = |seed| {
            let mut transport = SimTransport::with_seed(peer.clone(), seed);
            let handle = transport.open(AddressFamily::V4, remote()).unwrap();
            (0..32).map(|_| transport.write_ready(handle, 8)).collect::<Vec<_>>()
        };

        assert_eq!(run(7), run(7));
    }
}
