//! Production secure transport: rustls over non-blocking TCP.
//!
//! TCP connects run as tokio tasks and hand back a non-blocking std stream
//! through a oneshot channel, so [`SecureTransport::is_connected`] never
//! blocks. Once connected, every readiness query pumps the TLS connection
//! (flush outgoing records, read what the socket has, process it) and
//! answers from the resulting state.
//!
//! Raw byte counts include handshake records. They accumulate between
//! application reads and writes and are reported with the next one.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufReader, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    path::{Path, PathBuf},
    sync::Arc,
};

use rustls::{ClientConfig, ClientConnection, RootCertStore, pki_types::ServerName};
use securelink_core::{
    AddressFamily, ReceiveSignal, SecureTransport, SocketHandle, Subscription, Transfer,
    TransportError,
};
use tokio::{
    runtime::Handle,
    sync::oneshot::{self, error::TryRecvError},
};
use tracing::{debug, info, warn};

use crate::error::ConsoleError;

/// Largest plaintext write accepted at once.
pub const DEFAULT_SEND_CAPACITY: usize = 16 * 1024;

/// Build the client configuration: bundled web PKI roots plus every
/// certificate in `ca_files` (PEM).
///
/// # Errors
///
/// Fails if a file cannot be read, holds no certificates, or holds one
/// rustls rejects.
pub fn client_config(ca_files: &[PathBuf]) -> Result<Arc<ClientConfig>, ConsoleError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    for path in ca_files {
        let added = add_pem_roots(&mut roots, path)?;
        info!(path = %path.display(), added, "loaded trust anchors");
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Arc::new(config))
}

fn add_pem_roots(roots: &mut RootCertStore, path: &Path) -> Result<usize, ConsoleError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut added = 0;

    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert
            .map_err(|e| ConsoleError::Certificate(format!("{}: {e}", path.display())))?;
        roots.add(cert)?;
        added += 1;
    }

    if added == 0 {
        return Err(ConsoleError::Certificate(format!(
            "no certificates found in {}",
            path.display()
        )));
    }

    Ok(added)
}

/// One client socket.
#[derive(Debug)]
struct TlsSocket {
    remote: SocketAddr,
    tls: ClientConnection,
    connecting: Option<oneshot::Receiver<io::Result<TcpStream>>>,
    tcp: Option<TcpStream>,
    signal: Option<(Subscription, ReceiveSignal)>,
    raw_in: usize,
    raw_out: usize,
    plaintext: usize,
    peer_closed: bool,
    failed: bool,
}

impl TlsSocket {
    /// Pick up the connect result if it arrived.
    fn poll_connect(&mut self) {
        let Some(pending) = self.connecting.as_mut() else {
            return;
        };

        match pending.try_recv() {
            Ok(Ok(tcp)) => {
                debug!(remote = %self.remote, "TCP connection established");
                self.connecting = None;
                self.tcp = Some(tcp);
            },
            Ok(Err(err)) => {
                warn!(remote = %self.remote, %err, "TCP connect failed");
                self.connecting = None;
                self.failed = true;
            },
            Err(TryRecvError::Empty) => {},
            Err(TryRecvError::Closed) => {
                self.connecting = None;
                self.failed = true;
            },
        }
    }

    /// Move records between rustls and the socket until the socket would
    /// block.
    fn pump(&mut self) {
        if self.failed {
            return;
        }
        let Some(tcp) = self.tcp.as_mut() else {
            return;
        };

        for _ in 0..2 {
            while self.tls.wants_write() {
                match self.tls.write_tls(tcp) {
                    Ok(0) => break,
                    Ok(n) => self.raw_out += n,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        warn!(remote = %self.remote, err = %e, "TLS write failed");
                        self.failed = true;
                        return;
                    },
                }
            }

            while !self.peer_closed && self.tls.wants_read() {
                match self.tls.read_tls(tcp) {
                    Ok(0) => self.peer_closed = true,
                    Ok(n) => {
                        self.raw_in += n;
                        match self.tls.process_new_packets() {
                            Ok(state) => {
                                self.plaintext = state.plaintext_bytes_to_read();
                                self.peer_closed |= state.peer_has_closed();
                            },
                            Err(e) => {
                                warn!(remote = %self.remote, err = %e, "TLS protocol error");
                                self.failed = true;
                                return;
                            },
                        }
                    },
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        warn!(remote = %self.remote, err = %e, "TLS read failed");
                        self.failed = true;
                        return;
                    },
                }
            }
        }

        if self.peer_closed && self.tls.is_handshaking() {
            debug!(remote = %self.remote, "peer closed during negotiation");
            self.failed = true;
        }
    }

    fn established(&self) -> bool {
        self.tcp.is_some() && !self.failed
    }

    fn has_inbound(&self) -> bool {
        self.tcp.is_some() && (self.failed || self.peer_closed || self.plaintext > 0)
    }
}

/// rustls client transport.
#[derive(Debug)]
pub struct TlsTransport {
    config: Arc<ClientConfig>,
    runtime: Handle,
    sockets: BTreeMap<SocketHandle, TlsSocket>,
    next_handle: u32,
    next_subscription: u32,
    send_capacity: usize,
}

impl TlsTransport {
    /// Create a transport that spawns TCP connects on `runtime`.
    pub fn new(config: Arc<ClientConfig>, runtime: Handle) -> Self {
        Self {
            config,
            runtime,
            sockets: BTreeMap::new(),
            next_handle: 1,
            next_subscription: 1,
            send_capacity: DEFAULT_SEND_CAPACITY,
        }
    }

    /// Override the largest plaintext write accepted at once.
    #[must_use]
    pub fn with_send_capacity(mut self, send_capacity: usize) -> Self {
        self.send_capacity = send_capacity;
        self
    }

    /// Number of sockets not yet closed.
    pub fn open_sockets(&self) -> usize {
        self.sockets.len()
    }

    fn socket(&mut self, handle: SocketHandle) -> Result<&mut TlsSocket, TransportError> {
        self.sockets.get_mut(&handle).ok_or(TransportError::UnknownSocket(handle))
    }
}

impl SecureTransport for TlsTransport {
    fn open(
        &mut self,
        family: AddressFamily,
        remote: SocketAddr,
    ) -> Result<SocketHandle, TransportError> {
        let matches = match family {
            AddressFamily::V4 => remote.is_ipv4(),
            AddressFamily::V6 => remote.is_ipv6(),
            AddressFamily::Any => true,
        };
        if !matches {
            return Err(TransportError::Open(format!("{remote} is not an {family} address")));
        }

        let server_name = ServerName::from(remote.ip());
        let tls = ClientConnection::new(Arc::clone(&self.config), server_name)
            .map_err(|e| TransportError::Open(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.runtime.spawn(async move {
            let result: io::Result<TcpStream> = async {
                let stream = tokio::net::TcpStream::connect(remote).await?;
                stream.set_nodelay(true)?;
                stream.into_std()
            }
            .await;
            let _ = tx.send(result);
        });

        let handle = SocketHandle::new(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.sockets.insert(handle, TlsSocket {
            remote,
            tls,
            connecting: Some(rx),
            tcp: None,
            signal: None,
            raw_in: 0,
            raw_out: 0,
            plaintext: 0,
            peer_closed: false,
            failed: false,
        });

        info!(%handle, %remote, "opening secure socket");
        Ok(handle)
    }

    fn is_connected(&mut self, handle: SocketHandle) -> bool {
        let Some(socket) = self.sockets.get_mut(&handle) else {
            return false;
        };
        socket.poll_connect();
        socket.tcp.is_some()
    }

    fn is_negotiating(&mut self, handle: SocketHandle) -> bool {
        let Some(socket) = self.sockets.get_mut(&handle) else {
            return false;
        };
        socket.pump();
        socket.established() && socket.tls.is_handshaking()
    }

    fn is_secure(&self, handle: SocketHandle) -> bool {
        self.sockets
            .get(&handle)
            .is_some_and(|socket| socket.established() && !socket.tls.is_handshaking())
    }

    fn write_ready(&mut self, handle: SocketHandle, len: usize) -> bool {
        let send_capacity = self.send_capacity;
        let Some(socket) = self.sockets.get_mut(&handle) else {
            return false;
        };
        socket.pump();
        socket.established()
            && !socket.peer_closed
            && !socket.tls.wants_write()
            && len <= send_capacity
    }

    fn write(&mut self, handle: SocketHandle, buf: &[u8]) -> Result<Transfer, TransportError> {
        let socket = self.socket(handle)?;
        if !socket.established() {
            return Err(TransportError::Closed);
        }

        socket.tls.writer().write_all(buf)?;
        socket.pump();
        if socket.failed {
            return Err(TransportError::Closed);
        }

        Ok(Transfer::new(buf.len(), std::mem::take(&mut socket.raw_out)))
    }

    fn read_ready(&mut self, handle: SocketHandle) -> bool {
        let Some(socket) = self.sockets.get_mut(&handle) else {
            return false;
        };
        socket.pump();
        socket.has_inbound()
    }

    fn read(&mut self, handle: SocketHandle, buf: &mut [u8]) -> Result<Transfer, TransportError> {
        let socket = self.socket(handle)?;
        socket.pump();
        if !socket.established() {
            return Err(TransportError::Closed);
        }

        let result = socket.tls.reader().read(buf);
        let raw = std::mem::take(&mut socket.raw_in);

        match result {
            Ok(0) if !buf.is_empty() => Err(TransportError::Closed),
            Ok(n) => {
                socket.plaintext = socket.plaintext.saturating_sub(n);
                Ok(Transfer::new(n, raw))
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if socket.peer_closed {
                    Err(TransportError::Closed)
                } else {
                    Ok(Transfer::new(0, raw))
                }
            },
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(TransportError::Closed),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn register_receive(
        &mut self,
        handle: SocketHandle,
        signal: ReceiveSignal,
    ) -> Result<Subscription, TransportError> {
        let subscription = Subscription::new(self.next_subscription);
        let socket = self.socket(handle)?;
        if socket.signal.is_some() {
            return Err(TransportError::AlreadyRegistered(handle));
        }
        socket.signal = Some((subscription, signal));
        self.next_subscription = self.next_subscription.wrapping_add(1);
        Ok(subscription)
    }

    fn deregister(&mut self, handle: SocketHandle, subscription: Subscription) {
        if let Some(socket) = self.sockets.get_mut(&handle) {
            if socket.signal.as_ref().is_some_and(|(s, _)| *s == subscription) {
                socket.signal = None;
            }
        }
    }

    fn close(&mut self, handle: SocketHandle) {
        let Some(mut socket) = self.sockets.remove(&handle) else {
            return;
        };

        if socket.established() {
            socket.tls.send_close_notify();
            socket.pump();
        }
        if let Some(tcp) = socket.tcp.take() {
            let _ = tcp.shutdown(Shutdown::Both);
        }

        info!(%handle, remote = %socket.remote, "secure socket closed");
    }

    fn service(&mut self) {
        for socket in self.sockets.values_mut() {
            if socket.signal.is_none() {
                continue;
            }
            socket.pump();
            if socket.has_inbound() {
                if let Some((_, signal)) = &socket.signal {
                    if !signal.is_pending() {
                        signal.raise();
                    }
                }
            }
        }
    }
}
