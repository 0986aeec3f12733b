//! rustls transport tests against local listeners.
//!
//! Covers a full session against a rustls echo peer with a self-signed
//! certificate, plus the failure paths: a plaintext peer, refused
//! connections, family mismatch and trust anchor loading.

use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpListener},
    path::PathBuf,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use securelink_console::{
    ConsoleError, HostStack, Runtime, TlsTransport, commands,
    tls::{self, client_config},
};
use securelink_core::{
    AddressFamily, ConnectionState, Interface, MachineConfig, SecureTransport,
};
use tokio::runtime::Handle;

/// A peer that answers any bytes with plaintext HTTP, then waits for EOF.
fn plaintext_peer() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 512];
        let _ = stream.read(&mut buf);
        let _ = stream.write_all(b"HTTP/1.0 400 Bad Request\r\n\r\n");
        while matches!(stream.read(&mut buf), Ok(n) if n > 0) {}
    });

    addr
}

fn transport() -> TlsTransport {
    TlsTransport::new(client_config(&[]).unwrap(), tokio::runtime::Handle::current())
}

async fn poll_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn temp_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("securelink-{}-{name}", std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

#[tokio::test(flavor = "multi_thread")]
async fn plaintext_peer_fails_negotiation() {
    let peer = plaintext_peer();
    let mut transport = transport();

    let handle = transport.open(AddressFamily::V4, peer).unwrap();
    poll_until(|| transport.is_connected(handle)).await;
    poll_until(|| !transport.is_negotiating(handle)).await;

    assert!(!transport.is_secure(handle));
    assert!(!transport.write_ready(handle, 5));

    transport.close(handle);
    assert_eq!(transport.open_sockets(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn refused_connect_never_connects() {
    // Bind then drop to get a port nothing listens on.
    let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    let mut transport = transport();

    let handle = transport.open(AddressFamily::V4, addr).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!transport.is_connected(handle));
    assert!(!transport.is_negotiating(handle));
    assert!(!transport.is_secure(handle));
}

#[tokio::test(flavor = "multi_thread")]
async fn family_mismatch_is_refused() {
    let mut transport = transport();

    let result = transport.open(AddressFamily::V6, "127.0.0.1:4433".parse().unwrap());

    assert!(result.is_err());
    assert_eq!(transport.open_sockets(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn runtime_reports_failed_negotiation() {
    let peer = plaintext_peer();
    let stack = HostStack::with_interfaces(vec![Interface::up("lo", "127.0.0.1".parse().unwrap())]);
    let mut runtime = Runtime::new(MachineConfig::default(), stack, transport());
    let mut output = Vec::new();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut connected = false;
    loop {
        assert!(Instant::now() < deadline, "no verdict; output so far: {output:?}");
        output.extend(runtime.tick(Instant::now()));

        if !connected && runtime.state() == ConnectionState::WaitingForCommand {
            let line = format!("connect_tls {peer}");
            output.extend(runtime.execute(commands::parse(&line), Instant::now()));
            connected = true;
        } else if connected && runtime.state() == ConnectionState::WaitingForCommand {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(output.contains(&"connection opened, starting TLS negotiation".to_string()));
    assert!(
        output.contains(&"negotiation complete, could not establish secure connection".to_string()),
        "{output:?}"
    );
    assert_eq!(output.last().map(String::as_str), Some("connection closed"));
    assert_eq!(runtime.transport().open_sockets(), 0);
}

#[test]
fn missing_ca_file_is_io_error() {
    let result = client_config(&[PathBuf::from("/nonexistent/securelink-ca.pem")]);
    assert!(matches!(result, Err(ConsoleError::Io(_))));
}

#[test]
fn ca_file_without_certificates_is_rejected() {
    let path = temp_file("empty.pem", "not a certificate\n");

    let result = tls::client_config(&[path.clone()]);
    let _ = std::fs::remove_file(&path);

    match result {
        Err(ConsoleError::Certificate(msg)) => assert!(msg.contains("no certificates"), "{msg}"),
        other => panic!("expected certificate error, got {other:?}"),
    }
}

#[test]
fn bundled_roots_load() {
    assert!(client_config(&[]).is_ok());
}

/// A rustls server that echoes every record until the client closes.
struct EchoPeer {
    addr: SocketAddr,
    ca_file: PathBuf,
    /// Bytes echoed, and whether the client sent close_notify.
    done: JoinHandle<(usize, bool)>,
}

fn echo_peer(name: &str) -> EchoPeer {
    let certified = rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string()]).unwrap();
    let ca_file = temp_file(name, &certified.cert.pem());
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![certified.cert.der().clone()], key)
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let done = thread::spawn(move || {
        let (tcp, _) = listener.accept().unwrap();
        let conn = rustls::ServerConnection::new(Arc::new(config)).unwrap();
        let mut tls = rustls::StreamOwned::new(conn, tcp);
        let mut buf = [0u8; 1024];
        let mut echoed = 0;

        loop {
            match tls.read(&mut buf) {
                Ok(0) => return (echoed, true),
                Ok(n) => {
                    if tls.write_all(&buf[..n]).and_then(|()| tls.flush()).is_err() {
                        return (echoed, false);
                    }
                    echoed += n;
                },
                Err(_) => return (echoed, false),
            }
        }
    });

    EchoPeer { addr, ca_file, done }
}

/// Production runtime over the loopback interface, ticked in real time.
struct TlsConsole {
    runtime: Runtime<HostStack, TlsTransport>,
    output: Vec<String>,
}

impl TlsConsole {
    fn new(transport: TlsTransport) -> Self {
        let stack =
            HostStack::with_interfaces(vec![Interface::up("lo", "127.0.0.1".parse().unwrap())]);
        Self { runtime: Runtime::new(MachineConfig::default(), stack, transport), output: Vec::new() }
    }

    fn run(&mut self, line: &str) {
        let lines = self.runtime.execute(commands::parse(line), Instant::now());
        self.output.extend(lines);
    }

    async fn until(&mut self, what: &str, mut done: impl FnMut(&Self) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(self) {
            assert!(Instant::now() < deadline, "no {what}; output so far: {:?}", self.output);
            let lines = self.runtime.tick(Instant::now());
            self.output.extend(lines);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn until_state(&mut self, state: ConnectionState) {
        self.until(&format!("{state:?}"), |c| c.runtime.state() == state).await;
    }

    async fn until_line(&mut self, line: &str) {
        self.until(line, |c| c.output.iter().any(|l| l == line)).await;
    }

    fn stat(&self, label: &str) -> u64 {
        let prefix = format!("{label}: ");
        self.output
            .iter()
            .rev()
            .find_map(|l| l.strip_prefix(&prefix))
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| panic!("no {label} in {:?}", self.output))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn echo_session_over_tls() {
    let peer = echo_peer("echo-ca.pem");
    let config = client_config(&[peer.ca_file.clone()]).unwrap();
    let mut console = TlsConsole::new(TlsTransport::new(config, Handle::current()));

    console.until_state(ConnectionState::WaitingForCommand).await;
    console.run(&format!("connect_tls {}", peer.addr));
    console.until_state(ConnectionState::WaitingForMessage).await;
    assert!(console.output.contains(&"negotiation complete, socket is secure".to_string()));

    console.run("send_msg Hello,World");
    console.until_line("server response: Hello,World").await;
    assert!(console.output.contains(&"sent \"Hello,World\"".to_string()));

    console.run("stats");
    assert_eq!(console.stat("Clear bytes sent"), 11);
    assert_eq!(console.stat("Clear bytes received"), 11);
    assert!(console.stat("Raw bytes sent") > 11);
    assert!(console.stat("Raw bytes received") > 11);

    console.run("disconnect_tls");
    console.until_state(ConnectionState::WaitingForCommand).await;
    assert_eq!(console.output.last().map(String::as_str), Some("connection closed"));
    assert_eq!(console.runtime.transport().open_sockets(), 0);

    let (echoed, clean_close) = peer.done.join().unwrap();
    let _ = std::fs::remove_file(&peer.ca_file);
    assert_eq!(echoed, 11);
    assert!(clean_close, "close_notify should reach the peer");
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_message_is_dropped_over_tls() {
    let peer = echo_peer("small-ca.pem");
    let config = client_config(&[peer.ca_file.clone()]).unwrap();
    let transport = TlsTransport::new(config, Handle::current()).with_send_capacity(8);
    let mut console = TlsConsole::new(transport);

    console.until_state(ConnectionState::WaitingForCommand).await;
    console.run(&format!("connect_tls {}", peer.addr));
    console.until_state(ConnectionState::WaitingForMessage).await;

    console.run("send_msg Hello,World");
    console.until_line("not enough buffer space, dropped 11 byte message").await;
    assert_eq!(console.runtime.state(), ConnectionState::WaitingForMessage);

    console.run("send_msg Hi");
    console.until_line("server response: Hi").await;

    console.run("stats");
    assert_eq!(console.stat("Clear bytes sent"), 2);
    assert_eq!(console.stat("Clear bytes received"), 2);

    console.run("quit");
    console.until("quit", |c| c.runtime.should_quit()).await;

    let (echoed, _) = peer.done.join().unwrap();
    let _ = std::fs::remove_file(&peer.ca_file);
    assert_eq!(echoed, 2);
}
