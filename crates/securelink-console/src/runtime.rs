//! Generic console runtime.
//!
//! Owns the state machine together with its collaborators and turns ticks
//! and operator commands into console lines. Generic over the stack and the
//! transport, so the same orchestration runs against the host TLS transport
//! in production and the simulated one in tests. Time is always passed in.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use securelink_core::{
    CommandError, ConnectionState, ConnectionStateMachine, MachineConfig, NetworkStack,
    SecureTransport,
};
use tracing::{debug, info};

use crate::{
    commands::{COMMANDS, Command},
    render, stats,
};

/// Console runtime over a network stack `N` and a secure transport `T`.
#[derive(Debug)]
pub struct Runtime<N, T> {
    machine: ConnectionStateMachine,
    stack: N,
    transport: T,
    started: Option<Instant>,
    quitting: bool,
}

impl<N: NetworkStack, T: SecureTransport> Runtime<N, T> {
    /// Create a runtime; the machine starts in `Init`.
    pub fn new(config: MachineConfig, stack: N, transport: T) -> Self {
        Self {
            machine: ConnectionStateMachine::new(config),
            stack,
            transport,
            started: None,
            quitting: false,
        }
    }

    /// One scheduler tick: service the transport, step the machine, and
    /// render what happened.
    pub fn tick(&mut self, now: Instant) -> Vec<String> {
        self.started.get_or_insert(now);
        self.transport.service();
        self.machine
            .step(&self.stack, &mut self.transport, now)
            .iter()
            .map(render::describe)
            .collect()
    }

    /// Execute one operator command.
    ///
    /// Commands that start work return nothing; progress is reported by
    /// later ticks.
    pub fn execute(&mut self, command: Command, now: Instant) -> Vec<String> {
        debug!(?command, state = ?self.machine.state(), "executing command");

        match command {
            Command::ConnectTls { target } => rejection(self.machine.connect(&target)),
            Command::DisconnectTls => rejection(self.machine.disconnect()),
            Command::SendMessage { message } => rejection(self.machine.send(message.as_bytes())),
            Command::Stats => stats::render(self.machine.counters(), self.machine.timings()),
            Command::IpMode { family } => {
                self.machine.set_address_family(family);
                vec![format!("ip mode: {family}")]
            },
            Command::UnixTime => self.unix_time(now),
            Command::Reset => {
                self.machine.reinitialize(&mut self.transport);
                vec!["reinitializing".to_string()]
            },
            Command::Help => {
                COMMANDS.iter().map(|(name, about)| format!("{name:<16}{about}")).collect()
            },
            Command::Quit => {
                info!("quit requested");
                self.quitting = true;
                if self.holds_connection() && self.state() != ConnectionState::ClosingConnection {
                    rejection(self.machine.disconnect())
                } else {
                    Vec::new()
                }
            },
            Command::Empty => Vec::new(),
            Command::Unknown { input } => vec![format!("unknown command: {input} (try help)")],
            Command::InvalidArgs { error, .. } => vec![error],
        }
    }

    /// End of operator input; behaves as `quit`.
    pub fn input_closed(&mut self, now: Instant) -> Vec<String> {
        info!("operator input closed");
        self.execute(Command::Quit, now)
    }

    /// Whether quit was requested and no connection is left to close.
    pub fn should_quit(&self) -> bool {
        self.quitting && !self.holds_connection()
    }

    /// Close any open socket immediately and return to `Init`.
    pub fn shutdown(&mut self) {
        if self.holds_connection() {
            info!("closing connection on shutdown");
            self.machine.reinitialize(&mut self.transport);
        }
    }

    /// The state machine.
    pub fn machine(&self) -> &ConnectionStateMachine {
        &self.machine
    }

    /// Current machine state.
    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Mutable access to the network stack.
    pub fn stack_mut(&mut self) -> &mut N {
        &mut self.stack
    }

    fn holds_connection(&self) -> bool {
        self.machine.state().holds_socket()
    }

    fn unix_time(&self, now: Instant) -> Vec<String> {
        let mut lines = Vec::with_capacity(2);
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(since) => lines.push(format!("unix time: {}", since.as_secs())),
            Err(_) => lines.push("unix time: clock is before 1970".to_string()),
        }
        let uptime = self.started.map(|started| now.saturating_duration_since(started));
        lines.push(format!("uptime: {} s", uptime.unwrap_or_default().as_secs()));
        lines
    }
}

fn rejection(result: Result<(), CommandError>) -> Vec<String> {
    match result {
        Ok(()) => Vec::new(),
        Err(err) => vec![err.to_string()],
    }
}
