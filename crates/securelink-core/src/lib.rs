//! SecureLink core logic
//!
//! Pure state machine logic for driving one secure TCP session from a
//! textual `host:port` target to an established TLS channel and back,
//! completely decoupled from I/O.
//!
//! # Architecture
//!
//! The [`machine::ConnectionStateMachine`] advances exactly one decision per
//! call to [`machine::ConnectionStateMachine::step`]. Every wait is expressed
//! as "stay in this state and return", so a cooperative scheduler can
//! interleave the machine with unrelated work. Collaborators (the network
//! stack, the secure transport and the clock) are passed in by the caller on
//! every step; the machine stores none of them.
//!
//! Inbound data is announced by the transport through a
//! [`signal::ReceiveSignal`]. Raising the signal only enqueues a request;
//! the machine drains it at the start of the next step, which keeps the
//! session state single-writer.
//!
//! Console output is returned as [`machine::MachineEvent`] values for the
//! driver to render.
//!
//! # Components
//!
//! - [`address`]: `host:port` parsing with an explicit address family
//! - [`timing`]: lifecycle milestone timestamps
//! - [`counters`]: raw and clear byte accounting
//! - [`buffer`]: fixed-capacity message buffers
//! - [`signal`]: receive signal bridge between transport and machine
//! - [`transport`]: secure transport capability
//! - [`stack`]: network stack readiness capability
//! - [`mod@env`]: environment abstraction (time)
//! - [`session`]: per-connection session data
//! - [`machine`]: the connection state machine
//! - [`error`]: error types

pub mod address;
pub mod buffer;
pub mod counters;
pub mod env;
pub mod error;
pub mod machine;
pub mod session;
pub mod signal;
pub mod stack;
pub mod timing;
pub mod transport;

pub use address::{AddressFamily, TargetAddress, parse_target};
pub use buffer::MessageBuffer;
pub use counters::{ByteCounters, CounterKind, Direction, Transfer};
pub use env::{Environment, SystemEnv};
pub use error::{CapacityError, CommandError, TargetError, TransportError};
pub use machine::{ConnectionState, ConnectionStateMachine, MachineConfig, MachineEvent};
pub use session::Session;
pub use signal::{ReceiveBridge, ReceiveSignal};
pub use stack::{Interface, NetworkStack, StackStatus};
pub use timing::{Milestone, Timings};
pub use transport::{SecureTransport, SocketHandle, Subscription};
