//! Operator console for SecureLink
//!
//! A thin shell over [`securelink_core::ConnectionStateMachine`] that parses
//! console commands, renders machine events, and supplies the production
//! collaborators: the host network stack and a rustls transport. All
//! orchestration lives in the generic [`Runtime`], which runs unchanged
//! against the simulated stack and transport in tests.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod commands;
pub mod error;
pub mod host;
pub mod render;
pub mod runtime;
pub mod stats;
pub mod tls;

pub use commands::Command;
pub use error::ConsoleError;
pub use host::HostStack;
pub use runtime::Runtime;
pub use tls::TlsTransport;
