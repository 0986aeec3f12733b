//! Deterministic simulation harness for the securelink state machine.
//!
//! In-memory implementations of the [`Environment`], [`NetworkStack`] and
//! [`SecureTransport`] traits for reproducible tests under scripted peer
//! behaviour and seeded fault injection.
//!
//! [`Environment`]: securelink_core::Environment
//! [`NetworkStack`]: securelink_core::NetworkStack
//! [`SecureTransport`]: securelink_core::SecureTransport

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod scenario;
pub mod sim_env;
pub mod sim_stack;
pub mod sim_transport;

pub use model::{ModelSession, Operation, Phase, Rejection};
pub use sim_env::SimEnv;
pub use sim_stack::SimStack;
pub use sim_transport::{PeerConfig, SimTransport};
