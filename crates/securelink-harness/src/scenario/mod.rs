//! Scenario testing framework.
//!
//! Scenarios script operator commands and peer behaviour against a real
//! [`ConnectionStateMachine`](securelink_core::ConnectionStateMachine) over
//! the simulated stack and transport. A scenario cannot run without an
//! oracle: every run ends with a verification of the final [`World`].

mod builder;
pub mod oracle;
mod world;

pub use builder::{RunnableScenario, Scenario, ScenarioStep};
pub use world::{CommandOutcome, World};

/// Verification run against the final world state.
pub type OracleFn = Box<dyn FnOnce(&World) -> Result<(), String>>;
