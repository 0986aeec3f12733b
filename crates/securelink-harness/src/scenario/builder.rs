//! Scenario builder API.
//!
//! Provides a declarative API for constructing scenario tests that enforce
//! the Oracle Pattern.

use std::time::Duration;

use securelink_core::{AddressFamily, ConnectionStateMachine, MachineConfig};
use tracing::debug;

use crate::{
    PeerConfig, SimEnv, SimStack, SimTransport,
    scenario::{OracleFn, World},
};

/// Upper bound on steps spent settling after each scripted operation.
const MAX_SETTLE_STEPS: usize = 64;

/// Simulated time that passes per scheduler tick.
const TICK: Duration = Duration::from_millis(1);

/// One scripted operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioStep {
    /// Operator connects to a target
    Connect(String),
    /// Operator sends a message
    Send(Vec<u8>),
    /// Peer delivers data on the current socket
    Deliver(Vec<u8>),
    /// Peer closes the current socket
    PeerClose,
    /// Operator disconnects
    Disconnect,
    /// Operator changes the address family
    SetFamily(AddressFamily),
    /// Operator reinitializes the machine
    Reinitialize,
    /// Simulated time passes, then the machine settles
    Advance(Duration),
    /// The machine gets exactly this many ticks, without settling
    Ticks(usize),
}

/// Scenario builder.
///
/// Script the stack, the peer, and a sequence of operations. Must call
/// `.oracle()` to get a [`RunnableScenario`] that can be executed.
pub struct Scenario {
    name: String,
    config: MachineConfig,
    peer: PeerConfig,
    stack: SimStack,
    seed: u64,
    steps: Vec<ScenarioStep>,
}

impl Scenario {
    /// Create a new scenario with the given name.
    ///
    /// Defaults: ready stack, well-behaved secure peer, default machine
    /// configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: MachineConfig::default(),
            peer: PeerConfig::default(),
            stack: SimStack::ready(),
            seed: 0,
            steps: Vec::new(),
        }
    }

    /// Use a custom machine configuration.
    pub fn config(mut self, config: MachineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom peer.
    pub fn peer(mut self, peer: PeerConfig) -> Self {
        self.peer = peer;
        self
    }

    /// Use a custom network stack.
    pub fn stack(mut self, stack: SimStack) -> Self {
        self.stack = stack;
        self
    }

    /// Seed the transport's fault injection.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Append an operation.
    pub fn step(mut self, step: ScenarioStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Operator connects to `target`.
    pub fn connect(self, target: impl Into<String>) -> Self {
        self.step(ScenarioStep::Connect(target.into()))
    }

    /// Operator sends `message`.
    pub fn send(self, message: impl AsRef<[u8]>) -> Self {
        self.step(ScenarioStep::Send(message.as_ref().to_vec()))
    }

    /// Peer delivers `data`.
    pub fn deliver(self, data: impl AsRef<[u8]>) -> Self {
        self.step(ScenarioStep::Deliver(data.as_ref().to_vec()))
    }

    /// Operator disconnects.
    pub fn disconnect(self) -> Self {
        self.step(ScenarioStep::Disconnect)
    }

    /// Simulated time passes.
    pub fn advance(self, by: Duration) -> Self {
        self.step(ScenarioStep::Advance(by))
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario.
    ///
    /// Boots the machine until it settles, applies each operation followed
    /// by another settle, then runs the oracle against the final world.
    /// Command rejections are recorded in the world, not treated as
    /// failures.
    pub fn run(self) -> Result<(), String> {
        let world = self.execute();
        (self.oracle)(&world).map_err(|e| format!("Scenario '{}': {e}", self.scenario.name))
    }

    /// Execute the scenario and hand back the world without verification.
    ///
    /// For tests that compare whole runs, such as determinism checks.
    pub fn run_unverified(self) -> World {
        self.execute()
    }

    fn execute(&self) -> World {
        let scenario = &self.scenario;
        let machine = ConnectionStateMachine::new(scenario.config.clone());
        let transport = SimTransport::with_seed(scenario.peer.clone(), scenario.seed);
        let mut world = World::new(machine, SimEnv::new(), scenario.stack.clone(), transport);

        world.settle();
        for step in &scenario.steps {
            debug!(scenario = %scenario.name, ?step, "applying step");
            world.apply(step);
        }
        world
    }
}

impl World {
    /// Apply one scripted operation, then settle unless it is
    /// [`ScenarioStep::Ticks`].
    pub fn apply(&mut self, step: &ScenarioStep) {
        match step {
            ScenarioStep::Connect(target) => {
                let result = self.machine.connect(target);
                self.record_command(format!("connect {target}"), result);
            },
            ScenarioStep::Send(message) => {
                let result = self.machine.send(message);
                self.record_command(format!("send {}", String::from_utf8_lossy(message)), result);
            },
            ScenarioStep::Deliver(data) => {
                if let Some(handle) = self.machine.session().socket() {
                    self.transport.deliver(handle, data);
                }
            },
            ScenarioStep::PeerClose => {
                if let Some(handle) = self.machine.session().socket() {
                    self.transport.close_from_peer(handle);
                }
            },
            ScenarioStep::Disconnect => {
                let result = self.machine.disconnect();
                self.record_command("disconnect", result);
            },
            ScenarioStep::SetFamily(family) => {
                self.machine.set_address_family(*family);
                self.record_command(format!("ipmode {family}"), Ok(()));
            },
            ScenarioStep::Reinitialize => {
                self.machine.reinitialize(&mut self.transport);
                self.record_command("reset", Ok(()));
            },
            ScenarioStep::Advance(by) => self.env.advance(*by),
            ScenarioStep::Ticks(count) => {
                for _ in 0..*count {
                    self.env.advance(TICK);
                    self.tick();
                }
                return;
            },
        }
        self.settle();
    }

    /// Tick until the machine rests in an idle state or the bound is hit.
    ///
    /// Await states that never resolve simply run out the bound.
    pub fn settle(&mut self) {
        for _ in 0..MAX_SETTLE_STEPS {
            let before = self.machine.state();
            self.env.advance(TICK);
            let events = self.tick();
            if events.is_empty() && before == self.machine.state() && before.is_idle() {
                break;
            }
        }
    }
}
