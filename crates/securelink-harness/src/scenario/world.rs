//! World state for scenario execution.
//!
//! The World owns the machine and its simulated collaborators, and records
//! what happened so oracles can verify it afterwards.

use securelink_core::{
    CommandError, ConnectionState, ConnectionStateMachine, Environment, MachineEvent,
    SecureTransport,
};

use crate::{SimEnv, SimStack, SimTransport};

/// Result of one scripted operator command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// Command as scripted
    pub command: String,
    /// What the machine answered
    pub result: Result<(), CommandError>,
}

/// Machine, collaborators and trace.
#[derive(Debug)]
pub struct World {
    pub(crate) machine: ConnectionStateMachine,
    pub(crate) env: SimEnv,
    pub(crate) stack: SimStack,
    pub(crate) transport: SimTransport,
    events: Vec<MachineEvent>,
    states: Vec<ConnectionState>,
    commands: Vec<CommandOutcome>,
    steps: usize,
}

impl World {
    /// Assemble a world around a fresh machine.
    pub fn new(
        machine: ConnectionStateMachine,
        env: SimEnv,
        stack: SimStack,
        transport: SimTransport,
    ) -> Self {
        let states = vec![machine.state()];
        Self {
            machine,
            env,
            stack,
            transport,
            events: Vec::new(),
            states,
            commands: Vec::new(),
            steps: 0,
        }
    }

    /// Run one scheduler tick: transport service, then one machine step.
    pub fn tick(&mut self) -> Vec<MachineEvent> {
        self.transport.service();
        let events = self.machine.step(&self.stack, &mut self.transport, self.env.now());
        self.steps += 1;

        let state = self.machine.state();
        if self.states.last() != Some(&state) {
            self.states.push(state);
        }
        self.events.extend(events.iter().cloned());
        events
    }

    /// Record a command issued outside the scripted steps.
    pub fn record_command(
        &mut self,
        command: impl Into<String>,
        result: Result<(), CommandError>,
    ) {
        let state = self.machine.state();
        if self.states.last() != Some(&state) {
            self.states.push(state);
        }
        self.commands.push(CommandOutcome { command: command.into(), result });
    }

    /// The machine under test.
    pub fn machine(&self) -> &ConnectionStateMachine {
        &self.machine
    }

    /// The machine under test, for commands outside the scripted steps.
    pub fn machine_mut(&mut self) -> &mut ConnectionStateMachine {
        &mut self.machine
    }

    /// Simulated transport.
    pub fn transport(&self) -> &SimTransport {
        &self.transport
    }

    /// Simulated transport, for peer actions outside the scripted steps.
    pub fn transport_mut(&mut self) -> &mut SimTransport {
        &mut self.transport
    }

    /// Simulated network stack.
    pub fn stack(&self) -> &SimStack {
        &self.stack
    }

    /// Simulated network stack, for changing status mid-run.
    pub fn stack_mut(&mut self) -> &mut SimStack {
        &mut self.stack
    }

    /// Simulated clock.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Every event the machine produced, in order.
    pub fn events(&self) -> &[MachineEvent] {
        &self.events
    }

    /// States visited, without consecutive repeats.
    pub fn states(&self) -> &[ConnectionState] {
        &self.states
    }

    /// Every scripted command and its result.
    pub fn commands(&self) -> &[CommandOutcome] {
        &self.commands
    }

    /// Number of steps taken.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Whether the machine passed through `state`.
    pub fn visited(&self, state: ConnectionState) -> bool {
        self.states.contains(&state)
    }

    /// Plaintext received over the whole run, concatenated.
    pub fn received(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                MachineEvent::DataReceived { data } => Some(data.as_ref()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    /// Number of events matching `predicate`.
    pub fn count_events(&self, predicate: impl Fn(&MachineEvent) -> bool) -> usize {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}
