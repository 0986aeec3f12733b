//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! state machine behaves identically to the reference model.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!     ModelSession     World (sim)     Compare
//!      (reference)     real machine    results
//! ```

use std::time::Duration;

use proptest::prelude::*;
use securelink_core::{AddressFamily, ConnectionState};
use securelink_harness::{
    ModelSession, Operation, Phase,
    model::TARGETS,
    scenario::{Scenario, ScenarioStep, World},
};

fn booted() -> World {
    Scenario::new("model").oracle(Box::new(|_| Ok(()))).run_unverified()
}

fn to_step(op: &Operation) -> ScenarioStep {
    match *op {
        Operation::Connect { target } => ScenarioStep::Connect(TARGETS[target].to_string()),
        Operation::Send { len } => ScenarioStep::Send(vec![b'x'; len]),
        Operation::Deliver { len } => ScenarioStep::Deliver(vec![b'y'; len]),
        Operation::Disconnect => ScenarioStep::Disconnect,
        Operation::SetFamily(family) => ScenarioStep::SetFamily(family),
        Operation::AdvanceTime { millis } => {
            ScenarioStep::Advance(Duration::from_millis(u64::from(millis)))
        },
    }
}

fn is_command(op: &Operation) -> bool {
    matches!(op, Operation::Connect { .. } | Operation::Send { .. } | Operation::Disconnect)
}

fn family_strategy() -> impl Strategy<Value = AddressFamily> {
    prop_oneof![Just(AddressFamily::V4), Just(AddressFamily::V6), Just(AddressFamily::Any)]
}

/// Strategy for generating operations.
fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        // Weight towards operations that change the connection
        3 => (0..TARGETS.len()).prop_map(|target| Operation::Connect { target }),
        4 => (0..300usize).prop_map(|len| Operation::Send { len }),
        3 => (1..600usize).prop_map(|len| Operation::Deliver { len }),
        2 => Just(Operation::Disconnect),
        1 => family_strategy().prop_map(Operation::SetFamily),
        1 => any::<u16>().prop_map(|millis| Operation::AdvanceTime { millis }),
    ]
}

fn phase_of(state: ConnectionState) -> Option<Phase> {
    match state {
        ConnectionState::WaitingForCommand => Some(Phase::Idle),
        ConnectionState::WaitingForMessage => Some(Phase::Connected),
        _ => None,
    }
}

proptest! {
    /// Verify that command results, phase and counters match between model
    /// and real machine after every operation.
    #[test]
    fn prop_model_matches_real(ops in prop::collection::vec(operation_strategy(), 0..40)) {
        let mut model = ModelSession::new();
        let mut world = booted();

        for (i, op) in ops.iter().enumerate() {
            let expected = model.apply(op);
            world.apply(&to_step(op));

            if is_command(op) {
                let actual = &world.commands().last().unwrap().result;
                match (expected, actual) {
                    (Ok(()), Ok(())) => {},
                    (Err(rejection), Err(error)) => prop_assert!(
                        rejection.matches(error),
                        "Divergence at operation {}: {:?}\nModel: {:?}\nReal: {:?}",
                        i, op, rejection, error
                    ),
                    (expected, actual) => prop_assert!(
                        false,
                        "Divergence at operation {}: {:?}\nModel: {:?}\nReal: {:?}",
                        i, op, expected, actual
                    ),
                }
            }

            let state = world.machine().state();
            prop_assert_eq!(
                phase_of(state),
                Some(model.phase()),
                "Phase divergence at operation {}: {:?} (real state {:?})",
                i, op, state
            );

            let counters = world.machine().counters();
            prop_assert_eq!(counters.clear_sent(), model.clear_sent(), "clear_sent after {:?}", op);
            prop_assert_eq!(
                counters.clear_received(),
                model.clear_received(),
                "clear_received after {:?}",
                op
            );
        }

        let successful = world.transport().opens().len() as u64;
        prop_assert_eq!(successful, model.attempts());
    }

    /// Idle means nothing is held open, whatever came before.
    #[test]
    fn prop_idle_holds_no_socket(ops in prop::collection::vec(operation_strategy(), 0..60)) {
        let mut world = booted();

        for op in &ops {
            world.apply(&to_step(op));

            let session = world.machine().session();
            prop_assert!(world.transport().open_sockets() <= 1);
            if world.machine().state() == ConnectionState::WaitingForCommand {
                prop_assert_eq!(session.socket(), None);
                prop_assert_eq!(session.subscription(), None);
                prop_assert_eq!(world.transport().open_sockets(), 0);
            }
            if session.subscription().is_some() {
                prop_assert!(session.socket().is_some());
            }
        }
    }
}
