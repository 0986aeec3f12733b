//! Example scenario tests demonstrating the scenario framework.

use securelink_core::{AddressFamily, ConnectionState, MachineEvent};
use securelink_harness::scenario::{Scenario, ScenarioStep, oracle};

#[test]
fn scenario_framework_basic_example() {
    // Connect, exchange one message each way, and verify the final state
    let result = Scenario::new("basic example")
        .connect("10.0.0.5:4433")
        .send("hi")
        .deliver("hello yourself")
        .oracle(Box::new(|world| {
            let machine = world.machine();
            assert_eq!(machine.state(), ConnectionState::WaitingForMessage);
            assert!(machine.session().socket().is_some(), "socket should be open");
            assert!(machine.session().subscription().is_some(), "receive should be registered");

            let handle = machine.session().socket().unwrap();
            assert!(world.transport().is_registered(handle));
            assert_eq!(
                world.transport().remote(handle),
                Some("10.0.0.5:4433".parse().unwrap())
            );
            Ok(())
        }))
        .run();

    assert!(result.is_ok(), "scenario should succeed: {result:?}");
}

#[test]
fn scenario_framework_oracle_helpers() {
    let result = Scenario::new("oracle helpers")
        .connect("10.0.0.5:4433")
        .disconnect()
        .oracle(oracle::no_open_sockets())
        .run();

    assert!(result.is_ok(), "scenario should succeed: {result:?}");
}

#[test]
fn scenario_framework_oracle_composition() {
    let result = Scenario::new("oracle composition")
        .step(ScenarioStep::SetFamily(AddressFamily::Any))
        .connect("[fe80::1]:8443")
        .send("over v6")
        .disconnect()
        .oracle(oracle::all_of(vec![
            oracle::final_state(ConnectionState::WaitingForCommand),
            oracle::visited(ConnectionState::SendingMessage),
            oracle::peer_received(vec![b"over v6"]),
            oracle::closed_sockets_released(),
        ]))
        .run();

    assert!(result.is_ok(), "scenario should succeed: {result:?}");
}

#[test]
fn scenario_framework_reports_oracle_failure() {
    let result = Scenario::new("expects too much")
        .connect("10.0.0.5")
        .oracle(oracle::final_state(ConnectionState::WaitingForMessage))
        .run();

    let err = result.unwrap_err();
    assert!(err.starts_with("Scenario 'expects too much'"), "{err}");
    assert!(err.contains("WaitingForCommand"), "{err}");
}

#[test]
fn scenario_events_describe_the_run() {
    let result = Scenario::new("events")
        .connect("10.0.0.5:4433")
        .oracle(Box::new(|world| {
            let accepted = world.events().iter().find_map(|e| match e {
                MachineEvent::TargetAccepted { address } => Some(*address),
                _ => None,
            });
            assert_eq!(accepted, Some("10.0.0.5:4433".parse().unwrap()));
            assert!(world.events().contains(&MachineEvent::Connected));
            assert!(world.events().contains(&MachineEvent::NegotiationComplete { secure: true }));
            Ok(())
        }))
        .run();

    assert!(result.is_ok(), "scenario should succeed: {result:?}");
}
