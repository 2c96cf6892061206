// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! State machine driven through the public handle.

mod common;

use common::{ports, Harness, TIMEOUT};
use mediacomp::{Command, ComponentError, ComponentHandle, Event, Param, PortDefinition, State};

#[test]
fn test_full_lifecycle() {
    let harness = Harness::filter("lifecycle", 2);
    assert_eq!(harness.component.get_state(), State::Loaded);

    let (inputs, outputs) = harness.to_idle(2);
    for port in [0, 1] {
        let status = harness.component.port_status(port).unwrap();
        assert!(status.populated);
        assert_eq!(status.assigned_buffers, 2);
    }

    harness.command(Command::StateSet(State::Executing));
    harness.expect_state(State::Executing);
    harness.command(Command::StateSet(State::Pause));
    harness.expect_state(State::Pause);
    harness.command(Command::StateSet(State::Executing));
    harness.expect_state(State::Executing);
    harness.command(Command::StateSet(State::Idle));
    harness.expect_state(State::Idle);

    harness.to_loaded(ports(0, inputs).chain(ports(1, outputs)));
    let status = harness.component.port_status(0).unwrap();
    assert!(!status.populated);
    assert_eq!(status.assigned_buffers, 0);
}

#[test]
fn test_same_state_reported_as_error_event() {
    let harness = Harness::filter("same-state", 2);
    harness.command(Command::StateSet(State::Loaded));
    let result = harness
        .receivers
        .wait_for_state(harness.component.id(), TIMEOUT);
    assert_eq!(result, Some(Err(ComponentError::SameState)));
    assert_eq!(harness.component.get_state(), State::Loaded);
}

#[test]
fn test_illegal_edges_leave_state_untouched() {
    let harness = Harness::filter("illegal", 2);
    for target in [State::Executing, State::Pause] {
        harness.command(Command::StateSet(target));
        let result = harness
            .receivers
            .wait_for_state(harness.component.id(), TIMEOUT);
        assert!(
            matches!(result, Some(Err(ComponentError::IncorrectStateTransition(_)))),
            "Loaded -> {target} should be refused, got {result:?}"
        );
        assert_eq!(harness.component.get_state(), State::Loaded);
    }
}

#[test]
fn test_queued_state_change_keeps_allocation_edge_open() {
    let harness = Harness::filter("queued-edges", 1);
    harness.command(Command::StateSet(State::Idle));
    harness.command(Command::StateSet(State::WaitForResources));

    let inputs = harness.allocate(0, 1);
    let outputs = harness.allocate(1, 1);
    harness.expect_state(State::Idle);

    // Idle -> WaitForResources is refused once the handler gets to it.
    let result = harness
        .receivers
        .wait_for_state(harness.component.id(), TIMEOUT);
    assert!(matches!(
        result,
        Some(Err(ComponentError::IncorrectStateTransition(_)))
    ));
    assert_eq!(harness.component.get_state(), State::Idle);

    harness.to_loaded(ports(0, inputs).chain(ports(1, outputs)));
}

#[test]
fn test_refused_edge_does_not_close_the_next_one() {
    let harness = Harness::filter("refused-then-idle", 1);
    harness.command(Command::StateSet(State::Executing));
    harness.command(Command::StateSet(State::Idle));

    let inputs = harness.allocate(0, 1);
    let outputs = harness.allocate(1, 1);
    let result = harness
        .receivers
        .wait_for_state(harness.component.id(), TIMEOUT);
    assert!(matches!(
        result,
        Some(Err(ComponentError::IncorrectStateTransition(_)))
    ));
    harness.expect_state(State::Idle);

    harness.to_loaded(ports(0, inputs).chain(ports(1, outputs)));
}

#[test]
fn test_wait_for_resources_round_trip() {
    let harness = Harness::filter("wfr", 2);
    harness.command(Command::StateSet(State::WaitForResources));
    harness.expect_state(State::WaitForResources);
    harness.command(Command::StateSet(State::Loaded));
    harness.expect_state(State::Loaded);
}

#[test]
fn test_idle_from_wait_for_resources() {
    let harness = Harness::filter("wfr-idle", 1);
    harness.command(Command::StateSet(State::WaitForResources));
    harness.expect_state(State::WaitForResources);

    let (inputs, outputs) = harness.to_idle(1);
    harness.to_loaded(ports(0, inputs).chain(ports(1, outputs)));
}

#[test]
fn test_invalid_is_terminal() {
    let harness = Harness::filter("invalid", 2);
    harness.command(Command::StateSet(State::Invalid));
    let result = harness
        .receivers
        .wait_for_state(harness.component.id(), TIMEOUT);
    assert_eq!(result, Some(Err(ComponentError::InvalidState)));
    assert_eq!(harness.component.get_state(), State::Invalid);

    assert_eq!(
        harness
            .component
            .send_command(Command::StateSet(State::Loaded)),
        Err(ComponentError::InvalidState)
    );
    let mut param = Param::PortDefinition(PortDefinition::query(0));
    assert_eq!(
        harness.component.get_parameter(&mut param),
        Err(ComponentError::InvalidState)
    );
    assert_eq!(
        harness.component.allocate_buffer(0, 256).map(|_| ()),
        Err(ComponentError::InvalidState)
    );
}

#[test]
fn test_allocation_refused_outside_loaded_to_idle() {
    let harness = Harness::filter("early-alloc", 2);
    assert!(matches!(
        harness.component.allocate_buffer(0, 256),
        Err(ComponentError::IncorrectStateTransition(_))
    ));
}

#[test]
fn test_drop_while_waiting_for_buffers() {
    let harness = Harness::filter("abandoned", 2);
    harness.command(Command::StateSet(State::Idle));
    let _first = harness.allocate(0, 1);
    // Dropping the component must unblock the pending Loaded -> Idle edge.
    drop(harness);
}

#[test]
fn test_component_version() {
    let harness = Harness::filter("versioned", 1);
    let version = harness.component.get_component_version();
    assert_eq!(version.name, "versioned");
    assert_eq!(version.id, harness.component.id());

    let events: Vec<Event> = harness.receivers.events.try_iter().map(|(_, e)| e).collect();
    assert!(events.is_empty());
}
