// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Port bookkeeping: allocation capacity, free, enable and disable.

mod common;

use common::{ports, Harness, BUFFER_SIZE};
use mediacomp::{
    Command, Completion, ComponentError, ComponentHandle, Param, PortDefinition, PortTarget,
    State,
};

#[test]
fn test_assigned_never_exceeds_capacity() {
    let harness = Harness::filter("capacity", 2);
    harness.command(Command::StateSet(State::Idle));

    let mut inputs = Vec::new();
    for expected in 1..=2 {
        inputs.push(harness.component.allocate_buffer(0, BUFFER_SIZE).unwrap());
        let status = harness.component.port_status(0).unwrap();
        assert_eq!(status.assigned_buffers, expected);
        assert!(status.assigned_buffers <= status.buffer_count_actual);
    }
    assert!(harness.component.port_status(0).unwrap().populated);
    assert!(matches!(
        harness.component.allocate_buffer(0, BUFFER_SIZE),
        Err(ComponentError::InsufficientResources(_))
    ));
    assert_eq!(harness.component.port_status(0).unwrap().assigned_buffers, 2);

    let outputs = harness.allocate(1, 2);
    harness.expect_state(State::Idle);
    harness.to_loaded(ports(0, inputs).chain(ports(1, outputs)));
}

#[test]
fn test_undersized_buffers_refused() {
    let harness = Harness::filter("undersized", 1);
    harness.command(Command::StateSet(State::Idle));
    assert!(matches!(
        harness.component.allocate_buffer(0, BUFFER_SIZE - 1),
        Err(ComponentError::BadParameter(_))
    ));
    assert!(matches!(
        harness.component.use_buffer(1, vec![0; 8]),
        Err(ComponentError::BadParameter(_))
    ));
    assert_eq!(harness.component.port_status(0).unwrap().assigned_buffers, 0);

    let (inputs, outputs) = (harness.allocate(0, 1), harness.allocate(1, 1));
    harness.expect_state(State::Idle);
    harness.to_loaded(ports(0, inputs).chain(ports(1, outputs)));
}

#[test]
fn test_use_buffer_hands_storage_back() {
    let harness = Harness::filter("lent", 1);
    harness.command(Command::StateSet(State::Idle));
    let input = harness
        .component
        .use_buffer(0, vec![0xEE; BUFFER_SIZE])
        .unwrap();
    let output = harness
        .component
        .use_buffer(1, vec![0xFF; BUFFER_SIZE])
        .unwrap();
    harness.expect_state(State::Idle);

    harness.command(Command::StateSet(State::Loaded));
    let storage = harness.component.free_buffer(0, input).unwrap();
    assert_eq!(storage, Some(vec![0xEE; BUFFER_SIZE]));
    harness.component.free_buffer(1, output).unwrap();
    harness.expect_state(State::Loaded);
}

#[test]
fn test_free_on_wrong_port_changes_nothing() {
    let harness = Harness::filter("wrong-free", 2);
    let (mut inputs, outputs) = harness.to_idle(2);

    let rejected = harness
        .component
        .free_buffer(1, inputs.remove(0))
        .unwrap_err();
    assert!(matches!(rejected.error, ComponentError::BadPortIndex(1)));
    inputs.push(rejected.buffer);

    let stranger = Harness::filter("stranger", 1);
    stranger.command(Command::StateSet(State::Idle));
    let foreign = stranger.allocate(0, 1).remove(0);
    let rejected = harness.component.free_buffer(0, foreign).unwrap_err();
    assert!(matches!(rejected.error, ComponentError::BadParameter(_)));

    for port in [0, 1] {
        let status = harness.component.port_status(port).unwrap();
        assert_eq!(status.assigned_buffers, 2);
        assert!(status.populated);
    }
    harness.to_loaded(ports(0, inputs).chain(ports(1, outputs)));
}

#[test]
fn test_disable_twice_is_refused() {
    let harness = Harness::filter("disable", 2);
    harness.command(Command::PortDisable(PortTarget::Index(0)));
    harness.expect_completion(Completion::PortDisable(0));
    assert!(!harness.component.port_status(0).unwrap().enabled);

    assert!(matches!(
        harness
            .component
            .send_command(Command::PortDisable(PortTarget::Index(0))),
        Err(ComponentError::IncorrectStateOperation(_))
    ));
    assert!(harness.component.port_status(1).unwrap().enabled);

    harness.command(Command::PortEnable(PortTarget::Index(0)));
    harness.expect_completion(Completion::PortEnable(0));
    assert!(harness.component.port_status(0).unwrap().enabled);
    assert!(matches!(
        harness
            .component
            .send_command(Command::PortEnable(PortTarget::All)),
        Err(ComponentError::IncorrectStateOperation(_))
    ));
}

#[test]
fn test_disabled_port_skipped_on_idle() {
    let harness = Harness::filter("skip-disabled", 1);
    harness.command(Command::PortDisable(PortTarget::Index(1)));
    harness.expect_completion(Completion::PortDisable(1));

    harness.command(Command::StateSet(State::Idle));
    let inputs = harness.allocate(0, 1);
    harness.expect_state(State::Idle);
    assert!(matches!(
        harness.component.allocate_buffer(1, BUFFER_SIZE),
        Err(ComponentError::IncorrectStateTransition(_))
    ));

    harness.to_loaded(ports(0, inputs));
}

#[test]
fn test_disable_and_enable_while_executing() {
    let harness = Harness::filter("reconfigure", 2);
    let (inputs, outputs) = harness.to_idle(2);
    harness.command(Command::StateSet(State::Executing));
    harness.expect_state(State::Executing);

    harness.command(Command::PortDisable(PortTarget::Index(1)));
    for output in outputs {
        harness.component.free_buffer(1, output).unwrap();
    }
    harness.expect_completion(Completion::PortDisable(1));
    let status = harness.component.port_status(1).unwrap();
    assert!(!status.enabled);
    assert_eq!(status.assigned_buffers, 0);

    // A disabled port may be reconfigured outside Loaded.
    let mut param = Param::PortDefinition(PortDefinition::query(1));
    harness.component.get_parameter(&mut param).unwrap();
    let Param::PortDefinition(mut definition) = param else {
        panic!("wrong parameter kind");
    };
    definition.buffer_count_actual = 3;
    harness
        .component
        .set_parameter(&Param::PortDefinition(definition))
        .unwrap();

    harness.command(Command::PortEnable(PortTarget::Index(1)));
    let outputs = harness.allocate(1, 3);
    harness.expect_completion(Completion::PortEnable(1));
    let status = harness.component.port_status(1).unwrap();
    assert!(status.enabled && status.populated);
    assert_eq!(status.assigned_buffers, 3);

    harness.command(Command::StateSet(State::Idle));
    harness.expect_state(State::Idle);
    harness.to_loaded(ports(0, inputs).chain(ports(1, outputs)));
}

#[test]
fn test_settings_locked_while_enabled() {
    let harness = Harness::filter("locked", 1);
    let (inputs, outputs) = harness.to_idle(1);

    let mut param = Param::PortDefinition(PortDefinition::query(0));
    harness.component.get_parameter(&mut param).unwrap();
    assert!(matches!(
        harness.component.set_parameter(&param),
        Err(ComponentError::IncorrectStateOperation(_))
    ));

    harness.to_loaded(ports(0, inputs).chain(ports(1, outputs)));
}
