// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Command intake and the message-handler thread.
//!
//! `submit` validates what can be decided immediately and queues the rest;
//! the handler thread executes commands one at a time and reports each
//! outcome as an event.

use std::sync::Arc;

use super::ComponentCore;
use crate::core::commands::{Command, Message, PortTarget};
use crate::core::error::{ComponentError, Result};
use crate::core::events::{Completion, Event};
use crate::core::port::Port;
use crate::core::state::{self, State, TransientState};

impl ComponentCore {
    /// Validate and queue a command.
    pub(crate) fn submit(&self, command: Command) -> Result<()> {
        let current = self.state();
        if current == State::Invalid {
            return Err(ComponentError::InvalidState);
        }

        match &command {
            Command::StateSet(target) => {
                // Refused edges are reported by the handler as error events.
                // An edge already in flight keeps its transient state; the
                // handler records this one when it gets to it.
                if let Ok(transient) = state::transition(current, *target) {
                    if transient != TransientState::None
                        && self.transient() == TransientState::None
                    {
                        self.begin_transient(transient);
                    }
                }
            }
            Command::Flush(target) => {
                self.check_target(*target)?;
                if !current.is_operational() {
                    return Err(ComponentError::IncorrectStateOperation(format!(
                        "flush in {}",
                        current
                    )));
                }
            }
            Command::PortDisable(target) => {
                self.check_target(*target)?;
                self.mark_ports(*target, Port::mark_disabling, "disabled")?;
            }
            Command::PortEnable(target) => {
                self.check_target(*target)?;
                self.mark_ports(*target, Port::mark_enabling, "enabled")?;
            }
            Command::MarkBuffer { port, .. } => {
                self.port(*port)?;
            }
        }

        tracing::debug!("[{}] Queued {:?}", self.name(), command);
        self.messages.push(Message::Command(command));
        Ok(())
    }

    fn check_target(&self, target: PortTarget) -> Result<()> {
        match target {
            PortTarget::Index(index) => self.port(index).map(|_| ()),
            PortTarget::All => Ok(()),
        }
    }

    /// Pre-mark the transient enable/disable flag on every targeted port.
    /// A single port already in the requested condition is an error; for
    /// `All`, ports already there are skipped.
    fn mark_ports(&self, target: PortTarget, mark: fn(&Port) -> bool, wanted: &str) -> Result<()> {
        let marked = self
            .ports()
            .iter()
            .filter(|p| target.includes(p.index()))
            .map(|p| mark(p))
            .filter(|marked| *marked)
            .count();
        if marked == 0 {
            return Err(ComponentError::IncorrectStateOperation(format!(
                "{} is already {}",
                target, wanted
            )));
        }
        Ok(())
    }

    fn dispatch(self: &Arc<Self>, command: Command) {
        tracing::debug!("[{}] Executing {:?}", self.name(), command);
        match command {
            Command::StateSet(target) => {
                match self.change_state(target) {
                    Ok(()) => {
                        tracing::info!("[{}] State is now {}", self.name(), target);
                        self.notify(Event::CmdComplete(Completion::StateSet(target)));
                    }
                    Err(e) => {
                        tracing::warn!(
                            "[{}] State change to {} failed: {}",
                            self.name(),
                            target,
                            e
                        );
                        self.notify(Event::error(e));
                    }
                }
            }
            Command::Flush(target) => {
                let state = self.state();
                if !state.is_operational() {
                    self.notify(Event::error(ComponentError::IncorrectStateOperation(format!(
                        "flush in {}",
                        state
                    ))));
                    return;
                }
                for port in self.targeted(target, |_| true) {
                    port.flush(self);
                    self.notify(Event::CmdComplete(Completion::Flush(port.index())));
                }
            }
            Command::PortDisable(target) => {
                for port in self.targeted(target, Port::is_transient_to_disabled) {
                    let index = port.index();
                    match self.disable_port(&port) {
                        Ok(()) => self.notify(Event::CmdComplete(Completion::PortDisable(index))),
                        Err(e) => self.notify(Event::port_error(e, index)),
                    }
                }
            }
            Command::PortEnable(target) => {
                for port in self.targeted(target, Port::is_transient_to_enabled) {
                    let index = port.index();
                    match self.enable_port(&port) {
                        Ok(()) => self.notify(Event::CmdComplete(Completion::PortEnable(index))),
                        Err(e) => self.notify(Event::port_error(e, index)),
                    }
                }
            }
            Command::MarkBuffer { port, mark } => {
                self.set_pending_mark(mark);
                self.notify(Event::CmdComplete(Completion::MarkBuffer(port)));
            }
        }
    }

    fn targeted(&self, target: PortTarget, eligible: fn(&Port) -> bool) -> Vec<Arc<Port>> {
        self.ports()
            .iter()
            .filter(|p| target.includes(p.index()) && eligible(p))
            .cloned()
            .collect()
    }
}

pub(super) fn run_message_handler(core: Arc<ComponentCore>) {
    tracing::debug!("[{}] Message handler started", core.name());
    loop {
        let Some(message) = core.messages.pop() else {
            continue;
        };
        match message {
            Message::Command(command) => {
                if core.is_terminating() {
                    tracing::debug!("[{}] Dropping {:?} during teardown", core.name(), command);
                    continue;
                }
                core.dispatch(command);
            }
            Message::Terminate => break,
        }
    }
    tracing::debug!("[{}] Message handler stopped", core.name());
}
