// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Lifecycle edges and port enable/disable, executed on the handler thread.

use std::sync::Arc;

use super::ComponentCore;
use crate::core::error::{ComponentError, Result};
use crate::core::port::Port;
use crate::core::state::{self, State, TransientState};

impl ComponentCore {
    pub(super) fn change_state(self: &Arc<Self>, target: State) -> Result<()> {
        let from = self.state();
        if target == State::Invalid {
            self.enter_invalid();
            return Err(ComponentError::InvalidState);
        }

        let transient = state::transition(from, target)?;
        self.begin_transient(transient);
        let result = self.run_edge(from, target);
        self.set_transient(TransientState::None);
        result
    }

    /// Record the transient state of an edge about to run.
    pub(super) fn begin_transient(&self, transient: TransientState) {
        self.set_transient(transient);
        if transient == TransientState::LoadedToIdle {
            self.ports().iter().for_each(|p| p.prepare_slots());
        }
    }

    fn run_edge(self: &Arc<Self>, from: State, target: State) -> Result<()> {
        match (from, target) {
            (State::Loaded | State::WaitForResources, State::Idle) => self.loaded_to_idle(),
            (State::Idle, State::Loaded) => self.idle_to_loaded(),
            (State::Idle, State::Executing) => {
                self.set_state(State::Executing);
                self.preload_supplier_buffers();
                self.wake_buffer_thread();
                Ok(())
            }
            (State::Executing | State::Pause, State::Idle) => {
                for port in self.ports() {
                    port.flush(self);
                }
                self.set_state(State::Idle);
                Ok(())
            }
            (State::Pause, State::Executing) => {
                self.set_state(State::Executing);
                self.wake_buffer_thread();
                Ok(())
            }
            _ => {
                self.set_state(target);
                Ok(())
            }
        }
    }

    /// Supplier ports allocate and share their tunnel buffers; every other
    /// enabled port waits until the client (or the peer) has populated it.
    /// On failure the tunnel buffers already shared are freed with their
    /// peers so the next attempt starts from empty slot tables.
    fn loaded_to_idle(self: &Arc<Self>) -> Result<()> {
        let result = self.populate_enabled_ports().and_then(|()| self.start_buffer_thread());
        if let Err(e) = result {
            let suppliers = self.ports().iter().filter(|p| p.is_tunneled_supplier());
            for port in suppliers.filter(|p| p.is_enabled()) {
                port.reclaim_tunnel_buffers(self);
            }
            return Err(e);
        }
        self.set_state(State::Idle);
        Ok(())
    }

    fn populate_enabled_ports(&self) -> Result<()> {
        for port in self.ports().iter().filter(|p| p.is_enabled()) {
            if port.is_tunneled_supplier() {
                port.allocate_tunnel_buffers(self)?;
            } else {
                port.wait_populated(self)?;
            }
        }
        Ok(())
    }

    /// Supplier ports collect and free their tunnel buffers; every other
    /// port hands back what it still queues and waits to be drained.
    fn idle_to_loaded(&self) -> Result<()> {
        for port in self.ports() {
            if port.is_tunneled_supplier() {
                port.free_tunnel_buffers(self)?;
            } else {
                port.return_queued(self);
                port.wait_drained(self)?;
            }
        }
        self.set_state(State::Loaded);
        self.stop_buffer_thread();
        Ok(())
    }

    /// Wake the buffer thread once per buffer a supplier already holds, so
    /// they are sent to the peer as soon as processing starts.
    fn preload_supplier_buffers(&self) {
        for port in self.ports().iter().filter(|p| p.is_tunneled_supplier()) {
            for _ in 0..port.queued() {
                self.wake_buffer_thread();
            }
        }
    }

    fn enter_invalid(&self) {
        tracing::error!("[{}] Entering Invalid state", self.name());
        self.set_state(State::Invalid);
        self.set_transient(TransientState::None);
        self.stop_buffer_thread();
    }

    pub(super) fn disable_port(&self, port: &Port) -> Result<()> {
        let result = self.release_port_buffers(port);
        port.complete_disable(result.is_ok());
        result?;
        tracing::info!("[{}] Port {} disabled", self.name(), port.index());
        Ok(())
    }

    fn release_port_buffers(&self, port: &Port) -> Result<()> {
        if !self.state().is_operational() {
            return Ok(());
        }
        port.flush(self);
        if port.is_tunneled_supplier() {
            port.free_tunnel_buffers(self)
        } else {
            port.wait_drained(self)
        }
    }

    pub(super) fn enable_port(&self, port: &Port) -> Result<()> {
        let result = self.populate_port(port);
        port.complete_enable(result.is_ok());
        result?;

        if self.state() == State::Executing && port.is_tunneled_supplier() {
            for _ in 0..port.queued() {
                self.wake_buffer_thread();
            }
        }
        tracing::info!("[{}] Port {} enabled", self.name(), port.index());
        Ok(())
    }

    fn populate_port(&self, port: &Port) -> Result<()> {
        let state = self.state();
        if !state.is_operational() && self.transient() != TransientState::LoadedToIdle {
            return Ok(());
        }
        if port.is_tunneled_supplier() {
            port.allocate_tunnel_buffers(self)
        } else {
            port.wait_populated(self)
        }
    }
}
