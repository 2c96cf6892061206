// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Buffer exchange: accepting buffers, handing them back, and flushing.

use std::sync::atomic::Ordering;

use super::tunnel::PeerLink;
use super::{Port, PortDirection};
use crate::core::buffer::BufferHeader;
use crate::core::component::ComponentCore;
use crate::core::error::{BufferRejected, BufferResult, ComponentError};
use crate::core::state::TransientState;

/// What to do with a buffer that arrived while the port is not accepting work.
enum Arrival {
    Queued,
    Parked,
    Bounce(BufferHeader),
}

impl Port {
    /// Accept a buffer from the client or the tunnel peer.
    ///
    /// While the port is flushing, being disabled, or the component is
    /// leaving Idle for Loaded, the buffer goes straight back to its owner;
    /// a tunnel supplier keeps it in its queue without waking the buffer
    /// thread since it owns the buffer anyway.
    pub(crate) fn send_buffer(
        &self,
        core: &ComponentCore,
        buffer: BufferHeader,
    ) -> BufferResult<()> {
        if buffer.port_index(self.direction) != Some(self.index) {
            return Err(BufferRejected::new(
                ComponentError::BadPortIndex(self.index),
                buffer,
            ));
        }

        let alloc_len = buffer.alloc_len();
        if buffer
            .offset
            .checked_add(buffer.filled_len)
            .is_none_or(|end| end > alloc_len)
        {
            return Err(BufferRejected::new(
                ComponentError::BadParameter(format!(
                    "payload {}+{} exceeds {} bytes of storage",
                    buffer.offset, buffer.filled_len, alloc_len
                )),
                buffer,
            ));
        }

        let state = core.state();
        if !state.is_operational() {
            return Err(BufferRejected::new(
                ComponentError::IncorrectStateOperation(format!(
                    "cannot accept buffers in {}",
                    state
                )),
                buffer,
            ));
        }

        let arrival = {
            let _gate = self.gate.lock();
            let supplier = self.is_tunneled_supplier();
            let disabling = self.is_transient_to_disabled();
            if !self.is_enabled() && !(disabling && supplier) {
                return Err(BufferRejected::new(
                    ComponentError::IncorrectStateOperation(format!(
                        "port {} is disabled",
                        self.index
                    )),
                    buffer,
                ));
            }

            let transient = core.transient();
            let hold_back = self.is_flushing()
                || disabling
                || transient == TransientState::IdleToLoaded
                || (self.is_tunneled()
                    && !supplier
                    && transient == TransientState::ExecutingToIdle);

            if !hold_back {
                self.queue.push(buffer);
                Arrival::Queued
            } else if supplier {
                self.queue.push(buffer);
                Arrival::Parked
            } else {
                Arrival::Bounce(buffer)
            }
        };

        match arrival {
            Arrival::Queued => core.wake_buffer_thread(),
            Arrival::Parked => {
                tracing::trace!("[{}] Port {}: parked returning buffer", core.name(), self.index);
            }
            Arrival::Bounce(buffer) => {
                tracing::trace!("[{}] Port {}: bouncing {}", core.name(), self.index, buffer.id());
                self.return_buffer(core, buffer);
            }
        }
        Ok(())
    }

    /// Hand a buffer back to whoever supplied it: the client callbacks when
    /// untunneled, the peer otherwise. A buffer the peer refuses stays in
    /// this port's queue.
    pub fn return_buffer(&self, core: &ComponentCore, buffer: BufferHeader) {
        match self.peer() {
            PeerLink::Untunneled => match self.direction {
                PortDirection::Input => core.empty_buffer_done(buffer),
                PortDirection::Output => core.fill_buffer_done(buffer),
            },
            PeerLink::Connected(peer, _) => {
                let result = match self.direction {
                    PortDirection::Input => peer.fill_this_buffer(buffer),
                    PortDirection::Output => peer.empty_this_buffer(buffer),
                };
                if let Err(rejected) = result {
                    let (error, buffer) = rejected.into_parts();
                    tracing::warn!(
                        "[{}] Port {}: peer '{}' refused {}: {}",
                        core.name(),
                        self.index,
                        peer.name(),
                        buffer.id(),
                        error
                    );
                    self.queue.push(buffer);
                }
            }
            PeerLink::Gone => {
                tracing::warn!(
                    "[{}] Port {}: tunnel peer is gone, keeping {}",
                    core.name(),
                    self.index,
                    buffer.id()
                );
                self.queue.push(buffer);
            }
        }
    }

    /// Take the next queued buffer for processing, if the port is accepting work.
    pub fn claim_buffer(&self) -> Option<BufferHeader> {
        if !self.is_enabled() || self.is_transient_to_disabled() || self.is_flushing() {
            return None;
        }
        self.queue.try_pop()
    }

    /// Give back a buffer the buffer thread held while this port flushes.
    /// A supplier keeps its own buffers queued; everyone else returns them.
    pub fn release_flushed(&self, core: &ComponentCore, buffer: BufferHeader) {
        if self.is_tunneled_supplier() {
            self.queue.push(buffer);
        } else {
            self.return_buffer(core, buffer);
        }
    }

    /// Return every queued buffer to its owner. A supplier's queue holds its
    /// own buffers, so it is left alone.
    pub(crate) fn return_queued(&self, core: &ComponentCore) -> usize {
        if self.is_tunneled_supplier() {
            return 0;
        }
        let drained = self.queue.drain();
        let count = drained.len();
        for buffer in drained {
            self.return_buffer(core, buffer);
        }
        count
    }

    /// Return every buffer held by the port or the buffer thread on its
    /// behalf. Runs on the message-handler thread.
    pub(crate) fn flush(&self, core: &ComponentCore) {
        tracing::debug!("[{}] Port {}: flush started", core.name(), self.index);
        {
            let _flush = core.flush_guard();
            let _gate = self.gate.lock();
            self.flushing.store(true, Ordering::Release);
        }

        let synchronized = core.is_buffer_thread_alive();
        if synchronized {
            core.wake_buffer_thread();
            core.wake_paused();
            core.await_flush_ack();
        }

        let returned = self.return_queued(core);

        {
            let _flush = core.flush_guard();
            let _gate = self.gate.lock();
            self.flushing.store(false, Ordering::Release);
        }
        if synchronized {
            core.release_flush();
        }
        tracing::debug!(
            "[{}] Port {}: flush complete, {} buffer(s) returned",
            core.name(),
            self.index,
            returned
        );
    }
}
