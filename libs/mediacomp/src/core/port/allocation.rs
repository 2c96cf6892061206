// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Buffer allocation, registration and release on a port.

use std::time::Duration;

use super::slots::{Slot, SlotTable};
use super::Port;
use crate::core::buffer::{BufferHeader, BufferId, StorageKind};
use crate::core::component::ComponentCore;
use crate::core::error::{BufferRejected, BufferResult, ComponentError, Result};
use crate::core::events::Event;
use crate::core::state::TransientState;

/// Upper bound on a single wait for the allocation semaphore; the waiter
/// re-checks for teardown between waits.
const ALLOCATION_POLL: Duration = Duration::from_millis(100);

impl Port {
    /// Buffers may only be registered during the Loaded->Idle edge or while
    /// the port is being enabled.
    fn check_accepting(&self, core: &ComponentCore) -> Result<()> {
        if self.is_transient_to_enabled() {
            return Ok(());
        }
        if core.transient() == TransientState::LoadedToIdle && self.is_enabled() {
            return Ok(());
        }
        Err(ComponentError::IncorrectStateTransition(format!(
            "port {} is not accepting buffers in {}",
            self.index,
            core.state()
        )))
    }

    fn check_size(&self, size: usize) -> Result<()> {
        let required = self.buffer_size();
        if size < required {
            return Err(ComponentError::BadParameter(format!(
                "buffer of {} bytes is smaller than port {} buffer size {}",
                size, self.index, required
            )));
        }
        Ok(())
    }

    pub(crate) fn allocate_buffer(
        &self,
        core: &ComponentCore,
        size: usize,
    ) -> Result<BufferHeader> {
        self.check_accepting(core)?;
        self.check_size(size)?;
        let storage = core.allocate_storage(size)?;
        self.register(
            core,
            BufferHeader::new(storage, StorageKind::Allocated),
            Slot::Allocated,
        )
    }

    pub(crate) fn use_buffer(
        &self,
        core: &ComponentCore,
        storage: Vec<u8>,
    ) -> Result<BufferHeader> {
        self.check_accepting(core)?;
        self.check_size(storage.len())?;
        self.register(
            core,
            BufferHeader::new(storage, StorageKind::External),
            Slot::Assigned,
        )
    }

    fn register(
        &self,
        core: &ComponentCore,
        mut buffer: BufferHeader,
        slot: fn(BufferId) -> Slot,
    ) -> Result<BufferHeader> {
        buffer.set_port_index(self.direction, self.index);
        let populated = {
            let mut slots = self.slots.lock();
            if slots.claim(slot(buffer.id())).is_none() {
                return Err(ComponentError::InsufficientResources(format!(
                    "port {} already holds {} buffers",
                    self.index,
                    slots.capacity()
                )));
            }
            slots.is_populated()
        };

        tracing::trace!("[{}] Port {}: registered {}", core.name(), self.index, buffer.id());
        if populated {
            tracing::debug!("[{}] Port {} populated", core.name(), self.index);
            self.allocation.up();
        }
        Ok(buffer)
    }

    /// Release a buffer registered on this port. External storage is handed
    /// back to the caller.
    pub(crate) fn free_buffer(
        &self,
        core: &ComponentCore,
        buffer: BufferHeader,
    ) -> BufferResult<Option<Vec<u8>>> {
        if buffer.port_index(self.direction) != Some(self.index) {
            return Err(BufferRejected::new(
                ComponentError::BadPortIndex(self.index),
                buffer,
            ));
        }

        let id = buffer.id();
        let drained = {
            let mut slots = self.slots.lock();
            if slots.release(id).is_none() {
                drop(slots);
                return Err(BufferRejected::new(
                    ComponentError::BadParameter(format!(
                        "{} is not registered on port {}",
                        id, self.index
                    )),
                    buffer,
                ));
            }
            slots.is_empty()
        };

        let expected =
            core.transient() == TransientState::IdleToLoaded || self.is_transient_to_disabled();
        if !expected {
            tracing::warn!(
                "[{}] Port {}: {} freed while the port was still in use",
                core.name(),
                self.index,
                id
            );
            core.notify(Event::port_error(
                ComponentError::PortUnpopulated(self.index),
                self.index,
            ));
        }

        if drained {
            tracing::debug!("[{}] Port {} drained", core.name(), self.index);
            self.allocation.up();
        }

        Ok(match buffer.storage() {
            StorageKind::External => Some(buffer.into_storage()),
            StorageKind::Allocated => None,
        })
    }

    /// Block until every slot is taken.
    pub(crate) fn wait_populated(&self, core: &ComponentCore) -> Result<()> {
        self.wait_allocation(core, SlotTable::is_populated)
    }

    /// Block until every buffer has been freed.
    pub(crate) fn wait_drained(&self, core: &ComponentCore) -> Result<()> {
        self.wait_allocation(core, SlotTable::is_empty)
    }

    fn wait_allocation(&self, core: &ComponentCore, done: fn(&SlotTable) -> bool) -> Result<()> {
        loop {
            if done(&self.slots.lock()) {
                return Ok(());
            }
            if core.is_terminating() {
                return Err(ComponentError::InvalidState);
            }
            self.allocation.down_timeout(ALLOCATION_POLL);
        }
    }

    /// Wake anything blocked in an allocation wait so it can observe teardown.
    pub(crate) fn interrupt_allocation_wait(&self) {
        self.allocation.up();
    }
}
