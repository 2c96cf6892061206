// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-port buffer bookkeeping.

use crate::core::buffer::BufferId;

/// Ownership of one buffer slot on a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Free,
    /// Storage was allocated by this port.
    Allocated(BufferId),
    /// Storage was supplied by the client or the tunnel peer.
    Assigned(BufferId),
}

impl Slot {
    fn id(&self) -> Option<BufferId> {
        match self {
            Self::Free => None,
            Self::Allocated(id) | Self::Assigned(id) => Some(*id),
        }
    }
}

/// Fixed-capacity table of slots. `assigned` always equals the number of
/// non-free slots, and the table is populated exactly when every slot is taken.
#[derive(Debug, Default)]
pub(crate) struct SlotTable {
    slots: Vec<Slot>,
    assigned: u32,
}

impl SlotTable {
    pub(crate) fn new(capacity: u32) -> Self {
        Self {
            slots: vec![Slot::Free; capacity as usize],
            assigned: 0,
        }
    }

    pub(crate) fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    pub(crate) fn assigned(&self) -> u32 {
        self.assigned
    }

    pub(crate) fn is_populated(&self) -> bool {
        !self.slots.is_empty() && self.assigned == self.capacity()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.assigned == 0
    }

    /// Change the capacity. Refused while any slot is taken.
    pub(crate) fn resize(&mut self, capacity: u32) -> bool {
        if !self.is_empty() {
            return false;
        }
        self.slots = vec![Slot::Free; capacity as usize];
        true
    }

    /// Take the first free slot. `None` when the table is full.
    pub(crate) fn claim(&mut self, slot: Slot) -> Option<usize> {
        let position = self.slots.iter().position(|s| *s == Slot::Free)?;
        self.slots[position] = slot;
        self.assigned += 1;
        Some(position)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: BufferId) -> bool {
        self.slots.iter().any(|s| s.id() == Some(id))
    }

    pub(crate) fn release(&mut self, id: BufferId) -> Option<Slot> {
        let position = self.slots.iter().position(|s| s.id() == Some(id))?;
        let slot = std::mem::replace(&mut self.slots[position], Slot::Free);
        self.assigned -= 1;
        Some(slot)
    }

    /// Forget every buffer.
    pub(crate) fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = Slot::Free);
        self.assigned = 0;
    }

    /// Non-free slots counted directly from the table.
    pub(crate) fn occupied(&self) -> u32 {
        self.slots.iter().filter(|s| **s != Slot::Free).count() as u32
    }
}
