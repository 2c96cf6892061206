// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Ports: one endpoint of buffer exchange on a component.
//!
//! A port owns a queue of pending buffers, a slot table recording which
//! buffers belong to it, its enable/flush flags and, when connected, the
//! tunnel to a peer port. Operations take the owning component's core so
//! they can read the lifecycle state and reach the client callbacks.

mod allocation;
mod exchange;
mod slots;
mod tunnel;

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::buffer::BufferHeader;
use super::config::PortConfig;
use super::error::{ComponentError, Result};
use super::params::{BufferSupplier, ParamHeader, PortDefinition, PortDomain, PortFormat};
use super::queue::SyncQueue;
use super::semaphore::Semaphore;

use slots::SlotTable;

pub use tunnel::{TunnelFlags, TunnelStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

impl PortDirection {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }
}

impl std::fmt::Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Client-settable part of the port definition.
#[derive(Debug, Clone)]
struct PortSettings {
    buffer_count_actual: u32,
    buffer_count_min: u32,
    buffer_size: usize,
    format: PortFormat,
}

/// Point-in-time view of a port, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStatus {
    pub index: u32,
    pub direction: PortDirection,
    pub enabled: bool,
    pub populated: bool,
    pub flushing: bool,
    pub buffer_count_actual: u32,
    /// Buffers currently recorded against the port.
    pub assigned_buffers: u32,
    /// Non-free slots counted from the slot table itself.
    pub occupied_slots: u32,
    pub queued_buffers: usize,
    pub tunnel: Option<TunnelStatus>,
}

pub struct Port {
    index: u32,
    direction: PortDirection,
    settings: Mutex<PortSettings>,
    slots: Mutex<SlotTable>,
    queue: SyncQueue<BufferHeader>,
    /// Serializes "check flags, then enqueue" against the start of a flush.
    gate: Mutex<()>,
    enabled: AtomicBool,
    transient_to_enabled: AtomicBool,
    transient_to_disabled: AtomicBool,
    flushing: AtomicBool,
    /// Signalled when the slot table becomes populated or drains to empty.
    allocation: Semaphore,
    tunnel: Mutex<tunnel::Tunnel>,
    supplier_preference: Mutex<BufferSupplier>,
}

impl Port {
    pub(crate) fn new(index: u32, config: &PortConfig) -> Self {
        Self {
            index,
            direction: config.direction,
            settings: Mutex::new(PortSettings {
                buffer_count_actual: config.buffer_count_actual,
                buffer_count_min: config.buffer_count_min,
                buffer_size: config.buffer_size,
                format: config.format.clone(),
            }),
            slots: Mutex::new(SlotTable::new(config.buffer_count_actual)),
            queue: SyncQueue::new(),
            gate: Mutex::new(()),
            enabled: AtomicBool::new(config.enabled),
            transient_to_enabled: AtomicBool::new(false),
            transient_to_disabled: AtomicBool::new(false),
            flushing: AtomicBool::new(false),
            allocation: Semaphore::new(0),
            tunnel: Mutex::new(tunnel::Tunnel::default()),
            supplier_preference: Mutex::new(config.supplier_preference),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn format(&self) -> PortFormat {
        self.settings.lock().format.clone()
    }

    pub fn domain(&self) -> PortDomain {
        self.settings.lock().format.domain()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn is_populated(&self) -> bool {
        self.slots.lock().is_populated()
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    pub(crate) fn is_transient_to_enabled(&self) -> bool {
        self.transient_to_enabled.load(Ordering::Acquire)
    }

    pub(crate) fn is_transient_to_disabled(&self) -> bool {
        self.transient_to_disabled.load(Ordering::Acquire)
    }

    pub(crate) fn buffer_count_actual(&self) -> u32 {
        self.settings.lock().buffer_count_actual
    }

    pub(crate) fn buffer_size(&self) -> usize {
        self.settings.lock().buffer_size
    }

    pub(crate) fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Flag the port for an upcoming disable. Returns `false` if it is
    /// already disabled or already being disabled.
    pub(crate) fn mark_disabling(&self) -> bool {
        if !self.is_enabled() || self.is_transient_to_disabled() {
            return false;
        }
        self.transient_to_disabled.store(true, Ordering::Release);
        true
    }

    /// Flag the port for an upcoming enable and size its slot table.
    /// Returns `false` if it is already enabled or already being enabled.
    pub(crate) fn mark_enabling(&self) -> bool {
        if self.is_enabled() || self.is_transient_to_enabled() {
            return false;
        }
        self.prepare_slots();
        self.transient_to_enabled.store(true, Ordering::Release);
        true
    }

    /// End a disable; the port is disabled only if it succeeded.
    pub(crate) fn complete_disable(&self, disabled: bool) {
        if disabled {
            self.enabled.store(false, Ordering::Release);
        }
        self.transient_to_disabled.store(false, Ordering::Release);
    }

    /// End an enable; the port is enabled only if it succeeded.
    pub(crate) fn complete_enable(&self, enabled: bool) {
        if enabled {
            self.enabled.store(true, Ordering::Release);
        }
        self.transient_to_enabled.store(false, Ordering::Release);
    }

    /// Match the slot table capacity to the current buffer count.
    pub(crate) fn prepare_slots(&self) {
        let count = self.buffer_count_actual();
        self.slots.lock().resize(count);
    }

    pub(crate) fn definition(&self) -> PortDefinition {
        let settings = self.settings.lock().clone();
        PortDefinition {
            header: ParamHeader::of::<PortDefinition>(),
            port_index: self.index,
            direction: self.direction,
            buffer_count_actual: settings.buffer_count_actual,
            buffer_count_min: settings.buffer_count_min,
            buffer_size: settings.buffer_size,
            enabled: self.is_enabled(),
            populated: self.is_populated(),
            format: settings.format,
        }
    }

    /// Apply the client-settable fields of a definition: buffer count,
    /// buffer size and format (within the port's domain).
    pub(crate) fn apply_definition(&self, definition: &PortDefinition) -> Result<()> {
        if definition.direction != self.direction {
            return Err(ComponentError::BadParameter(format!(
                "port {} is an {} port",
                self.index, self.direction
            )));
        }
        let mut settings = self.settings.lock();
        if definition.buffer_count_actual < settings.buffer_count_min {
            return Err(ComponentError::BadParameter(format!(
                "buffer_count_actual {} below minimum {}",
                definition.buffer_count_actual, settings.buffer_count_min
            )));
        }
        if definition.buffer_size == 0 {
            return Err(ComponentError::BadParameter(
                "buffer_size must be non-zero".into(),
            ));
        }
        if definition.format.domain() != settings.format.domain() {
            return Err(ComponentError::UnsupportedSetting(format!(
                "port {} is a {} port",
                self.index,
                settings.format.domain()
            )));
        }
        settings.buffer_count_actual = definition.buffer_count_actual;
        settings.buffer_size = definition.buffer_size;
        settings.format = definition.format.clone();
        drop(settings);

        self.prepare_slots();
        Ok(())
    }

    pub fn status(&self) -> PortStatus {
        let (populated, assigned, occupied) = {
            let slots = self.slots.lock();
            (slots.is_populated(), slots.assigned(), slots.occupied())
        };
        PortStatus {
            index: self.index,
            direction: self.direction,
            enabled: self.is_enabled(),
            populated,
            flushing: self.is_flushing(),
            buffer_count_actual: self.buffer_count_actual(),
            assigned_buffers: assigned,
            occupied_slots: occupied,
            queued_buffers: self.queued(),
            tunnel: self.tunnel_status(),
        }
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("index", &self.index)
            .field("direction", &self.direction)
            .field("enabled", &self.is_enabled())
            .field("queued", &self.queued())
            .finish()
    }
}
