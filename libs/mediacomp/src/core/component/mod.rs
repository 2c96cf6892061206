// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Components: lifecycle, command dispatch and the client-facing handle.
//!
//! Each component runs two threads. The message handler serializes every
//! asynchronous command (state changes, flush, port enable/disable, marks);
//! the buffer-management thread moves buffers through the ports while the
//! component is Idle, Executing or Paused. Both share a [`ComponentCore`].

mod buffer_management;
mod component_core;
mod handle;
mod message_handler;
mod parameters;
mod state_set;

use std::sync::atomic::{AtomicU64, Ordering};

pub use buffer_management::BufferManagement;
pub use component_core::ComponentCore;
pub use handle::{Component, ComponentBuilder};

use super::buffer::BufferHeader;
use super::commands::Command;
use super::error::{BufferResult, Result};
use super::params::{Param, Version};
use super::port::PortStatus;
use super::state::State;
use super::tunnel::{TunnelPeer, TunnelSetup};

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique component identity. Also the target of buffer marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    pub(crate) fn next() -> Self {
        Self(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "component-{}", self.0)
    }
}

/// Answer to `get_component_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentVersion {
    pub name: String,
    pub component_version: Version,
    pub interface_version: Version,
    pub id: ComponentId,
}

/// Uniform entry points of a component.
///
/// Clients drive components through this trait, and tunneled components
/// call each other through it. Buffer-carrying calls hand a rejected buffer
/// back inside the error so it is never lost.
pub trait ComponentHandle: Send + Sync {
    fn id(&self) -> ComponentId;

    fn name(&self) -> &str;

    fn get_component_version(&self) -> ComponentVersion;

    fn get_state(&self) -> State;

    /// Queue a command for the message handler. Completion is reported
    /// through a `CmdComplete` or `Error` event.
    fn send_command(&self, command: Command) -> Result<()>;

    fn get_parameter(&self, param: &mut Param) -> Result<()>;

    fn set_parameter(&self, param: &Param) -> Result<()>;

    fn allocate_buffer(&self, port: u32, size: usize) -> Result<BufferHeader>;

    fn use_buffer(&self, port: u32, storage: Vec<u8>) -> Result<BufferHeader>;

    /// Release a buffer. Storage supplied through `use_buffer` is returned.
    fn free_buffer(&self, port: u32, buffer: BufferHeader) -> BufferResult<Option<Vec<u8>>>;

    /// Hand a filled buffer to an input port.
    fn empty_this_buffer(&self, buffer: BufferHeader) -> BufferResult<()>;

    /// Hand an empty buffer to an output port.
    fn fill_this_buffer(&self, buffer: BufferHeader) -> BufferResult<()>;

    /// Set up (`Some`) or tear down (`None`) one side of a tunnel.
    fn component_tunnel_request(
        &self,
        port: u32,
        peer: Option<TunnelPeer>,
        setup: &mut TunnelSetup,
    ) -> Result<()>;

    fn port_status(&self, port: u32) -> Result<PortStatus>;
}
