// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Builder and client-facing handle of a component.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use super::buffer_management::BufferManagement;
use super::message_handler::run_message_handler;
use super::{ComponentCore, ComponentHandle, ComponentId, ComponentVersion};
use crate::core::allocator::{HeapAllocator, StorageAllocator};
use crate::core::buffer::BufferHeader;
use crate::core::commands::{Command, Message};
use crate::core::config::ComponentConfig;
use crate::core::error::{BufferRejected, BufferResult, ComponentError, Result};
use crate::core::events::ComponentCallbacks;
use crate::core::filter::{BufferProcessor, FilterLoop};
use crate::core::params::{Param, Version, INTERFACE_VERSION};
use crate::core::port::{Port, PortDirection, PortStatus};
use crate::core::state::State;
use crate::core::tunnel::{TunnelPeer, TunnelSetup};

/// Builder for configuring and constructing a [`Component`].
pub struct ComponentBuilder {
    config: ComponentConfig,
    callbacks: Option<Arc<dyn ComponentCallbacks>>,
    allocator: Arc<dyn StorageAllocator>,
    buffer_management: Option<Arc<dyn BufferManagement>>,
    processor: Option<Box<dyn BufferProcessor>>,
}

impl ComponentBuilder {
    pub fn new(config: ComponentConfig) -> Self {
        Self {
            config,
            callbacks: None,
            allocator: Arc::new(HeapAllocator),
            buffer_management: None,
            processor: None,
        }
    }

    /// Set the client callbacks. Required.
    pub fn with_callbacks(mut self, callbacks: Arc<dyn ComponentCallbacks>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    /// Set the storage allocator for port-allocated buffers.
    pub fn with_allocator<A: StorageAllocator + 'static>(mut self, allocator: A) -> Self {
        self.allocator = Arc::new(allocator);
        self
    }

    /// Use a custom buffer-management policy instead of the filter loop.
    pub fn with_buffer_management(mut self, policy: Arc<dyn BufferManagement>) -> Self {
        self.buffer_management = Some(policy);
        self
    }

    /// Processing callback for the default filter loop.
    pub fn with_processor<P: BufferProcessor + 'static>(mut self, processor: P) -> Self {
        self.processor = Some(Box::new(processor));
        self
    }

    /// Construct the component and start its message handler. The component
    /// starts in Loaded.
    pub fn build(self) -> Result<Arc<Component>> {
        let callbacks = self.callbacks.ok_or_else(|| {
            ComponentError::BadParameter("component callbacks are required".into())
        })?;
        let buffer_management = match self.buffer_management {
            Some(policy) => policy,
            None => {
                let has = |d| self.config.ports.iter().any(|p| p.direction == d);
                if !has(PortDirection::Input) || !has(PortDirection::Output) {
                    return Err(ComponentError::BadParameter(format!(
                        "component '{}': the filter loop needs an input and an output port",
                        self.config.name
                    )));
                }
                Arc::new(FilterLoop::new(self.processor))
            }
        };

        let core = Arc::new(ComponentCore::new(
            self.config,
            callbacks,
            self.allocator,
            buffer_management,
        )?);

        let handler_core = Arc::clone(&core);
        let handler = std::thread::Builder::new()
            .name(format!("{}-messages", core.name()))
            .spawn(move || run_message_handler(handler_core))
            .map_err(|e| {
                ComponentError::InsufficientResources(format!(
                    "Failed to spawn message handler: {}",
                    e
                ))
            })?;

        tracing::info!(
            "[{}] Component created with {} port(s)",
            core.name(),
            core.ports().len()
        );

        Ok(Arc::new(Component {
            core,
            handler: Mutex::new(Some(handler)),
        }))
    }
}

/// A running component. Dropping it shuts both threads down.
pub struct Component {
    core: Arc<ComponentCore>,
    handler: Mutex<Option<JoinHandle<()>>>,
}

impl Component {
    pub fn builder(config: ComponentConfig) -> ComponentBuilder {
        ComponentBuilder::new(config)
    }

    /// A filter with one input and one output port that copies input to
    /// output (or just consumes input when `processor` is `None`).
    pub fn filter(
        config: ComponentConfig,
        callbacks: Arc<dyn ComponentCallbacks>,
        processor: Option<Box<dyn BufferProcessor>>,
    ) -> Result<Arc<Self>> {
        let mut builder = ComponentBuilder::new(config).with_callbacks(callbacks);
        builder.processor = processor;
        builder.build()
    }

    pub fn core(&self) -> &Arc<ComponentCore> {
        &self.core
    }

    fn component_version() -> Version {
        let part = |s: &str| s.parse::<u8>().unwrap_or(0);
        Version {
            major: part(env!("CARGO_PKG_VERSION_MAJOR")),
            minor: part(env!("CARGO_PKG_VERSION_MINOR")),
            revision: part(env!("CARGO_PKG_VERSION_PATCH")),
            step: 0,
        }
    }

    fn ensure_valid(&self) -> Result<()> {
        if self.core.state() == State::Invalid {
            return Err(ComponentError::InvalidState);
        }
        Ok(())
    }

    /// The port in `direction` a buffer header names.
    fn buffer_port(&self, buffer: &BufferHeader, direction: PortDirection) -> Result<&Arc<Port>> {
        let index = buffer
            .port_index(direction)
            .ok_or(ComponentError::BadPortIndex(u32::MAX))?;
        let port = self.core.port(index)?;
        if port.direction() != direction {
            return Err(ComponentError::BadPortIndex(index));
        }
        Ok(port)
    }

    fn deliver(&self, buffer: BufferHeader, direction: PortDirection) -> BufferResult<()> {
        if let Err(e) = self.ensure_valid() {
            return Err(BufferRejected::new(e, buffer));
        }
        match self.buffer_port(&buffer, direction) {
            Ok(port) => port.send_buffer(&self.core, buffer),
            Err(e) => Err(BufferRejected::new(e, buffer)),
        }
    }
}

impl ComponentHandle for Component {
    fn id(&self) -> ComponentId {
        self.core.id()
    }

    fn name(&self) -> &str {
        self.core.name()
    }

    fn get_component_version(&self) -> ComponentVersion {
        ComponentVersion {
            name: self.core.name().to_string(),
            component_version: Self::component_version(),
            interface_version: INTERFACE_VERSION,
            id: self.core.id(),
        }
    }

    fn get_state(&self) -> State {
        self.core.state()
    }

    fn send_command(&self, command: Command) -> Result<()> {
        self.core.submit(command)
    }

    fn get_parameter(&self, param: &mut Param) -> Result<()> {
        self.core.get_parameter(param)
    }

    fn set_parameter(&self, param: &Param) -> Result<()> {
        self.core.set_parameter(param)
    }

    fn allocate_buffer(&self, port: u32, size: usize) -> Result<BufferHeader> {
        self.ensure_valid()?;
        self.core.port(port)?.allocate_buffer(&self.core, size)
    }

    fn use_buffer(&self, port: u32, storage: Vec<u8>) -> Result<BufferHeader> {
        self.ensure_valid()?;
        self.core.port(port)?.use_buffer(&self.core, storage)
    }

    fn free_buffer(&self, port: u32, buffer: BufferHeader) -> BufferResult<Option<Vec<u8>>> {
        match self.core.port(port) {
            Ok(p) => p.free_buffer(&self.core, buffer),
            Err(e) => Err(BufferRejected::new(e, buffer)),
        }
    }

    fn empty_this_buffer(&self, buffer: BufferHeader) -> BufferResult<()> {
        self.deliver(buffer, PortDirection::Input)
    }

    fn fill_this_buffer(&self, buffer: BufferHeader) -> BufferResult<()> {
        self.deliver(buffer, PortDirection::Output)
    }

    fn component_tunnel_request(
        &self,
        port: u32,
        peer: Option<TunnelPeer>,
        setup: &mut TunnelSetup,
    ) -> Result<()> {
        self.ensure_valid()?;
        self.core.port(port)?.tunnel_request(&self.core, peer, setup)
    }

    fn port_status(&self, port: u32) -> Result<PortStatus> {
        Ok(self.core.port(port)?.status())
    }
}

impl Drop for Component {
    fn drop(&mut self) {
        tracing::debug!("[{}] Tearing down", self.core.name());
        self.core.begin_termination();
        self.core.messages.push(Message::Terminate);
        if let Some(handler) = self.handler.lock().take() {
            if handler.join().is_err() {
                tracing::error!("[{}] Message handler panicked", self.core.name());
            }
        }
        self.core.set_state(State::Invalid);
        self.core.stop_buffer_thread();
        tracing::info!("[{}] Component destroyed", self.core.name());
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("core", &self.core)
            .finish()
    }
}
