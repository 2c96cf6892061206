// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod allocator;
pub mod buffer;
pub mod commands;
pub mod component;
pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod logging;
pub mod params;
pub mod port;
pub mod queue;
pub mod semaphore;
pub mod state;
pub mod tunnel;

pub use allocator::{HeapAllocator, StorageAllocator};
pub use buffer::{BufferFlags, BufferHeader, BufferId, Mark, StorageKind};
pub use commands::{Command, CommandKind, PortTarget};
pub use component::{
    BufferManagement, Component, ComponentBuilder, ComponentCore, ComponentHandle, ComponentId,
    ComponentVersion,
};
pub use config::{ComponentConfig, PortConfig};
pub use error::{BufferRejected, BufferResult, ComponentError, Result};
pub use events::{CallbackReceivers, ChannelCallbacks, Completion, ComponentCallbacks, Event};
pub use filter::{BufferProcessor, FilterLoop, Passthrough};
pub use logging::init_logging;
pub use params::{
    BufferSupplier, BufferSupplierParam, Param, ParamHeader, PortDefinition, PortDomain,
    PortDomainsParam, PortFormat, PriorityParam, Version,
};
pub use port::{Port, PortDirection, PortStatus, TunnelFlags, TunnelStatus};
pub use queue::SyncQueue;
pub use semaphore::Semaphore;
pub use state::{State, TransientState};
pub use tunnel::{setup_tunnel, teardown_tunnel, TunnelPeer, TunnelSetup};
