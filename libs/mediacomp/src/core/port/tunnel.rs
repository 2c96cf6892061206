// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Tunnel state on a port, supplier negotiation and supplier-owned buffers.

use std::sync::{Arc, Weak};
use std::time::Duration;

use bitflags::bitflags;

use super::slots::Slot;
use super::{Port, PortDirection};
use crate::core::buffer::BufferHeader;
use crate::core::component::{ComponentCore, ComponentHandle, ComponentId};
use crate::core::error::{ComponentError, Result};
use crate::core::params::{BufferSupplier, BufferSupplierParam, Param, PortDefinition};
use crate::core::state::State;
use crate::core::tunnel::{TunnelPeer, TunnelSetup};

const HOMECOMING_POLL: Duration = Duration::from_millis(100);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TunnelFlags: u32 {
        const ESTABLISHED = 0x0000_0001;
        const SUPPLIER = 0x0000_0002;
    }
}

#[derive(Default)]
pub(super) struct Tunnel {
    peer: Option<Weak<dyn ComponentHandle>>,
    peer_id: Option<ComponentId>,
    peer_port: u32,
    flags: TunnelFlags,
}

impl Tunnel {
    fn connected(peer: &Arc<dyn ComponentHandle>, peer_port: u32, flags: TunnelFlags) -> Self {
        Self {
            peer: Some(Arc::downgrade(peer)),
            peer_id: Some(peer.id()),
            peer_port,
            flags,
        }
    }
}

/// Tunnel as seen from one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelStatus {
    pub peer: ComponentId,
    pub peer_port: u32,
    pub flags: TunnelFlags,
}

/// Resolved tunnel peer.
pub(crate) enum PeerLink {
    Untunneled,
    Connected(Arc<dyn ComponentHandle>, u32),
    /// Tunneled, but the peer component has been dropped.
    Gone,
}

impl Port {
    pub fn is_tunneled(&self) -> bool {
        self.tunnel.lock().flags.contains(TunnelFlags::ESTABLISHED)
    }

    pub fn is_tunneled_supplier(&self) -> bool {
        self.tunnel
            .lock()
            .flags
            .contains(TunnelFlags::ESTABLISHED | TunnelFlags::SUPPLIER)
    }

    pub(crate) fn peer(&self) -> PeerLink {
        let tunnel = self.tunnel.lock();
        if !tunnel.flags.contains(TunnelFlags::ESTABLISHED) {
            return PeerLink::Untunneled;
        }
        match tunnel.peer.as_ref().and_then(Weak::upgrade) {
            Some(peer) => PeerLink::Connected(peer, tunnel.peer_port),
            None => PeerLink::Gone,
        }
    }

    pub(crate) fn tunnel_status(&self) -> Option<TunnelStatus> {
        let tunnel = self.tunnel.lock();
        if !tunnel.flags.contains(TunnelFlags::ESTABLISHED) {
            return None;
        }
        tunnel.peer_id.map(|peer| TunnelStatus {
            peer,
            peer_port: tunnel.peer_port,
            flags: tunnel.flags,
        })
    }

    /// Supplier role as reported by `get_parameter`. An untunneled port
    /// reports its configured preference.
    pub(crate) fn supplier_role(&self) -> BufferSupplier {
        let flags = self.tunnel.lock().flags;
        if !flags.contains(TunnelFlags::ESTABLISHED) {
            return *self.supplier_preference.lock();
        }
        let supplies = flags.contains(TunnelFlags::SUPPLIER);
        match (self.direction, supplies) {
            (PortDirection::Input, true) | (PortDirection::Output, false) => BufferSupplier::Input,
            (PortDirection::Output, true) | (PortDirection::Input, false) => BufferSupplier::Output,
        }
    }

    /// Apply a supplier decision from `set_parameter`.
    ///
    /// Untunneled ports only record the preference. On a tunneled input
    /// port a change of role is forwarded to the peer output so both sides
    /// agree; output ports never forward.
    pub(crate) fn set_supplier(
        &self,
        core: &ComponentCore,
        supplier: BufferSupplier,
    ) -> Result<()> {
        let mut tunnel = self.tunnel.lock();
        if !tunnel.flags.contains(TunnelFlags::ESTABLISHED) {
            drop(tunnel);
            *self.supplier_preference.lock() = supplier;
            return Ok(());
        }

        let supplies = match (self.direction, supplier) {
            (_, BufferSupplier::Unspecified) => {
                return Err(ComponentError::BadParameter(
                    "a tunneled port needs an explicit supplier".into(),
                ));
            }
            (PortDirection::Input, s) => s == BufferSupplier::Input,
            (PortDirection::Output, s) => s == BufferSupplier::Output,
        };
        let was_supplier = tunnel.flags.contains(TunnelFlags::SUPPLIER);
        tunnel.flags.set(TunnelFlags::SUPPLIER, supplies);

        let forward = (self.direction == PortDirection::Input && was_supplier != supplies)
            .then(|| (tunnel.peer.as_ref().and_then(Weak::upgrade), tunnel.peer_port));
        drop(tunnel);

        tracing::debug!(
            "[{}] Port {}: supplier={} after {:?}",
            core.name(),
            self.index,
            supplies,
            supplier
        );

        if let Some((peer, peer_port)) = forward {
            let peer = peer.ok_or_else(|| {
                ComponentError::PortsNotCompatible("tunnel peer is gone".into())
            })?;
            peer.set_parameter(&Param::BufferSupplier(BufferSupplierParam::new(
                peer_port, supplier,
            )))?;
        }
        Ok(())
    }

    /// Handle one side of tunnel setup or teardown.
    ///
    /// The output side records the tunnel and reports its supplier
    /// preference through `setup`. The input side decides who supplies
    /// (input for read-only tunnels and when the preference is not
    /// `Output`), records the decision in `setup` and pushes it to the peer.
    pub(crate) fn tunnel_request(
        &self,
        core: &ComponentCore,
        peer: Option<TunnelPeer>,
        setup: &mut TunnelSetup,
    ) -> Result<()> {
        let Some(TunnelPeer {
            component: peer,
            port: peer_port,
        }) = peer
        else {
            *self.tunnel.lock() = Tunnel::default();
            tracing::debug!("[{}] Port {}: tunnel cleared", core.name(), self.index);
            return Ok(());
        };

        let state = core.state();
        if state != State::Loaded && self.is_enabled() {
            return Err(ComponentError::IncorrectStateOperation(format!(
                "tunnel on enabled port {} requested in {}",
                self.index, state
            )));
        }

        let definition = query_definition(&peer, peer_port)?;
        if definition.direction == self.direction {
            return Err(ComponentError::PortsNotCompatible(format!(
                "both ports are {} ports",
                self.direction
            )));
        }
        if let Some(reason) = self.format().incompatibility(&definition.format) {
            return Err(ComponentError::PortsNotCompatible(reason));
        }

        match self.direction {
            PortDirection::Output => {
                *self.tunnel.lock() =
                    Tunnel::connected(&peer, peer_port, TunnelFlags::ESTABLISHED);
                setup.supplier = *self.supplier_preference.lock();
                tracing::debug!(
                    "[{}] Port {} tunneled to '{}' port {} (preference {:?})",
                    core.name(),
                    self.index,
                    peer.name(),
                    peer_port,
                    setup.supplier
                );
                Ok(())
            }
            PortDirection::Input => {
                let mut peer_supplier =
                    Param::BufferSupplier(BufferSupplierParam::query(peer_port));
                peer.get_parameter(&mut peer_supplier).map_err(|e| {
                    ComponentError::PortsNotCompatible(format!(
                        "peer supplier query failed: {}",
                        e
                    ))
                })?;

                let input_supplies = setup.read_only || setup.supplier != BufferSupplier::Output;
                let decided = if input_supplies {
                    BufferSupplier::Input
                } else {
                    BufferSupplier::Output
                };
                let mut flags = TunnelFlags::ESTABLISHED;
                flags.set(TunnelFlags::SUPPLIER, input_supplies);
                *self.tunnel.lock() = Tunnel::connected(&peer, peer_port, flags);
                setup.supplier = decided;

                let push = peer.set_parameter(&Param::BufferSupplier(BufferSupplierParam::new(
                    peer_port, decided,
                )));
                if let Err(e) = push {
                    self.tunnel.lock().flags = TunnelFlags::empty();
                    return Err(ComponentError::PortsNotCompatible(format!(
                        "peer refused supplier {:?}: {}",
                        decided, e
                    )));
                }

                tracing::debug!(
                    "[{}] Port {} tunneled from '{}' port {}, supplier {:?}",
                    core.name(),
                    self.index,
                    peer.name(),
                    peer_port,
                    decided
                );
                Ok(())
            }
        }
    }

    /// Allocate this supplier port's buffers and register each with the peer
    /// via `use_buffer`. The buffers start out in this port's queue.
    pub(crate) fn allocate_tunnel_buffers(&self, core: &ComponentCore) -> Result<()> {
        let PeerLink::Connected(peer, peer_port) = self.peer() else {
            return Err(ComponentError::Undefined(format!(
                "port {} has no live tunnel peer",
                self.index
            )));
        };

        let count = self.buffer_count_actual();
        let size = self
            .buffer_size()
            .max(query_definition(&peer, peer_port)?.buffer_size);
        self.prepare_slots();

        for _ in 0..count {
            if let Err(e) = self.share_tunnel_buffer(core, &peer, peer_port, size) {
                self.reclaim_tunnel_buffers(core);
                return Err(e);
            }
        }

        tracing::debug!(
            "[{}] Port {}: {} tunnel buffer(s) of {} bytes shared with '{}'",
            core.name(),
            self.index,
            count,
            size,
            peer.name()
        );
        Ok(())
    }

    fn share_tunnel_buffer(
        &self,
        core: &ComponentCore,
        peer: &Arc<dyn ComponentHandle>,
        peer_port: u32,
        size: usize,
    ) -> Result<()> {
        let mut buffer = self.use_peer_buffer(core, peer, peer_port, size)?;
        buffer.set_port_index(self.direction, self.index);
        let claimed = self.slots.lock().claim(Slot::Allocated(buffer.id()));
        if claimed.is_none() {
            self.free_with_peer(core, peer, peer_port, buffer);
            return Err(ComponentError::InsufficientResources(format!(
                "port {} slot table is full",
                self.index
            )));
        }
        self.queue.push(buffer);
        Ok(())
    }

    /// Undo a partial allocation: free every queued tunnel buffer with the
    /// peer and forget all slots. Only valid while the supplier still holds
    /// all of its buffers, i.e. before any were sent.
    pub(crate) fn reclaim_tunnel_buffers(&self, core: &ComponentCore) {
        let buffers = self.queue.drain();
        let reclaimed = buffers.len();
        if let PeerLink::Connected(peer, peer_port) = self.peer() {
            for buffer in buffers {
                self.free_with_peer(core, &peer, peer_port, buffer);
            }
        }
        self.slots.lock().clear();
        tracing::debug!(
            "[{}] Port {}: reclaimed {} tunnel buffer(s)",
            core.name(),
            self.index,
            reclaimed
        );
    }

    fn free_with_peer(
        &self,
        core: &ComponentCore,
        peer: &Arc<dyn ComponentHandle>,
        peer_port: u32,
        buffer: BufferHeader,
    ) {
        let id = buffer.id();
        if let Err(rejected) = peer.free_buffer(peer_port, buffer) {
            tracing::warn!(
                "[{}] Port {}: peer could not free {}: {}",
                core.name(),
                self.index,
                id,
                rejected.error
            );
        }
    }

    /// The peer refuses `use_buffer` until it has entered its own allocation
    /// edge, so retry a bounded number of times.
    fn use_peer_buffer(
        &self,
        core: &ComponentCore,
        peer: &Arc<dyn ComponentHandle>,
        peer_port: u32,
        size: usize,
    ) -> Result<BufferHeader> {
        let retries = core.config().tunnel_use_buffer_retries;
        let interval = Duration::from_millis(core.config().tunnel_retry_interval_ms);
        let mut attempt = 0;
        loop {
            let storage = core.allocate_storage(size)?;
            match peer.use_buffer(peer_port, storage) {
                Ok(buffer) => return Ok(buffer),
                Err(ComponentError::IncorrectStateTransition(reason)) if attempt < retries => {
                    attempt += 1;
                    tracing::trace!(
                        "[{}] Port {}: peer not ready ({}), retry {}/{}",
                        core.name(),
                        self.index,
                        reason,
                        attempt,
                        retries
                    );
                    if core.is_terminating() {
                        return Err(ComponentError::InvalidState);
                    }
                    std::thread::sleep(interval);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Wait for every supplier buffer to come home, then free each with the
    /// peer and release its slot.
    pub(crate) fn free_tunnel_buffers(&self, core: &ComponentCore) -> Result<()> {
        let (peer, peer_port) = match self.peer() {
            PeerLink::Connected(peer, port) => (peer, port),
            PeerLink::Untunneled | PeerLink::Gone => {
                let dropped = self.queue.drain().len();
                self.slots.lock().clear();
                tracing::warn!(
                    "[{}] Port {}: tunnel peer gone, dropped {} buffer(s)",
                    core.name(),
                    self.index,
                    dropped
                );
                return Ok(());
            }
        };

        while !self.slots.lock().is_empty() {
            let Some(buffer) = self.queue.pop_timeout(HOMECOMING_POLL) else {
                if core.is_terminating() {
                    return Err(ComponentError::InvalidState);
                }
                continue;
            };
            let id = buffer.id();
            self.free_with_peer(core, &peer, peer_port, buffer);
            self.slots.lock().release(id);
        }

        tracing::debug!("[{}] Port {}: tunnel buffers freed", core.name(), self.index);
        Ok(())
    }
}

fn query_definition(peer: &Arc<dyn ComponentHandle>, peer_port: u32) -> Result<PortDefinition> {
    let mut param = Param::PortDefinition(PortDefinition::query(peer_port));
    peer.get_parameter(&mut param).map_err(|e| {
        ComponentError::PortsNotCompatible(format!(
            "peer port {} definition query failed: {}",
            peer_port, e
        ))
    })?;
    match param {
        Param::PortDefinition(definition) => Ok(definition),
        other => Err(ComponentError::PortsNotCompatible(format!(
            "peer answered with {}",
            other.name()
        ))),
    }
}
