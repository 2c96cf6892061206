// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Direct component-to-component connections.
//!
//! A tunnel links an output port of one component to an input port of
//! another so buffers flow between them without the client. Exactly one
//! side of the tunnel (the supplier) allocates the buffers; the other side
//! registers them through `use_buffer`.

use std::sync::Arc;

use super::component::ComponentHandle;
use super::error::{ComponentError, Result};
use super::params::BufferSupplier;

/// The far end of a tunnel, as handed to `component_tunnel_request`.
#[derive(Clone)]
pub struct TunnelPeer {
    pub component: Arc<dyn ComponentHandle>,
    pub port: u32,
}

impl TunnelPeer {
    pub fn new(component: &Arc<dyn ComponentHandle>, port: u32) -> Self {
        Self {
            component: Arc::clone(component),
            port,
        }
    }
}

impl std::fmt::Debug for TunnelPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelPeer")
            .field("component", &self.component.name())
            .field("port", &self.port)
            .finish()
    }
}

/// Negotiation record passed from the output side to the input side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TunnelSetup {
    /// The output side only reads the buffers; the input side must supply.
    pub read_only: bool,
    /// Preference on the way in, decision on the way out.
    pub supplier: BufferSupplier,
}

/// Connect `output:out_port` to `input:in_port`.
///
/// The output side is asked first, then the input side, which makes the
/// supplier decision. If the input side refuses, the output side is torn
/// down again. Returns the negotiated setup.
pub fn setup_tunnel(
    output: &Arc<dyn ComponentHandle>,
    out_port: u32,
    input: &Arc<dyn ComponentHandle>,
    in_port: u32,
) -> Result<TunnelSetup> {
    let mut setup = TunnelSetup::default();
    output.component_tunnel_request(out_port, Some(TunnelPeer::new(input, in_port)), &mut setup)?;

    if let Err(e) =
        input.component_tunnel_request(in_port, Some(TunnelPeer::new(output, out_port)), &mut setup)
    {
        tracing::warn!(
            "[{}] Tunnel to '{}' port {} refused: {}",
            output.name(),
            input.name(),
            in_port,
            e
        );
        let mut cancel = TunnelSetup::default();
        if let Err(cancel_error) = output.component_tunnel_request(out_port, None, &mut cancel) {
            tracing::warn!(
                "[{}] Failed to cancel half-open tunnel on port {}: {}",
                output.name(),
                out_port,
                cancel_error
            );
        }
        return Err(e);
    }

    tracing::info!(
        "[{}] Port {} tunneled to '{}' port {}, supplier {:?}",
        output.name(),
        out_port,
        input.name(),
        in_port,
        setup.supplier
    );
    Ok(setup)
}

/// Disconnect both sides of a tunnel. Both components must allow tunnel
/// requests (Loaded, or the ports disabled).
pub fn teardown_tunnel(
    output: &Arc<dyn ComponentHandle>,
    out_port: u32,
    input: &Arc<dyn ComponentHandle>,
    in_port: u32,
) -> Result<()> {
    let mut setup = TunnelSetup::default();
    let out_result = output.component_tunnel_request(out_port, None, &mut setup);
    let in_result = input.component_tunnel_request(in_port, None, &mut setup);
    out_result.and(in_result).map_err(|e| match e {
        ComponentError::BadPortIndex(_) => e,
        other => ComponentError::Undefined(format!("tunnel teardown failed: {}", other)),
    })
}
