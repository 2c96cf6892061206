// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use super::ComponentCore;

/// Body of a component's buffer-management thread.
///
/// `run` is entered when the component starts its Loaded->Idle edge and
/// must return once [`ComponentCore::buffer_loop_active`] turns false,
/// handing back every buffer it still holds. While running it must honour
/// the flush handshake: whenever [`ComponentCore::is_flush_pending`] is
/// true, return the buffers held for flushing ports, call
/// [`ComponentCore::acknowledge_flush`], then
/// [`ComponentCore::wait_flush_release`].
pub trait BufferManagement: Send + Sync {
    fn run(&self, core: &Arc<ComponentCore>);
}
