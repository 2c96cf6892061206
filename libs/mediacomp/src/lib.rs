// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Pluggable media component runtime.
//!
//! A [`Component`] owns an ordered set of ports, a lifecycle state machine
//! driven by commands on a message-handler thread, and a buffer-management
//! thread that moves buffers between its ports. Components exchange buffers
//! with a client through [`ComponentCallbacks`] or directly with each other
//! through tunnels.

// Re-export crossbeam_channel for callers consuming ChannelCallbacks
pub use crossbeam_channel;

pub mod core;

pub use crate::core::*;
