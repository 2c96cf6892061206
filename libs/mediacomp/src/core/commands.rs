// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

use super::buffer::Mark;
use super::state::State;

/// Which ports a port command applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortTarget {
    Index(u32),
    All,
}

impl PortTarget {
    pub fn includes(&self, index: u32) -> bool {
        match self {
            Self::Index(i) => *i == index,
            Self::All => true,
        }
    }
}

impl From<u32> for PortTarget {
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

impl std::fmt::Display for PortTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "port {}", i),
            Self::All => write!(f, "all ports"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    StateSet,
    Flush,
    PortDisable,
    PortEnable,
    MarkBuffer,
}

/// Asynchronous commands accepted by `send_command`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StateSet(State),
    Flush(PortTarget),
    PortDisable(PortTarget),
    PortEnable(PortTarget),
    MarkBuffer { port: u32, mark: Mark },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::StateSet(_) => CommandKind::StateSet,
            Self::Flush(_) => CommandKind::Flush,
            Self::PortDisable(_) => CommandKind::PortDisable,
            Self::PortEnable(_) => CommandKind::PortEnable,
            Self::MarkBuffer { .. } => CommandKind::MarkBuffer,
        }
    }
}

/// Entry in a component's command queue.
#[derive(Debug)]
pub(crate) enum Message {
    Command(Command),
    /// Delivered once at teardown; the handler thread exits on it.
    Terminate,
}
