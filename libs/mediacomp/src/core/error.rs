// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

use super::buffer::BufferHeader;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    #[error("Bad parameter: {0}")]
    BadParameter(String),

    #[error("Structure version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },

    #[error("Bad port index: {0}")]
    BadPortIndex(u32),

    #[error("Incorrect state transition: {0}")]
    IncorrectStateTransition(String),

    #[error("Operation not allowed in current state: {0}")]
    IncorrectStateOperation(String),

    #[error("Component is in the Invalid state")]
    InvalidState,

    #[error("Component is already in the requested state")]
    SameState,

    #[error("Insufficient resources: {0}")]
    InsufficientResources(String),

    #[error("Ports not compatible: {0}")]
    PortsNotCompatible(String),

    #[error("Port {0} unpopulated while buffers were still expected")]
    PortUnpopulated(u32),

    #[error("Unsupported parameter index: {0}")]
    UnsupportedIndex(String),

    #[error("Unsupported setting: {0}")]
    UnsupportedSetting(String),

    #[error("Undefined error: {0}")]
    Undefined(String),
}

pub type Result<T> = std::result::Result<T, ComponentError>;

/// A buffer entry point refused a buffer; ownership goes back to the caller.
#[derive(Debug)]
pub struct BufferRejected {
    pub error: ComponentError,
    pub buffer: BufferHeader,
}

impl BufferRejected {
    pub fn new(error: ComponentError, buffer: BufferHeader) -> Self {
        Self { error, buffer }
    }

    pub fn into_parts(self) -> (ComponentError, BufferHeader) {
        (self.error, self.buffer)
    }
}

impl std::fmt::Display for BufferRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "buffer {} rejected: {}", self.buffer.id(), self.error)
    }
}

impl std::error::Error for BufferRejected {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<BufferRejected> for ComponentError {
    fn from(rejected: BufferRejected) -> Self {
        rejected.error
    }
}

pub type BufferResult<T> = std::result::Result<T, BufferRejected>;
