// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Buffer headers exchanged through ports.
//!
//! A [`BufferHeader`] is moved by value between the port queue, the
//! buffer-management thread and its owner (client or tunnel peer), so a
//! header can never be observed in two places at once.

use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

use super::component::ComponentId;
use super::port::PortDirection;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique buffer identity, recorded in port slot tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    fn next() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "buf-{}", self.0)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        const EOS = 0x0000_0001;
        const START_TIME = 0x0000_0002;
        const DECODE_ONLY = 0x0000_0004;
        const DATA_CORRUPT = 0x0000_0008;
        const END_OF_FRAME = 0x0000_0010;
        const SYNC_FRAME = 0x0000_0020;
        const EXTRA_DATA = 0x0000_0040;
        const CODEC_CONFIG = 0x0000_0080;
    }
}

/// Token attached to a buffer; fires a Mark event when it reaches `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    pub target: ComponentId,
    pub data: u64,
}

impl Mark {
    pub fn new(target: ComponentId, data: u64) -> Self {
        Self { target, data }
    }
}

/// Who owns the storage behind a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Allocated by the port that created the header.
    Allocated,
    /// Lent by a client (`use_buffer`) or a tunnel supplier.
    External,
}

#[derive(Debug)]
pub struct BufferHeader {
    id: BufferId,
    data: Vec<u8>,
    storage: StorageKind,
    input_port_index: Option<u32>,
    output_port_index: Option<u32>,
    pub filled_len: usize,
    pub offset: usize,
    pub flags: BufferFlags,
    pub timestamp: i64,
    pub mark: Option<Mark>,
    pub app_private: u64,
}

impl BufferHeader {
    pub(crate) fn new(data: Vec<u8>, storage: StorageKind) -> Self {
        Self {
            id: BufferId::next(),
            data,
            storage,
            input_port_index: None,
            output_port_index: None,
            filled_len: 0,
            offset: 0,
            flags: BufferFlags::empty(),
            timestamp: 0,
            mark: None,
            app_private: 0,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn storage(&self) -> StorageKind {
        self.storage
    }

    /// Capacity of the underlying storage.
    pub fn alloc_len(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The valid payload: `filled_len` bytes starting at `offset`.
    pub fn payload(&self) -> &[u8] {
        let start = self.offset.min(self.data.len());
        let end = (start + self.filled_len).min(self.data.len());
        &self.data[start..end]
    }

    /// Copy `bytes` to the start of the storage and mark them as filled.
    /// Returns how many bytes fit.
    pub fn fill_from(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.data.len());
        self.data[..n].copy_from_slice(&bytes[..n]);
        self.offset = 0;
        self.filled_len = n;
        n
    }

    pub fn is_eos(&self) -> bool {
        self.flags.contains(BufferFlags::EOS)
    }

    pub fn input_port_index(&self) -> Option<u32> {
        self.input_port_index
    }

    pub fn output_port_index(&self) -> Option<u32> {
        self.output_port_index
    }

    pub(crate) fn port_index(&self, direction: PortDirection) -> Option<u32> {
        match direction {
            PortDirection::Input => self.input_port_index,
            PortDirection::Output => self.output_port_index,
        }
    }

    pub(crate) fn set_port_index(&mut self, direction: PortDirection, index: u32) {
        match direction {
            PortDirection::Input => self.input_port_index = Some(index),
            PortDirection::Output => self.output_port_index = Some(index),
        }
    }

    pub(crate) fn into_storage(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = BufferHeader::new(vec![0; 4], StorageKind::Allocated);
        let b = BufferHeader::new(vec![0; 4], StorageKind::Allocated);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_fill_from_truncates_to_capacity() {
        let mut buffer = BufferHeader::new(vec![0; 4], StorageKind::External);
        assert_eq!(buffer.fill_from(&[1, 2, 3, 4, 5, 6]), 4);
        assert_eq!(buffer.filled_len, 4);
        assert_eq!(buffer.payload(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_payload_respects_offset() {
        let mut buffer = BufferHeader::new(vec![1, 2, 3, 4, 5], StorageKind::Allocated);
        buffer.offset = 1;
        buffer.filled_len = 3;
        assert_eq!(buffer.payload(), &[2, 3, 4]);

        buffer.filled_len = 10;
        assert_eq!(buffer.payload(), &[2, 3, 4, 5]);
    }

    #[test]
    fn test_port_indices_by_direction() {
        let mut buffer = BufferHeader::new(vec![0; 1], StorageKind::Allocated);
        buffer.set_port_index(PortDirection::Input, 0);
        buffer.set_port_index(PortDirection::Output, 3);
        assert_eq!(buffer.port_index(PortDirection::Input), Some(0));
        assert_eq!(buffer.output_port_index(), Some(3));
    }

    #[test]
    fn test_eos_flag() {
        let mut buffer = BufferHeader::new(vec![0; 1], StorageKind::Allocated);
        assert!(!buffer.is_eos());
        buffer.flags |= BufferFlags::EOS;
        assert!(buffer.is_eos());
    }
}
