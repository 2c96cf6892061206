// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Buffer storage allocation strategy.

use super::error::{ComponentError, Result};

/// Supplies the storage behind buffers a port allocates itself
/// (`allocate_buffer` and tunnel supplier buffers).
pub trait StorageAllocator: Send + Sync {
    fn allocate(&self, size: usize) -> Result<Vec<u8>>;
}

/// Zero-initialised heap storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl StorageAllocator for HeapAllocator {
    fn allocate(&self, size: usize) -> Result<Vec<u8>> {
        let mut storage = Vec::new();
        storage.try_reserve_exact(size).map_err(|e| {
            ComponentError::InsufficientResources(format!(
                "failed to allocate {} bytes: {}",
                size, e
            ))
        })?;
        storage.resize(size, 0);
        Ok(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_allocator_sizes() {
        let storage = HeapAllocator.allocate(128).unwrap();
        assert_eq!(storage.len(), 128);
        assert!(storage.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_heap_allocator_reports_exhaustion() {
        let result = HeapAllocator.allocate(usize::MAX);
        assert!(matches!(
            result,
            Err(ComponentError::InsufficientResources(_))
        ));
    }
}
