// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! FIFO paired with a counting semaphore.
//!
//! The semaphore count equals the queue length at all times: every push is
//! followed by an `up`, every pop is preceded by a `down`. Holds pending
//! buffers on a port and pending messages on a component.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;

use super::semaphore::Semaphore;

pub struct SyncQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Semaphore,
}

impl<T> Default for SyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Semaphore::new(0),
        }
    }

    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.available.up();
    }

    /// Block until an item is queued, then dequeue it.
    pub fn pop(&self) -> Option<T> {
        self.available.down();
        self.items.lock().pop_front()
    }

    /// Blocking pop bounded by `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        if self.available.down_timeout(timeout) {
            self.items.lock().pop_front()
        } else {
            None
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        if self.available.try_down() {
            self.items.lock().pop_front()
        } else {
            None
        }
    }

    /// Remove every queued item, keeping the semaphore in step.
    pub fn drain(&self) -> Vec<T> {
        let mut drained = Vec::new();
        while let Some(item) = self.try_pop() {
            drained.push(item);
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Semaphore count; equal to `len()` whenever no push/pop is mid-flight.
    pub fn available(&self) -> u32 {
        self.available.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = SyncQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_semaphore_tracks_length() {
        let queue = SyncQueue::new();
        for i in 0..4 {
            queue.push(i);
            assert_eq!(queue.available() as usize, queue.len());
        }
        queue.try_pop();
        assert_eq!(queue.available() as usize, queue.len());
        let rest = queue.drain();
        assert_eq!(rest, vec![1, 2, 3]);
        assert_eq!(queue.available(), 0);
        assert!(queue.is_empty());
    }
}
