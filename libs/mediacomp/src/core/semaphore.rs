// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Counting semaphore used for every wait/signal relationship in the runtime.
//!
//! Used both as a one-shot gate (allocation complete) and as a counter that
//! tracks queued buffers, so callers must never assume binary semantics.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct Semaphore {
    count: Mutex<u32>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(initial: u32) -> Self {
        Self {
            count: Mutex::new(initial),
            available: Condvar::new(),
        }
    }

    /// Block while the count is zero, then decrement it.
    pub fn down(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.available.wait(&mut count);
        }
        *count -= 1;
    }

    /// Like [`down`](Self::down) but gives up after `timeout`.
    /// Returns `true` if the count was decremented.
    pub fn down_timeout(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock();
        while *count == 0 {
            if self.available.wait_for(&mut count, timeout).timed_out() && *count == 0 {
                return false;
            }
        }
        *count -= 1;
        true
    }

    /// Decrement without blocking. Returns `false` if the count was zero.
    pub fn try_down(&self) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    /// Increment the count and wake one waiter.
    pub fn up(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.available.notify_one();
    }

    /// Force the count to zero.
    pub fn reset(&self) {
        *self.count.lock() = 0;
    }

    pub fn value(&self) -> u32 {
        *self.count.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_counts_are_not_binary() {
        let sem = Semaphore::new(0);
        sem.up();
        sem.up();
        sem.up();
        assert_eq!(sem.value(), 3);
        assert!(sem.try_down());
        assert!(sem.try_down());
        assert_eq!(sem.value(), 1);
    }

    #[test]
    fn test_try_down_on_empty() {
        let sem = Semaphore::new(0);
        assert!(!sem.try_down());
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn test_down_timeout_expires() {
        let sem = Semaphore::new(0);
        assert!(!sem.down_timeout(Duration::from_millis(10)));
        sem.up();
        assert!(sem.down_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_reset() {
        let sem = Semaphore::new(5);
        sem.reset();
        assert_eq!(sem.value(), 0);
        assert!(!sem.try_down());
    }

    #[test]
    fn test_down_blocks_until_up() {
        let sem = Arc::new(Semaphore::new(0));
        let (tx, rx) = crossbeam_channel::bounded(1);

        let waiter = {
            let sem = Arc::clone(&sem);
            std::thread::spawn(move || {
                sem.down();
                tx.send(()).unwrap();
            })
        };

        // Still blocked
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        sem.up();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        waiter.join().unwrap();
        assert_eq!(sem.value(), 0);
    }
}
