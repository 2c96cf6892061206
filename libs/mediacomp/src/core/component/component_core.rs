// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! State shared by a component's handle, message handler and buffer thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::buffer_management::BufferManagement;
use super::ComponentId;
use crate::core::allocator::StorageAllocator;
use crate::core::buffer::{BufferHeader, Mark};
use crate::core::commands::Message;
use crate::core::config::ComponentConfig;
use crate::core::error::{ComponentError, Result};
use crate::core::events::{ComponentCallbacks, Event};
use crate::core::params::{PortDomain, PriorityParam};
use crate::core::port::{Port, PortDirection};
use crate::core::queue::SyncQueue;
use crate::core::semaphore::Semaphore;
use crate::core::state::{State, TransientState};

const FLUSH_ACK_POLL: Duration = Duration::from_millis(100);

/// Clears the buffer thread's liveness flag when the thread ends, whether
/// the policy returned or panicked.
struct AliveGuard<'a>(&'a AtomicBool);

impl Drop for AliveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ComponentCore {
    id: ComponentId,
    name: String,
    config: ComponentConfig,
    /// Ordered by domain; each domain occupies a contiguous index range.
    ports: Vec<Arc<Port>>,

    state: Mutex<State>,
    /// Notified on every state change and at flush start; the buffer
    /// thread waits on it while paused.
    state_changed: Condvar,
    transient: Mutex<TransientState>,

    callbacks: Arc<dyn ComponentCallbacks>,
    pub(super) messages: SyncQueue<Message>,

    /// Counts reasons for the buffer thread to look at its ports again.
    wake: Semaphore,
    flush_lock: Mutex<()>,
    flush_ack: Semaphore,
    flush_release: Semaphore,

    pending_mark: Mutex<Option<Mark>>,
    pub(super) priority: Mutex<PriorityParam>,
    allocator: Arc<dyn StorageAllocator>,
    buffer_management: Arc<dyn BufferManagement>,
    buffer_thread: Mutex<Option<JoinHandle<()>>>,
    buffer_thread_alive: AtomicBool,
    terminating: AtomicBool,
}

impl ComponentCore {
    pub(super) fn new(
        config: ComponentConfig,
        callbacks: Arc<dyn ComponentCallbacks>,
        allocator: Arc<dyn StorageAllocator>,
        buffer_management: Arc<dyn BufferManagement>,
    ) -> Result<Self> {
        config.validate()?;

        let mut port_configs: Vec<_> = config.ports.iter().collect();
        port_configs.sort_by_key(|p| p.format.domain());
        let ports = port_configs
            .into_iter()
            .enumerate()
            .map(|(index, port)| Arc::new(Port::new(index as u32, port)))
            .collect();

        Ok(Self {
            id: ComponentId::next(),
            name: config.name.clone(),
            config,
            ports,
            state: Mutex::new(State::Loaded),
            state_changed: Condvar::new(),
            transient: Mutex::new(TransientState::None),
            callbacks,
            messages: SyncQueue::new(),
            wake: Semaphore::new(0),
            flush_lock: Mutex::new(()),
            flush_ack: Semaphore::new(0),
            flush_release: Semaphore::new(0),
            pending_mark: Mutex::new(None),
            priority: Mutex::new(PriorityParam::default()),
            allocator,
            buffer_management,
            buffer_thread: Mutex::new(None),
            buffer_thread_alive: AtomicBool::new(false),
            terminating: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ComponentConfig {
        &self.config
    }

    pub fn state(&self) -> State {
        *self.state.lock()
    }

    pub fn transient(&self) -> TransientState {
        *self.transient.lock()
    }

    pub fn ports(&self) -> &[Arc<Port>] {
        &self.ports
    }

    pub fn port(&self, index: u32) -> Result<&Arc<Port>> {
        self.ports
            .get(index as usize)
            .ok_or(ComponentError::BadPortIndex(index))
    }

    /// Lowest-indexed port in `direction`.
    pub fn first_port(&self, direction: PortDirection) -> Option<Arc<Port>> {
        self.ports
            .iter()
            .find(|p| p.direction() == direction)
            .cloned()
    }

    /// First index and number of ports in `domain`.
    pub fn domain_range(&self, domain: PortDomain) -> (u32, u32) {
        let mut indices = self
            .ports
            .iter()
            .filter(|p| p.domain() == domain)
            .map(|p| p.index());
        match indices.next() {
            Some(start) => (start, 1 + indices.count() as u32),
            None => (0, 0),
        }
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::Acquire)
    }

    pub(crate) fn set_state(&self, state: State) {
        let mut current = self.state.lock();
        if *current != state {
            tracing::debug!("[{}] {} -> {}", self.name, *current, state);
        }
        *current = state;
        self.state_changed.notify_all();
    }

    pub(crate) fn set_transient(&self, transient: TransientState) {
        *self.transient.lock() = transient;
    }

    pub(crate) fn begin_termination(&self) {
        self.terminating.store(true, Ordering::Release);
        for port in &self.ports {
            port.interrupt_allocation_wait();
        }
        self.wake_paused();
    }

    // Callbacks. Never called with a component lock held.

    pub fn notify(&self, event: Event) {
        self.callbacks.on_event(self.id, event);
    }

    pub(crate) fn empty_buffer_done(&self, buffer: BufferHeader) {
        self.callbacks.on_empty_buffer_done(self.id, buffer);
    }

    pub(crate) fn fill_buffer_done(&self, buffer: BufferHeader) {
        self.callbacks.on_fill_buffer_done(self.id, buffer);
    }

    pub(crate) fn allocate_storage(&self, size: usize) -> Result<Vec<u8>> {
        self.allocator.allocate(size)
    }

    // Marks

    pub(crate) fn set_pending_mark(&self, mark: Mark) {
        if let Some(previous) = self.pending_mark.lock().replace(mark) {
            tracing::debug!(
                "[{}] Pending mark {} replaced before it was applied",
                self.name,
                previous.data
            );
        }
    }

    /// Take the mark queued by a `MarkBuffer` command, if any.
    pub fn take_pending_mark(&self) -> Option<Mark> {
        self.pending_mark.lock().take()
    }

    // Buffer-thread signalling

    pub fn wake_buffer_thread(&self) {
        self.wake.up();
    }

    /// Block until something may have changed for the buffer thread.
    pub fn wait_for_work(&self) {
        self.wake.down();
    }

    pub(crate) fn wake_paused(&self) {
        let _state = self.state.lock();
        self.state_changed.notify_all();
    }

    /// Block while the component is paused. Returns early when a flush
    /// starts or the component is being torn down.
    pub fn wait_while_paused(&self) {
        let mut state = self.state.lock();
        while *state == State::Pause && !self.any_port_flushing() && !self.is_terminating() {
            self.state_changed.wait(&mut state);
        }
    }

    pub fn any_port_flushing(&self) -> bool {
        self.ports.iter().any(|p| p.is_flushing())
    }

    /// True while the buffer thread should keep running.
    pub fn buffer_loop_active(&self) -> bool {
        if self.is_terminating() {
            return false;
        }
        self.state().is_operational() || self.transient() == TransientState::LoadedToIdle
    }

    // Flush handshake between the handler (flushing a port) and the
    // buffer thread (returning what it holds).

    pub(crate) fn flush_guard(&self) -> MutexGuard<'_, ()> {
        self.flush_lock.lock()
    }

    /// Snapshot of a port's flushing flag, consistent with flush start/end.
    pub fn is_port_flushing(&self, port: &Port) -> bool {
        let _flush = self.flush_lock.lock();
        port.is_flushing()
    }

    /// Whether a flush of any port is in progress.
    pub fn is_flush_pending(&self) -> bool {
        let _flush = self.flush_lock.lock();
        self.any_port_flushing()
    }

    /// Called by the buffer thread once it has returned the buffers it held
    /// for the flushing port.
    pub fn acknowledge_flush(&self) {
        self.flush_ack.up();
    }

    /// Called by the buffer thread after acknowledging; returns once the
    /// handler has finished the flush.
    pub fn wait_flush_release(&self) {
        self.flush_release.down();
    }

    /// Wait for the buffer thread to acknowledge a flush. Gives up if the
    /// thread exits first or the component is being torn down.
    pub(crate) fn await_flush_ack(&self) {
        while !self.flush_ack.down_timeout(FLUSH_ACK_POLL) {
            if !self.is_buffer_thread_alive() || self.is_terminating() {
                return;
            }
        }
    }

    pub(crate) fn release_flush(&self) {
        self.flush_release.up();
    }

    // Buffer thread lifecycle

    pub(crate) fn is_buffer_thread_alive(&self) -> bool {
        self.buffer_thread_alive.load(Ordering::Acquire)
    }

    pub(crate) fn start_buffer_thread(self: &Arc<Self>) -> Result<()> {
        let mut slot = self.buffer_thread.lock();
        if slot.is_some() {
            return Ok(());
        }

        self.buffer_thread_alive.store(true, Ordering::Release);
        let core = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name(format!("{}-buffers", self.name))
            .spawn(move || {
                tracing::debug!("[{}] Buffer management thread started", core.name);
                let _alive = AliveGuard(&core.buffer_thread_alive);
                let policy = Arc::clone(&core.buffer_management);
                policy.run(&core);
                tracing::debug!("[{}] Buffer management thread stopped", core.name);
            });

        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.buffer_thread_alive.store(false, Ordering::Release);
                Err(ComponentError::InsufficientResources(format!(
                    "Failed to spawn buffer thread: {}",
                    e
                )))
            }
        }
    }

    /// Wake the buffer thread so it observes the current state, then join it.
    /// Must not be called from the buffer thread.
    pub(crate) fn stop_buffer_thread(&self) {
        let handle = self.buffer_thread.lock().take();
        let Some(handle) = handle else {
            return;
        };
        self.wake.up();
        self.wake_paused();
        if handle.join().is_err() {
            tracing::error!("[{}] Buffer management thread panicked", self.name);
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        config: ComponentConfig,
        callbacks: Arc<dyn ComponentCallbacks>,
    ) -> Arc<Self> {
        use crate::core::allocator::HeapAllocator;
        use crate::core::filter::FilterLoop;

        Arc::new(
            Self::new(
                config,
                callbacks,
                Arc::new(HeapAllocator),
                Arc::new(FilterLoop::passthrough()),
            )
            .unwrap(),
        )
    }
}

impl std::fmt::Debug for ComponentCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("ports", &self.ports)
            .finish()
    }
}
