// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Events and client callbacks.
//!
//! Completions of asynchronous commands, errors raised inside the
//! message-handler thread, marks and buffer flags all reach the client
//! through [`ComponentCallbacks::on_event`]. Finished buffers come back
//! through the two done-callbacks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::buffer::{BufferFlags, BufferHeader};
use super::commands::CommandKind;
use super::component::ComponentId;
use super::error::ComponentError;
use super::state::State;

/// A completed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    StateSet(State),
    Flush(u32),
    PortDisable(u32),
    PortEnable(u32),
    MarkBuffer(u32),
}

impl Completion {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::StateSet(_) => CommandKind::StateSet,
            Self::Flush(_) => CommandKind::Flush,
            Self::PortDisable(_) => CommandKind::PortDisable,
            Self::PortEnable(_) => CommandKind::PortEnable,
            Self::MarkBuffer(_) => CommandKind::MarkBuffer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    CmdComplete(Completion),
    Error {
        error: ComponentError,
        port: Option<u32>,
    },
    /// A marked buffer reached its target component.
    Mark { data: u64 },
    /// A buffer carrying `flags` (end of stream) left through `port`.
    BufferFlag { port: u32, flags: BufferFlags },
}

impl Event {
    pub(crate) fn error(error: ComponentError) -> Self {
        Self::Error { error, port: None }
    }

    pub(crate) fn port_error(error: ComponentError, port: u32) -> Self {
        Self::Error {
            error,
            port: Some(port),
        }
    }
}

/// Client-side handlers. Invoked from component threads, never owned by them.
pub trait ComponentCallbacks: Send + Sync {
    fn on_event(&self, component: ComponentId, event: Event);

    /// An input buffer has been consumed and is handed back.
    fn on_empty_buffer_done(&self, component: ComponentId, buffer: BufferHeader);

    /// An output buffer has been filled and is handed back.
    fn on_fill_buffer_done(&self, component: ComponentId, buffer: BufferHeader);
}

/// Callbacks that forward everything into unbounded channels.
pub struct ChannelCallbacks {
    events: Sender<(ComponentId, Event)>,
    empty_done: Sender<(ComponentId, BufferHeader)>,
    fill_done: Sender<(ComponentId, BufferHeader)>,
}

/// Receiving ends of a [`ChannelCallbacks`].
pub struct CallbackReceivers {
    pub events: Receiver<(ComponentId, Event)>,
    pub empty_done: Receiver<(ComponentId, BufferHeader)>,
    pub fill_done: Receiver<(ComponentId, BufferHeader)>,
}

impl ChannelCallbacks {
    pub fn new() -> (Arc<Self>, CallbackReceivers) {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let (empty_tx, empty_rx) = crossbeam_channel::unbounded();
        let (fill_tx, fill_rx) = crossbeam_channel::unbounded();
        (
            Arc::new(Self {
                events: events_tx,
                empty_done: empty_tx,
                fill_done: fill_tx,
            }),
            CallbackReceivers {
                events: events_rx,
                empty_done: empty_rx,
                fill_done: fill_rx,
            },
        )
    }
}

impl ComponentCallbacks for ChannelCallbacks {
    fn on_event(&self, component: ComponentId, event: Event) {
        let _ = self.events.send((component, event));
    }

    fn on_empty_buffer_done(&self, component: ComponentId, buffer: BufferHeader) {
        let _ = self.empty_done.send((component, buffer));
    }

    fn on_fill_buffer_done(&self, component: ComponentId, buffer: BufferHeader) {
        let _ = self.fill_done.send((component, buffer));
    }
}

impl CallbackReceivers {
    /// Wait for the first event matching `predicate`, discarding the others.
    pub fn wait_for_event<F>(
        &self,
        timeout: Duration,
        mut predicate: F,
    ) -> Option<(ComponentId, Event)>
    where
        F: FnMut(ComponentId, &Event) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match self.events.recv_timeout(remaining) {
                Ok((id, event)) if predicate(id, &event) => return Some((id, event)),
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            }
        }
    }

    /// Wait until `component` reports completion of a `StateSet`, or an error.
    pub fn wait_for_state(
        &self,
        component: ComponentId,
        timeout: Duration,
    ) -> Option<std::result::Result<State, ComponentError>> {
        let (_, event) = self.wait_for_event(timeout, |id, event| {
            id == component
                && matches!(
                    event,
                    Event::CmdComplete(Completion::StateSet(_)) | Event::Error { .. }
                )
        })?;
        match event {
            Event::CmdComplete(Completion::StateSet(state)) => Some(Ok(state)),
            Event::Error { error, .. } => Some(Err(error)),
            _ => None,
        }
    }

    /// Collect `count` buffers from a done-channel in arrival order.
    pub fn collect_buffers(
        receiver: &Receiver<(ComponentId, BufferHeader)>,
        count: usize,
        timeout: Duration,
    ) -> Vec<BufferHeader> {
        let deadline = Instant::now() + timeout;
        let mut buffers = Vec::with_capacity(count);
        while buffers.len() < count {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                break;
            };
            match receiver.recv_timeout(remaining) {
                Ok((_, buffer)) => buffers.push(buffer),
                Err(_) => break,
            }
        }
        buffers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::StorageKind;

    #[test]
    fn test_channel_callbacks_forward() {
        let (callbacks, receivers) = ChannelCallbacks::new();
        let id = ComponentId::next();

        callbacks.on_event(id, Event::Mark { data: 7 });
        callbacks.on_fill_buffer_done(id, BufferHeader::new(vec![0; 2], StorageKind::Allocated));

        let (from, event) = receivers.events.try_recv().unwrap();
        assert_eq!(from, id);
        assert_eq!(event, Event::Mark { data: 7 });
        assert_eq!(receivers.fill_done.try_recv().unwrap().1.alloc_len(), 2);
        assert!(receivers.empty_done.try_recv().is_err());
    }

    #[test]
    fn test_wait_for_state_skips_unrelated_events() {
        let (callbacks, receivers) = ChannelCallbacks::new();
        let id = ComponentId::next();
        let other = ComponentId::next();

        callbacks.on_event(id, Event::Mark { data: 1 });
        callbacks.on_event(other, Event::CmdComplete(Completion::StateSet(State::Loaded)));
        callbacks.on_event(id, Event::CmdComplete(Completion::StateSet(State::Idle)));

        let result = receivers.wait_for_state(id, Duration::from_millis(100));
        assert_eq!(result, Some(Ok(State::Idle)));
    }

    #[test]
    fn test_wait_for_event_times_out() {
        let (_callbacks, receivers) = ChannelCallbacks::new();
        assert!(receivers
            .wait_for_event(Duration::from_millis(20), |_, _| true)
            .is_none());
    }
}
