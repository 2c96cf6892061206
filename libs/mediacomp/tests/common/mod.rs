// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use mediacomp::{
    BufferHeader, CallbackReceivers, ChannelCallbacks, Command, Completion, Component,
    ComponentConfig, ComponentHandle, Event, PortConfig, PortFormat, State,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);
pub const BUFFER_SIZE: usize = 256;

/// A component under test plus the receiving ends of its callbacks.
pub struct Harness {
    pub component: Arc<Component>,
    pub receivers: CallbackReceivers,
}

impl Harness {
    pub fn new(config: ComponentConfig) -> Self {
        let (callbacks, receivers) = ChannelCallbacks::new();
        let component = Component::builder(config)
            .with_callbacks(callbacks)
            .with_processor(mediacomp::Passthrough)
            .build()
            .expect("component should build");
        Self {
            component,
            receivers,
        }
    }

    /// Pass-through filter with `count` buffers of `BUFFER_SIZE` per port.
    pub fn filter(name: &str, count: u32) -> Self {
        Self::new(filter_config(name, count))
    }

    pub fn handle(&self) -> Arc<dyn ComponentHandle> {
        self.component.clone()
    }

    pub fn command(&self, command: Command) {
        self.component
            .send_command(command)
            .expect("command should be accepted");
    }

    pub fn expect_state(&self, state: State) {
        let result = self.receivers.wait_for_state(self.component.id(), TIMEOUT);
        assert_eq!(result, Some(Ok(state)));
        assert_eq!(self.component.get_state(), state);
    }

    pub fn expect_completion(&self, completion: Completion) {
        let id = self.component.id();
        let event = self.receivers.wait_for_event(TIMEOUT, |from, event| {
            from == id && *event == Event::CmdComplete(completion)
        });
        assert!(event.is_some(), "no {:?} completion", completion);
    }

    pub fn allocate(&self, port: u32, count: u32) -> Vec<BufferHeader> {
        (0..count)
            .map(|_| {
                self.component
                    .allocate_buffer(port, BUFFER_SIZE)
                    .expect("allocation should succeed")
            })
            .collect()
    }

    /// Loaded -> Idle with `count` client buffers on each port.
    pub fn to_idle(&self, count: u32) -> (Vec<BufferHeader>, Vec<BufferHeader>) {
        self.command(Command::StateSet(State::Idle));
        let inputs = self.allocate(0, count);
        let outputs = self.allocate(1, count);
        self.expect_state(State::Idle);
        (inputs, outputs)
    }

    /// Idle -> Loaded, freeing the given buffers.
    pub fn to_loaded(&self, buffers: impl IntoIterator<Item = (u32, BufferHeader)>) {
        self.command(Command::StateSet(State::Loaded));
        for (port, buffer) in buffers {
            self.component
                .free_buffer(port, buffer)
                .expect("free should succeed");
        }
        self.expect_state(State::Loaded);
    }

    pub fn empty_done(&self, count: usize) -> Vec<BufferHeader> {
        CallbackReceivers::collect_buffers(&self.receivers.empty_done, count, TIMEOUT)
    }

    pub fn fill_done(&self, count: usize) -> Vec<BufferHeader> {
        CallbackReceivers::collect_buffers(&self.receivers.fill_done, count, TIMEOUT)
    }
}

pub fn filter_config(name: &str, count: u32) -> ComponentConfig {
    ComponentConfig::new(name)
        .with_port(PortConfig::input(PortFormat::audio("pcm")).with_buffers(count, BUFFER_SIZE))
        .with_port(PortConfig::output(PortFormat::audio("pcm")).with_buffers(count, BUFFER_SIZE))
        .with_tunnel_retry(100, 10)
}

/// Poll `condition` until it holds, failing the test after `TIMEOUT`.
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Buffer filled with `len` copies of `byte`.
pub fn filled(mut buffer: BufferHeader, byte: u8, len: usize) -> BufferHeader {
    buffer.fill_from(&vec![byte; len]);
    buffer
}

pub fn ports(port: u32, buffers: Vec<BufferHeader>) -> impl Iterator<Item = (u32, BufferHeader)> {
    buffers.into_iter().map(move |b| (port, b))
}
