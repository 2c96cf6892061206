// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The filter loop: one input buffer and one output buffer at a time.
//!
//! Each turn of the loop picks exactly one step, in priority order:
//! service a flush, leave, wait out a pause, wait for processing to be
//! allowed, fetch an input, fetch an output, or process the pair.
//! Processing applies pending marks, runs the [`BufferProcessor`],
//! propagates end-of-stream and hands finished buffers back.

use std::sync::Arc;

use parking_lot::Mutex;

use super::buffer::{BufferFlags, BufferHeader};
use super::component::{BufferManagement, ComponentCore};
use super::events::Event;
use super::port::{Port, PortDirection};
use super::state::{State, TransientState};

/// Domain-specific work done on one input/output pair.
pub trait BufferProcessor: Send {
    /// Consume from `input` and produce into `output`. Consumption is
    /// reported by lowering `input.filled_len`.
    fn process(&mut self, input: &mut BufferHeader, output: &mut BufferHeader);
}

/// Copies as much of the input payload as fits after the output payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl BufferProcessor for Passthrough {
    fn process(&mut self, input: &mut BufferHeader, output: &mut BufferHeader) {
        let write_at = output.offset + output.filled_len;
        let room = output.alloc_len().saturating_sub(write_at);
        let count = input.filled_len.min(room);

        let read_at = input.offset;
        output.data_mut()[write_at..write_at + count]
            .copy_from_slice(&input.data()[read_at..read_at + count]);
        output.filled_len += count;
        output.timestamp = input.timestamp;

        input.offset += count;
        input.filled_len -= count;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterStep {
    Flushing,
    Exit,
    Paused,
    Waiting,
    NeedInput,
    NeedOutput,
    Processing,
}

#[derive(Default)]
struct HeldBuffers {
    input: Option<BufferHeader>,
    output: Option<BufferHeader>,
}

/// Buffer management for components with one input and one output port.
pub struct FilterLoop {
    processor: Mutex<Option<Box<dyn BufferProcessor>>>,
}

impl FilterLoop {
    pub fn new(processor: Option<Box<dyn BufferProcessor>>) -> Self {
        Self {
            processor: Mutex::new(processor),
        }
    }

    pub fn passthrough() -> Self {
        Self::new(Some(Box::new(Passthrough)))
    }

    fn next_step(core: &ComponentCore, held: &HeldBuffers) -> FilterStep {
        if core.is_flush_pending() {
            return FilterStep::Flushing;
        }
        if !core.buffer_loop_active() {
            return FilterStep::Exit;
        }
        let state = core.state();
        if state == State::Pause {
            return FilterStep::Paused;
        }
        if state != State::Executing || core.transient() == TransientState::ExecutingToIdle {
            return FilterStep::Waiting;
        }
        if held.input.is_none() {
            return FilterStep::NeedInput;
        }
        if held.output.is_none() {
            return FilterStep::NeedOutput;
        }
        FilterStep::Processing
    }

    /// Hand held buffers of flushing ports back, then wait for the handler
    /// to finish the flush. Repeats while any port is still flushing.
    fn service_flush(core: &ComponentCore, input: &Port, output: &Port, held: &mut HeldBuffers) {
        while core.is_flush_pending() {
            if core.is_port_flushing(input) {
                if let Some(buffer) = held.input.take() {
                    input.release_flushed(core, buffer);
                }
            }
            if core.is_port_flushing(output) {
                if let Some(buffer) = held.output.take() {
                    output.release_flushed(core, buffer);
                }
            }
            core.acknowledge_flush();
            core.wait_flush_release();
        }
    }

    fn process_pair(
        &self,
        core: &ComponentCore,
        input_port: &Port,
        output_port: &Port,
        held: &mut HeldBuffers,
    ) {
        let (Some(input), Some(output)) = (held.input.as_mut(), held.output.as_mut()) else {
            return;
        };

        if let Some(mark) = core.take_pending_mark() {
            output.mark = Some(mark);
        }
        if let Some(mark) = input.mark.take() {
            if mark.target == core.id() {
                core.notify(Event::Mark { data: mark.data });
            } else {
                output.mark = Some(mark);
            }
        }

        if input.filled_len > 0 {
            let before = (input.filled_len, output.filled_len);
            match self.processor.lock().as_mut() {
                Some(processor) => processor.process(input, output),
                None => input.filled_len = 0,
            }
            if (input.filled_len, output.filled_len) == before {
                tracing::warn!(
                    "[{}] Processor made no progress on {}, dropping its payload",
                    core.name(),
                    input.id()
                );
                input.filled_len = 0;
            }
        }

        let input_consumed = input.filled_len == 0;
        if input_consumed && input.is_eos() {
            output.flags |= input.flags;
            input.flags.remove(BufferFlags::EOS);
            tracing::debug!("[{}] End of stream on port {}", core.name(), output_port.index());
            core.notify(Event::BufferFlag {
                port: output_port.index(),
                flags: output.flags,
            });
        }
        let output_ready = output.filled_len > 0 || output.is_eos();

        if core.state() == State::Pause {
            core.wait_while_paused();
        }

        if output_ready {
            if let Some(buffer) = held.output.take() {
                output_port.return_buffer(core, buffer);
            }
        }
        if input_consumed {
            if let Some(buffer) = held.input.take() {
                input_port.return_buffer(core, buffer);
            }
        }
    }
}

impl BufferManagement for FilterLoop {
    fn run(&self, core: &Arc<ComponentCore>) {
        let (Some(input), Some(output)) = (
            core.first_port(PortDirection::Input),
            core.first_port(PortDirection::Output),
        ) else {
            tracing::error!("[{}] Filter loop needs an input and an output port", core.name());
            return;
        };

        let mut held = HeldBuffers::default();
        loop {
            match Self::next_step(core, &held) {
                FilterStep::Flushing => Self::service_flush(core, &input, &output, &mut held),
                FilterStep::Exit => break,
                FilterStep::Paused => core.wait_while_paused(),
                FilterStep::Waiting => core.wait_for_work(),
                FilterStep::NeedInput => match input.claim_buffer() {
                    Some(buffer) => held.input = Some(buffer),
                    None => core.wait_for_work(),
                },
                FilterStep::NeedOutput => match output.claim_buffer() {
                    Some(mut buffer) => {
                        buffer.filled_len = 0;
                        buffer.offset = 0;
                        buffer.flags = BufferFlags::empty();
                        held.output = Some(buffer);
                    }
                    None => core.wait_for_work(),
                },
                FilterStep::Processing => self.process_pair(core, &input, &output, &mut held),
            }
        }

        if let Some(buffer) = held.input.take() {
            input.return_buffer(core, buffer);
        }
        if let Some(buffer) = held.output.take() {
            output.return_buffer(core, buffer);
        }
    }
}
