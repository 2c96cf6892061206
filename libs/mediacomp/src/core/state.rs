// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

use super::error::{ComponentError, Result};

/// Lifecycle state of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum State {
    /// Created, no buffers, no buffer thread
    #[default]
    Loaded,
    /// Waiting for external resources before it can go Idle
    WaitForResources,
    /// Buffers allocated, not processing
    Idle,
    /// Processing buffers
    Executing,
    /// Holding buffers, processing suspended
    Pause,
    /// Unrecoverable; only destruction is left
    Invalid,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loaded => write!(f, "Loaded"),
            Self::WaitForResources => write!(f, "WaitForResources"),
            Self::Idle => write!(f, "Idle"),
            Self::Executing => write!(f, "Executing"),
            Self::Pause => write!(f, "Pause"),
            Self::Invalid => write!(f, "Invalid"),
        }
    }
}

impl State {
    /// States in which the buffer-management thread runs and buffers may be exchanged.
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Idle | Self::Executing | Self::Pause)
    }
}

/// The lifecycle edge currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransientState {
    #[default]
    None,
    LoadedToIdle,
    IdleToLoaded,
    ExecutingToIdle,
    IdleToExecuting,
    ToPause,
    PauseToExecuting,
}

/// Classify a requested state change.
///
/// Returns the transient state to record while the edge runs, or the error
/// the request resolves to. Requests towards `Invalid` are always accepted
/// here; the handler forces them.
pub fn transition(from: State, to: State) -> Result<TransientState> {
    use State::*;

    if from == Invalid {
        return Err(ComponentError::InvalidState);
    }
    if to == Invalid {
        return Ok(TransientState::None);
    }
    if from == to {
        return Err(ComponentError::SameState);
    }

    match (from, to) {
        (Loaded, Idle) | (WaitForResources, Idle) => Ok(TransientState::LoadedToIdle),
        (Loaded, WaitForResources) | (WaitForResources, Loaded) => Ok(TransientState::None),
        (Idle, Loaded) => Ok(TransientState::IdleToLoaded),
        (Idle, Executing) => Ok(TransientState::IdleToExecuting),
        (Executing, Idle) | (Pause, Idle) => Ok(TransientState::ExecutingToIdle),
        (Idle, Pause) | (Executing, Pause) => Ok(TransientState::ToPause),
        (Pause, Executing) => Ok(TransientState::PauseToExecuting),
        _ => Err(ComponentError::IncorrectStateTransition(format!(
            "{} -> {}",
            from, to
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATES: [State; 5] = [
        State::Loaded,
        State::WaitForResources,
        State::Idle,
        State::Executing,
        State::Pause,
    ];

    fn allowed(from: State, to: State) -> bool {
        use State::*;
        matches!(
            (from, to),
            (Loaded, Idle)
                | (Loaded, WaitForResources)
                | (WaitForResources, Loaded)
                | (WaitForResources, Idle)
                | (Idle, Loaded)
                | (Idle, Executing)
                | (Idle, Pause)
                | (Executing, Idle)
                | (Executing, Pause)
                | (Pause, Idle)
                | (Pause, Executing)
        )
    }

    #[test]
    fn test_full_table() {
        for from in STATES {
            for to in STATES {
                let result = transition(from, to);
                if from == to {
                    assert_eq!(result, Err(ComponentError::SameState), "{from} -> {to}");
                } else if allowed(from, to) {
                    assert!(result.is_ok(), "{from} -> {to} should be allowed");
                } else {
                    assert!(
                        matches!(result, Err(ComponentError::IncorrectStateTransition(_))),
                        "{from} -> {to} should be rejected"
                    );
                }
            }
        }
    }

    #[test]
    fn test_invalid_is_terminal() {
        for to in STATES {
            assert_eq!(
                transition(State::Invalid, to),
                Err(ComponentError::InvalidState)
            );
        }
        for from in STATES {
            assert_eq!(transition(from, State::Invalid), Ok(TransientState::None));
        }
    }

    #[test]
    fn test_transient_for_allocation_edges() {
        assert_eq!(
            transition(State::Loaded, State::Idle),
            Ok(TransientState::LoadedToIdle)
        );
        assert_eq!(
            transition(State::WaitForResources, State::Idle),
            Ok(TransientState::LoadedToIdle)
        );
        assert_eq!(
            transition(State::Idle, State::Loaded),
            Ok(TransientState::IdleToLoaded)
        );
        assert_eq!(
            transition(State::Pause, State::Idle),
            Ok(TransientState::ExecutingToIdle)
        );
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&State::Executing).unwrap();
        let back: State = serde_json::from_str(&json).unwrap();
        assert_eq!(back, State::Executing);
    }
}
