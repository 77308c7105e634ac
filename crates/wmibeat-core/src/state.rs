//! Query runner state machine types

use std::fmt;

use chrono::{DateTime, Utc};

/// States of a `QueryRunner`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Ticking,
    Executing,
    Emitting,
    Stopped,
}

impl RunnerState {
    /// Check whether moving to `next` is a valid transition
    #[must_use]
    pub fn can_transition_to(self, next: RunnerState) -> bool {
        use RunnerState::{Emitting, Executing, Idle, Stopped, Ticking};

        matches!(
            (self, next),
            (Idle, Ticking)
                | (Ticking, Executing)
                | (Executing, Emitting)
                | (Executing, Ticking)
                | (Emitting, Ticking)
                | (_, Stopped)
        ) && self != Stopped
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunnerState::Idle => "idle",
            RunnerState::Ticking => "ticking",
            RunnerState::Executing => "executing",
            RunnerState::Emitting => "emitting",
            RunnerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters collected by a runner over its lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerStats {
    /// Ticks started
    pub ticks: u64,
    /// Ticks aborted by a connection or execution failure
    pub failed_ticks: u64,
    /// Events published
    pub events: u64,
    /// Fields left out of events (unreadable or not coercible)
    pub skipped_fields: u64,
    /// Most recent tick-aborting error
    pub last_error: Option<String>,
    /// When the last successful tick finished
    pub last_success: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(RunnerState::Idle.can_transition_to(RunnerState::Ticking));
        assert!(RunnerState::Ticking.can_transition_to(RunnerState::Executing));
        assert!(RunnerState::Executing.can_transition_to(RunnerState::Emitting));
        assert!(RunnerState::Executing.can_transition_to(RunnerState::Ticking));
        assert!(RunnerState::Emitting.can_transition_to(RunnerState::Ticking));
        assert!(RunnerState::Idle.can_transition_to(RunnerState::Stopped));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!RunnerState::Idle.can_transition_to(RunnerState::Executing));
        assert!(!RunnerState::Ticking.can_transition_to(RunnerState::Emitting));
        assert!(!RunnerState::Stopped.can_transition_to(RunnerState::Ticking));
        assert!(!RunnerState::Stopped.can_transition_to(RunnerState::Stopped));
    }
}
