//! The four ordered crawl stages, and the per-phase retry/backoff
//! sub-state machine.
//!
//! The outer pipeline (areas -> users -> resources -> repository) is a flat
//! sequence with no transitions of its own worth modeling as a state
//! machine. A single phase's response to a connectivity error, though, is a
//! closed set of transitions — attempting, backing off, exhausted — so it's
//! modeled as one here instead of scattering ad-hoc retry counters through
//! the engine loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Areas,
    Users,
    Resources,
    Repository,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Areas, Phase::Users, Phase::Resources, Phase::Repository];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Areas => "areas",
            Phase::Users => "users",
            Phase::Resources => "resources",
            Phase::Repository => "repository",
        }
    }

    pub fn parse(s: &str) -> Option<Phase> {
        match s {
            "areas" => Some(Phase::Areas),
            "users" => Some(Phase::Users),
            "resources" => Some(Phase::Resources),
            "repository" => Some(Phase::Repository),
            _ => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of running a single phase to its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed,
    PartiallyFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting { attempt: u32 },
    Backoff { attempt: u32 },
    Exhausted,
}

impl RetryState {
    pub fn initial() -> Self {
        RetryState::Attempting { attempt: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    ConnectivityError,
    BackoffElapsed,
    Succeeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Proceed,
    Sleep(Duration),
    GiveUp,
}

/// Drive one retry decision. Pure function: no I/O, no sleeping — the
/// caller executes whatever `RetryAction` it gets back.
pub fn handle_retry(state: RetryState, event: RetryEvent, max_retries: u32) -> (RetryState, RetryAction) {
    match (state, event) {
        (RetryState::Attempting { .. }, RetryEvent::Succeeded) => (RetryState::Attempting { attempt: 0 }, RetryAction::Proceed),

        (RetryState::Attempting { attempt }, RetryEvent::ConnectivityError) if attempt < max_retries => {
            let delay = Duration::from_millis(2u64.saturating_pow(attempt) * 1000);
            (RetryState::Backoff { attempt: attempt + 1 }, RetryAction::Sleep(delay))
        }

        (RetryState::Attempting { .. }, RetryEvent::ConnectivityError) => (RetryState::Exhausted, RetryAction::GiveUp),

        (RetryState::Backoff { attempt }, RetryEvent::BackoffElapsed) => (RetryState::Attempting { attempt }, RetryAction::Proceed),

        (state @ RetryState::Exhausted, _) => (state, RetryAction::GiveUp),

        (state, _) => (state, RetryAction::Proceed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_round_trips_phase_names() {
        for phase in Phase::ALL {
            assert_eq!(Phase::parse(phase.as_str()), Some(phase));
        }
        assert_eq!(Phase::parse("bogus"), None);
    }

    #[test]
    fn first_connectivity_error_schedules_backoff() {
        let (state, action) = handle_retry(RetryState::initial(), RetryEvent::ConnectivityError, 3);
        assert_eq!(state, RetryState::Backoff { attempt: 1 });
        assert_eq!(action, RetryAction::Sleep(Duration::from_secs(1)));
    }

    #[test]
    fn backoff_doubles_each_attempt() {
        let (state, action) = handle_retry(RetryState::Attempting { attempt: 1 }, RetryEvent::ConnectivityError, 3);
        assert_eq!(state, RetryState::Backoff { attempt: 2 });
        assert_eq!(action, RetryAction::Sleep(Duration::from_secs(2)));
    }

    #[test]
    fn exhausting_max_retries_gives_up() {
        let (state, action) = handle_retry(RetryState::Attempting { attempt: 3 }, RetryEvent::ConnectivityError, 3);
        assert_eq!(state, RetryState::Exhausted);
        assert_eq!(action, RetryAction::GiveUp);
    }

    #[test]
    fn exhausted_state_stays_exhausted() {
        let (state, action) = handle_retry(RetryState::Exhausted, RetryEvent::BackoffElapsed, 3);
        assert_eq!(state, RetryState::Exhausted);
        assert_eq!(action, RetryAction::GiveUp);
    }

    #[test]
    fn success_resets_attempt_counter() {
        let (state, action) = handle_retry(RetryState::Attempting { attempt: 2 }, RetryEvent::Succeeded, 3);
        assert_eq!(state, RetryState::Attempting { attempt: 0 });
        assert_eq!(action, RetryAction::Proceed);
    }
}
