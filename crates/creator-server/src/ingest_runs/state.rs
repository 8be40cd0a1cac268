//! Ingest run state machine
//!
//! ```text
//!            start            complete
//! waiting ──────────▶ running ─────────▶ complete
//!    │                   │  fail
//!    │ cancel            ├─────────────▶ failed
//!    │                   │ cancel
//!    └───────────────────┴─────────────▶ canceled
//! ```
//!
//! Terminal states are sticky. Canceling a terminal run is accepted as a
//! no-op and returns the unchanged state; every other event outside the
//! table above is an [`IllegalTransition`].

use serde::{Deserialize, Serialize};

/// Lifecycle state of an ingest run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestRunState {
    Waiting,
    Running,
    Complete,
    Failed,
    Canceled,
}

impl IngestRunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestRunState::Waiting => "waiting",
            IngestRunState::Running => "running",
            IngestRunState::Complete => "complete",
            IngestRunState::Failed => "failed",
            IngestRunState::Canceled => "canceled",
        }
    }

    /// Whether no further transition can leave this state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IngestRunState::Complete | IngestRunState::Failed | IngestRunState::Canceled
        )
    }

    /// Apply an event to this state.
    ///
    /// Returns the next state, or the current one when `event` is a cancel
    /// against an already terminal run.
    pub fn apply(self, event: StateEvent) -> Result<IngestRunState, IllegalTransition> {
        use IngestRunState::*;

        match (self, event) {
            (Waiting, StateEvent::Start) => Ok(Running),
            (Running, StateEvent::Complete) => Ok(Complete),
            (Running, StateEvent::Fail) => Ok(Failed),
            (Waiting | Running, StateEvent::Cancel) => Ok(Canceled),
            (state, StateEvent::Cancel) if state.is_terminal() => Ok(state),
            (from, event) => Err(IllegalTransition { from, event }),
        }
    }
}

impl std::fmt::Display for IngestRunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IngestRunState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(IngestRunState::Waiting),
            "running" => Ok(IngestRunState::Running),
            "complete" => Ok(IngestRunState::Complete),
            "failed" => Ok(IngestRunState::Failed),
            "canceled" => Ok(IngestRunState::Canceled),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

/// Stored state text that does not name a known state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ingest run state '{0}'")]
pub struct UnknownState(pub String);

/// Events that drive the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateEvent {
    Start,
    Complete,
    Fail,
    Cancel,
}

impl StateEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateEvent::Start => "start",
            StateEvent::Complete => "complete",
            StateEvent::Fail => "fail",
            StateEvent::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event that is not permitted from the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {event} an ingest run that is {from}")]
pub struct IllegalTransition {
    pub from: IngestRunState,
    pub event: StateEvent,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use IngestRunState::*;

    const ALL: [IngestRunState; 5] = [Waiting, Running, Complete, Failed, Canceled];

    #[test]
    fn test_happy_path() {
        let state = Waiting.apply(StateEvent::Start).unwrap();
        assert_eq!(state, Running);
        assert_eq!(state.apply(StateEvent::Complete).unwrap(), Complete);
        assert_eq!(Running.apply(StateEvent::Fail).unwrap(), Failed);
    }

    #[test]
    fn test_start_only_from_waiting() {
        for state in ALL.into_iter().filter(|s| *s != Waiting) {
            let err = state.apply(StateEvent::Start).unwrap_err();
            assert_eq!(err, IllegalTransition { from: state, event: StateEvent::Start });
        }
    }

    #[test]
    fn test_complete_and_fail_only_from_running() {
        for state in ALL.into_iter().filter(|s| *s != Running) {
            assert!(state.apply(StateEvent::Complete).is_err());
            assert!(state.apply(StateEvent::Fail).is_err());
        }
    }

    #[test]
    fn test_cancel_non_terminal() {
        assert_eq!(Waiting.apply(StateEvent::Cancel).unwrap(), Canceled);
        assert_eq!(Running.apply(StateEvent::Cancel).unwrap(), Canceled);
    }

    #[test]
    fn test_cancel_terminal_is_noop() {
        for state in [Complete, Failed, Canceled] {
            assert_eq!(state.apply(StateEvent::Cancel).unwrap(), state);
        }
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        for state in ALL.into_iter().filter(IngestRunState::is_terminal) {
            for event in [StateEvent::Start, StateEvent::Complete, StateEvent::Fail, StateEvent::Cancel] {
                let next = state.apply(event).unwrap_or(state);
                assert_eq!(next, state, "{state} left its terminal state on {event}");
            }
        }
    }

    #[test]
    fn test_state_round_trips_through_text() {
        for state in ALL {
            assert_eq!(state.as_str().parse::<IngestRunState>().unwrap(), state);
        }
        assert!("initializing".parse::<IngestRunState>().is_err());
    }

    #[test]
    fn test_illegal_transition_message() {
        let err = Complete.apply(StateEvent::Start).unwrap_err();
        assert_eq!(err.to_string(), "cannot start an ingest run that is complete");
    }
}
